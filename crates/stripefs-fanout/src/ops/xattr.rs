//! Extended attribute operations
//!
//! getxattr, setxattr, removexattr and xattrop. Mutations run at full
//! quorum. The keys this layer maintains internally (the `stripefs.`
//! namespace) are invisible upward: reads filter them out and a filtered
//! single-key read degrades to ENODATA. The facade rejects mutations of
//! internal keys before a manager is ever built.

use crate::answer::{xattrs_match, AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::{OpManager, Quorum};
use crate::ops::lookup::strip_internal;
use crate::ops::Nodes;
use async_trait::async_trait;
use stripefs_common::{Errno, FileId, XattrOpKind, Xattrs};

#[derive(Clone, Debug)]
pub enum XattrCall {
    Get { name: Option<String> },
    /// Read of one bookkeeping key, bypassing the namespace filter.
    /// Built only by this crate, never from caller input.
    GetRaw { name: String },
    Set { xattrs: Xattrs },
    Remove { name: String },
    Op { kind: XattrOpKind, delta: Xattrs },
}

impl XattrCall {
    fn name(&self) -> &'static str {
        match self {
            XattrCall::Get { .. } | XattrCall::GetRaw { .. } => "getxattr",
            XattrCall::Set { .. } => "setxattr",
            XattrCall::Remove { .. } => "removexattr",
            XattrCall::Op { .. } => "xattrop",
        }
    }
}

pub struct XattrManager {
    nodes: Nodes,
    file: FileId,
    call: XattrCall,
}

impl XattrManager {
    #[must_use]
    pub fn new(nodes: Nodes, file: FileId, call: XattrCall) -> Self {
        Self { nodes, file, call }
    }
}

#[async_trait]
impl OpManager for XattrManager {
    fn name(&self) -> &'static str {
        self.call.name()
    }

    fn quorum(&self) -> Quorum {
        match self.call {
            XattrCall::Get { .. } | XattrCall::GetRaw { .. } => Quorum::Fragments,
            _ => Quorum::All,
        }
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        let backend = &self.nodes[node];
        match &self.call {
            XattrCall::Get { name } => backend
                .getxattr(self.file, name.as_deref())
                .await
                .map(OpPayload::Xattrs),
            XattrCall::GetRaw { name } => backend
                .getxattr(self.file, Some(name.as_str()))
                .await
                .map(OpPayload::Xattrs),
            XattrCall::Set { xattrs } => backend
                .setxattr(self.file, xattrs)
                .await
                .map(|()| OpPayload::Unit),
            XattrCall::Remove { name } => backend
                .removexattr(self.file, name)
                .await
                .map(|()| OpPayload::Unit),
            XattrCall::Op { kind, delta } => backend
                .xattrop(self.file, *kind, delta)
                .await
                .map(OpPayload::Xattrs),
        }
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Xattrs(a)), Ok(OpPayload::Xattrs(b))) => xattrs_match(a, b),
            (Ok(OpPayload::Unit), Ok(OpPayload::Unit)) => true,
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        match (&self.call, &group.representative().res) {
            (XattrCall::Get { name }, Ok(OpPayload::Xattrs(xattrs))) => {
                let filtered = strip_internal(xattrs);
                if name.is_some() && filtered.is_empty() {
                    // The only matching key was internal.
                    return Err(Errno::ENODATA);
                }
                Ok(OpPayload::Xattrs(filtered))
            }
            (XattrCall::GetRaw { .. }, Ok(OpPayload::Xattrs(xattrs))) => {
                Ok(OpPayload::Xattrs(xattrs.clone()))
            }
            (_, Ok(payload)) => Ok(payload.clone()),
            (_, Err(errno)) => Err(*errno),
        }
    }
}
