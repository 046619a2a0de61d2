//! Lookup
//!
//! The widest integrity check in the stack: every node returns the
//! entry's attributes plus the fragment's extended attribute dictionary,
//! and replies combine only when both agree (the per-node content key is
//! compared by length alone). A winning group that excludes some healthy
//! repliers means those nodes hold divergent fragments; `finish` hands
//! them to the healer.
//!
//! The logical size is recovered from the size xattr written alongside
//! every mutation, reconciled minimum-wins against the per-inode cache.

use crate::answer::{xattrs_match, AnswerGroup, NodeAnswer, OpPayload};
use crate::heal::Healer;
use crate::inode::InodeTable;
use crate::manager::OpManager;
use crate::ops::Nodes;
use crate::request::Outcome;
use async_trait::async_trait;
use std::sync::Arc;
use stripefs_common::{
    xattr_to_u64, Errno, FileId, FileKind, Xattrs, XATTR_SIZE, XATTR_VERSION,
};
use tracing::debug;

/// Drop the keys this layer maintains for itself; callers above never
/// see them.
pub(crate) fn strip_internal(xattrs: &Xattrs) -> Xattrs {
    xattrs
        .iter()
        .filter(|(k, _)| !k.starts_with("stripefs."))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub struct LookupManager {
    nodes: Nodes,
    parent: FileId,
    name: String,
    fragments: usize,
    table: Arc<InodeTable>,
    healer: Option<Arc<Healer>>,
}

impl LookupManager {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        parent: FileId,
        name: String,
        fragments: usize,
        table: Arc<InodeTable>,
        healer: Option<Arc<Healer>>,
    ) -> Self {
        Self {
            nodes,
            parent,
            name,
            fragments,
            table,
            healer,
        }
    }
}

#[async_trait]
impl OpManager for LookupManager {
    fn name(&self) -> &'static str {
        "lookup"
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .lookup(self.parent, &self.name)
            .await
            .map(|(attr, xattrs)| OpPayload::Lookup { attr, xattrs })
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (
                Ok(OpPayload::Lookup { attr: a, xattrs: xa }),
                Ok(OpPayload::Lookup { attr: b, xattrs: xb }),
            ) => a.matches(b) && xattrs_match(xa, xb),
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        let (attr, xattrs) = match &group.representative().res {
            Ok(OpPayload::Lookup { attr, xattrs }) => (attr, xattrs),
            Ok(_) => return Err(Errno::EIO),
            Err(errno) => return Err(*errno),
        };

        let mut attr = *attr;
        if attr.kind == FileKind::Regular {
            let ctx = self.table.get(attr.file_id);
            let observed = xattrs
                .get(XATTR_SIZE)
                .and_then(|v| xattr_to_u64(v))
                .unwrap_or(attr.size * self.fragments as u64);
            attr.size = ctx.reconcile_size(attr.file_id, observed);
            attr.blocks *= self.fragments as u64;
            if let Some(version) = xattrs.get(XATTR_VERSION).and_then(|v| xattr_to_u64(v)) {
                ctx.note_version(version);
            }
        }

        Ok(OpPayload::Lookup {
            attr,
            xattrs: strip_internal(xattrs),
        })
    }

    async fn finish(&self, outcome: &Outcome) {
        let Ok(OpPayload::Lookup { attr, .. }) = &outcome.res else {
            return;
        };
        if attr.kind != FileKind::Regular {
            return;
        }
        // Healthy repliers outside the winning group hold divergent
        // fragments.
        let bad = outcome.replied - outcome.good;
        if bad.is_empty() {
            return;
        }
        debug!(file = %attr.file_id, %bad, "lookup found divergent fragments");
        if let Some(healer) = &self.healer {
            healer.spawn(
                attr.file_id,
                self.parent,
                self.name.clone(),
                *attr,
                outcome.good,
                bad,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_internal_keys() {
        let mut xattrs = Xattrs::new();
        xattrs.insert("user.color".into(), b"red".to_vec());
        xattrs.insert(XATTR_SIZE.into(), vec![0; 8]);
        xattrs.insert(XATTR_VERSION.into(), vec![0; 8]);
        let out = strip_internal(&xattrs);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("user.color"));
    }
}
