//! Namespace (entry) operations
//!
//! mknod, mkdir, symlink, unlink, rmdir, rename, link and create. All of
//! them mutate the namespace, so they run at full quorum: every reachable
//! node must apply the change before the caller is acknowledged. The file
//! identifier for creating operations is chosen by the caller and handed
//! to every node, keeping the object identity uniform across the cluster.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::{OpManager, Quorum};
use crate::ops::Nodes;
use async_trait::async_trait;
use stripefs_common::{Errno, FileId, FileKind, OpenFlags};

/// The concrete namespace call carried by an [`EntryManager`].
#[derive(Clone, Debug)]
pub enum EntryCall {
    Mknod {
        parent: FileId,
        name: String,
        file: FileId,
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    },
    Mkdir {
        parent: FileId,
        name: String,
        file: FileId,
        mode: u32,
        uid: u32,
        gid: u32,
    },
    Symlink {
        parent: FileId,
        name: String,
        file: FileId,
        target: String,
        uid: u32,
        gid: u32,
    },
    Unlink {
        parent: FileId,
        name: String,
    },
    Rmdir {
        parent: FileId,
        name: String,
    },
    Rename {
        old_parent: FileId,
        old_name: String,
        new_parent: FileId,
        new_name: String,
    },
    Link {
        file: FileId,
        new_parent: FileId,
        new_name: String,
    },
    Create {
        parent: FileId,
        name: String,
        file: FileId,
        mode: u32,
        flags: OpenFlags,
        uid: u32,
        gid: u32,
    },
}

impl EntryCall {
    fn name(&self) -> &'static str {
        match self {
            EntryCall::Mknod { .. } => "mknod",
            EntryCall::Mkdir { .. } => "mkdir",
            EntryCall::Symlink { .. } => "symlink",
            EntryCall::Unlink { .. } => "unlink",
            EntryCall::Rmdir { .. } => "rmdir",
            EntryCall::Rename { .. } => "rename",
            EntryCall::Link { .. } => "link",
            EntryCall::Create { .. } => "create",
        }
    }
}

pub struct EntryManager {
    nodes: Nodes,
    call: EntryCall,
}

impl EntryManager {
    #[must_use]
    pub fn new(nodes: Nodes, call: EntryCall) -> Self {
        Self { nodes, call }
    }
}

#[async_trait]
impl OpManager for EntryManager {
    fn name(&self) -> &'static str {
        self.call.name()
    }

    fn quorum(&self) -> Quorum {
        Quorum::All
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        let backend = &self.nodes[node];
        match &self.call {
            EntryCall::Mknod {
                parent,
                name,
                file,
                kind,
                mode,
                uid,
                gid,
            } => backend
                .mknod(*parent, name, *file, *kind, *mode, *uid, *gid)
                .await
                .map(OpPayload::Attr),
            EntryCall::Mkdir {
                parent,
                name,
                file,
                mode,
                uid,
                gid,
            } => backend
                .mkdir(*parent, name, *file, *mode, *uid, *gid)
                .await
                .map(OpPayload::Attr),
            EntryCall::Symlink {
                parent,
                name,
                file,
                target,
                uid,
                gid,
            } => backend
                .symlink(*parent, name, *file, target, *uid, *gid)
                .await
                .map(OpPayload::Attr),
            EntryCall::Unlink { parent, name } => backend
                .unlink(*parent, name)
                .await
                .map(|()| OpPayload::Unit),
            EntryCall::Rmdir { parent, name } => backend
                .rmdir(*parent, name)
                .await
                .map(|()| OpPayload::Unit),
            EntryCall::Rename {
                old_parent,
                old_name,
                new_parent,
                new_name,
            } => backend
                .rename(*old_parent, old_name, *new_parent, new_name)
                .await
                .map(OpPayload::Attr),
            EntryCall::Link {
                file,
                new_parent,
                new_name,
            } => backend
                .link(*file, *new_parent, new_name)
                .await
                .map(OpPayload::Attr),
            EntryCall::Create {
                parent,
                name,
                file,
                mode,
                flags,
                uid,
                gid,
            } => backend
                .create(*parent, name, *file, *mode, *flags, *uid, *gid)
                .await
                .map(OpPayload::Attr),
        }
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Attr(a)), Ok(OpPayload::Attr(b))) => a.matches(b),
            (Ok(OpPayload::Unit), Ok(OpPayload::Unit)) => true,
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        match &group.representative().res {
            Ok(payload) => Ok(payload.clone()),
            Err(errno) => Err(*errno),
        }
    }
}
