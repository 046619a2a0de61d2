//! Inode-level operations without data movement
//!
//! stat, access, readlink, open, opendir, flush, fsync and fsyncdir.
//! Read-only queries need only a fragment quorum; handle and sync
//! operations run at full quorum so every node ends up in the same state.
//!
//! Per-node attributes describe the local fragment; `rebuild` rescales
//! them to logical values. Block counts multiply by K; the logical size
//! of a regular file comes from the per-inode size cache when one exists
//! (populated by lookup, truncate and write), with `fragment_size * K` as
//! the fallback upper bound.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::inode::InodeCtx;
use crate::manager::{OpManager, Quorum};
use crate::ops::Nodes;
use async_trait::async_trait;
use std::sync::Arc;
use stripefs_common::{Errno, FileAttr, FileId, FileKind, OpenFlags};

#[derive(Clone, Debug)]
pub enum AttrCall {
    Stat,
    Access { mask: u32 },
    Readlink,
    Open { flags: OpenFlags },
    Opendir,
    Flush,
    Fsync { datasync: bool },
    Fsyncdir { datasync: bool },
}

impl AttrCall {
    fn name(&self) -> &'static str {
        match self {
            AttrCall::Stat => "stat",
            AttrCall::Access { .. } => "access",
            AttrCall::Readlink => "readlink",
            AttrCall::Open { .. } => "open",
            AttrCall::Opendir => "opendir",
            AttrCall::Flush => "flush",
            AttrCall::Fsync { .. } => "fsync",
            AttrCall::Fsyncdir { .. } => "fsyncdir",
        }
    }

    fn quorum(&self) -> Quorum {
        match self {
            // Queries are satisfied by any agreeing fragment quorum.
            AttrCall::Stat | AttrCall::Access { .. } | AttrCall::Readlink => Quorum::Fragments,
            // Handle and sync state must exist on every reachable node.
            _ => Quorum::All,
        }
    }
}

pub struct AttrManager {
    nodes: Nodes,
    file: FileId,
    call: AttrCall,
    /// K, for rescaling fragment attributes to logical values.
    fragments: usize,
    ctx: Arc<InodeCtx>,
}

impl AttrManager {
    #[must_use]
    pub fn new(nodes: Nodes, file: FileId, call: AttrCall, fragments: usize, ctx: Arc<InodeCtx>) -> Self {
        Self {
            nodes,
            file,
            call,
            fragments,
            ctx,
        }
    }
}

/// Rescale a fragment attribute record to logical values.
pub(crate) fn scale_attr(attr: &FileAttr, fragments: usize, cached_size: Option<u64>) -> FileAttr {
    let mut out = *attr;
    if attr.kind == FileKind::Regular {
        out.blocks = attr.blocks * fragments as u64;
        out.size = cached_size.unwrap_or(attr.size * fragments as u64);
    }
    out
}

#[async_trait]
impl OpManager for AttrManager {
    fn name(&self) -> &'static str {
        self.call.name()
    }

    fn quorum(&self) -> Quorum {
        self.call.quorum()
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        let backend = &self.nodes[node];
        match &self.call {
            AttrCall::Stat => backend.stat(self.file).await.map(OpPayload::Attr),
            AttrCall::Access { mask } => backend
                .access(self.file, *mask)
                .await
                .map(|()| OpPayload::Unit),
            AttrCall::Readlink => backend.readlink(self.file).await.map(OpPayload::Target),
            AttrCall::Open { flags } => backend
                .open(self.file, *flags)
                .await
                .map(|()| OpPayload::Unit),
            AttrCall::Opendir => backend.opendir(self.file).await.map(|()| OpPayload::Unit),
            AttrCall::Flush => backend.flush(self.file).await.map(|()| OpPayload::Unit),
            AttrCall::Fsync { datasync } => backend
                .fsync(self.file, *datasync)
                .await
                .map(|()| OpPayload::Unit),
            AttrCall::Fsyncdir { datasync } => backend
                .fsyncdir(self.file, *datasync)
                .await
                .map(|()| OpPayload::Unit),
        }
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Attr(a)), Ok(OpPayload::Attr(b))) => a.matches(b),
            (Ok(OpPayload::Target(a)), Ok(OpPayload::Target(b))) => a == b,
            (Ok(OpPayload::Unit), Ok(OpPayload::Unit)) => true,
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        match &group.representative().res {
            Ok(OpPayload::Attr(attr)) => Ok(OpPayload::Attr(scale_attr(
                attr,
                self.fragments,
                self.ctx.cached_size(),
            ))),
            Ok(payload) => Ok(payload.clone()),
            Err(errno) => Err(*errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripefs_common::FileKind;

    #[test]
    fn test_scale_attr_regular() {
        let mut attr = FileAttr::new(FileId::root(), FileKind::Regular, 0o644, 0, 0);
        attr.size = 512;
        attr.blocks = 1;
        let scaled = scale_attr(&attr, 4, None);
        assert_eq!(scaled.size, 2048);
        assert_eq!(scaled.blocks, 4);
        // The cached logical size is authoritative when present.
        let scaled = scale_attr(&attr, 4, Some(1700));
        assert_eq!(scaled.size, 1700);
    }

    #[test]
    fn test_scale_attr_leaves_directories() {
        let mut attr = FileAttr::new(FileId::root(), FileKind::Directory, 0o755, 0, 0);
        attr.size = 4096;
        let scaled = scale_attr(&attr, 4, Some(99));
        assert_eq!(scaled.size, 4096);
    }
}
