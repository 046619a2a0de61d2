//! Directory listing
//!
//! readdir and readdirp share one manager; the `with_attrs` flag selects
//! the plus variant. Listings combine on structure (names, identifiers,
//! kinds, in order) because per-node attributes legitimately differ;
//! rebuild rescales the attributes of regular entries to logical values.

use crate::answer::{dirents_match, AnswerGroup, NodeAnswer, OpPayload};
use crate::inode::InodeTable;
use crate::manager::OpManager;
use crate::ops::attr::scale_attr;
use crate::ops::Nodes;
use async_trait::async_trait;
use std::sync::Arc;
use stripefs_common::{Errno, FileId};

pub struct ReaddirManager {
    nodes: Nodes,
    file: FileId,
    offset: u64,
    count: usize,
    with_attrs: bool,
    fragments: usize,
    table: Arc<InodeTable>,
}

impl ReaddirManager {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        file: FileId,
        offset: u64,
        count: usize,
        with_attrs: bool,
        fragments: usize,
        table: Arc<InodeTable>,
    ) -> Self {
        Self {
            nodes,
            file,
            offset,
            count,
            with_attrs,
            fragments,
            table,
        }
    }
}

#[async_trait]
impl OpManager for ReaddirManager {
    fn name(&self) -> &'static str {
        if self.with_attrs {
            "readdirp"
        } else {
            "readdir"
        }
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .readdir(self.file, self.offset, self.count, self.with_attrs)
            .await
            .map(OpPayload::Dirents)
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Dirents(a)), Ok(OpPayload::Dirents(b))) => dirents_match(a, b),
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        let entries = match &group.representative().res {
            Ok(OpPayload::Dirents(entries)) => entries,
            Ok(_) => return Err(Errno::EIO),
            Err(errno) => return Err(*errno),
        };
        let mut out = entries.clone();
        if self.with_attrs {
            for entry in &mut out {
                if let Some(attr) = &entry.attr {
                    let cached = self
                        .table
                        .peek(entry.file_id)
                        .and_then(|ctx| ctx.cached_size());
                    entry.attr = Some(scale_attr(attr, self.fragments, cached));
                }
            }
        }
        Ok(OpPayload::Dirents(out))
    }
}
