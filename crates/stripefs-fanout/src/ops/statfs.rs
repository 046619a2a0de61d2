//! Filesystem statistics
//!
//! Every reply is acceptable; disagreement between nodes is expected (the
//! nodes have different disks). All successful replies fall into one
//! group and rebuild takes the field-wise minimum across the members,
//! then rescales block counts to logical capacity: each node stores 1/K
//! of every file, so the cluster can hold K times the most constrained
//! node.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::OpManager;
use crate::ops::Nodes;
use async_trait::async_trait;
use stripefs_common::{Errno, FileId, StatvfsInfo};

pub struct StatfsManager {
    nodes: Nodes,
    file: FileId,
    fragments: usize,
}

impl StatfsManager {
    #[must_use]
    pub fn new(nodes: Nodes, file: FileId, fragments: usize) -> Self {
        Self {
            nodes,
            file,
            fragments,
        }
    }
}

#[async_trait]
impl OpManager for StatfsManager {
    fn name(&self) -> &'static str {
        "statfs"
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .statfs(self.file)
            .await
            .map(OpPayload::Statfs)
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        matches!(
            (&rep.res, &answer.res),
            (Ok(OpPayload::Statfs(_)), Ok(OpPayload::Statfs(_)))
        )
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        let mut folded: Option<StatvfsInfo> = None;
        for answer in &group.answers {
            let Ok(OpPayload::Statfs(info)) = &answer.res else {
                return Err(Errno::EIO);
            };
            folded = Some(match folded {
                None => *info,
                Some(acc) => StatvfsInfo {
                    block_size: acc.block_size.min(info.block_size),
                    blocks: acc.blocks.min(info.blocks),
                    blocks_free: acc.blocks_free.min(info.blocks_free),
                    blocks_avail: acc.blocks_avail.min(info.blocks_avail),
                    files: acc.files.min(info.files),
                    files_free: acc.files_free.min(info.files_free),
                },
            });
        }
        let mut out = folded.ok_or(Errno::EIO)?;
        let k = self.fragments as u64;
        out.blocks *= k;
        out.blocks_free *= k;
        out.blocks_avail *= k;
        Ok(OpPayload::Statfs(out))
    }
}
