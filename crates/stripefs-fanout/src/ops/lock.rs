//! Cluster-wide locks
//!
//! lk (POSIX record locks), inodelk and entrylk fan out at full quorum: a
//! lock held on only some nodes is no lock at all. The facade rolls back
//! partial acquisitions by issuing a best-effort unlock when a lock
//! request fails.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::{OpManager, Quorum};
use crate::ops::Nodes;
use async_trait::async_trait;
use stripefs_common::{Errno, FileId, LockCmd, LockRange};

#[derive(Clone, Debug)]
pub enum LockCall {
    Lk {
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    },
    Inodelk {
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    },
    Entrylk {
        name: Option<String>,
        owner: u64,
        cmd: LockCmd,
    },
}

impl LockCall {
    fn name(&self) -> &'static str {
        match self {
            LockCall::Lk { .. } => "lk",
            LockCall::Inodelk { .. } => "inodelk",
            LockCall::Entrylk { .. } => "entrylk",
        }
    }

    /// The same call with the command replaced by unlock, for rollback.
    #[must_use]
    pub fn as_unlock(&self) -> LockCall {
        let mut out = self.clone();
        match &mut out {
            LockCall::Lk { cmd, .. }
            | LockCall::Inodelk { cmd, .. }
            | LockCall::Entrylk { cmd, .. } => *cmd = LockCmd::Unlock,
        }
        out
    }

    #[must_use]
    pub fn is_acquire(&self) -> bool {
        let cmd = match self {
            LockCall::Lk { cmd, .. }
            | LockCall::Inodelk { cmd, .. }
            | LockCall::Entrylk { cmd, .. } => cmd,
        };
        !matches!(cmd, LockCmd::Unlock)
    }
}

pub struct LockManager {
    nodes: Nodes,
    file: FileId,
    call: LockCall,
}

impl LockManager {
    #[must_use]
    pub fn new(nodes: Nodes, file: FileId, call: LockCall) -> Self {
        Self { nodes, file, call }
    }
}

#[async_trait]
impl OpManager for LockManager {
    fn name(&self) -> &'static str {
        self.call.name()
    }

    fn quorum(&self) -> Quorum {
        Quorum::All
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        let backend = &self.nodes[node];
        match &self.call {
            LockCall::Lk { owner, cmd, range } => backend
                .lk(self.file, *owner, *cmd, *range)
                .await
                .map(OpPayload::Lock),
            LockCall::Inodelk { owner, cmd, range } => backend
                .inodelk(self.file, *owner, *cmd, *range)
                .await
                .map(|()| OpPayload::Unit),
            LockCall::Entrylk { name, owner, cmd } => backend
                .entrylk(self.file, name.as_deref(), *owner, *cmd)
                .await
                .map(|()| OpPayload::Unit),
        }
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Lock(a)), Ok(OpPayload::Lock(b))) => a == b,
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
