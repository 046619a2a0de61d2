//! The dispatch/combine/rebuild policy interface
//!
//! Every operation type is a policy record implementing [`OpManager`].
//! The request engine owns the shared mechanics (fan-out, grouping,
//! quorum, at-most-once reply); the manager decides which call goes down
//! to a node, when two replies are equivalent, and how a winning group
//! becomes the single answer the caller sees.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::request::Outcome;
use async_trait::async_trait;
use stripefs_common::Errno;

/// How many agreeing replies a request needs before its answer is
/// trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quorum {
    /// K agreeing replies, the default: enough to reconstruct data.
    Fragments,
    /// All reachable nodes minus `n` slack, but never fewer than K.
    /// Encodes the original's negative-required convention.
    Minus(usize),
    /// Every currently reachable node. Used by mutating operations,
    /// where correctness benefits from maximum agreement before the
    /// caller is acknowledged.
    All,
}

impl Quorum {
    /// Resolve to a concrete count given the geometry and the number of
    /// reachable candidates.
    #[must_use]
    pub fn required(self, fragments: usize, reachable: usize) -> usize {
        match self {
            Quorum::Fragments => fragments,
            Quorum::Minus(n) => reachable.saturating_sub(n).max(fragments),
            Quorum::All => reachable.max(fragments),
        }
    }
}

/// Per-operation policy record: the five operations driving one request.
///
/// `dispatch` and `finish` are async (they issue node calls); `combine`
/// and `rebuild` run under the request lock and must not block. Resource
/// release (the original's `wipe`) is the manager's `Drop`.
#[async_trait]
pub trait OpManager: Send + Sync {
    /// Operation name, for logs.
    fn name(&self) -> &'static str;

    /// Quorum policy for this operation.
    fn quorum(&self) -> Quorum {
        Quorum::Fragments
    }

    /// Send the operation to one node and return its reply.
    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno>;

    /// True iff `answer` is equivalent to the group's representative
    /// under this operation's rules.
    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool;

    /// Transform a winning group's per-node partial results into the
    /// externally visible answer. May fail (e.g. not enough distinct
    /// fragments), in which case the engine keeps searching or waiting.
    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno>;

    /// Invoked exactly once after the terminal reply has been produced;
    /// performs unlocks and deferred side effects (e.g. heal triggers).
    async fn finish(&self, _outcome: &Outcome) {}
}
