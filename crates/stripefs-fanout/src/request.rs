//! Request lifecycle
//!
//! One [`Request`] per externally visible operation. The request fans the
//! operation out to every candidate node, funnels the replies through the
//! manager's combine predicate into answer groups, and produces exactly
//! one terminal reply: either the rebuilt answer of a group that reached
//! quorum, or the first recorded error once every dispatched call has
//! completed.
//!
//! State machine: CREATED -> EXECUTING -> (combining) ->
//! {QUORUM_REACHED -> REPORTED} | {ALL_REPLIED_NO_QUORUM -> ERROR_REPORTED}
//! -> FINISHING -> dropped. There is no transition back from REPORTED:
//! the `reported` flag is set with an atomic swap and the completion
//! channel is taken with it.
//!
//! Shared ownership replaces the original's manual ref/unref pairs: every
//! spawned per-node call holds an `Arc` to the request, and resource
//! release happens in `Drop` once the last participant finishes.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::OpManager;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use stripefs_common::{Errno, NodeMask};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The terminal result of one request.
#[derive(Debug)]
pub struct Outcome {
    /// Rebuilt answer or the recorded errno.
    pub res: Result<OpPayload, Errno>,
    /// Members of the winning group (empty on error).
    pub good: NodeMask,
    /// Every node that replied, success or failure.
    pub replied: NodeMask,
    /// Every node the operation was dispatched to.
    pub candidates: NodeMask,
}

impl Outcome {
    /// Convenience accessor: errno of a failed outcome, OK otherwise.
    #[must_use]
    pub fn errno(&self) -> Errno {
        match &self.res {
            Ok(_) => Errno::OK,
            Err(e) => *e,
        }
    }
}

struct FanIn {
    replied: NodeMask,
    groups: Vec<AnswerGroup>,
    done: Option<oneshot::Sender<Outcome>>,
}

/// One in-flight fan-out operation.
pub struct Request {
    manager: Arc<dyn OpManager>,
    /// K for this cluster; also the floor for reachability.
    fragments: usize,
    /// Resolved quorum for this operation.
    required: usize,
    candidates: NodeMask,
    /// In-flight count; starts at 1 for the request's own reference.
    pending: AtomicUsize,
    /// First recorded errno (0 = none), compare-and-swap, first wins.
    errno: AtomicI32,
    /// At-most-once terminal reply.
    reported: AtomicBool,
    shared: Mutex<FanIn>,
}

impl Request {
    /// Create a request for the given candidates. The quorum is resolved
    /// from the manager's policy against the reachable candidate count.
    pub fn new(
        manager: Arc<dyn OpManager>,
        fragments: usize,
        candidates: NodeMask,
    ) -> Arc<Self> {
        let required = manager.quorum().required(fragments, candidates.count());
        Arc::new(Self {
            manager,
            fragments,
            required,
            candidates,
            pending: AtomicUsize::new(1),
            errno: AtomicI32::new(0),
            reported: AtomicBool::new(false),
            shared: Mutex::new(FanIn {
                replied: NodeMask::EMPTY,
                groups: Vec::new(),
                done: None,
            }),
        })
    }

    /// Resolved quorum count.
    #[must_use]
    pub fn required(&self) -> usize {
        self.required
    }

    /// Dispatch to every candidate and wait for the terminal reply.
    ///
    /// Returns after the first group reaches quorum and rebuilds, or
    /// after every dispatched call completed without one. The manager's
    /// `finish` runs before this returns; straggler replies continue to
    /// drain in the background and are absorbed without effect.
    pub async fn run(self: &Arc<Self>) -> Outcome {
        let rx = {
            let (tx, rx) = oneshot::channel();
            self.shared.lock().done = Some(tx);
            rx
        };

        if self.candidates.count() < self.fragments {
            warn!(
                op = self.manager.name(),
                candidates = %self.candidates,
                fragments = self.fragments,
                "quorum structurally unreachable"
            );
            self.record_errno(Errno::EIO);
        } else {
            debug!(
                op = self.manager.name(),
                candidates = %self.candidates,
                required = self.required,
                "dispatching"
            );
            for node in self.candidates.iter() {
                self.pending.fetch_add(1, Ordering::AcqRel);
                let req = Arc::clone(self);
                tokio::spawn(async move {
                    let res = req.manager.dispatch(node).await;
                    req.complete(node, res);
                });
            }
        }

        // Drop the request's own pending reference.
        self.settle();

        let outcome = match rx.await {
            Ok(outcome) => outcome,
            // The sender cannot be dropped before a report, but never
            // propagate a phantom success if it somehow is.
            Err(_) => Outcome {
                res: Err(Errno::EIO),
                good: NodeMask::EMPTY,
                replied: NodeMask::EMPTY,
                candidates: self.candidates,
            },
        };
        self.manager.finish(&outcome).await;
        outcome
    }

    /// Funnel one node's reply into the request.
    ///
    /// Replies from unknown nodes and duplicate replies are contract
    /// violations: they are logged and discarded without touching the
    /// pending count or the groups.
    pub fn complete(&self, node: usize, res: Result<OpPayload, Errno>) {
        if !self.candidates.test(node) {
            warn!(
                op = self.manager.name(),
                node, "reply from node outside the candidate set, discarding"
            );
            return;
        }
        {
            let mut shared = self.shared.lock();
            if shared.replied.test(node) {
                warn!(
                    op = self.manager.name(),
                    node, "duplicate reply, discarding"
                );
                return;
            }
            shared.replied.set(node);

            if let Err(errno) = &res {
                debug!(op = self.manager.name(), node, %errno, "node failed");
                self.record_errno(*errno);
            }

            let mut answer = Some(NodeAnswer::new(node, res));
            for group in &mut shared.groups {
                let candidate = answer.as_ref().expect("answer not yet placed");
                if candidate.same_class(group.representative())
                    && self.manager.combine(group.representative(), candidate)
                {
                    group.push(answer.take().expect("answer not yet placed"));
                    break;
                }
            }
            if let Some(answer) = answer {
                shared.groups.push(AnswerGroup::new(answer));
            }
            shared.groups.sort_by(|a, b| b.count().cmp(&a.count()));

            // Early promotion once enough successful replies exist to
            // possibly satisfy quorum (a single leading group, or a
            // subset recombination of several).
            let ok_total: usize = shared
                .groups
                .iter()
                .filter(|g| g.is_ok())
                .map(AnswerGroup::count)
                .sum();
            if !self.reported.load(Ordering::Acquire) && ok_total >= self.required {
                if let Some((good, payload)) = self.try_rebuild(&shared.groups) {
                    self.report(&mut shared, Ok(payload), good);
                }
            }
        }
        self.settle();
    }

    /// Drop one pending reference; the last one resolves the request.
    fn settle(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut shared = self.shared.lock();
        if self.reported.load(Ordering::Acquire) {
            return;
        }
        match self.try_rebuild(&shared.groups) {
            Some((good, payload)) => self.report(&mut shared, Ok(payload), good),
            None => {
                let errno = self.recorded_errno();
                warn!(
                    op = self.manager.name(),
                    required = self.required,
                    replied = %shared.replied,
                    %errno,
                    "no quorum after all replies"
                );
                self.report(&mut shared, Err(errno), NodeMask::EMPTY);
            }
        }
    }

    /// Find a subset of the received answers that satisfies quorum and
    /// rebuilds successfully. Single groups are tried largest-first; if
    /// none suffices, combinatorial unions of groups are searched. A
    /// merged union mixes groups that never combined, so the manager's
    /// `rebuild` is the gate: it must reject any merged group whose
    /// members it cannot actually reconcile. The enumeration is bounded
    /// by the number of distinct groups, which is at most the number of
    /// replies and in practice tiny.
    fn try_rebuild(&self, groups: &[AnswerGroup]) -> Option<(NodeMask, OpPayload)> {
        for group in groups.iter().filter(|g| g.is_ok()) {
            if group.count() < self.required {
                break; // sorted descending, nothing further can reach quorum
            }
            match self.manager.rebuild(group) {
                Ok(payload) => return Some((group.mask, payload)),
                Err(errno) => {
                    debug!(op = self.manager.name(), %errno, "group rebuild failed");
                    self.record_errno(errno);
                }
            }
        }

        let ok_groups: Vec<&AnswerGroup> = groups.iter().filter(|g| g.is_ok()).collect();
        if ok_groups.len() < 2 {
            return None;
        }
        let mut selections: Vec<NodeMask> = NodeMask::first(ok_groups.len())
            .subsets()
            .filter(|sel| sel.count() >= 2)
            .collect();
        selections.sort_by_key(|sel| {
            std::cmp::Reverse(sel.iter().map(|i| ok_groups[i].count()).sum::<usize>())
        });
        for sel in selections {
            let total: usize = sel.iter().map(|i| ok_groups[i].count()).sum();
            if total < self.required {
                continue;
            }
            let mut iter = sel.iter();
            let first = iter.next().expect("selection has at least two groups");
            let merged = iter.fold(ok_groups[first].clone(), |acc, i| {
                acc.merged_with(ok_groups[i])
            });
            if let Ok(payload) = self.manager.rebuild(&merged) {
                return Some((merged.mask, payload));
            }
        }
        None
    }

    fn report(&self, shared: &mut FanIn, res: Result<OpPayload, Errno>, good: NodeMask) {
        if self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let outcome = Outcome {
            res,
            good,
            replied: shared.replied,
            candidates: self.candidates,
        };
        if let Some(tx) = shared.done.take() {
            let _ = tx.send(outcome);
        }
    }

    fn record_errno(&self, errno: Errno) {
        if errno.is_err() {
            let _ = self.errno.compare_exchange(
                0,
                errno.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    fn recorded_errno(&self) -> Errno {
        match self.errno.load(Ordering::Acquire) {
            0 => Errno::EIO,
            raw => Errno(raw),
        }
    }

    /// Snapshot of (mask, is_ok) per group, for tests and introspection.
    #[must_use]
    pub fn group_masks(&self) -> Vec<(NodeMask, bool)> {
        self.shared
            .lock()
            .groups
            .iter()
            .map(|g| (g.mask, g.is_ok()))
            .collect()
    }

    /// Nodes that have replied so far.
    #[must_use]
    pub fn replied(&self) -> NodeMask {
        self.shared.lock().replied
    }
}
