//! Per-inode context
//!
//! Process-wide, lazily allocated state attached to every in-memory
//! inode: the last known logical file size (used to detect and clamp
//! inconsistent per-node sizes) and the heal-in-progress state guarded by
//! an atomic test-and-set so at most one heal runs per inode.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use stripefs_common::{FileId, NodeMask};
use tracing::warn;

/// Heal bookkeeping while a pass is running.
#[derive(Clone, Copy, Debug, Default)]
pub struct HealState {
    pub good: NodeMask,
    pub bad: NodeMask,
    pub offset: u64,
}

/// Context for one inode.
#[derive(Default)]
pub struct InodeCtx {
    /// Last known logical size, if any operation has observed one.
    size: Mutex<Option<u64>>,
    /// Highest fragment version observed during lookup.
    version: AtomicU64,
    /// Sticky heal-in-progress flag; set with test-and-set.
    healing: AtomicBool,
    heal: Mutex<HealState>,
}

impl InodeCtx {
    #[must_use]
    pub fn cached_size(&self) -> Option<u64> {
        *self.size.lock()
    }

    /// Reconcile a freshly observed logical size with the cache.
    ///
    /// When the two disagree the smaller value wins and the cache is
    /// updated to it. This clamping is a consistency-repair heuristic
    /// carried over for compatibility, not a correctness proof: it hides
    /// the inconsistency rather than deciding which value was right.
    pub fn reconcile_size(&self, file: FileId, observed: u64) -> u64 {
        let mut cached = self.size.lock();
        let resolved = match *cached {
            Some(prev) if prev != observed => {
                warn!(
                    %file,
                    cached = prev,
                    observed,
                    "inconsistent file size, clamping to minimum"
                );
                prev.min(observed)
            }
            _ => observed,
        };
        *cached = Some(resolved);
        resolved
    }

    /// Record an authoritative size (truncate, create).
    pub fn set_size(&self, size: u64) {
        *self.size.lock() = Some(size);
    }

    /// Grow the cached size after a successful write ending at `end`.
    pub fn note_write_end(&self, end: u64) {
        let mut cached = self.size.lock();
        *cached = Some(cached.map_or(end, |prev| prev.max(end)));
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn note_version(&self, version: u64) {
        self.version.fetch_max(version, Ordering::AcqRel);
    }

    /// Atomically claim the heal slot. Returns false if a heal is
    /// already in progress for this inode.
    pub fn try_begin_heal(&self, good: NodeMask, bad: NodeMask) -> bool {
        if self.healing.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.heal.lock() = HealState {
            good,
            bad,
            offset: 0,
        };
        true
    }

    pub fn note_heal_progress(&self, offset: u64) {
        self.heal.lock().offset = offset;
    }

    #[must_use]
    pub fn heal_state(&self) -> HealState {
        *self.heal.lock()
    }

    /// Release the heal slot; the next lookup observing disagreement may
    /// start a fresh pass.
    pub fn end_heal(&self) {
        self.healing.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_healing(&self) -> bool {
        self.healing.load(Ordering::Acquire)
    }
}

/// Process-wide inode context table.
#[derive(Default)]
pub struct InodeTable {
    map: DashMap<FileId, Arc<InodeCtx>>,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the context for an inode, allocating it on first use.
    #[must_use]
    pub fn get(&self, file: FileId) -> Arc<InodeCtx> {
        self.map.entry(file).or_default().clone()
    }

    /// Fetch without allocating.
    #[must_use]
    pub fn peek(&self, file: FileId) -> Option<Arc<InodeCtx>> {
        self.map.get(&file).map(|e| e.clone())
    }

    /// Drop the context (file removed).
    pub fn forget(&self, file: FileId) {
        self.map.remove(&file);
    }
}
