//! Self-heal
//!
//! When lookup finds nodes whose fragment diverges from the winning
//! group, the healer rebuilds those copies in the background: drop the
//! divergent object, recreate it with the correct identity, relink the
//! directory entry, then stream the file through the decoder in aligned
//! chunks, re-encoding each bad node's row from the surviving quorum.
//! Extended attributes are copied last so the version and size keys land
//! only after the data is consistent.
//!
//! At most one heal runs per inode; the per-inode flag is claimed with an
//! atomic test-and-set before the task is spawned. A failure on any bad
//! node aborts the whole pass (the next lookup will trigger a retry);
//! heal writes bypass the lock layer because the pass owns no file
//! handle.

use crate::inode::InodeTable;
use crate::ops::Nodes;
use futures::future::try_join_all;
use std::sync::Arc;
use stripefs_common::config::FRAGMENT_CHUNK;
use stripefs_common::{ClusterConfig, Errno, FileAttr, FileId, NodeMask};
use stripefs_erasure::ErasureCoder;
use tracing::{info, warn};

/// Logical bytes copied per round of the streaming loop, rounded to a
/// whole number of stripes.
const HEAL_WINDOW_STRIPES: usize = 64;

pub struct Healer {
    nodes: Nodes,
    coder: Arc<ErasureCoder>,
    config: ClusterConfig,
    table: Arc<InodeTable>,
}

impl Healer {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        coder: Arc<ErasureCoder>,
        config: ClusterConfig,
        table: Arc<InodeTable>,
    ) -> Self {
        Self {
            nodes,
            coder,
            config,
            table,
        }
    }

    /// Claim the inode's heal slot and run the pass in the background.
    /// A pass already in flight makes this a no-op.
    pub fn spawn(
        self: &Arc<Self>,
        file: FileId,
        parent: FileId,
        name: String,
        attr: FileAttr,
        good: NodeMask,
        bad: NodeMask,
    ) {
        if good.count() < self.coder.columns() {
            warn!(%file, %good, "not enough intact fragments to heal");
            return;
        }
        let ctx = self.table.get(file);
        if !ctx.try_begin_heal(good, bad) {
            return;
        }
        let healer = Arc::clone(self);
        tokio::spawn(async move {
            match healer.run(file, parent, &name, attr, good, bad).await {
                Ok(()) => info!(%file, %bad, "heal complete"),
                Err(errno) => warn!(%file, %bad, %errno, "heal aborted"),
            }
            healer.table.get(file).end_heal();
        });
    }

    async fn run(
        &self,
        file: FileId,
        parent: FileId,
        name: &str,
        attr: FileAttr,
        good: NodeMask,
        bad: NodeMask,
    ) -> Result<(), Errno> {
        let logical = self
            .table
            .get(file)
            .cached_size()
            .unwrap_or(attr.size);
        info!(%file, %good, %bad, logical, "heal starting");

        // Recreate every divergent copy from scratch.
        for node in bad.iter() {
            let backend = &self.nodes[node];
            backend.heal_remove(file).await?;
            backend.heal_create(file, attr, logical).await?;
            backend.heal_link(parent, name, file).await?;
        }

        self.copy_data(file, logical, good, bad).await?;
        self.copy_xattrs(file, good, bad).await?;
        Ok(())
    }

    /// Stream the file from the surviving quorum to the recreated copies
    /// in stripe-aligned windows.
    async fn copy_data(
        &self,
        file: FileId,
        logical: u64,
        good: NodeMask,
        bad: NodeMask,
    ) -> Result<(), Errno> {
        let k = self.coder.columns();
        let sources: Vec<usize> = good.iter().take(k).collect();
        let aligned = self.config.align_up(logical);
        let window = (self.config.stripe_size() * HEAL_WINDOW_STRIPES) as u64;
        let ctx = self.table.get(file);

        let mut offset = 0u64;
        while offset < aligned {
            let len = window.min(aligned - offset);
            let frag_off = self.config.fragment_len(offset);
            let frag_len = self.config.fragment_len(len);
            // Heal I/O is chunk addressed; a misaligned offset would
            // interleave partial rows on the recreated copies.
            if frag_off % FRAGMENT_CHUNK as u64 != 0 {
                return Err(Errno::EINVAL);
            }

            let inputs = try_join_all(
                sources
                    .iter()
                    .map(|&node| self.nodes[node].read(file, frag_off, frag_len)),
            )
            .await?;
            if inputs.iter().any(|data| data.len() as u64 != frag_len) {
                warn!(%file, "short fragment read during heal");
                return Err(Errno::EIO);
            }
            let slices: Vec<&[u8]> = inputs.iter().map(|b| &b[..]).collect();
            let merged = self.coder.merge(&sources, &slices).map_err(|e| e.errno())?;

            for node in bad.iter() {
                let fragment = self.coder.split(node, &merged).map_err(|e| e.errno())?;
                let wrote = self.nodes[node]
                    .write(file, frag_off, fragment, logical)
                    .await?;
                if wrote != frag_len {
                    return Err(Errno::EIO);
                }
            }

            offset += len;
            ctx.note_heal_progress(offset);
        }
        Ok(())
    }

    /// Copy the full xattr dictionary (internal keys included) from one
    /// surviving node to every healed copy.
    async fn copy_xattrs(&self, file: FileId, good: NodeMask, bad: NodeMask) -> Result<(), Errno> {
        let source = good.lowest().ok_or(Errno::EIO)?;
        let xattrs = self.nodes[source].getxattr(file, None).await?;
        for node in bad.iter() {
            self.nodes[node].setxattr(file, &xattrs).await?;
        }
        Ok(())
    }
}
