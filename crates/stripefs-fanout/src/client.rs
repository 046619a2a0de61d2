//! The StripeFs facade
//!
//! One method per filesystem operation. Each call builds the matching
//! manager, hands it to a [`Request`] fanned out over the currently
//! reachable nodes, and unwraps the rebuilt payload. The facade also owns
//! the pieces the managers share: the node handles, the erasure coder,
//! the per-inode context table, the healer and the reachability mask.
//!
//! All stripe alignment happens here. Reads widen the range to stripe
//! boundaries and trim afterwards; writes do a full read-modify-write of
//! the covered stripes before re-encoding. Fragment files therefore only
//! ever grow in whole chunks and every node-level offset is aligned.

use crate::heal::Healer;
use crate::inode::{InodeCtx, InodeTable};
use crate::manager::OpManager;
use crate::ops::attr::{AttrCall, AttrManager};
use crate::ops::data::{ReadManager, TruncateManager, WriteManager};
use crate::ops::dir::ReaddirManager;
use crate::ops::entry::{EntryCall, EntryManager};
use crate::ops::lock::{LockCall, LockManager};
use crate::ops::lookup::LookupManager;
use crate::ops::statfs::StatfsManager;
use crate::ops::xattr::{XattrCall, XattrManager};
use crate::ops::Nodes;
use crate::request::Request;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stripefs_common::{
    xattr_to_u64, ClusterConfig, DirEntry, Errno, Error, FileAttr, FileId, FileKind, LockCmd,
    LockRange, NodeMask, OpenFlags, Result as CommonResult, StatvfsInfo, XattrOpKind, Xattrs,
    XATTR_SIZE,
};
use stripefs_erasure::ErasureCoder;
use stripefs_transport::NodeBackend;
use tracing::debug;

use crate::answer::OpPayload;

/// Client-side entry point for one erasure-coded volume.
pub struct StripeFs {
    config: ClusterConfig,
    coder: Arc<ErasureCoder>,
    nodes: Nodes,
    table: Arc<InodeTable>,
    healer: Arc<Healer>,
    /// Reachability mask; bits are flipped by the membership layer.
    up: AtomicU64,
    /// Owner ids for the internal locks taken around writes.
    lock_owner: AtomicU64,
}

impl StripeFs {
    /// Build a client over one backend per node, in node-index order.
    pub fn new(config: ClusterConfig, backends: Vec<Arc<dyn NodeBackend>>) -> CommonResult<Self> {
        config.validate()?;
        if backends.len() != config.nodes {
            return Err(Error::invalid_argument(format!(
                "{} backends supplied for a {}-node cluster",
                backends.len(),
                config.nodes
            )));
        }
        let nodes: Nodes = backends.into();
        let coder = Arc::new(ErasureCoder::new(&config)?);
        let table = Arc::new(InodeTable::new());
        let healer = Arc::new(Healer::new(
            Arc::clone(&nodes),
            Arc::clone(&coder),
            config,
            Arc::clone(&table),
        ));
        Ok(Self {
            config,
            coder,
            nodes,
            table,
            healer,
            up: AtomicU64::new(NodeMask::first(config.nodes).bits()),
            // Internal write-lock owners live above the caller id space.
            lock_owner: AtomicU64::new(1 << 48),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Currently reachable nodes.
    #[must_use]
    pub fn up_mask(&self) -> NodeMask {
        NodeMask::from_bits(self.up.load(Ordering::Acquire))
    }

    /// Flip a node's reachability. Driven by the membership layer; a
    /// down node is excluded from every subsequent fan-out.
    pub fn set_node_up(&self, node: usize, up: bool) {
        let bit = NodeMask::single(node).bits();
        if up {
            self.up.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.up.fetch_and(!bit, Ordering::AcqRel);
        }
        debug!(node, up, mask = %self.up_mask(), "membership change");
    }

    /// Per-inode context table (exposed for integration tests and the
    /// admin surface).
    #[must_use]
    pub fn inode(&self, file: FileId) -> Arc<InodeCtx> {
        self.table.get(file)
    }

    fn fragments(&self) -> usize {
        self.config.fragments()
    }

    async fn run<M: OpManager + 'static>(&self, manager: M) -> Result<OpPayload, Errno> {
        Request::new(Arc::new(manager), self.fragments(), self.up_mask())
            .run()
            .await
            .res
    }

    // ---- namespace ----

    pub async fn lookup(&self, parent: FileId, name: &str) -> Result<(FileAttr, Xattrs), Errno> {
        let manager = LookupManager::new(
            Arc::clone(&self.nodes),
            parent,
            name.to_string(),
            self.fragments(),
            Arc::clone(&self.table),
            Some(Arc::clone(&self.healer)),
        );
        match self.run(manager).await? {
            OpPayload::Lookup { attr, xattrs } => Ok((attr, xattrs)),
            _ => Err(Errno::EIO),
        }
    }

    pub async fn mknod(
        &self,
        parent: FileId,
        name: &str,
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<FileAttr, Errno> {
        let file = FileId::new();
        let attr = self
            .entry_attr(EntryCall::Mknod {
                parent,
                name: name.to_string(),
                file,
                kind,
                mode,
                uid,
                gid,
            })
            .await?;
        if kind == FileKind::Regular {
            self.table.get(file).set_size(0);
        }
        Ok(attr)
    }

    pub async fn mkdir(
        &self,
        parent: FileId,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<FileAttr, Errno> {
        self.entry_attr(EntryCall::Mkdir {
            parent,
            name: name.to_string(),
            file: FileId::new(),
            mode,
            uid,
            gid,
        })
        .await
    }

    pub async fn symlink(
        &self,
        parent: FileId,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> Result<FileAttr, Errno> {
        self.entry_attr(EntryCall::Symlink {
            parent,
            name: name.to_string(),
            file: FileId::new(),
            target: target.to_string(),
            uid,
            gid,
        })
        .await
    }

    pub async fn unlink(&self, parent: FileId, name: &str) -> Result<(), Errno> {
        self.entry_unit(EntryCall::Unlink {
            parent,
            name: name.to_string(),
        })
        .await
    }

    pub async fn rmdir(&self, parent: FileId, name: &str) -> Result<(), Errno> {
        self.entry_unit(EntryCall::Rmdir {
            parent,
            name: name.to_string(),
        })
        .await
    }

    pub async fn rename(
        &self,
        old_parent: FileId,
        old_name: &str,
        new_parent: FileId,
        new_name: &str,
    ) -> Result<FileAttr, Errno> {
        self.entry_attr(EntryCall::Rename {
            old_parent,
            old_name: old_name.to_string(),
            new_parent,
            new_name: new_name.to_string(),
        })
        .await
    }

    pub async fn link(
        &self,
        file: FileId,
        new_parent: FileId,
        new_name: &str,
    ) -> Result<FileAttr, Errno> {
        self.entry_attr(EntryCall::Link {
            file,
            new_parent,
            new_name: new_name.to_string(),
        })
        .await
    }

    pub async fn create(
        &self,
        parent: FileId,
        name: &str,
        mode: u32,
        flags: OpenFlags,
        uid: u32,
        gid: u32,
    ) -> Result<FileAttr, Errno> {
        let file = FileId::new();
        let attr = self
            .entry_attr(EntryCall::Create {
                parent,
                name: name.to_string(),
                file,
                mode,
                flags,
                uid,
                gid,
            })
            .await?;
        self.table.get(file).set_size(0);
        Ok(attr)
    }

    async fn entry_attr(&self, call: EntryCall) -> Result<FileAttr, Errno> {
        match self
            .run(EntryManager::new(Arc::clone(&self.nodes), call))
            .await?
        {
            OpPayload::Attr(attr) => Ok(attr),
            _ => Err(Errno::EIO),
        }
    }

    async fn entry_unit(&self, call: EntryCall) -> Result<(), Errno> {
        match self
            .run(EntryManager::new(Arc::clone(&self.nodes), call))
            .await?
        {
            OpPayload::Unit => Ok(()),
            _ => Err(Errno::EIO),
        }
    }

    // ---- inode ----

    pub async fn stat(&self, file: FileId) -> Result<FileAttr, Errno> {
        match self.attr_call(file, AttrCall::Stat).await? {
            OpPayload::Attr(attr) => Ok(attr),
            _ => Err(Errno::EIO),
        }
    }

    /// Handle-addressed stat. Identical to [`Self::stat`]: nodes address
    /// objects by file id, so an open handle adds nothing here.
    pub async fn fstat(&self, file: FileId) -> Result<FileAttr, Errno> {
        self.stat(file).await
    }

    pub async fn access(&self, file: FileId, mask: u32) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Access { mask }).await.map(|_| ())
    }

    pub async fn readlink(&self, file: FileId) -> Result<String, Errno> {
        match self.attr_call(file, AttrCall::Readlink).await? {
            OpPayload::Target(target) => Ok(target),
            _ => Err(Errno::EIO),
        }
    }

    pub async fn truncate(&self, file: FileId, size: u64) -> Result<FileAttr, Errno> {
        if size > u64::MAX - self.config.stripe_size() as u64 {
            return Err(Errno::EINVAL);
        }
        let old = self.logical_size(file).await?;
        let fragment_len = self.config.fragment_len(self.config.align_up(size));
        let manager = TruncateManager::new(
            Arc::clone(&self.nodes),
            file,
            fragment_len,
            size,
            self.fragments(),
        );
        match self.run(manager).await? {
            OpPayload::Attr(attr) => {
                // Growing past a partial stripe would expose whatever
                // bytes the old tail stripe still carries; zero them.
                if size > old {
                    self.zero_partial_stripe(file, old, size).await?;
                }
                self.table.get(file).set_size(size);
                Ok(attr)
            }
            _ => Err(Errno::EIO),
        }
    }

    /// Handle-addressed truncate; identical to [`Self::truncate`] for
    /// the same reason [`Self::fstat`] is identical to stat.
    pub async fn ftruncate(&self, file: FileId, size: u64) -> Result<FileAttr, Errno> {
        self.truncate(file, size).await
    }

    /// Zero the logical bytes from `boundary` to the end of its stripe.
    /// Used when a file grows past an old end that was not stripe
    /// aligned: the fragments still hold the pre-shrink bytes there.
    async fn zero_partial_stripe(
        &self,
        file: FileId,
        boundary: u64,
        logical: u64,
    ) -> Result<(), Errno> {
        let stripe = self.config.stripe_size() as u64;
        if boundary % stripe == 0 {
            return Ok(());
        }
        let start = self.config.align_down(boundary);
        let mut buf = self.read_aligned(file, start, stripe).await?.to_vec();
        buf.resize(stripe as usize, 0);
        for b in &mut buf[(boundary - start) as usize..] {
            *b = 0;
        }
        let fragments = self.coder.split_all(&buf).map_err(|e| e.errno())?;
        let manager = WriteManager::new(
            Arc::clone(&self.nodes),
            file,
            self.config.fragment_len(start),
            fragments,
            logical,
            0,
        );
        self.run(manager).await.map(|_| ())
    }

    pub async fn statfs(&self, file: FileId) -> Result<StatvfsInfo, Errno> {
        let manager = StatfsManager::new(Arc::clone(&self.nodes), file, self.fragments());
        match self.run(manager).await? {
            OpPayload::Statfs(info) => Ok(info),
            _ => Err(Errno::EIO),
        }
    }

    /// Logical size from the per-inode cache, recovered from the size
    /// xattr when this client has not observed the file before. Without
    /// the recovery, a write through a fresh client would record too
    /// small a size on the nodes and the minimum-wins reconciliation
    /// would clamp the file to it.
    async fn logical_size(&self, file: FileId) -> Result<u64, Errno> {
        let ctx = self.table.get(file);
        if let Some(size) = ctx.cached_size() {
            return Ok(size);
        }
        let call = XattrCall::GetRaw {
            name: XATTR_SIZE.to_string(),
        };
        let observed = match self.xattr_call(file, call).await {
            Ok(OpPayload::Xattrs(xattrs)) => xattrs
                .get(XATTR_SIZE)
                .and_then(|v| xattr_to_u64(v))
                .unwrap_or(0),
            Ok(_) => return Err(Errno::EIO),
            // Objects predating the size bookkeeping have no key.
            Err(Errno::ENODATA) => 0,
            Err(errno) => return Err(errno),
        };
        Ok(ctx.reconcile_size(file, observed))
    }

    /// End of a logical byte range, refusing ranges that overflow or
    /// leave no headroom for stripe rounding.
    fn range_end(&self, offset: u64, len: u64) -> Result<u64, Errno> {
        let end = offset.checked_add(len).ok_or(Errno::EINVAL)?;
        if end > u64::MAX - self.config.stripe_size() as u64 {
            return Err(Errno::EINVAL);
        }
        Ok(end)
    }

    async fn attr_call(&self, file: FileId, call: AttrCall) -> Result<OpPayload, Errno> {
        let manager = AttrManager::new(
            Arc::clone(&self.nodes),
            file,
            call,
            self.fragments(),
            self.table.get(file),
        );
        self.run(manager).await
    }

    // ---- data ----

    pub async fn open(&self, file: FileId, flags: OpenFlags) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Open { flags }).await?;
        if flags.truncate {
            self.truncate(file, 0).await?;
        }
        Ok(())
    }

    /// Read `len` logical bytes at `offset`, clamped to end of file.
    pub async fn read(&self, file: FileId, offset: u64, len: u64) -> Result<Bytes, Errno> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let end = self.range_end(offset, len)?;
        let size = self.logical_size(file).await?;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let end = end.min(size);

        let start = self.config.align_down(offset);
        let buf = self
            .read_aligned(file, start, self.config.align_up(end) - start)
            .await?;

        // Trim alignment padding and clamp to end of file.
        let head = (offset - start) as usize;
        let tail = ((end - start) as usize).min(buf.len());
        if head >= tail {
            return Ok(Bytes::new());
        }
        Ok(buf.slice(head..tail))
    }

    /// Read a stripe-aligned logical range without end-of-file clamping.
    /// The result can be shorter than `len` when the fragments end early,
    /// but is always a whole number of stripes.
    async fn read_aligned(&self, file: FileId, start: u64, len: u64) -> Result<Bytes, Errno> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let manager = ReadManager::new(
            Arc::clone(&self.nodes),
            Arc::clone(&self.coder),
            file,
            self.config.fragment_len(start),
            self.config.fragment_len(len),
        );
        match self.run(manager).await? {
            OpPayload::Data(buf) => Ok(buf),
            _ => Err(Errno::EIO),
        }
    }

    /// Write `data` at `offset`. A cluster-wide write lock on the inode
    /// is held for the duration so the read-modify-write of shared
    /// stripes cannot interleave with another writer's.
    pub async fn write(&self, file: FileId, offset: u64, data: &[u8]) -> Result<u64, Errno> {
        if data.is_empty() {
            return Ok(0);
        }
        self.range_end(offset, data.len() as u64)?;
        let owner = self.lock_owner.fetch_add(1, Ordering::Relaxed);
        let range = LockRange::whole_file();
        self.inodelk(file, owner, LockCmd::Lock, range).await?;
        let res = self.write_locked(file, offset, data).await;
        let _ = self.inodelk(file, owner, LockCmd::Unlock, range).await;
        res
    }

    /// Read-modify-write the covered stripes. Caller holds the inode
    /// write lock.
    async fn write_locked(&self, file: FileId, offset: u64, data: &[u8]) -> Result<u64, Errno> {
        let ctx = self.table.get(file);
        let old = self.logical_size(file).await?;
        let end = self.range_end(offset, data.len() as u64)?;
        let start = self.config.align_down(offset);
        let aligned_len = self.config.align_up(end) - start;

        let mut buf = vec![0u8; aligned_len as usize];
        // Pre-read whenever existing data can fall inside the window.
        if start < self.config.align_up(old) {
            let existing = self.read_aligned(file, start, aligned_len).await?;
            buf[..existing.len()].copy_from_slice(&existing);
        }
        // A write past the old end creates a hole; any stale bytes the
        // fragments still hold in that gap must read back as zeros.
        if offset > old {
            if old < start {
                self.zero_partial_stripe(file, old, old).await?;
            } else {
                for b in &mut buf[(old - start) as usize..(offset - start) as usize] {
                    *b = 0;
                }
            }
        }
        buf[(offset - start) as usize..][..data.len()].copy_from_slice(data);

        let fragments = self.coder.split_all(&buf).map_err(|e| e.errno())?;
        let logical = end.max(old);
        let manager = WriteManager::new(
            Arc::clone(&self.nodes),
            file,
            self.config.fragment_len(start),
            fragments,
            logical,
            data.len() as u64,
        );
        match self.run(manager).await? {
            OpPayload::Written(n) => {
                ctx.note_write_end(end);
                Ok(n)
            }
            _ => Err(Errno::EIO),
        }
    }

    pub async fn flush(&self, file: FileId) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Flush).await.map(|_| ())
    }

    pub async fn fsync(&self, file: FileId, datasync: bool) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Fsync { datasync })
            .await
            .map(|_| ())
    }

    /// Weak (crc32c) and strong (sha256) checksum of a logical range,
    /// computed over the reconstructed bytes so every client sees the
    /// same value regardless of fragment placement.
    pub async fn rchecksum(&self, file: FileId, offset: u64, len: u64) -> Result<(u32, Vec<u8>), Errno> {
        let data = self.read(file, offset, len).await?;
        let weak = crc32c::crc32c(&data);
        let strong = Sha256::digest(&data).to_vec();
        Ok((weak, strong))
    }

    // ---- directories ----

    pub async fn opendir(&self, file: FileId) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Opendir).await.map(|_| ())
    }

    pub async fn readdir(
        &self,
        file: FileId,
        offset: u64,
        count: usize,
    ) -> Result<Vec<DirEntry>, Errno> {
        self.readdir_inner(file, offset, count, false).await
    }

    /// readdir plus logical attributes per entry.
    pub async fn readdirp(
        &self,
        file: FileId,
        offset: u64,
        count: usize,
    ) -> Result<Vec<DirEntry>, Errno> {
        self.readdir_inner(file, offset, count, true).await
    }

    async fn readdir_inner(
        &self,
        file: FileId,
        offset: u64,
        count: usize,
        with_attrs: bool,
    ) -> Result<Vec<DirEntry>, Errno> {
        let manager = ReaddirManager::new(
            Arc::clone(&self.nodes),
            file,
            offset,
            count,
            with_attrs,
            self.fragments(),
            Arc::clone(&self.table),
        );
        match self.run(manager).await? {
            OpPayload::Dirents(entries) => Ok(entries),
            _ => Err(Errno::EIO),
        }
    }

    pub async fn fsyncdir(&self, file: FileId, datasync: bool) -> Result<(), Errno> {
        self.attr_call(file, AttrCall::Fsyncdir { datasync })
            .await
            .map(|_| ())
    }

    // ---- extended attributes ----

    pub async fn getxattr(&self, file: FileId, name: Option<&str>) -> Result<Xattrs, Errno> {
        let call = XattrCall::Get {
            name: name.map(str::to_string),
        };
        match self.xattr_call(file, call).await? {
            OpPayload::Xattrs(xattrs) => Ok(xattrs),
            _ => Err(Errno::EIO),
        }
    }

    pub async fn setxattr(&self, file: FileId, xattrs: &Xattrs) -> Result<(), Errno> {
        if xattrs.keys().any(|k| is_internal(k)) {
            return Err(Errno::EPERM);
        }
        self.xattr_call(file, XattrCall::Set { xattrs: xattrs.clone() })
            .await
            .map(|_| ())
    }

    pub async fn removexattr(&self, file: FileId, name: &str) -> Result<(), Errno> {
        if is_internal(name) {
            return Err(Errno::EPERM);
        }
        self.xattr_call(
            file,
            XattrCall::Remove {
                name: name.to_string(),
            },
        )
        .await
        .map(|_| ())
    }

    pub async fn xattrop(
        &self,
        file: FileId,
        kind: XattrOpKind,
        delta: &Xattrs,
    ) -> Result<Xattrs, Errno> {
        if delta.keys().any(|k| is_internal(k)) {
            return Err(Errno::EPERM);
        }
        let call = XattrCall::Op {
            kind,
            delta: delta.clone(),
        };
        match self.xattr_call(file, call).await? {
            OpPayload::Xattrs(xattrs) => Ok(xattrs),
            _ => Err(Errno::EIO),
        }
    }

    async fn xattr_call(&self, file: FileId, call: XattrCall) -> Result<OpPayload, Errno> {
        self.run(XattrManager::new(Arc::clone(&self.nodes), file, call))
            .await
    }

    // ---- locks ----

    pub async fn lk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> Result<LockRange, Errno> {
        match self.lock_call(file, LockCall::Lk { owner, cmd, range }).await? {
            OpPayload::Lock(granted) => Ok(granted),
            _ => Err(Errno::EIO),
        }
    }

    pub async fn inodelk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> Result<(), Errno> {
        self.lock_call(file, LockCall::Inodelk { owner, cmd, range })
            .await
            .map(|_| ())
    }

    pub async fn entrylk(
        &self,
        parent: FileId,
        name: Option<&str>,
        owner: u64,
        cmd: LockCmd,
    ) -> Result<(), Errno> {
        let call = LockCall::Entrylk {
            name: name.map(str::to_string),
            owner,
            cmd,
        };
        self.lock_call(parent, call).await.map(|_| ())
    }

    /// Run a lock call; a failed acquisition is rolled back with a
    /// best-effort unlock so no node is left holding a partial lock.
    async fn lock_call(&self, file: FileId, call: LockCall) -> Result<OpPayload, Errno> {
        let rollback = call.is_acquire().then(|| call.as_unlock());
        let res = self
            .run(LockManager::new(Arc::clone(&self.nodes), file, call))
            .await;
        if res.is_err() {
            if let Some(unlock) = rollback {
                debug!(%file, "rolling back partial lock");
                let _ = self
                    .run(LockManager::new(Arc::clone(&self.nodes), file, unlock))
                    .await;
            }
        }
        res
    }
}

fn is_internal(key: &str) -> bool {
    key.starts_with("stripefs.")
}
