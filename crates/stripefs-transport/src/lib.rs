//! StripeFS Transport - the per-node backend interface
//!
//! The fan-out engine talks to every storage node through [`NodeBackend`],
//! the async equivalent of the host stack's per-node call primitive. A
//! real deployment implements it over RPC; this crate ships [`mem::MemNode`],
//! an in-memory implementation with fault injection that the integration
//! suites run against.
//!
//! Contract: once a method is invoked it runs to completion and returns
//! exactly once (no cancellation mid-call). Timeouts belong to concrete
//! transports, never to this interface. Offsets and lengths in `read`,
//! `write` and `truncate` are fragment-space values; only the
//! `logical_size` arguments describe the whole file.

pub mod mem;

use async_trait::async_trait;
use bytes::Bytes;
use stripefs_common::{
    DirEntry, Errno, FileAttr, FileId, FileKind, LockCmd, LockRange, OpenFlags, StatvfsInfo,
    XattrOpKind, Xattrs,
};

/// Per-node operation result: payload or plain errno.
pub type OpResult<T> = Result<T, Errno>;

/// Async interface to one storage node.
///
/// One method per filesystem operation, mirroring the POSIX-like surface
/// the fan-out layer exposes upward. Namespace operations address files by
/// `(parent, name)`; everything else is addressed by [`FileId`] so that all
/// nodes resolve the same object regardless of local directory state.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    // Namespace
    async fn lookup(&self, parent: FileId, name: &str) -> OpResult<(FileAttr, Xattrs)>;
    async fn mknod(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr>;
    async fn mkdir(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr>;
    async fn symlink(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr>;
    async fn unlink(&self, parent: FileId, name: &str) -> OpResult<()>;
    async fn rmdir(&self, parent: FileId, name: &str) -> OpResult<()>;
    async fn rename(
        &self,
        old_parent: FileId,
        old_name: &str,
        new_parent: FileId,
        new_name: &str,
    ) -> OpResult<FileAttr>;
    async fn link(&self, file: FileId, new_parent: FileId, new_name: &str) -> OpResult<FileAttr>;
    async fn create(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        mode: u32,
        flags: OpenFlags,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr>;

    // Inode
    async fn stat(&self, file: FileId) -> OpResult<FileAttr>;
    async fn access(&self, file: FileId, mask: u32) -> OpResult<()>;
    async fn readlink(&self, file: FileId) -> OpResult<String>;
    async fn truncate(
        &self,
        file: FileId,
        fragment_len: u64,
        logical_size: u64,
    ) -> OpResult<FileAttr>;
    async fn statfs(&self, file: FileId) -> OpResult<StatvfsInfo>;

    // Data
    async fn open(&self, file: FileId, flags: OpenFlags) -> OpResult<()>;
    async fn read(&self, file: FileId, offset: u64, len: u64) -> OpResult<Bytes>;
    async fn write(
        &self,
        file: FileId,
        offset: u64,
        data: Bytes,
        logical_size: u64,
    ) -> OpResult<u64>;
    async fn flush(&self, file: FileId) -> OpResult<()>;
    async fn fsync(&self, file: FileId, datasync: bool) -> OpResult<()>;

    // Directories
    async fn opendir(&self, file: FileId) -> OpResult<()>;
    async fn readdir(
        &self,
        file: FileId,
        offset: u64,
        count: usize,
        with_attrs: bool,
    ) -> OpResult<Vec<DirEntry>>;
    async fn fsyncdir(&self, file: FileId, datasync: bool) -> OpResult<()>;

    // Extended attributes
    async fn getxattr(&self, file: FileId, name: Option<&str>) -> OpResult<Xattrs>;
    async fn setxattr(&self, file: FileId, xattrs: &Xattrs) -> OpResult<()>;
    async fn removexattr(&self, file: FileId, name: &str) -> OpResult<()>;
    async fn xattrop(&self, file: FileId, kind: XattrOpKind, delta: &Xattrs) -> OpResult<Xattrs>;

    // Locks
    async fn lk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> OpResult<LockRange>;
    async fn inodelk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> OpResult<()>;
    async fn entrylk(
        &self,
        parent: FileId,
        name: Option<&str>,
        owner: u64,
        cmd: LockCmd,
    ) -> OpResult<()>;

    // Heal support: id-addressed repair primitives. `heal_remove` drops
    // a divergent copy, `heal_create` recreates the object with the
    // correct identity and expected final size, `heal_link` restores the
    // directory entry.
    async fn heal_remove(&self, file: FileId) -> OpResult<()>;
    async fn heal_create(&self, file: FileId, attr: FileAttr, logical_size: u64) -> OpResult<()>;
    async fn heal_link(&self, parent: FileId, name: &str, file: FileId) -> OpResult<()>;
}
