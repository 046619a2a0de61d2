//! Core type definitions for StripeFS
//!
//! File identifiers, attributes, directory entries and the extended
//! attribute dictionaries carried by per-node replies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Extended attribute key holding the fragment's version counter.
///
/// Bumped on every mutating data operation; lookup cross-checks it across
/// nodes to detect divergent fragments.
pub const XATTR_VERSION: &str = "stripefs.version";

/// Extended attribute key holding the 64-bit logical size of the whole
/// file (not of the fragment). Written during create/truncate/write and
/// read back during lookup to validate the reconstructed size.
pub const XATTR_SIZE: &str = "stripefs.size";

/// Extended attribute key whose value is a per-node content checksum.
/// Every node's fragment differs by design, so replies compare this key
/// by length only, never by value.
pub const XATTR_CONTENT: &str = "stripefs.content";

/// Extended attribute dictionary attached to replies and requests.
pub type Xattrs = BTreeMap<String, Vec<u8>>;

/// Globally unique file identifier (the GFID of a file across all nodes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The well-known identifier of the filesystem root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Uuid::from_u128(1))
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File type, as reported in attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Fifo,
    Socket,
    BlockDevice,
    CharDevice,
}

impl FileKind {
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// A point in time with nanosecond precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: u32,
}

impl Timespec {
    #[must_use]
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }
}

/// File attributes, the per-node answer payload of every stat-like
/// operation. On a storage node `size`/`blocks` describe the fragment;
/// the fan-out layer rescales them to logical values during rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    pub file_id: FileId,
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

impl FileAttr {
    /// A fresh attribute record for a newly created file.
    #[must_use]
    pub fn new(file_id: FileId, kind: FileKind, mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            file_id,
            kind,
            mode,
            nlink: 1,
            uid,
            gid,
            size: 0,
            blocks: 0,
            atime: Timespec::default(),
            mtime: Timespec::default(),
            ctime: Timespec::default(),
        }
    }

    /// Structural equality used when bucketing replies: identical identity,
    /// type, ownership and permissions; size compared only for
    /// non-directories (directory sizes legitimately differ per node);
    /// timestamps excluded (they are merged, not compared).
    #[must_use]
    pub fn matches(&self, other: &FileAttr) -> bool {
        self.file_id == other.file_id
            && self.kind == other.kind
            && self.mode == other.mode
            && self.uid == other.uid
            && self.gid == other.gid
            && (self.kind.is_dir() || self.size == other.size)
    }

    /// Merge timestamps from an equivalent answer by taking the earliest
    /// value for each field.
    pub fn merge_times(&mut self, other: &FileAttr) {
        self.atime = self.atime.min(other.atime);
        self.mtime = self.mtime.min(other.mtime);
        self.ctime = self.ctime.min(other.ctime);
    }
}

/// One directory entry, as returned by readdir/readdirp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub file_id: FileId,
    pub kind: FileKind,
    /// Present only for readdirp.
    pub attr: Option<FileAttr>,
}

/// Filesystem-wide statistics, as returned by statfs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatvfsInfo {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_avail: u64,
    pub files: u64,
    pub files_free: u64,
}

/// Open flags, the subset this core cares about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags {
        read: true,
        write: false,
        truncate: false,
    };
    pub const RDWR: OpenFlags = OpenFlags {
        read: true,
        write: true,
        truncate: false,
    };
}

/// Lock command for lk/inodelk/entrylk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockCmd {
    Lock,
    TryLock,
    Unlock,
}

/// Byte range covered by an inode lock. `len == 0` means "to EOF".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRange {
    pub start: u64,
    pub len: u64,
    pub write: bool,
}

impl LockRange {
    /// Whole-file write lock.
    #[must_use]
    pub const fn whole_file() -> Self {
        Self {
            start: 0,
            len: 0,
            write: true,
        }
    }
}

/// Arithmetic applied by xattrop to the named keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum XattrOpKind {
    /// Add the little-endian u64 operand to the stored value.
    Add,
    /// Replace the stored value with the operand.
    Set,
}

/// Encode a u64 as a little-endian xattr value.
#[must_use]
pub fn xattr_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decode a u64 from a little-endian xattr value, if well-formed.
#[must_use]
pub fn xattr_to_u64(value: &[u8]) -> Option<u64> {
    value.try_into().ok().map(u64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr() -> FileAttr {
        FileAttr::new(FileId::root(), FileKind::Regular, 0o644, 0, 0)
    }

    #[test]
    fn test_attr_matches_ignores_times() {
        let a = attr();
        let mut b = a;
        b.mtime = Timespec::new(100, 0);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn test_attr_matches_size_dir_exemption() {
        let mut a = attr();
        let mut b = a;
        b.size = 42;
        assert!(!a.matches(&b));

        a.kind = FileKind::Directory;
        b.kind = FileKind::Directory;
        assert!(a.matches(&b));
    }

    #[test]
    fn test_merge_times_takes_minimum() {
        let mut a = attr();
        a.mtime = Timespec::new(200, 0);
        let mut b = attr();
        b.mtime = Timespec::new(100, 500);
        a.merge_times(&b);
        assert_eq!(a.mtime, Timespec::new(100, 500));
    }

    #[test]
    fn test_xattr_u64_roundtrip() {
        let v = xattr_u64(0xDEAD_BEEF);
        assert_eq!(xattr_to_u64(&v), Some(0xDEAD_BEEF));
        assert_eq!(xattr_to_u64(&[1, 2, 3]), None);
    }
}
