//! In-memory storage node
//!
//! [`MemNode`] implements [`NodeBackend`] entirely in memory: one fragment
//! store keyed by [`FileId`], directory entries as sorted maps, xattrs and
//! advisory locks. It exists for the integration suites, which need
//! clusters whose nodes can be taken down, made to fail, or silently
//! diverge; the tamper helpers cover the self-heal scenarios.

use crate::{NodeBackend, OpResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stripefs_common::{
    xattr_to_u64, xattr_u64, DirEntry, Errno, FileAttr, FileId, FileKind, LockCmd, LockRange,
    OpenFlags, StatvfsInfo, Timespec, XattrOpKind, Xattrs, XATTR_SIZE, XATTR_VERSION,
};

const BLOCK: u64 = 512;

#[derive(Clone, Debug)]
struct MemFile {
    attr: FileAttr,
    /// Fragment bytes for regular files.
    data: Vec<u8>,
    xattrs: Xattrs,
    /// Child name -> id, for directories.
    entries: BTreeMap<String, FileId>,
    /// Symlink target.
    target: String,
}

impl MemFile {
    fn new(attr: FileAttr) -> Self {
        Self {
            attr,
            data: Vec::new(),
            xattrs: Xattrs::new(),
            entries: BTreeMap::new(),
            target: String::new(),
        }
    }
}

#[derive(Default)]
struct NodeState {
    files: HashMap<FileId, MemFile>,
    inode_locks: HashMap<FileId, Vec<(u64, LockRange)>>,
    entry_locks: HashMap<(FileId, Option<String>), u64>,
    /// Logical clock driving timestamps; advances on mutation.
    clock: i64,
}

impl NodeState {
    fn now(&mut self) -> Timespec {
        self.clock += 1;
        Timespec::new(self.clock, 0)
    }

    fn file(&self, id: FileId) -> OpResult<&MemFile> {
        self.files.get(&id).ok_or(Errno::ENOENT)
    }

    fn file_mut(&mut self, id: FileId) -> OpResult<&mut MemFile> {
        self.files.get_mut(&id).ok_or(Errno::ENOENT)
    }

    fn dir(&self, id: FileId) -> OpResult<&MemFile> {
        let f = self.file(id)?;
        if !f.attr.kind.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        Ok(f)
    }

    fn child(&self, parent: FileId, name: &str) -> OpResult<FileId> {
        self.dir(parent)?.entries.get(name).copied().ok_or(Errno::ENOENT)
    }

    fn insert_child(
        &mut self,
        parent: FileId,
        name: &str,
        file: MemFile,
    ) -> OpResult<FileAttr> {
        let id = file.attr.file_id;
        {
            let dir = self.file(parent)?;
            if !dir.attr.kind.is_dir() {
                return Err(Errno::ENOTDIR);
            }
            if dir.entries.contains_key(name) {
                return Err(Errno::EEXIST);
            }
        }
        let attr = file.attr;
        self.files.insert(id, file);
        let now = self.now();
        let dir = self.files.get_mut(&parent).expect("parent checked above");
        dir.entries.insert(name.to_string(), id);
        dir.attr.mtime = now;
        Ok(attr)
    }

    fn refresh_size(&mut self, id: FileId) {
        if let Some(f) = self.files.get_mut(&id) {
            f.attr.size = f.data.len() as u64;
            f.attr.blocks = (f.data.len() as u64).div_ceil(BLOCK);
        }
    }

    fn bump_version(&mut self, id: FileId, logical_size: u64) {
        if let Some(f) = self.files.get_mut(&id) {
            let version = f
                .xattrs
                .get(XATTR_VERSION)
                .and_then(|v| xattr_to_u64(v))
                .unwrap_or(0);
            f.xattrs
                .insert(XATTR_VERSION.to_string(), xattr_u64(version + 1));
            f.xattrs.insert(XATTR_SIZE.to_string(), xattr_u64(logical_size));
        }
    }
}

fn ranges_conflict(a: &LockRange, b: &LockRange) -> bool {
    if !a.write && !b.write {
        return false;
    }
    let a_end = if a.len == 0 { u64::MAX } else { a.start + a.len };
    let b_end = if b.len == 0 { u64::MAX } else { b.start + b.len };
    a.start < b_end && b.start < a_end
}

/// One in-memory storage node.
pub struct MemNode {
    state: Mutex<NodeState>,
    down: AtomicBool,
    fail_next: Mutex<Option<Errno>>,
}

impl MemNode {
    /// Create a node holding an empty root directory.
    #[must_use]
    pub fn new(root: FileId) -> Self {
        let mut state = NodeState::default();
        let mut attr = FileAttr::new(root, FileKind::Directory, 0o755, 0, 0);
        attr.nlink = 2;
        state.files.insert(root, MemFile::new(attr));
        Self {
            state: Mutex::new(state),
            down: AtomicBool::new(false),
            fail_next: Mutex::new(None),
        }
    }

    /// Take the node offline; every call fails with ENOTCONN until
    /// [`Self::set_down`] flips it back.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail the next call with the given errno, once.
    pub fn fail_next(&self, errno: Errno) {
        *self.fail_next.lock() = Some(errno);
    }

    /// Mutate a file's attributes in place (test helper for simulating a
    /// divergent node).
    pub fn tamper_attr(&self, file: FileId, f: impl FnOnce(&mut FileAttr)) {
        let mut state = self.state.lock();
        if let Some(mf) = state.files.get_mut(&file) {
            f(&mut mf.attr);
        }
    }

    /// Mutate a file's xattrs in place (test helper).
    pub fn tamper_xattrs(&self, file: FileId, f: impl FnOnce(&mut Xattrs)) {
        let mut state = self.state.lock();
        if let Some(mf) = state.files.get_mut(&file) {
            f(&mut mf.xattrs);
        }
    }

    /// Drop a file outright (test helper: a node that lost the object).
    pub fn drop_file(&self, parent: FileId, name: &str, file: FileId) {
        let mut state = self.state.lock();
        if let Some(dir) = state.files.get_mut(&parent) {
            dir.entries.remove(name);
        }
        state.files.remove(&file);
    }

    /// Current fragment bytes of a file, if present.
    #[must_use]
    pub fn fragment(&self, file: FileId) -> Option<Vec<u8>> {
        self.state.lock().files.get(&file).map(|f| f.data.clone())
    }

    /// Current value of one xattr, if present.
    #[must_use]
    pub fn xattr(&self, file: FileId, name: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .files
            .get(&file)
            .and_then(|f| f.xattrs.get(name).cloned())
    }

    /// Whether the node holds the file at all.
    #[must_use]
    pub fn has_file(&self, file: FileId) -> bool {
        self.state.lock().files.contains_key(&file)
    }

    fn gate(&self) -> OpResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Errno::ENOTCONN);
        }
        if let Some(errno) = self.fail_next.lock().take() {
            return Err(errno);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeBackend for MemNode {
    async fn lookup(&self, parent: FileId, name: &str) -> OpResult<(FileAttr, Xattrs)> {
        self.gate()?;
        let state = self.state.lock();
        let id = state.child(parent, name)?;
        let f = state.file(id)?;
        Ok((f.attr, f.xattrs.clone()))
    }

    async fn mknod(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let mut mf = MemFile::new(FileAttr::new(file, kind, mode, uid, gid));
        mf.xattrs.insert(XATTR_VERSION.to_string(), xattr_u64(0));
        mf.xattrs.insert(XATTR_SIZE.to_string(), xattr_u64(0));
        state.insert_child(parent, name, mf)
    }

    async fn mkdir(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let mut attr = FileAttr::new(file, FileKind::Directory, mode, uid, gid);
        attr.nlink = 2;
        state.insert_child(parent, name, MemFile::new(attr))
    }

    async fn symlink(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let mut mf = MemFile::new(FileAttr::new(file, FileKind::Symlink, 0o777, uid, gid));
        mf.target = target.to_string();
        mf.attr.size = target.len() as u64;
        state.insert_child(parent, name, mf)
    }

    async fn unlink(&self, parent: FileId, name: &str) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        let id = state.child(parent, name)?;
        if state.file(id)?.attr.kind.is_dir() {
            return Err(Errno::EISDIR);
        }
        let now = state.now();
        let dir = state.file_mut(parent)?;
        dir.entries.remove(name);
        dir.attr.mtime = now;
        let remove = {
            let f = state.file_mut(id)?;
            f.attr.nlink = f.attr.nlink.saturating_sub(1);
            f.attr.nlink == 0
        };
        if remove {
            state.files.remove(&id);
        }
        Ok(())
    }

    async fn rmdir(&self, parent: FileId, name: &str) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        let id = state.child(parent, name)?;
        let f = state.file(id)?;
        if !f.attr.kind.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if !f.entries.is_empty() {
            return Err(Errno::ENOTEMPTY);
        }
        let now = state.now();
        let dir = state.file_mut(parent)?;
        dir.entries.remove(name);
        dir.attr.mtime = now;
        state.files.remove(&id);
        Ok(())
    }

    async fn rename(
        &self,
        old_parent: FileId,
        old_name: &str,
        new_parent: FileId,
        new_name: &str,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let id = state.child(old_parent, old_name)?;
        state.dir(new_parent)?;
        if let Ok(existing) = state.child(new_parent, new_name) {
            if existing != id {
                let ef = state.file(existing)?;
                if ef.attr.kind.is_dir() && !ef.entries.is_empty() {
                    return Err(Errno::ENOTEMPTY);
                }
                state.files.remove(&existing);
            }
        }
        let now = state.now();
        state.file_mut(old_parent)?.entries.remove(old_name);
        state.file_mut(old_parent)?.attr.mtime = now;
        state
            .file_mut(new_parent)?
            .entries
            .insert(new_name.to_string(), id);
        state.file_mut(new_parent)?.attr.mtime = now;
        let f = state.file_mut(id)?;
        f.attr.ctime = now;
        Ok(f.attr)
    }

    async fn link(&self, file: FileId, new_parent: FileId, new_name: &str) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        {
            let f = state.file(file)?;
            if f.attr.kind.is_dir() {
                return Err(Errno::EISDIR);
            }
            let dir = state.dir(new_parent)?;
            if dir.entries.contains_key(new_name) {
                return Err(Errno::EEXIST);
            }
        }
        let now = state.now();
        state
            .file_mut(new_parent)?
            .entries
            .insert(new_name.to_string(), file);
        state.file_mut(new_parent)?.attr.mtime = now;
        let f = state.file_mut(file)?;
        f.attr.nlink += 1;
        f.attr.ctime = now;
        Ok(f.attr)
    }

    async fn create(
        &self,
        parent: FileId,
        name: &str,
        file: FileId,
        mode: u32,
        _flags: OpenFlags,
        uid: u32,
        gid: u32,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let mut mf = MemFile::new(FileAttr::new(file, FileKind::Regular, mode, uid, gid));
        mf.xattrs.insert(XATTR_VERSION.to_string(), xattr_u64(0));
        mf.xattrs.insert(XATTR_SIZE.to_string(), xattr_u64(0));
        state.insert_child(parent, name, mf)
    }

    async fn stat(&self, file: FileId) -> OpResult<FileAttr> {
        self.gate()?;
        Ok(self.state.lock().file(file)?.attr)
    }

    async fn access(&self, file: FileId, _mask: u32) -> OpResult<()> {
        self.gate()?;
        self.state.lock().file(file)?;
        Ok(())
    }

    async fn readlink(&self, file: FileId) -> OpResult<String> {
        self.gate()?;
        let state = self.state.lock();
        let f = state.file(file)?;
        if f.attr.kind != FileKind::Symlink {
            return Err(Errno::EINVAL);
        }
        Ok(f.target.clone())
    }

    async fn truncate(
        &self,
        file: FileId,
        fragment_len: u64,
        logical_size: u64,
    ) -> OpResult<FileAttr> {
        self.gate()?;
        let mut state = self.state.lock();
        let now = state.now();
        {
            let f = state.file_mut(file)?;
            if f.attr.kind.is_dir() {
                return Err(Errno::EISDIR);
            }
            f.data.resize(fragment_len as usize, 0);
            f.attr.mtime = now;
            f.attr.ctime = now;
        }
        state.refresh_size(file);
        state.bump_version(file, logical_size);
        Ok(state.file(file)?.attr)
    }

    async fn statfs(&self, file: FileId) -> OpResult<StatvfsInfo> {
        self.gate()?;
        let state = self.state.lock();
        state.file(file)?;
        let used: u64 = state
            .files
            .values()
            .map(|f| (f.data.len() as u64).div_ceil(BLOCK))
            .sum();
        let blocks = 1u64 << 20;
        Ok(StatvfsInfo {
            block_size: BLOCK,
            blocks,
            blocks_free: blocks - used,
            blocks_avail: blocks - used,
            files: 1 << 16,
            files_free: (1 << 16) - state.files.len() as u64,
        })
    }

    async fn open(&self, file: FileId, flags: OpenFlags) -> OpResult<()> {
        self.gate()?;
        let state = self.state.lock();
        let f = state.file(file)?;
        if f.attr.kind.is_dir() && flags.write {
            return Err(Errno::EISDIR);
        }
        Ok(())
    }

    async fn read(&self, file: FileId, offset: u64, len: u64) -> OpResult<Bytes> {
        self.gate()?;
        let state = self.state.lock();
        let f = state.file(file)?;
        if f.attr.kind.is_dir() {
            return Err(Errno::EISDIR);
        }
        let start = (offset as usize).min(f.data.len());
        let end = (offset + len).min(f.data.len() as u64) as usize;
        Ok(Bytes::copy_from_slice(&f.data[start..end]))
    }

    async fn write(
        &self,
        file: FileId,
        offset: u64,
        data: Bytes,
        logical_size: u64,
    ) -> OpResult<u64> {
        self.gate()?;
        let mut state = self.state.lock();
        let now = state.now();
        {
            let f = state.file_mut(file)?;
            if f.attr.kind.is_dir() {
                return Err(Errno::EISDIR);
            }
            let end = offset as usize + data.len();
            if f.data.len() < end {
                f.data.resize(end, 0);
            }
            f.data[offset as usize..end].copy_from_slice(&data);
            f.attr.mtime = now;
        }
        state.refresh_size(file);
        state.bump_version(file, logical_size);
        Ok(data.len() as u64)
    }

    async fn flush(&self, file: FileId) -> OpResult<()> {
        self.gate()?;
        self.state.lock().file(file)?;
        Ok(())
    }

    async fn fsync(&self, file: FileId, _datasync: bool) -> OpResult<()> {
        self.gate()?;
        self.state.lock().file(file)?;
        Ok(())
    }

    async fn opendir(&self, file: FileId) -> OpResult<()> {
        self.gate()?;
        let state = self.state.lock();
        state.dir(file)?;
        Ok(())
    }

    async fn readdir(
        &self,
        file: FileId,
        offset: u64,
        count: usize,
        with_attrs: bool,
    ) -> OpResult<Vec<DirEntry>> {
        self.gate()?;
        let state = self.state.lock();
        let dir = state.dir(file)?;
        let entries = dir
            .entries
            .iter()
            .skip(offset as usize)
            .take(count)
            .map(|(name, id)| {
                let child = state.file(*id)?;
                Ok(DirEntry {
                    name: name.clone(),
                    file_id: *id,
                    kind: child.attr.kind,
                    attr: with_attrs.then_some(child.attr),
                })
            })
            .collect::<OpResult<Vec<_>>>()?;
        Ok(entries)
    }

    async fn fsyncdir(&self, file: FileId, _datasync: bool) -> OpResult<()> {
        self.gate()?;
        let state = self.state.lock();
        state.dir(file)?;
        Ok(())
    }

    async fn getxattr(&self, file: FileId, name: Option<&str>) -> OpResult<Xattrs> {
        self.gate()?;
        let state = self.state.lock();
        let f = state.file(file)?;
        match name {
            None => Ok(f.xattrs.clone()),
            Some(key) => {
                let value = f.xattrs.get(key).ok_or(Errno::ENODATA)?;
                let mut out = Xattrs::new();
                out.insert(key.to_string(), value.clone());
                Ok(out)
            }
        }
    }

    async fn setxattr(&self, file: FileId, xattrs: &Xattrs) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        let f = state.file_mut(file)?;
        for (k, v) in xattrs {
            f.xattrs.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn removexattr(&self, file: FileId, name: &str) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        let f = state.file_mut(file)?;
        if f.xattrs.remove(name).is_none() {
            return Err(Errno::ENODATA);
        }
        Ok(())
    }

    async fn xattrop(&self, file: FileId, kind: XattrOpKind, delta: &Xattrs) -> OpResult<Xattrs> {
        self.gate()?;
        let mut state = self.state.lock();
        let f = state.file_mut(file)?;
        let mut out = Xattrs::new();
        for (k, v) in delta {
            let new = match kind {
                XattrOpKind::Set => v.clone(),
                XattrOpKind::Add => {
                    let old = f.xattrs.get(k).and_then(|x| xattr_to_u64(x)).unwrap_or(0);
                    let add = xattr_to_u64(v).ok_or(Errno::EINVAL)?;
                    xattr_u64(old.wrapping_add(add))
                }
            };
            f.xattrs.insert(k.clone(), new.clone());
            out.insert(k.clone(), new);
        }
        Ok(out)
    }

    async fn lk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> OpResult<LockRange> {
        self.inodelk(file, owner, cmd, range).await?;
        Ok(range)
    }

    async fn inodelk(
        &self,
        file: FileId,
        owner: u64,
        cmd: LockCmd,
        range: LockRange,
    ) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        state.file(file)?;
        let locks = state.inode_locks.entry(file).or_default();
        match cmd {
            LockCmd::Lock | LockCmd::TryLock => {
                // Never blocks; a conflicting holder fails the attempt.
                if locks
                    .iter()
                    .any(|(o, r)| *o != owner && ranges_conflict(r, &range))
                {
                    return Err(Errno::EBUSY);
                }
                locks.push((owner, range));
                Ok(())
            }
            LockCmd::Unlock => {
                locks.retain(|(o, r)| !(*o == owner && r.start == range.start && r.len == range.len));
                Ok(())
            }
        }
    }

    async fn entrylk(
        &self,
        parent: FileId,
        name: Option<&str>,
        owner: u64,
        cmd: LockCmd,
    ) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        state.dir(parent)?;
        let key = (parent, name.map(str::to_string));
        match cmd {
            LockCmd::Lock | LockCmd::TryLock => match state.entry_locks.get(&key) {
                Some(holder) if *holder != owner => Err(Errno::EBUSY),
                _ => {
                    state.entry_locks.insert(key, owner);
                    Ok(())
                }
            },
            LockCmd::Unlock => {
                if state.entry_locks.get(&key) == Some(&owner) {
                    state.entry_locks.remove(&key);
                }
                Ok(())
            }
        }
    }

    async fn heal_remove(&self, file: FileId) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        state.files.remove(&file);
        let mut emptied: Vec<(FileId, String)> = Vec::new();
        for (id, f) in &state.files {
            for (name, child) in &f.entries {
                if *child == file {
                    emptied.push((*id, name.clone()));
                }
            }
        }
        for (dir, name) in emptied {
            if let Some(d) = state.files.get_mut(&dir) {
                d.entries.remove(&name);
            }
        }
        Ok(())
    }

    async fn heal_create(&self, file: FileId, attr: FileAttr, logical_size: u64) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        let mut mf = MemFile::new(attr);
        mf.attr.size = 0;
        mf.attr.blocks = 0;
        mf.xattrs.insert(XATTR_VERSION.to_string(), xattr_u64(0));
        mf.xattrs
            .insert(XATTR_SIZE.to_string(), xattr_u64(logical_size));
        state.files.insert(file, mf);
        Ok(())
    }

    async fn heal_link(&self, parent: FileId, name: &str, file: FileId) -> OpResult<()> {
        self.gate()?;
        let mut state = self.state.lock();
        state.file(file)?;
        let dir = state.file_mut(parent)?;
        if !dir.attr.kind.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        dir.entries.insert(name.to_string(), file);
        Ok(())
    }
}

/// Build a cluster of `n` fresh nodes sharing one root id.
#[must_use]
pub fn mem_cluster(n: usize) -> (Vec<Arc<MemNode>>, FileId) {
    let root = FileId::root();
    let nodes = (0..n).map(|_| Arc::new(MemNode::new(root))).collect();
    (nodes, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_lookup_roundtrip() {
        let node = MemNode::new(FileId::root());
        let id = FileId::new();
        node.create(FileId::root(), "a", id, 0o644, OpenFlags::RDWR, 0, 0)
            .await
            .unwrap();
        let (attr, xattrs) = node.lookup(FileId::root(), "a").await.unwrap();
        assert_eq!(attr.file_id, id);
        assert!(xattrs.contains_key(XATTR_VERSION));
        assert_eq!(
            node.lookup(FileId::root(), "missing").await.unwrap_err(),
            Errno::ENOENT
        );
    }

    #[tokio::test]
    async fn test_write_bumps_version_and_size() {
        let node = MemNode::new(FileId::root());
        let id = FileId::new();
        node.create(FileId::root(), "f", id, 0o644, OpenFlags::RDWR, 0, 0)
            .await
            .unwrap();
        node.write(id, 0, Bytes::from_static(b"abcd"), 16)
            .await
            .unwrap();
        assert_eq!(node.xattr(id, XATTR_VERSION), Some(xattr_u64(1)));
        assert_eq!(node.xattr(id, XATTR_SIZE), Some(xattr_u64(16)));
        let data = node.read(id, 0, 4).await.unwrap();
        assert_eq!(&data[..], b"abcd");
    }

    #[tokio::test]
    async fn test_down_node_refuses() {
        let node = MemNode::new(FileId::root());
        node.set_down(true);
        assert_eq!(
            node.stat(FileId::root()).await.unwrap_err(),
            Errno::ENOTCONN
        );
        node.set_down(false);
        assert!(node.stat(FileId::root()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let node = MemNode::new(FileId::root());
        node.fail_next(Errno::ENOMEM);
        assert_eq!(node.stat(FileId::root()).await.unwrap_err(), Errno::ENOMEM);
        assert!(node.stat(FileId::root()).await.is_ok());
    }

    #[tokio::test]
    async fn test_inodelk_conflicts() {
        let node = MemNode::new(FileId::root());
        let id = FileId::new();
        node.create(FileId::root(), "f", id, 0o644, OpenFlags::RDWR, 0, 0)
            .await
            .unwrap();
        let range = LockRange::whole_file();
        node.inodelk(id, 1, LockCmd::Lock, range).await.unwrap();
        assert_eq!(
            node.inodelk(id, 2, LockCmd::Lock, range).await.unwrap_err(),
            Errno::EBUSY
        );
        node.inodelk(id, 1, LockCmd::Unlock, range).await.unwrap();
        node.inodelk(id, 2, LockCmd::Lock, range).await.unwrap();
    }
}
