//! Per-node answers and answer groups
//!
//! Every node reply is bucketed against the existing groups with the
//! operation's combine predicate. Matching replies join the group and
//! widen its member mask; non-matching replies open a new group. Groups
//! are disjoint in node membership and their union is exactly the set of
//! nodes that have replied.

use bytes::Bytes;
use stripefs_common::{
    DirEntry, Errno, FileAttr, LockRange, NodeMask, StatvfsInfo, Xattrs, XATTR_CONTENT,
};

/// The payload half of a per-node reply, and also the type of the final
/// rebuilt answer. One variant per operation category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpPayload {
    /// Operations with no output beyond success.
    Unit,
    /// Attribute-bearing replies (stat, entry operations, truncate).
    Attr(FileAttr),
    /// Lookup replies: attributes plus the fragment's xattr dictionary.
    Lookup { attr: FileAttr, xattrs: Xattrs },
    /// One fragment (per-node) or the rebuilt buffer (final).
    Data(Bytes),
    /// Bytes written.
    Written(u64),
    /// Symlink target.
    Target(String),
    /// Directory listing page.
    Dirents(Vec<DirEntry>),
    /// Filesystem statistics.
    Statfs(StatvfsInfo),
    /// Extended attribute dictionary.
    Xattrs(Xattrs),
    /// Granted lock range.
    Lock(LockRange),
}

/// One node's reply: payload or errno.
#[derive(Clone, Debug)]
pub struct NodeAnswer {
    pub node: usize,
    pub res: Result<OpPayload, Errno>,
}

impl NodeAnswer {
    #[must_use]
    pub fn new(node: usize, res: Result<OpPayload, Errno>) -> Self {
        Self { node, res }
    }

    /// Same result class: both successes, or both failures with the same
    /// errno. The baseline every combine predicate starts from.
    #[must_use]
    pub fn same_class(&self, other: &NodeAnswer) -> bool {
        match (&self.res, &other.res) {
            (Ok(_), Ok(_)) => true,
            (Err(a), Err(b)) => a == b,
            _ => false,
        }
    }
}

/// A set of mutually equivalent replies.
#[derive(Clone, Debug)]
pub struct AnswerGroup {
    /// Nodes whose replies matched this group.
    pub mask: NodeMask,
    /// Member answers; `answers[0]` is the representative (timestamps
    /// already merged to the minimum across members).
    pub answers: Vec<NodeAnswer>,
}

impl AnswerGroup {
    #[must_use]
    pub fn new(answer: NodeAnswer) -> Self {
        Self {
            mask: NodeMask::single(answer.node),
            answers: vec![answer],
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.mask.count()
    }

    #[must_use]
    pub fn representative(&self) -> &NodeAnswer {
        &self.answers[0]
    }

    /// Whether every member succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.representative().res.is_ok()
    }

    /// Add a matching answer, merging attribute timestamps into the
    /// representative (earliest wins).
    pub fn push(&mut self, answer: NodeAnswer) {
        self.mask.set(answer.node);
        let merged = match (&self.answers[0].res, &answer.res) {
            (Ok(rep), Ok(new)) => merge_times(rep, new),
            _ => None,
        };
        if let Some(payload) = merged {
            self.answers[0].res = Ok(payload);
        }
        self.answers.push(answer);
    }

    /// Merge another group into this one (used by the rebuild subset
    /// search to form a candidate quorum from several groups).
    #[must_use]
    pub fn merged_with(&self, other: &AnswerGroup) -> AnswerGroup {
        let mut merged = self.clone();
        for answer in &other.answers {
            merged.push(answer.clone());
        }
        merged
    }

    /// True when every member still matches the representative under
    /// `eq`. Groups built reply-by-reply are uniform by construction;
    /// merged selections from the rebuild subset search are not, and a
    /// manager whose rebuild answers from the representative must
    /// re-check before trusting it.
    #[must_use]
    pub fn uniform<F>(&self, eq: F) -> bool
    where
        F: Fn(&NodeAnswer, &NodeAnswer) -> bool,
    {
        let rep = self.representative();
        self.answers.iter().all(|a| eq(rep, a))
    }
}

fn merge_times(rep: &OpPayload, new: &OpPayload) -> Option<OpPayload> {
    match (rep, new) {
        (OpPayload::Attr(a), OpPayload::Attr(b)) => {
            let mut out = *a;
            out.merge_times(b);
            Some(OpPayload::Attr(out))
        }
        (
            OpPayload::Lookup { attr: a, xattrs },
            OpPayload::Lookup { attr: b, .. },
        ) => {
            let mut out = *a;
            out.merge_times(b);
            Some(OpPayload::Lookup {
                attr: out,
                xattrs: xattrs.clone(),
            })
        }
        _ => None,
    }
}

/// Key-wise dictionary equality with the special-key exemption: the
/// per-node content checksum key is compared by length only, because each
/// node's fragment differs by design.
#[must_use]
pub fn xattrs_match(a: &Xattrs, b: &Xattrs) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(key, va)| match b.get(key) {
        None => false,
        Some(vb) if key == XATTR_CONTENT => va.len() == vb.len(),
        Some(vb) => va == vb,
    })
}

/// Listing equality: same names, ids and kinds in the same order.
/// Per-node attributes (timestamps, fragment sizes) are merged during
/// rebuild, not compared here.
#[must_use]
pub fn dirents_match(a: &[DirEntry], b: &[DirEntry]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.name == y.name && x.file_id == y.file_id && x.kind == y.kind
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripefs_common::{FileId, FileKind, Timespec};

    fn attr_answer(node: usize, mtime: i64) -> NodeAnswer {
        let mut attr = FileAttr::new(FileId::root(), FileKind::Regular, 0o644, 0, 0);
        attr.mtime = Timespec::new(mtime, 0);
        NodeAnswer::new(node, Ok(OpPayload::Attr(attr)))
    }

    #[test]
    fn test_same_class() {
        let ok = NodeAnswer::new(0, Ok(OpPayload::Unit));
        let eio = NodeAnswer::new(1, Err(Errno::EIO));
        let enoent = NodeAnswer::new(2, Err(Errno::ENOENT));
        assert!(ok.same_class(&NodeAnswer::new(3, Ok(OpPayload::Unit))));
        assert!(!ok.same_class(&eio));
        assert!(!eio.same_class(&enoent));
        assert!(eio.same_class(&NodeAnswer::new(4, Err(Errno::EIO))));
    }

    #[test]
    fn test_group_merges_timestamps() {
        let mut group = AnswerGroup::new(attr_answer(0, 200));
        group.push(attr_answer(1, 100));
        group.push(attr_answer(2, 300));
        assert_eq!(group.count(), 3);
        match &group.representative().res {
            Ok(OpPayload::Attr(attr)) => assert_eq!(attr.mtime.sec, 100),
            other => panic!("unexpected representative: {other:?}"),
        }
    }

    #[test]
    fn test_merged_group_is_not_uniform() {
        let mut a = AnswerGroup::new(attr_answer(0, 10));
        a.push(attr_answer(1, 10));
        let mut odd = FileAttr::new(FileId::root(), FileKind::Regular, 0o600, 0, 0);
        odd.mtime = Timespec::new(10, 0);
        let b = AnswerGroup::new(NodeAnswer::new(2, Ok(OpPayload::Attr(odd))));

        let eq = |r: &NodeAnswer, x: &NodeAnswer| match (&r.res, &x.res) {
            (Ok(OpPayload::Attr(a)), Ok(OpPayload::Attr(b))) => a.matches(b),
            _ => false,
        };
        assert!(a.uniform(eq));
        assert!(!a.merged_with(&b).uniform(eq));
    }

    #[test]
    fn test_xattrs_match_special_key() {
        let mut a = Xattrs::new();
        let mut b = Xattrs::new();
        a.insert("user.k".into(), vec![1, 2]);
        b.insert("user.k".into(), vec![1, 2]);
        a.insert(XATTR_CONTENT.into(), vec![9, 9, 9]);
        b.insert(XATTR_CONTENT.into(), vec![7, 7, 7]);
        // Same length content checksums are equivalent.
        assert!(xattrs_match(&a, &b));
        b.insert(XATTR_CONTENT.into(), vec![7]);
        assert!(!xattrs_match(&a, &b));
        b.insert(XATTR_CONTENT.into(), vec![7, 7, 7]);
        b.insert("user.k".into(), vec![3]);
        assert!(!xattrs_match(&a, &b));
    }
}
