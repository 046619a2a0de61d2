//! Node masks
//!
//! A `NodeMask` is a fixed-width bitset with one bit per storage node
//! (at most 64 nodes). The fan-out engine uses masks for candidate,
//! contacted and succeeded sets; the rebuild retry logic enumerates
//! sub-masks when looking for an alternative quorum.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not, Sub, SubAssign};

/// Maximum number of storage nodes a mask can represent.
pub const MAX_NODES: usize = 64;

/// Fixed-capacity bitset over node indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeMask(u64);

impl NodeMask {
    /// The empty mask.
    pub const EMPTY: NodeMask = NodeMask(0);

    /// Mask with the low `n` bits set (nodes `0..n`).
    ///
    /// # Panics
    /// Panics if `n > 64`.
    #[must_use]
    pub fn first(n: usize) -> Self {
        assert!(n <= MAX_NODES, "node count exceeds mask width");
        if n == MAX_NODES {
            NodeMask(u64::MAX)
        } else {
            NodeMask((1u64 << n) - 1)
        }
    }

    /// Mask with a single bit set.
    #[must_use]
    pub fn single(node: usize) -> Self {
        assert!(node < MAX_NODES, "node index exceeds mask width");
        NodeMask(1u64 << node)
    }

    /// Construct from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        NodeMask(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of set bits.
    #[must_use]
    pub const fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub const fn test(self, node: usize) -> bool {
        node < MAX_NODES && (self.0 >> node) & 1 == 1
    }

    pub fn set(&mut self, node: usize) {
        assert!(node < MAX_NODES, "node index exceeds mask width");
        self.0 |= 1u64 << node;
    }

    pub fn clear(&mut self, node: usize) {
        assert!(node < MAX_NODES, "node index exceeds mask width");
        self.0 &= !(1u64 << node);
    }

    /// True if every bit of `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: NodeMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if the two masks share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: NodeMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Lowest set node index, if any.
    #[must_use]
    pub fn lowest(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Iterate over set node indices in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                None
            } else {
                let node = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(node)
            }
        })
    }

    /// Enumerate every sub-mask of this mask, largest first by bit pattern,
    /// ending with the empty mask. The enumeration visits `2^count()`
    /// masks, so callers must keep the population small (the rebuild retry
    /// walks sub-masks of the *group* set, not of the raw node set).
    pub fn subsets(self) -> impl Iterator<Item = NodeMask> {
        let full = self.0;
        let mut cur = full;
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let out = NodeMask(cur);
            if cur == 0 {
                done = true;
            } else {
                cur = (cur - 1) & full;
            }
            Some(out)
        })
    }

    /// Enumerate sub-masks with exactly `k` bits set.
    pub fn subsets_of_size(self, k: usize) -> impl Iterator<Item = NodeMask> {
        self.subsets().filter(move |m| m.count() == k)
    }
}

impl BitOr for NodeMask {
    type Output = NodeMask;
    fn bitor(self, rhs: NodeMask) -> NodeMask {
        NodeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeMask {
    fn bitor_assign(&mut self, rhs: NodeMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NodeMask {
    type Output = NodeMask;
    fn bitand(self, rhs: NodeMask) -> NodeMask {
        NodeMask(self.0 & rhs.0)
    }
}

impl BitAndAssign for NodeMask {
    fn bitand_assign(&mut self, rhs: NodeMask) {
        self.0 &= rhs.0;
    }
}

impl Sub for NodeMask {
    type Output = NodeMask;
    fn sub(self, rhs: NodeMask) -> NodeMask {
        NodeMask(self.0 & !rhs.0)
    }
}

impl SubAssign for NodeMask {
    fn sub_assign(&mut self, rhs: NodeMask) {
        self.0 &= !rhs.0;
    }
}

impl Not for NodeMask {
    type Output = NodeMask;
    fn not(self) -> NodeMask {
        NodeMask(!self.0)
    }
}

impl FromIterator<usize> for NodeMask {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut mask = NodeMask::EMPTY;
        for node in iter {
            mask.set(node);
        }
        mask
    }
}

impl fmt::Debug for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeMask({:#b})", self.0)
    }
}

impl fmt::Display for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, node) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ops() {
        let mut m = NodeMask::EMPTY;
        assert!(m.is_empty());
        m.set(0);
        m.set(5);
        m.set(63);
        assert_eq!(m.count(), 3);
        assert!(m.test(5));
        assert!(!m.test(4));
        m.clear(5);
        assert!(!m.test(5));
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![0, 63]);
    }

    #[test]
    fn test_first() {
        assert_eq!(NodeMask::first(0), NodeMask::EMPTY);
        assert_eq!(NodeMask::first(3).count(), 3);
        assert_eq!(NodeMask::first(64).count(), 64);
    }

    #[test]
    fn test_set_algebra() {
        let a = NodeMask::from_bits(0b1110);
        let b = NodeMask::from_bits(0b0111);
        assert_eq!((a | b).bits(), 0b1111);
        assert_eq!((a & b).bits(), 0b0110);
        assert_eq!((a - b).bits(), 0b1000);
        assert!(a.contains(NodeMask::from_bits(0b0110)));
        assert!(!a.contains(b));
        assert!(a.intersects(b));
    }

    #[test]
    fn test_subsets() {
        let m = NodeMask::from_bits(0b1011);
        let subs: Vec<_> = m.subsets().collect();
        assert_eq!(subs.len(), 8);
        assert_eq!(subs[0], m);
        assert_eq!(*subs.last().unwrap(), NodeMask::EMPTY);
        for s in &subs {
            assert!(m.contains(*s));
        }

        let pairs: Vec<_> = m.subsets_of_size(2).collect();
        assert_eq!(pairs.len(), 3);
        for p in &pairs {
            assert_eq!(p.count(), 2);
        }
    }

    #[test]
    fn test_from_iter_and_display() {
        let m: NodeMask = [1usize, 3, 4].into_iter().collect();
        assert_eq!(m.count(), 3);
        assert_eq!(format!("{m}"), "{1,3,4}");
    }
}
