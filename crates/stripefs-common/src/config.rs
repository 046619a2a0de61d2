//! Cluster configuration
//!
//! Node count and redundancy are the only tunables this core consumes;
//! everything else (block size, fragment chunk, quorum defaults) derives
//! from them.

use crate::error::{Error, Result};
use crate::mask::MAX_NODES;
use serde::{Deserialize, Serialize};

/// Galois field symbol width in bits.
pub const GF_BITS: usize = 8;

/// Width in bytes of the vectorized multiply unit.
pub const WORD_SIZE: usize = 64;

/// Bytes of one fragment per stripe: `WORD_SIZE * GF_BITS`.
///
/// Every fragment file grows in whole multiples of this chunk; the stripe
/// (the fundamental striping unit for all offset/size math) is
/// `fragments * FRAGMENT_CHUNK` bytes of logical data.
pub const FRAGMENT_CHUNK: usize = WORD_SIZE * GF_BITS;

/// Erasure-coded cluster geometry: N storage nodes holding K = N - R
/// data-bearing fragments plus R redundancy fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Total storage nodes (N).
    pub nodes: usize,
    /// Redundancy fragments (R). Any R nodes may be lost.
    pub redundancy: usize,
}

impl ClusterConfig {
    /// 4+2 geometry, the conventional default.
    pub const EC_4_2: ClusterConfig = ClusterConfig {
        nodes: 6,
        redundancy: 2,
    };

    /// Create and validate a configuration.
    pub fn new(nodes: usize, redundancy: usize) -> Result<Self> {
        let config = Self { nodes, redundancy };
        config.validate()?;
        Ok(config)
    }

    /// Check the geometry invariants: `0 < R < K` and `N <= 64`.
    pub fn validate(&self) -> Result<()> {
        if self.nodes < 3 || self.nodes > MAX_NODES {
            return Err(Error::InvalidConfig(format!(
                "node count must be in 3..={MAX_NODES}, got {}",
                self.nodes
            )));
        }
        if self.redundancy == 0 {
            return Err(Error::InvalidConfig(
                "redundancy must be at least 1".into(),
            ));
        }
        if self.redundancy >= self.fragments() {
            return Err(Error::InvalidConfig(format!(
                "redundancy {} must be smaller than fragment count {}",
                self.redundancy,
                self.fragments()
            )));
        }
        Ok(())
    }

    /// Data-bearing fragments required for reconstruction (K = N - R).
    #[must_use]
    pub const fn fragments(&self) -> usize {
        self.nodes - self.redundancy
    }

    /// Logical bytes covered by one stripe: `K * FRAGMENT_CHUNK`.
    #[must_use]
    pub const fn stripe_size(&self) -> usize {
        self.fragments() * FRAGMENT_CHUNK
    }

    /// Round `offset` down to a stripe boundary.
    #[must_use]
    pub const fn align_down(&self, offset: u64) -> u64 {
        offset - offset % self.stripe_size() as u64
    }

    /// Round `offset` up to a stripe boundary.
    #[must_use]
    pub const fn align_up(&self, offset: u64) -> u64 {
        let stripe = self.stripe_size() as u64;
        offset.div_ceil(stripe) * stripe
    }

    /// Fragment-space length corresponding to `len` aligned logical bytes.
    #[must_use]
    pub const fn fragment_len(&self, len: u64) -> u64 {
        len / self.fragments() as u64
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::EC_4_2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let c = ClusterConfig::default();
        assert_eq!(c.nodes, 6);
        assert_eq!(c.fragments(), 4);
        assert_eq!(c.stripe_size(), 4 * 512);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_geometry() {
        assert!(ClusterConfig::new(2, 1).is_err());
        assert!(ClusterConfig::new(6, 0).is_err());
        // R >= K
        assert!(ClusterConfig::new(6, 3).is_err());
        assert!(ClusterConfig::new(65, 2).is_err());
        assert!(ClusterConfig::new(5, 2).is_ok());
    }

    #[test]
    fn test_alignment() {
        let c = ClusterConfig::new(5, 2).unwrap();
        let stripe = c.stripe_size() as u64;
        assert_eq!(c.align_down(0), 0);
        assert_eq!(c.align_down(stripe + 1), stripe);
        assert_eq!(c.align_up(1), stripe);
        assert_eq!(c.align_up(stripe), stripe);
        assert_eq!(c.fragment_len(stripe), FRAGMENT_CHUNK as u64);
    }
}
