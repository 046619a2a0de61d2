//! StripeFS Erasure - GF(2^8) split/merge primitives
//!
//! This crate owns the erasure-coding data path: the Galois-field tables
//! and the `split`/`merge` pair that turn a byte range into per-node
//! fragments and back. Any K of the N fragments reconstruct the original
//! bytes exactly.
//!
//! ```
//! use stripefs_common::ClusterConfig;
//! use stripefs_erasure::ErasureCoder;
//!
//! let coder = ErasureCoder::new(&ClusterConfig::new(5, 2).unwrap()).unwrap();
//! let data = vec![7u8; coder.unit_size() * 3];
//! let fragments = coder.split_all(&data).unwrap();
//! let picked: Vec<&[u8]> = [4, 0, 2].iter().map(|&r| &fragments[r][..]).collect();
//! assert_eq!(coder.merge(&[4, 0, 2], &picked).unwrap(), data);
//! ```

pub mod code;
pub mod gf;

pub use code::{row_multiplier, ErasureCoder};
