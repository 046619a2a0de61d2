//! StripeFS Fanout - the request fan-out and recombination engine
//!
//! This crate is the heart of the client stack: it turns one filesystem
//! call into N per-node calls, buckets the replies into groups of
//! mutually agreeing answers, and reports exactly one result once a
//! group (or a recombination of groups) satisfies the operation's
//! quorum. Divergent fragments discovered along the way are repaired in
//! the background by the [`heal::Healer`].
//!
//! Layering, bottom up:
//! - [`answer`]: per-node replies and disjoint answer groups
//! - [`manager`]: the dispatch/combine/rebuild policy trait and quorum
//! - [`request`]: the shared fan-out state machine (at-most-once reply,
//!   first-error capture, subset recombination)
//! - [`ops`]: one manager per operation category
//! - [`inode`]: per-inode size cache and heal bookkeeping
//! - [`client`]: the [`client::StripeFs`] facade exposing the POSIX-like
//!   surface, including all stripe alignment and read-modify-write
//!
//! ```no_run
//! use std::sync::Arc;
//! use stripefs_common::{ClusterConfig, FileId, OpenFlags};
//! use stripefs_fanout::StripeFs;
//! use stripefs_transport::{mem::mem_cluster, NodeBackend};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClusterConfig::new(5, 2)?;
//! let (nodes, root) = mem_cluster(config.nodes);
//! let backends: Vec<Arc<dyn NodeBackend>> =
//!     nodes.into_iter().map(|n| n as Arc<dyn NodeBackend>).collect();
//! let fs = StripeFs::new(config, backends)?;
//!
//! let attr = fs.create(root, "hello.txt", 0o644, OpenFlags::RDWR, 0, 0).await?;
//! fs.write(attr.file_id, 0, b"hello, cluster").await?;
//! let data = fs.read(attr.file_id, 0, 14).await?;
//! assert_eq!(&data[..], b"hello, cluster");
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod client;
pub mod heal;
pub mod inode;
pub mod manager;
pub mod ops;
pub mod request;

pub use answer::{AnswerGroup, NodeAnswer, OpPayload};
pub use client::StripeFs;
pub use heal::Healer;
pub use inode::{InodeCtx, InodeTable};
pub use manager::{OpManager, Quorum};
pub use request::{Outcome, Request};
