//! StripeFS Common - Shared types and utilities
//!
//! This crate provides the types shared across all StripeFS components:
//! node masks, file identifiers and attributes, the errno model, and the
//! cluster configuration.

pub mod config;
pub mod errno;
pub mod error;
pub mod mask;
pub mod types;

pub use config::ClusterConfig;
pub use errno::Errno;
pub use error::{Error, Result};
pub use mask::NodeMask;
pub use types::*;
