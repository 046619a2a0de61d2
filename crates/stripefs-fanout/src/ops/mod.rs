//! Operation managers
//!
//! One manager type per operation category. Each manager owns the node
//! handles and the operation's arguments; the request engine drives it
//! through dispatch, combine and rebuild.

pub mod attr;
pub mod data;
pub mod dir;
pub mod entry;
pub mod lock;
pub mod lookup;
pub mod statfs;
pub mod xattr;

use std::sync::Arc;
use stripefs_transport::NodeBackend;

/// Shared, indexable set of node handles.
pub type Nodes = Arc<[Arc<dyn NodeBackend>]>;
