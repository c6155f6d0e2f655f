//! # regio-memory
//!
//! Hierarchical region ("pool") memory management.
//!
//! This crate provides:
//! - A size-classed [`Allocator`](allocator::Allocator) caching raw memnodes
//! - A tree of [`Pool`](pool::Pool)s that bump-allocate from those nodes and
//!   release everything at once on clear/destroy
//! - Cleanup callbacks, fork hooks and userdata bound to a pool's lifetime
//!
//! ## Quick Start
//!
//! ```rust
//! use regio_memory::prelude::*;
//!
//! let root = Pool::new()?;
//! let request = root.create_child()?;
//!
//! let name = request.pstrdup("session-42")?;
//! // SAFETY: `request` is alive and has not been cleared.
//! assert_eq!(unsafe { name.as_ref() }, "session-42");
//!
//! // Destroying the request pool releases every allocation made from it.
//! request.destroy();
//! # Ok::<(), MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//! - `serde`: `Serialize`/`Deserialize` for configuration types
//!
//! ## Architecture
//!
//! - Standalone error handling via [`error`] module
//! - [`allocator`] knows nothing about pools; it hands out and caches memnodes
//! - [`pool`] owns the tree, teardown ordering and cleanup semantics

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
// Memnode carving and bump allocation are raw-pointer code by nature.
#![allow(unsafe_code)]

// Error types
pub mod error;

pub mod allocator;
pub mod core;
pub mod pool;

/// Commonly used types
pub mod prelude {
    pub use crate::allocator::{Allocator, AllocatorConfig, AllocatorStats, MemNode};
    pub use crate::core::PoolId;
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::pool::{
        AbortHandler, CleanupId, CleanupResult, Lifecycle, Pool, PoolOptions, PoolRef,
        WeakPool, is_ancestor, null_cleanup,
    };
}

pub use crate::error::{BoxError, MemoryError, MemoryResult, Result};
