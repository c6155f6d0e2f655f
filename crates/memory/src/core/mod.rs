//! Core building blocks shared by the allocator and the pool tree:
//! alignment helpers, memnode size classes and pool identity.

pub mod types;

pub use types::{PoolId, alignment, class};
