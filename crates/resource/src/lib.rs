//! # regio-resource
//!
//! Bounded lists of reusable resources (connections, buffers, handles)
//! whose lifetime is tied to a `regio-memory` pool.
//!
//! A [`ResList`] keeps at least `min` instances built ahead of demand, never
//! lets more than `hmax` exist, and destroys instances idle past their ttl
//! while more than `smax` are idle. `acquire` blocks while the list is
//! exhausted, up to an optional timeout.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use regio_memory::pool::Pool;
//! use regio_resource::{FnResource, ResList, ResListConfig};
//!
//! let pool = Pool::new()?;
//! let resource = FnResource::new(|| Ok(String::from("conn")), |_conn| Ok(()));
//! let config = ResListConfig::new(1, 2, 4)
//!     .with_ttl(Duration::from_secs(30))
//!     .with_timeout(Duration::from_millis(250));
//! let list = ResList::with_pool(config, resource, &pool)?;
//!
//! {
//!     let conn = list.acquire()?;
//!     assert_eq!(*conn, "conn");
//! } // released here
//!
//! assert_eq!(list.idle_count(), 1);
//! // Destroying the pool destroys the list's idle resources.
//! pool.destroy();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Features
//!
//! - `threads` (default): blocking acquire with timeouts. Without it a list
//!   holds at most one resource and an exhausted acquire fails with
//!   [`Error::WouldBlock`].
//! - `serde`: `Serialize`/`Deserialize` for [`ResListConfig`]

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod guard;
pub mod reslist;
pub mod resource;

mod ring;

pub use config::ResListConfig;
pub use error::{BoxError, Error, Result};
pub use guard::Lease;
pub use reslist::{AcquireOrder, CleanupOrder, ResList};
pub use resource::{FnResource, Resource};
