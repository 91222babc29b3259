//! # corral-net
//!
//! Container networking for the corral runtime.
//!
//! - [`ipam`]: bitmap address allocator persisted as JSON, serialized
//!   across processes with a file lock.
//! - [`bridge`]: the `bridge` driver, built on the [`linux`] link and
//!   firewall backends.
//! - [`manager`]: network lifecycle and container attachment, tying the
//!   [`store`], the allocator and the drivers together.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod bridge;
pub mod driver;
pub mod ipam;
pub mod linux;
pub mod manager;
pub mod store;
pub mod types;

pub use driver::NetworkDriver;
pub use ipam::Ipam;
pub use manager::NetworkManager;
pub use types::{Endpoint, Network, VethPair};
