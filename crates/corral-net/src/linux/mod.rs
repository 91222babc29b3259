//! Host network backends.
//!
//! Links are managed through the `ip` program and NAT through `iptables`.
//! Both sit behind traits so drivers can be exercised without root.

pub mod firewall;
pub mod link;

pub use firewall::{Firewall, Iptables};
pub use link::{IpRoute, LinkManager};
