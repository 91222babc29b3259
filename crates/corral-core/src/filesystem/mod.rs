//! Filesystem management for container isolation.
//!
//! Provides the per-container overlay workspace, volume specs, the
//! `pivot_root` sequence run by the init process, and mount utilities.

pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
pub mod volume;
