//! Container lifecycle management for the corral runtime.
//!
//! A `run` builds an overlay workspace, clones the runtime's own binary
//! into fresh namespaces as `corral init`, constrains it with cgroups,
//! optionally wires it to a bridge network, and finally hands it the user
//! command over a one-shot pipe. Everything about a container that must
//! outlive the invocation lives in its state directory.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod exec;
pub mod init;
pub mod logs;
pub mod process;
pub mod state;
