//! # corral-core
//!
//! Low-level Linux isolation primitives for the corral runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for UTS, PID, mount, network and IPC
//!   isolation, and `setns(2)` for joining a running container.
//! - **Cgroups**: memory, CPU share and CPU set controllers on v1
//!   hierarchies located through mount metadata.
//! - **Filesystem**: `OverlayFS` workspaces with bind-mounted volumes,
//!   `pivot_root`, and the init-time mounts.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
