//! Linux namespace management for container isolation.
//!
//! New containers get their namespaces from the `clone(2)` flags built
//! here; `exec` joins an existing container through [`join`].

pub mod join;

#[cfg(target_os = "linux")]
use nix::sched::CloneFlags;

/// A namespace kind a container can be isolated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Hostname and domain name.
    Uts,
    /// Network devices, addresses, routes.
    Net,
    /// Process IDs.
    Pid,
    /// Mount table.
    Mount,
}

impl Namespace {
    /// Entry name under `/proc/<pid>/ns`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::Net => "net",
            Self::Pid => "pid",
            Self::Mount => "mnt",
        }
    }

    /// The matching `CLONE_NEW*` flag.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mount => CloneFlags::CLONE_NEWNS,
        }
    }
}

/// Configuration for which namespaces to create.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network: true,
            ipc: true,
        }
    }
}

impl NamespaceConfig {
    /// Enabled namespaces.
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        [
            (self.uts, Namespace::Uts),
            (self.pid, Namespace::Pid),
            (self.mount, Namespace::Mount),
            (self.network, Namespace::Net),
            (self.ipc, Namespace::Ipc),
        ]
        .into_iter()
        .filter_map(|(enabled, ns)| enabled.then_some(ns))
        .collect()
    }

    /// Flags for a single `clone(2)` creating every enabled namespace.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.namespaces()
            .into_iter()
            .fold(CloneFlags::empty(), |flags, ns| flags | ns.clone_flag())
    }
}
