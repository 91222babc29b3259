//! Joining the namespaces of a running process via `setns(2)`.

use std::path::PathBuf;

use corral_common::error::{CorralError, Result};

use super::Namespace;

/// Namespaces entered by `exec`, in joining order.
///
/// The mount namespace comes last: after it the host's `/proc` is no
/// longer visible.
pub const EXEC_NAMESPACES: [Namespace; 5] = [
    Namespace::Ipc,
    Namespace::Uts,
    Namespace::Net,
    Namespace::Pid,
    Namespace::Mount,
];

/// Path of the namespace handle of `pid`.
#[must_use]
pub fn ns_path(pid: i32, ns: Namespace) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/{}", ns.proc_name()))
}

/// Moves the calling thread into `namespaces` of `pid`.
///
/// All handles are opened before the first `setns(2)`. Joining a PID
/// namespace only affects children spawned afterwards; joining a mount
/// namespace requires a single-threaded caller.
///
/// # Errors
///
/// Returns an error if a handle cannot be opened or `setns(2)` fails.
#[cfg(target_os = "linux")]
pub fn join(pid: i32, namespaces: &[Namespace]) -> Result<()> {
    let handles = namespaces
        .iter()
        .map(|&ns| {
            let path = ns_path(pid, ns);
            std::fs::File::open(&path)
                .map(|file| (ns, file))
                .map_err(|e| CorralError::Io { path, source: e })
        })
        .collect::<Result<Vec<_>>>()?;

    for (ns, file) in &handles {
        nix::sched::setns(file, ns.clone_flag()).map_err(|e| CorralError::Syscall {
            message: format!("setns {} of pid {pid} failed: {e}", ns.proc_name()),
        })?;
        tracing::debug!(pid, ns = ns.proc_name(), "joined namespace");
    }
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, namespace joining requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn join(_pid: i32, _namespaces: &[Namespace]) -> Result<()> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ns_path_uses_proc_names() {
        assert_eq!(ns_path(42, Namespace::Mount), PathBuf::from("/proc/42/ns/mnt"));
    }

    #[test]
    fn mount_namespace_is_joined_last() {
        assert_eq!(EXEC_NAMESPACES.last(), Some(&Namespace::Mount));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn missing_process_is_an_io_error() {
        let err = join(i32::MAX, &[Namespace::Uts]).unwrap_err();
        assert!(matches!(err, CorralError::Io { .. }));
    }
}
