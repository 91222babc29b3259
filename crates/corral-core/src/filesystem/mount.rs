//! Mount utilities run inside the container's mount namespace.

use corral_common::error::{CorralError, Result};

/// Makes every mount under `/` private and recursive.
///
/// Mount and unmount events in the new namespace then stay out of the
/// host's namespace.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_mounts_private() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| CorralError::Syscall {
        message: format!("making / private failed: {e}"),
    })?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_mounts_private() -> Result<()> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Mounts a fresh `proc` at `/proc`.
///
/// # Errors
///
/// Returns an error if `/proc` cannot be created or mounted.
#[cfg(target_os = "linux")]
pub fn mount_proc() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    let target = std::path::Path::new("/proc");
    std::fs::create_dir_all(target).map_err(|e| CorralError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;
    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| CorralError::Syscall {
        message: format!("mounting /proc failed: {e}"),
    })?;
    tracing::debug!("proc mounted");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, mounting `proc` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_proc() -> Result<()> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}
