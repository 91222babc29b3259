//! Root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`.

use std::path::Path;

use corral_common::error::{CorralError, Result};

/// Directory under the new root that briefly holds the old one.
pub const PUT_OLD: &str = ".pivot_root";

/// Makes `new_root` the process root and discards the old root.
///
/// `new_root` is first bind-mounted onto itself, since `pivot_root(2)`
/// requires the new root to be a mount point on a different filesystem
/// from the current root. The old root lands in [`PUT_OLD`], is lazily
/// unmounted, and the directory is removed.
///
/// # Errors
///
/// Returns an error if any step fails. A failure after the pivot leaves
/// the process in a half-switched root and must be treated as fatal.
#[cfg(target_os = "linux")]
pub fn pivot_root(new_root: &Path) -> Result<()> {
    use nix::mount::{MntFlags, MsFlags, mount, umount2};

    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| CorralError::Syscall {
        message: format!("bind mount of {} failed: {e}", new_root.display()),
    })?;

    let put_old = new_root.join(PUT_OLD);
    std::fs::create_dir_all(&put_old).map_err(|e| CorralError::Io {
        path: put_old.clone(),
        source: e,
    })?;

    nix::unistd::pivot_root(new_root, &put_old).map_err(|e| CorralError::Syscall {
        message: format!("pivot_root to {} failed: {e}", new_root.display()),
    })?;
    nix::unistd::chdir("/").map_err(|e| CorralError::Syscall {
        message: format!("chdir to new root failed: {e}"),
    })?;

    let old_root = Path::new("/").join(PUT_OLD);
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|e| CorralError::Syscall {
        message: format!("detaching old root failed: {e}"),
    })?;
    std::fs::remove_dir(&old_root).map_err(|e| CorralError::Io {
        path: old_root.clone(),
        source: e,
    })?;

    tracing::info!(new_root = %new_root.display(), "root switched");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, `pivot_root` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn pivot_root(_new_root: &Path) -> Result<()> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}
