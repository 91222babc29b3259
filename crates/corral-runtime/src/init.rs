//! PID 1 of a new container.
//!
//! `corral init` starts in fresh namespaces with the merged workspace as
//! its working directory and the command pipe on descriptor 3. It isolates
//! the mount tree, switches root, mounts `/proc`, reads the command and
//! replaces itself with it. Any failure is fatal: the caller exits
//! non-zero and the container never runs.

use std::io::Read;

use corral_common::error::{CorralError, Result};

/// Splits the received command into an argument vector.
///
/// # Errors
///
/// Returns an error if the command is empty or only whitespace.
pub fn parse_command(raw: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(CorralError::Config {
            message: "received an empty command".into(),
        });
    }
    Ok(argv)
}

/// Reads the whole command from `reader` until the writer closes it.
///
/// # Errors
///
/// Returns an error if reading fails or the command is empty.
pub fn read_command(mut reader: impl Read) -> Result<Vec<String>> {
    let mut raw = String::new();
    let _ = reader
        .read_to_string(&mut raw)
        .map_err(|e| CorralError::Io {
            path: "pipe".into(),
            source: e,
        })?;
    parse_command(&raw)
}

/// Runs the init sequence and execs the user command.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns the first failing step.
#[cfg(target_os = "linux")]
pub fn run_container_init() -> Result<()> {
    use std::ffi::CString;
    use std::os::fd::FromRawFd;
    use std::os::unix::ffi::OsStrExt;

    use corral_common::constants::INIT_PIPE_FD;
    use corral_core::filesystem::{mount, pivot_root};

    tracing::debug!("container init starting");
    mount::make_mounts_private()?;

    let root = std::env::current_dir().map_err(|e| CorralError::Io {
        path: ".".into(),
        source: e,
    })?;
    pivot_root::pivot_root(&root)?;
    mount::mount_proc()?;

    // SAFETY: descriptor 3 is the read end of the command pipe, placed
    // there by the launcher and owned by no one else in this process.
    let pipe = unsafe { std::fs::File::from_raw_fd(INIT_PIPE_FD) };
    let argv = read_command(pipe)?;

    let program = which::which(&argv[0]).map_err(|e| CorralError::NotFound {
        kind: "executable",
        id: format!("{}: {e}", argv[0]),
    })?;
    tracing::debug!(program = %program.display(), "exec user command");

    let path = CString::new(program.as_os_str().as_bytes()).map_err(|_| CorralError::Config {
        message: format!("{} contains a NUL byte", program.display()),
    })?;
    let args = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| CorralError::Config {
            message: "command contains a NUL byte".into(),
        })?;

    let Err(err) = nix::unistd::execv(&path, &args);
    Err(CorralError::Syscall {
        message: format!("exec {} failed: {err}", program.display()),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn run_container_init() -> Result<()> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}
