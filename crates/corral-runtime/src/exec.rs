//! Running a command inside a running container.
//!
//! The runtime re-invokes itself as `corral exec` with the target PID and
//! command in the `corral_pid` / `corral_cmd` environment variables and the
//! container's environment appended. That child notices the variables,
//! joins the container's namespaces while still single-threaded, and runs
//! the command there.

use std::process::Command;

use corral_common::constants::{ENV_EXEC_CMD, ENV_EXEC_PID};
use corral_common::error::{CorralError, Result};
use corral_common::types::ContainerId;

use crate::process::SELF_EXE;
use crate::state::ContainerStore;

/// Hidden verb of the namespace-joining child.
pub const EXEC_VERB: &str = "exec";

/// Target of a namespace-joining child, read from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Host PID whose namespaces are joined.
    pub pid: i32,
    /// Space-joined command.
    pub command: String,
}

impl ExecRequest {
    /// Returns the request if this process was started as the exec child.
    ///
    /// # Errors
    ///
    /// Returns an error if the variables are present but malformed.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_vars(
            std::env::var(ENV_EXEC_PID).ok().as_deref(),
            std::env::var(ENV_EXEC_CMD).ok().as_deref(),
        )
    }

    fn from_vars(pid: Option<&str>, command: Option<&str>) -> Result<Option<Self>> {
        let (Some(pid), Some(command)) = (pid, command) else {
            return Ok(None);
        };
        let pid = pid.trim().parse().map_err(|_| CorralError::Config {
            message: format!("invalid {ENV_EXEC_PID} `{pid}`"),
        })?;
        Ok(Some(Self {
            pid,
            command: command.to_string(),
        }))
    }
}

/// Runs `command` in the namespaces of the running container `id`.
///
/// Blocks until the command finishes and returns its exit code.
///
/// # Errors
///
/// Returns an error if the container is unknown or not running, or the
/// child cannot be spawned.
pub fn exec_in_container(store: &ContainerStore, id: &ContainerId, command: &[String]) -> Result<i32> {
    if command.is_empty() {
        return Err(CorralError::Config {
            message: "exec command is empty".into(),
        });
    }
    let info = store.read(id)?;
    let pid = info.pid.filter(|_| info.is_running()).ok_or_else(|| CorralError::Config {
        message: format!("container {id} is not running"),
    })?;
    let joined = command.join(" ");
    tracing::info!(id = %id, pid, command = %joined, "exec into container");

    let status = Command::new(SELF_EXE)
        .arg(EXEC_VERB)
        .env(ENV_EXEC_PID, pid.to_string())
        .env(ENV_EXEC_CMD, &joined)
        .envs(process_env(pid)?)
        .status()
        .map_err(|e| CorralError::Io {
            path: SELF_EXE.into(),
            source: e,
        })?;
    Ok(status.code().unwrap_or(1))
}

/// Environment of process `pid` as key/value pairs.
///
/// # Errors
///
/// Returns an error if `/proc/<pid>/environ` cannot be read.
pub fn process_env(pid: i32) -> Result<Vec<(String, String)>> {
    let path = std::path::PathBuf::from(format!("/proc/{pid}/environ"));
    let raw = std::fs::read(&path).map_err(|e| CorralError::Io { path, source: e })?;
    Ok(parse_environ(&raw))
}

fn parse_environ(raw: &[u8]) -> Vec<(String, String)> {
    raw.split(|&b| b == 0)
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (key, value) = entry.split_once('=')?;
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Child side: joins the namespaces of `request.pid` and runs the command.
///
/// Must run before any other thread exists; joining a mount namespace
/// fails in a multi-threaded process.
///
/// # Errors
///
/// Returns an error if the namespaces cannot be joined or the command
/// cannot be spawned.
#[cfg(target_os = "linux")]
pub fn enter_and_run(request: &ExecRequest) -> Result<i32> {
    use corral_core::namespace::join::{EXEC_NAMESPACES, join};

    let argv = crate::init::parse_command(&request.command)?;
    join(request.pid, &EXEC_NAMESPACES)?;

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .map_err(|e| CorralError::Io {
            path: argv[0].clone().into(),
            source: e,
        })?;
    Ok(status.code().unwrap_or(1))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn enter_and_run(_request: &ExecRequest) -> Result<i32> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}
