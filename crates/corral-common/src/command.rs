//! Invocation of host programs.
//!
//! `tar`, `mount`, `umount`, `ip` and `iptables` are treated as OS services.
//! Their argument strings are part of the on-host contract, so callers build
//! them explicitly and this module only runs them and reports failures.

use std::process::Command;

use crate::error::{CorralError, Result};

/// Runs `program` with `args` and waits for it to finish.
///
/// Returns the captured stdout on success.
///
/// # Errors
///
/// Returns [`CorralError::Command`] if the program cannot be spawned or
/// exits with a non-zero status.
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    tracing::debug!(cmd = %command_line(program, &args), "running host command");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| CorralError::Command {
            program: program.to_string(),
            message: format!("spawn failed: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CorralError::Command {
            program: program.to_string(),
            message: format!(
                "`{}` exited with {}: {}",
                command_line(program, &args),
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Renders a command line for logs and error messages.
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
