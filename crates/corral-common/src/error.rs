//! Unified error type for the corral workspace.
//!
//! Every crate returns [`CorralError`]. Operations that deliberately keep
//! going after a failure (cgroup fan-out, workspace teardown) report all
//! collected failures at once through [`CorralError::Aggregate`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CorralError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or user-supplied argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A namespace, mount, signal, or process system call failed.
    #[error("system call failed: {message}")]
    Syscall {
        /// Description of the failed call, including the errno text.
        message: String,
    },

    /// A host program (`mount`, `tar`, `ip`, `iptables`, ...) failed.
    #[error("{program} failed: {message}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Exit status and captured stderr, or the spawn error.
        message: String,
    },

    /// No free address is left in a subnet.
    #[error("no free address left in subnet {subnet}")]
    Exhausted {
        /// Subnet in CIDR notation.
        subnet: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Several independent steps failed.
    #[error("{}", JoinedErrors(.0))]
    Aggregate(Vec<CorralError>),
}

impl CorralError {
    /// Collapses a list of collected failures into a single result.
    ///
    /// An empty list is success and a single failure is returned unwrapped.
    ///
    /// # Errors
    ///
    /// Returns the failure, or [`CorralError::Aggregate`] when there are several.
    pub fn from_collected(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }

    /// Returns `true` if this is a [`CorralError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

struct JoinedErrors<'a>(&'a [CorralError]);

impl fmt::Display for JoinedErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CorralError>;
