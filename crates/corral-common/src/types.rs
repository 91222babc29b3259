//! Domain primitive types used across the corral workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::ID_LENGTH;
use crate::error::{CorralError, Result};

/// Checks that `value` names exactly one directory entry.
///
/// Ids and names are joined onto state paths, so separators, `.`/`..`
/// and NUL bytes are refused.
///
/// # Errors
///
/// Returns [`CorralError::Config`] naming `kind` if `value` is unusable.
pub fn validate_name(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\0']) {
        return Err(CorralError::Config {
            message: format!("invalid {kind} `{}`", value.escape_debug()),
        });
    }
    Ok(())
}

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wraps a user-supplied id after checking it names a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::Config`] for an empty id or one containing a
    /// path separator, `..` or a NUL byte.
    pub fn parse(id: &str) -> Result<Self> {
        validate_name("container id", id)?;
        Ok(Self(id.to_string()))
    }

    /// Generates a random decimal ID of [`ID_LENGTH`] digits.
    #[must_use]
    pub fn generate() -> Self {
        let modulus = 10u128.pow(u32::try_from(ID_LENGTH).unwrap_or(10));
        let value = uuid::Uuid::new_v4().as_u128() % modulus;
        Self(format!("{value:0width$}", width = ID_LENGTH))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContainerId {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status recorded for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The init process was started and has not been stopped.
    Running,
    /// `stop` signalled the init process.
    Stopped,
    /// The init process is gone without a `stop`.
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Resource limits requested for a container.
///
/// `None` and empty strings both mean "do not constrain". Values are passed
/// to the kernel verbatim (e.g. `100m`, `512`, `0-1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit, e.g. `100m`.
    pub memory_limit: Option<String>,
    /// Relative CPU share.
    pub cpu_share: Option<String>,
    /// CPUs the container may run on, e.g. `0-1` or `2,4`.
    pub cpu_set: Option<String>,
}

impl ResourceConfig {
    /// Memory limit if one is set.
    #[must_use]
    pub fn memory_limit(&self) -> Option<&str> {
        non_empty(self.memory_limit.as_deref())
    }

    /// CPU share if one is set.
    #[must_use]
    pub fn cpu_share(&self) -> Option<&str> {
        non_empty(self.cpu_share.as_deref())
    }

    /// CPU set if one is set.
    #[must_use]
    pub fn cpu_set(&self) -> Option<&str> {
        non_empty(self.cpu_set.as_deref())
    }

    /// Returns `true` when no limit is configured.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.memory_limit().is_none() && self.cpu_share().is_none() && self.cpu_set().is_none()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_that_escape_the_state_root_are_rejected() {
        for bad in ["", ".", "..", "../x", "a/b", "/abs", "nul\0byte"] {
            assert!(ContainerId::parse(bad).is_err(), "{bad:?} accepted");
        }
        assert_eq!(ContainerId::parse("0123456789").unwrap().as_str(), "0123456789");
        assert!("web..1".parse::<ContainerId>().is_ok());
    }

    #[test]
    fn generated_id_has_fixed_decimal_length() {
        for _ in 0..32 {
            let id = ContainerId::generate();
            assert_eq!(id.as_str().len(), ID_LENGTH);
            assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(ContainerId::generate(), ContainerId::generate());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerStatus::Exited).unwrap();
        assert_eq!(json, "\"exited\"");
        let back: ContainerStatus = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(back, ContainerStatus::Stopped);
    }

    #[test]
    fn empty_strings_are_unconstrained() {
        let res = ResourceConfig {
            memory_limit: Some(String::new()),
            cpu_share: Some("  ".into()),
            cpu_set: None,
        };
        assert!(res.is_unconstrained());
        assert_eq!(res.memory_limit(), None);
    }

    #[test]
    fn set_values_are_returned() {
        let res = ResourceConfig {
            memory_limit: Some("100m".into()),
            ..ResourceConfig::default()
        };
        assert_eq!(res.memory_limit(), Some("100m"));
        assert!(!res.is_unconstrained());
    }
}
