//! Bind-mounted volume specs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use corral_common::error::{CorralError, Result};

/// A `hostPath:containerPath` volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    host: PathBuf,
    container: PathBuf,
}

impl VolumeSpec {
    /// Parses a `host:container` spec.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::Config`] unless the spec is exactly two
    /// non-empty colon-separated segments.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [host, container] if !host.is_empty() && !container.is_empty() => Ok(Self {
                host: PathBuf::from(host),
                container: PathBuf::from(container),
            }),
            _ => Err(CorralError::Config {
                message: format!("invalid volume spec `{spec}`, expected host:container"),
            }),
        }
    }

    /// Directory on the host.
    #[must_use]
    pub fn host(&self) -> &Path {
        &self.host
    }

    /// Directory as seen from inside the container.
    #[must_use]
    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Location of the container side under a merged root.
    #[must_use]
    pub fn target_in(&self, merged: &Path) -> PathBuf {
        let relative = self
            .container
            .strip_prefix("/")
            .unwrap_or(self.container.as_path());
        merged.join(relative)
    }
}

impl FromStr for VolumeSpec {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VolumeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.display(), self.container.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_container() {
        let spec = VolumeSpec::parse("/host:/container").unwrap();
        assert_eq!(spec.host(), Path::new("/host"));
        assert_eq!(spec.container(), Path::new("/container"));
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in ["badspec", "/only/host", ":/container", "/host:", "/a:/b:/c", ""] {
            assert!(VolumeSpec::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn target_stays_under_merged() {
        let spec: VolumeSpec = "/data:/mnt/data".parse().unwrap();
        assert_eq!(
            spec.target_in(Path::new("/ws/merged")),
            PathBuf::from("/ws/merged/mnt/data")
        );
    }

    #[test]
    fn display_round_trips() {
        let spec = VolumeSpec::parse("/h:/c").unwrap();
        assert_eq!(spec.to_string(), "/h:/c");
    }
}
