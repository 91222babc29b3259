//! Persistence of network records, one JSON file per network.

use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};
use corral_common::types::validate_name;

use crate::types::Network;

/// Directory of `<name>.json` network records.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    dir: PathBuf,
}

impl NetworkStore {
    /// Creates a store over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name("network name", name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Returns `true` if `name` is recorded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|path| path.exists())
    }

    /// Writes the record of `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn save(&self, network: &Network) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CorralError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path(&network.name)?;
        let json = serde_json::to_string_pretty(network)?;
        std::fs::write(&path, json).map_err(|e| CorralError::Io { path, source: e })
    }

    /// Reads the record of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::NotFound`] if no such network is recorded, or
    /// a config error for a name that is not a single path component.
    pub fn load(&self, name: &str) -> Result<Network> {
        read_record(&self.path(name)?).map_err(|e| match e {
            CorralError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                CorralError::NotFound {
                    kind: "network",
                    id: name.to_string(),
                }
            }
            other => other,
        })
    }

    /// Every readable record, sorted by name. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn list(&self) -> Result<Vec<Network>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CorralError::Io {
                    path: self.dir.clone(),
                    source: e,
                });
            }
        };

        let mut networks: Vec<Network> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                read_record(&path)
                    .inspect_err(|e| tracing::warn!(path = %path.display(), error = %e, "skipping network record"))
                    .ok()
            })
            .collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    /// Deletes the record of `name`; a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(CorralError::Io { path, source: e })
            }
            _ => Ok(()),
        }
    }
}

fn read_record(path: &Path) -> Result<Network> {
    let content = std::fs::read_to_string(path).map_err(|e| CorralError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}
