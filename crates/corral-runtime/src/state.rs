//! On-disk container state.
//!
//! Each container owns `<state_dir>/<id>/` holding `config.json` and, for
//! detached runs, `container.log`. The directory's existence is what makes
//! a container exist.

use std::path::{Path, PathBuf};

use corral_common::constants::{CONFIG_NAME, LOG_FILE};
use corral_common::error::{CorralError, Result};
use corral_common::types::ContainerId;

use crate::container::ContainerInfo;

/// Container records under one state directory.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    state_dir: PathBuf,
}

impl ContainerStore {
    /// Creates a store over `state_dir`.
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Root of all container directories.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Directory of container `id`.
    #[must_use]
    pub fn container_dir(&self, id: &ContainerId) -> PathBuf {
        self.state_dir.join(id.as_str())
    }

    /// Log file of container `id`.
    #[must_use]
    pub fn log_path(&self, id: &ContainerId) -> PathBuf {
        self.container_dir(id).join(LOG_FILE)
    }

    fn config_path(&self, id: &ContainerId) -> PathBuf {
        self.container_dir(id).join(CONFIG_NAME)
    }

    /// Creates the directory of container `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create_dir(&self, id: &ContainerId) -> Result<PathBuf> {
        let dir = self.container_dir(id);
        std::fs::create_dir_all(&dir).map_err(|e| CorralError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(dir)
    }

    /// Records a new container, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or record cannot be written.
    pub fn record(&self, info: &ContainerInfo) -> Result<()> {
        let _ = self.create_dir(&info.id)?;
        self.write(info)?;
        tracing::info!(id = %info.id, name = %info.name, "container recorded");
        Ok(())
    }

    /// Overwrites the record of an existing container.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn write(&self, info: &ContainerInfo) -> Result<()> {
        let path = self.config_path(&info.id);
        let json = serde_json::to_string_pretty(info)?;
        std::fs::write(&path, json).map_err(|e| CorralError::Io { path, source: e })
    }

    /// Reads the record of container `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::NotFound`] if the container does not exist,
    /// or an error if its record cannot be read or parsed.
    pub fn read(&self, id: &ContainerId) -> Result<ContainerInfo> {
        let path = self.config_path(id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorralError::NotFound {
                    kind: "container",
                    id: id.to_string(),
                }
            } else {
                CorralError::Io { path, source: e }
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Deletes the directory of container `id`; a missing one is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists and cannot be removed.
    pub fn delete(&self, id: &ContainerId) -> Result<()> {
        let dir = self.container_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(CorralError::Io { path: dir, source: e })
            }
            _ => {
                tracing::debug!(id = %id, "container state deleted");
                Ok(())
            }
        }
    }

    /// Every container with a readable record, oldest first.
    ///
    /// Directories without a readable record are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory exists but cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerInfo>> {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CorralError::Io {
                    path: self.state_dir.clone(),
                    source: e,
                });
            }
        };

        let mut infos = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            if !entry.path().is_dir() {
                continue;
            }
            let id = ContainerId::new(entry.file_name().to_string_lossy());
            match self.read(&id) {
                Ok(info) => infos.push(info),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable container"),
            }
        }
        infos.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::types::ContainerStatus;

    fn info(id: &str) -> ContainerInfo {
        ContainerInfo::running(ContainerId::new(id), Some("web"), 100, &["top".into()])
    }

    #[test]
    fn record_read_write_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path());
        let mut info = info("0000000001");

        store.record(&info).unwrap();
        assert_eq!(store.read(&info.id).unwrap(), info);

        info.status = ContainerStatus::Stopped;
        info.pid = None;
        store.write(&info).unwrap();
        assert_eq!(store.read(&info.id).unwrap().status, ContainerStatus::Stopped);

        store.delete(&info.id).unwrap();
        assert!(!store.container_dir(&info.id).exists());
        assert!(store.read(&info.id).unwrap_err().is_not_found());
        store.delete(&info.id).unwrap();
    }

    #[test]
    fn list_skips_directories_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path());
        store.record(&info("0000000001")).unwrap();
        store.record(&info("0000000002")).unwrap();
        std::fs::create_dir(dir.path().join("stray")).unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();

        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["0000000001", "0000000002"]);
    }

    #[test]
    fn missing_state_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path().join("nothing"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn log_path_is_inside_container_dir() {
        let store = ContainerStore::new("/var/run/corral");
        assert_eq!(
            store.log_path(&ContainerId::new("abc")),
            PathBuf::from("/var/run/corral/abc/container.log")
        );
    }
}
