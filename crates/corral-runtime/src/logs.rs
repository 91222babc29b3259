//! Container log access.

use corral_common::error::{CorralError, Result};
use corral_common::types::ContainerId;

use crate::state::ContainerStore;

/// Reads the captured output of container `id`.
///
/// Returns an empty string for a container that has no log yet, such as
/// one run with a terminal.
///
/// # Errors
///
/// Returns [`CorralError::NotFound`] for an unknown container, or an error
/// if the log exists but cannot be read.
pub fn read_logs(store: &ContainerStore, id: &ContainerId) -> Result<String> {
    if !store.container_dir(id).exists() {
        return Err(CorralError::NotFound {
            kind: "container",
            id: id.to_string(),
        });
    }
    let path = store.log_path(id);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(&path).map_err(|e| CorralError::Io { path, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_container_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContainerStore::new(dir.path());
        let err = read_logs(&store, &ContainerId::new("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContainerStore::new(dir.path());
        let id = ContainerId::new("c1");
        let _ = store.create_dir(&id).unwrap();
        assert!(read_logs(&store, &id).unwrap().is_empty());
    }

    #[test]
    fn returns_captured_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContainerStore::new(dir.path());
        let id = ContainerId::new("c2");
        let _ = store.create_dir(&id).unwrap();
        std::fs::write(store.log_path(&id), "hi\n").unwrap();
        assert_eq!(read_logs(&store, &id).unwrap(), "hi\n");
    }
}
