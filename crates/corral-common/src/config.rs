//! Runtime configuration model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;

/// Filesystem locations used by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// One sub-directory per container with its metadata and log.
    pub state_dir: PathBuf,
    /// Per-container `lower`/`upper`/`work`/`merged` trees.
    pub workspace_dir: PathBuf,
    /// Image archives, looked up as `<image_dir>/<name>.tar`.
    pub image_dir: PathBuf,
    /// Network configs and the IPAM allocation table.
    pub network_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(constants::DEFAULT_STATE_DIR),
            workspace_dir: PathBuf::from(constants::DEFAULT_WORKSPACE_DIR),
            image_dir: PathBuf::from(constants::DEFAULT_IMAGE_DIR),
            network_dir: PathBuf::from(constants::DEFAULT_NETWORK_DIR),
        }
    }
}

impl RuntimeConfig {
    /// Places every runtime directory under a single root.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            state_dir: root.join("containers"),
            workspace_dir: root.join("overlay"),
            image_dir: root.join("images"),
            network_dir: root.join("network"),
        }
    }

    /// Path of the archive for `image`.
    #[must_use]
    pub fn image_archive(&self, image: &str) -> PathBuf {
        self.image_dir.join(format!("{image}.tar"))
    }

    /// Path of the IPAM allocation table.
    #[must_use]
    pub fn ipam_file(&self) -> PathBuf {
        self.network_dir.join(constants::IPAM_FILE)
    }

    /// Directory holding one JSON file per network.
    #[must_use]
    pub fn networks_dir(&self) -> PathBuf {
        self.network_dir.join(constants::NETWORKS_SUBDIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_system_paths() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.state_dir, PathBuf::from("/var/run/corral"));
        assert_eq!(
            cfg.ipam_file(),
            PathBuf::from("/var/run/corral/network/ipam/subnet.json")
        );
    }

    #[test]
    fn rooted_at_keeps_everything_under_root() {
        let cfg = RuntimeConfig::rooted_at(Path::new("/tmp/x"));
        for dir in [
            &cfg.state_dir,
            &cfg.workspace_dir,
            &cfg.image_dir,
            &cfg.network_dir,
        ] {
            assert!(dir.starts_with("/tmp/x"));
        }
        assert_eq!(
            cfg.image_archive("busybox"),
            PathBuf::from("/tmp/x/images/busybox.tar")
        );
    }
}
