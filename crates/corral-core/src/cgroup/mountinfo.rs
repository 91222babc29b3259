//! Locating cgroup hierarchies on the host.
//!
//! A v1 controller is usable only where the kernel has mounted its
//! hierarchy. The mount point is discovered from `/proc/self/mountinfo`,
//! whose lines look like:
//!
//! ```text
//! 38 30 0:33 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec,relatime shared:19 - cgroup cgroup rw,memory
//! ```
//!
//! The last field lists the super options, including the controller name,
//! and field 4 is the mount point.

use std::path::{Path, PathBuf};

use corral_common::constants::MOUNTINFO_PATH;
use corral_common::error::{CorralError, Result};

/// Index of the mount point among the whitespace-separated fields.
const MOUNT_POINT_FIELD: usize = 4;

/// Finds the host directory where a controller hierarchy is mounted.
pub trait MountPointResolver: Send + Sync {
    /// Returns the hierarchy root for `subsystem` (e.g. `memory`).
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::NotFound`] if no hierarchy carries the
    /// subsystem, or an I/O error if the mount metadata cannot be read.
    fn resolve(&self, subsystem: &str) -> Result<PathBuf>;
}

impl<R: MountPointResolver + ?Sized> MountPointResolver for std::sync::Arc<R> {
    fn resolve(&self, subsystem: &str) -> Result<PathBuf> {
        (**self).resolve(subsystem)
    }
}

/// Resolver backed by live mount metadata.
#[derive(Debug, Clone)]
pub struct ProcMountInfo {
    path: PathBuf,
}

impl ProcMountInfo {
    /// Reads `/proc/self/mountinfo`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(MOUNTINFO_PATH)
    }

    /// Reads mount metadata from another file.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMountInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MountPointResolver for ProcMountInfo {
    fn resolve(&self, subsystem: &str) -> Result<PathBuf> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| CorralError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        find_mount_point(&content, subsystem).ok_or_else(|| CorralError::NotFound {
            kind: "cgroup hierarchy",
            id: subsystem.to_string(),
        })
    }
}

/// Resolver for hierarchies mounted at `<root>/<subsystem>`.
#[derive(Debug, Clone)]
pub struct FixedHierarchy {
    root: PathBuf,
}

impl FixedHierarchy {
    /// Creates a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of all hierarchies.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MountPointResolver for FixedHierarchy {
    fn resolve(&self, subsystem: &str) -> Result<PathBuf> {
        Ok(self.root.join(subsystem))
    }
}

/// Returns the mount point of the first line whose options name `subsystem`.
#[must_use]
pub fn find_mount_point(mountinfo: &str, subsystem: &str) -> Option<PathBuf> {
    mountinfo.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let options = fields.last()?;
        if options.split(',').any(|opt| opt == subsystem) {
            fields.get(MOUNT_POINT_FIELD).map(PathBuf::from)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
25 30 0:23 / /sys rw,nosuid,nodev,noexec,relatime shared:7 - sysfs sysfs rw
33 25 0:28 / /sys/fs/cgroup ro,nosuid,nodev,noexec shared:9 - tmpfs tmpfs ro,mode=755
36 33 0:31 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid,nodev,noexec,relatime shared:16 - cgroup cgroup rw,cpu,cpuacct
37 33 0:32 / /sys/fs/cgroup/cpuset rw,nosuid,nodev,noexec,relatime shared:17 - cgroup cgroup rw,cpuset
38 33 0:33 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec,relatime shared:18 - cgroup cgroup rw,memory
";

    #[test]
    fn finds_memory_hierarchy() {
        assert_eq!(
            find_mount_point(SAMPLE, "memory"),
            Some(PathBuf::from("/sys/fs/cgroup/memory"))
        );
    }

    #[test]
    fn cpu_does_not_match_cpuset() {
        assert_eq!(
            find_mount_point(SAMPLE, "cpu"),
            Some(PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"))
        );
        assert_eq!(
            find_mount_point(SAMPLE, "cpuset"),
            Some(PathBuf::from("/sys/fs/cgroup/cpuset"))
        );
    }

    #[test]
    fn unknown_subsystem_is_none() {
        assert_eq!(find_mount_point(SAMPLE, "pids"), None);
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(find_mount_point("", "memory"), None);
    }

    #[test]
    fn proc_resolver_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mountinfo");
        std::fs::write(&file, SAMPLE).unwrap();

        let resolver = ProcMountInfo::with_path(&file);
        assert_eq!(
            resolver.resolve("cpuset").unwrap(),
            PathBuf::from("/sys/fs/cgroup/cpuset")
        );
        assert!(resolver.resolve("pids").unwrap_err().is_not_found());
    }

    #[test]
    fn fixed_hierarchy_joins_name() {
        let resolver = FixedHierarchy::new("/cg");
        assert_eq!(resolver.resolve("memory").unwrap(), PathBuf::from("/cg/memory"));
    }
}
