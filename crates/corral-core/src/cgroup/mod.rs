//! Cgroup resource management.
//!
//! Each controller (memory, CPU share, CPU set) implements [`Subsystem`].
//! A [`CgroupManager`] owns one group path and fans every operation out to
//! the controllers it was built with, collecting failures instead of
//! stopping at the first one: a host without a memory hierarchy still gets
//! its CPU limits applied.

pub mod cpu;
pub mod cpuset;
pub mod memory;
pub mod mountinfo;

use std::path::{Path, PathBuf};

use corral_common::constants::CGROUP_PREFIX;
use corral_common::error::{CorralError, Result};
use corral_common::types::{ContainerId, ResourceConfig};

pub use self::mountinfo::{FixedHierarchy, MountPointResolver, ProcMountInfo};

/// Membership file listing the tasks of a v1 group.
pub const TASKS_FILE: &str = "tasks";

/// A resource controller bound to one cgroup hierarchy.
///
/// Implementations are stateless and identified by [`Subsystem::name`].
/// The provided `set`/`apply`/`remove` methods do the filesystem work; an
/// implementation only describes its hierarchy, control file, and which
/// field of the [`ResourceConfig`] it enforces.
pub trait Subsystem: Send + Sync {
    /// Hierarchy name as it appears in mount options (e.g. `memory`).
    fn name(&self) -> &'static str;

    /// File receiving the limit value.
    fn control_file(&self) -> &'static str;

    /// The configured limit for this controller, if any.
    fn limit<'a>(&self, res: &'a ResourceConfig) -> Option<&'a str>;

    /// Hook run on a freshly resolved group directory before the limit is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the group cannot be prepared.
    fn prepare_group(&self, _group_dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Writes the configured limit, creating the group if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy cannot be resolved or the control
    /// file cannot be written.
    fn set(
        &self,
        resolver: &dyn MountPointResolver,
        cgroup_path: &str,
        res: &ResourceConfig,
    ) -> Result<()> {
        let Some(limit) = self.limit(res) else {
            return Ok(());
        };
        let dir = group_dir(resolver, self.name(), cgroup_path, true)?;
        self.prepare_group(&dir)?;
        let file = dir.join(self.control_file());
        write_value(&file, limit)?;
        tracing::info!(subsystem = self.name(), file = %file.display(), limit, "cgroup limit set");
        Ok(())
    }

    /// Adds `pid` to the group's task list.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy cannot be resolved or the task
    /// file cannot be written.
    fn apply(
        &self,
        resolver: &dyn MountPointResolver,
        cgroup_path: &str,
        pid: u32,
        res: &ResourceConfig,
    ) -> Result<()> {
        if self.limit(res).is_none() {
            return Ok(());
        }
        let dir = group_dir(resolver, self.name(), cgroup_path, false)?;
        write_value(&dir.join(TASKS_FILE), &pid.to_string())?;
        tracing::info!(subsystem = self.name(), group = %dir.display(), pid, "process added to cgroup");
        Ok(())
    }

    /// Deletes the group directory.
    ///
    /// A hierarchy that is not mounted, or a group that does not exist,
    /// has nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists and cannot be removed.
    fn remove(&self, resolver: &dyn MountPointResolver, cgroup_path: &str) -> Result<()> {
        let dir = match group_dir(resolver, self.name(), cgroup_path, false) {
            Ok(dir) => dir,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        remove_group(&dir)?;
        tracing::debug!(subsystem = self.name(), group = %dir.display(), "cgroup removed");
        Ok(())
    }
}

/// The memory, CPU share and CPU set controllers.
#[must_use]
pub fn default_subsystems() -> Vec<Box<dyn Subsystem>> {
    vec![
        Box::new(memory::MemorySubsystem),
        Box::new(cpu::CpuSubsystem),
        Box::new(cpuset::CpusetSubsystem),
    ]
}

/// Handle to one logical cgroup spread over several hierarchies.
pub struct CgroupManager {
    path: String,
    subsystems: Vec<Box<dyn Subsystem>>,
    resolver: Box<dyn MountPointResolver>,
}

impl CgroupManager {
    /// Creates a manager for `path` driving exactly `subsystems`.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        subsystems: Vec<Box<dyn Subsystem>>,
        resolver: Box<dyn MountPointResolver>,
    ) -> Self {
        Self {
            path: path.into(),
            subsystems,
            resolver,
        }
    }

    /// Creates the manager for a container's own group.
    ///
    /// Uses the default controllers and the live mount metadata.
    #[must_use]
    pub fn for_container(id: &ContainerId) -> Self {
        Self::for_container_in(id, Box::new(ProcMountInfo::new()))
    }

    /// Creates the manager for a container's own group with the default
    /// controllers, locating hierarchies through `resolver`.
    #[must_use]
    pub fn for_container_in(id: &ContainerId, resolver: Box<dyn MountPointResolver>) -> Self {
        Self::new(group_name(id), default_subsystems(), resolver)
    }

    /// Relative group path inside every hierarchy.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes the configured limits in every hierarchy.
    ///
    /// # Errors
    ///
    /// Returns every controller failure combined; controllers that
    /// succeeded keep their limits.
    pub fn set(&self, res: &ResourceConfig) -> Result<()> {
        self.fan_out("set", |s| s.set(self.resolver.as_ref(), &self.path, res))
    }

    /// Moves `pid` into the group in every constrained hierarchy.
    ///
    /// # Errors
    ///
    /// Returns every controller failure combined.
    pub fn apply(&self, pid: u32, res: &ResourceConfig) -> Result<()> {
        self.fan_out("apply", |s| {
            s.apply(self.resolver.as_ref(), &self.path, pid, res)
        })
    }

    /// Removes the group from every hierarchy.
    ///
    /// # Errors
    ///
    /// Returns every controller failure combined.
    pub fn destroy(&self) -> Result<()> {
        self.fan_out("destroy", |s| s.remove(self.resolver.as_ref(), &self.path))
    }

    fn fan_out(&self, op: &'static str, f: impl Fn(&dyn Subsystem) -> Result<()>) -> Result<()> {
        let mut errors = Vec::new();
        for subsystem in &self.subsystems {
            if let Err(e) = f(subsystem.as_ref()) {
                tracing::warn!(op, subsystem = subsystem.name(), group = %self.path, error = %e, "cgroup operation failed");
                errors.push(e);
            }
        }
        CorralError::from_collected(errors)
    }
}

impl std::fmt::Debug for CgroupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgroupManager")
            .field("path", &self.path)
            .field(
                "subsystems",
                &self.subsystems.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Group name of a container, unique per container id.
#[must_use]
pub fn group_name(id: &ContainerId) -> String {
    format!("{CGROUP_PREFIX}{id}")
}

fn group_dir(
    resolver: &dyn MountPointResolver,
    subsystem: &str,
    cgroup_path: &str,
    create: bool,
) -> Result<PathBuf> {
    let root = resolver.resolve(subsystem)?;
    let dir = root.join(cgroup_path.trim_start_matches('/'));
    if create && !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| CorralError::Io {
            path: dir.clone(),
            source: e,
        })?;
    }
    Ok(dir)
}

fn write_value(file: &Path, value: &str) -> Result<()> {
    std::fs::write(file, value).map_err(|e| CorralError::Io {
        path: file.to_path_buf(),
        source: e,
    })
}

/// Removes a group directory.
///
/// On a cgroup filesystem the control files cannot be unlinked and `rmdir`
/// alone removes the group; on a plain directory tree the contents go first.
fn remove_group(dir: &Path) -> Result<()> {
    match std::fs::remove_dir(dir) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(_) => {}
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CorralError::Io {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}
