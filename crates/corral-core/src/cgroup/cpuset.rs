//! CPU set controller.
//!
//! A new cpuset group starts with empty `cpuset.cpus` and `cpuset.mems`,
//! and the kernel refuses tasks until both are filled. The memory nodes are
//! copied from the parent group when the child has none.

use std::path::Path;

use corral_common::error::{CorralError, Result};
use corral_common::types::ResourceConfig;

use super::Subsystem;

const MEMS_FILE: &str = "cpuset.mems";

/// Pins the container to CPUs through `cpuset.cpus`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpusetSubsystem;

impl Subsystem for CpusetSubsystem {
    fn name(&self) -> &'static str {
        "cpuset"
    }

    fn control_file(&self) -> &'static str {
        "cpuset.cpus"
    }

    fn limit<'a>(&self, res: &'a ResourceConfig) -> Option<&'a str> {
        res.cpu_set()
    }

    fn prepare_group(&self, group_dir: &Path) -> Result<()> {
        let Some(parent) = group_dir.parent() else {
            return Ok(());
        };
        let own = group_dir.join(MEMS_FILE);
        if !read_trimmed(&own).is_empty() {
            return Ok(());
        }
        let inherited = read_trimmed(&parent.join(MEMS_FILE));
        if inherited.is_empty() {
            return Ok(());
        }
        std::fs::write(&own, &inherited).map_err(|e| CorralError::Io {
            path: own.clone(),
            source: e,
        })?;
        tracing::debug!(mems = %inherited, "cpuset memory nodes inherited");
        Ok(())
    }
}

fn read_trimmed(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
