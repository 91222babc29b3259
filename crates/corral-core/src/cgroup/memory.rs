//! Memory controller.

use corral_common::types::ResourceConfig;

use super::Subsystem;

/// Enforces the memory limit through `memory.limit_in_bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySubsystem;

impl Subsystem for MemorySubsystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn control_file(&self) -> &'static str {
        "memory.limit_in_bytes"
    }

    fn limit<'a>(&self, res: &'a ResourceConfig) -> Option<&'a str> {
        res.memory_limit()
    }
}
