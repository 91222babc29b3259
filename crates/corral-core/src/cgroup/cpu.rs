//! CPU share controller.
//!
//! `cpu.shares` is a relative weight: a group with 1024 gets twice the CPU
//! time of a group with 512 under contention, and no cap when idle.

use corral_common::types::ResourceConfig;

use super::Subsystem;

/// Enforces the relative CPU weight through `cpu.shares`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuSubsystem;

impl Subsystem for CpuSubsystem {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn control_file(&self) -> &'static str {
        "cpu.shares"
    }

    fn limit<'a>(&self, res: &'a ResourceConfig) -> Option<&'a str> {
        res.cpu_share()
    }
}
