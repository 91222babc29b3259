//! `corral rm`: Remove a stopped container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::engine::Engine;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container is running, unknown, or teardown fails.
pub fn execute(engine: &Engine, args: &RmArgs) -> anyhow::Result<()> {
    engine.remove(&ContainerId::parse(&args.container)?)?;
    Ok(())
}
