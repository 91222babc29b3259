//! `corral stop`: Stop a running container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::engine::Engine;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or cannot be signalled.
pub fn execute(engine: &Engine, args: &StopArgs) -> anyhow::Result<()> {
    engine.stop(&ContainerId::parse(&args.container)?)?;
    Ok(())
}
