//! `corral logs`: Print the output of a detached container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::engine::Engine;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
pub fn execute(engine: &Engine, args: &LogsArgs) -> anyhow::Result<()> {
    let logs = engine.logs(&ContainerId::parse(&args.container)?)?;
    print!("{logs}");
    Ok(())
}
