//! `corral commit`: Archive a container's filesystem as an image.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::engine::Engine;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Container ID.
    pub container: String,

    /// Name of the new image.
    pub image: String,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or archiving fails.
pub fn execute(engine: &Engine, args: &CommitArgs) -> anyhow::Result<()> {
    let archive = engine.commit(&ContainerId::parse(&args.container)?, &args.image)?;
    println!("{}", archive.display());
    Ok(())
}
