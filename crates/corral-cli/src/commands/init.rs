//! `corral init`: PID 1 inside a new container.

/// Executes the `init` command.
///
/// Only returns if the container could not be started.
///
/// # Errors
///
/// Returns the failing init step.
pub fn execute() -> anyhow::Result<()> {
    if let Err(e) = corral_runtime::init::run_container_init() {
        tracing::error!(error = %e, "container init failed");
        return Err(e.into());
    }
    Ok(())
}
