//! `corral exec`: Execute a command inside a running container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::engine::Engine;
use corral_runtime::exec::{ExecRequest, enter_and_run};

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container ID.
    pub container: Option<String>,

    /// Command to execute.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// When re-invoked by the runtime with the target in its environment, it
/// joins the container's namespaces and runs the command there; otherwise
/// it starts that re-invocation for the named container.
///
/// # Errors
///
/// Returns an error if the container is not running or namespace joining fails.
pub fn execute(engine: &Engine, args: &ExecArgs) -> anyhow::Result<()> {
    let code = if let Some(request) = ExecRequest::from_env()? {
        enter_and_run(&request)?
    } else {
        let Some(container) = &args.container else {
            anyhow::bail!("exec needs a container id and a command");
        };
        if args.command.is_empty() {
            anyhow::bail!("exec needs a command to run in {container}");
        }
        engine.exec(&ContainerId::parse(container)?, &args.command)?
    };
    std::process::exit(code);
}
