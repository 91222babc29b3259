//! CLI command definitions and dispatch.

pub mod commit;
pub mod exec;
pub mod init;
pub mod logs;
pub mod network;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use corral_common::config::RuntimeConfig;
use corral_runtime::engine::Engine;

/// corral: minimal daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "corral", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Keep all state, workspaces, images and networks under this directory.
    #[arg(long, global = true, env = "CORRAL_ROOT")]
    pub root: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> RuntimeConfig {
        self.root
            .as_deref()
            .map_or_else(RuntimeConfig::default, RuntimeConfig::rooted_at)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start a container.
    Run(run::RunArgs),
    /// Container init process; invoked by the runtime, not by users.
    #[command(hide = true)]
    Init,
    /// Execute a command inside a running container.
    Exec(exec::ExecArgs),
    /// Archive a container's filesystem as an image.
    Commit(commit::CommitArgs),
    /// List containers.
    Ps,
    /// Print the output of a detached container.
    Logs(logs::LogsArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a stopped container.
    Rm(rm::RmArgs),
    /// Manage container networks.
    #[command(subcommand)]
    Network(network::NetworkCommand),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let engine = Engine::new(cli.config());
    match cli.command {
        Command::Run(args) => run::execute(&engine, args),
        Command::Init => init::execute(),
        Command::Exec(args) => exec::execute(&engine, &args),
        Command::Commit(args) => commit::execute(&engine, &args),
        Command::Ps => ps::execute(&engine),
        Command::Logs(args) => logs::execute(&engine, &args),
        Command::Stop(args) => stop::execute(&engine, &args),
        Command::Rm(args) => rm::execute(&engine, &args),
        Command::Network(cmd) => network::execute(&engine, cmd),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn root_flag_relocates_every_directory() {
        let cli = Cli::try_parse_from(["corral", "--root", "/tmp/c", "ps"]).unwrap();
        let config = cli.config();
        assert_eq!(config, RuntimeConfig::rooted_at(std::path::Path::new("/tmp/c")));
    }
}
