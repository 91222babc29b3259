//! `corral run`: Create and start a container.

use clap::Args;
use corral_common::types::ResourceConfig;
use corral_runtime::engine::{Engine, RunOptions};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Attach the terminal and wait for the container to exit.
    #[arg(long = "it", conflicts_with = "detach")]
    pub tty: bool,

    /// Run in the background, capturing output to the container log.
    #[arg(long = "d")]
    pub detach: bool,

    /// Memory limit, e.g. `100m`.
    #[arg(long = "mem")]
    pub memory: Option<String>,

    /// Relative CPU share.
    #[arg(long = "cpushare")]
    pub cpu_share: Option<String>,

    /// CPUs the container may run on, e.g. `0-1`.
    #[arg(long = "cpuset")]
    pub cpu_set: Option<String>,

    /// Bind mount as `host:container`.
    #[arg(long = "v")]
    pub volume: Option<String>,

    /// Container name.
    #[arg(long)]
    pub name: Option<String>,

    /// Extra environment entries as `KEY=VALUE`.
    #[arg(long = "e")]
    pub env: Vec<String>,

    /// Network to attach the container to.
    #[arg(long)]
    pub net: Option<String>,

    /// Port mapping as `host:container`.
    #[arg(short = 'p')]
    pub ports: Vec<String>,

    /// Image name.
    pub image: String,

    /// Command to run.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn into_options(self) -> RunOptions {
        RunOptions {
            tty: self.tty,
            image: self.image,
            command: self.command,
            name: self.name,
            resources: ResourceConfig {
                memory_limit: self.memory,
                cpu_share: self.cpu_share,
                cpu_set: self.cpu_set,
            },
            volume: self.volume,
            env: self.env,
            network: self.net,
            ports: self.ports,
        }
    }
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the container cannot be started.
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<()> {
    let tty = args.tty;
    let id = engine.run(&args.into_options())?;
    if !tty {
        println!("{id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Command};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("corral").chain(args.iter().copied()))
    }

    #[test]
    fn flags_map_to_options() {
        let cli = parse(&[
            "run", "--d", "--mem", "100m", "--cpuset", "0", "--v", "/a:/b", "--name", "web",
            "--e", "A=1", "--e", "B=2", "--net", "br0", "-p", "80:80", "busybox", "sh", "-c", "top",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            unreachable!("parsed as run");
        };
        let opts = args.into_options();
        assert!(!opts.tty);
        assert_eq!(opts.image, "busybox");
        assert_eq!(opts.command, vec!["sh", "-c", "top"]);
        assert_eq!(opts.resources.memory_limit.as_deref(), Some("100m"));
        assert_eq!(opts.resources.cpu_share, None);
        assert_eq!(opts.env, vec!["A=1", "B=2"]);
        assert_eq!(opts.network.as_deref(), Some("br0"));
        assert_eq!(opts.ports, vec!["80:80"]);
    }

    #[test]
    fn it_and_d_conflict() {
        assert!(parse(&["run", "--it", "--d", "busybox", "sh"]).is_err());
    }

    #[test]
    fn command_is_required() {
        assert!(parse(&["run", "busybox"]).is_err());
    }
}
