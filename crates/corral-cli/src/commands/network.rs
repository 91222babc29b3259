//! `corral network`: Manage container networks.

use clap::{Args, Subcommand};
use corral_common::constants::BRIDGE_DRIVER;
use corral_runtime::engine::Engine;

use crate::output;

/// Network subcommands.
#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Create a network.
    Create(CreateArgs),
    /// List networks.
    List,
    /// Remove a network.
    Remove(RemoveArgs),
}

/// Arguments for `network create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Network driver.
    #[arg(long, default_value = BRIDGE_DRIVER)]
    pub driver: String,

    /// Subnet in CIDR notation, e.g. `192.168.10.0/24`.
    #[arg(long)]
    pub subnet: String,

    /// Network name, also used as the bridge name.
    pub name: String,
}

/// Arguments for `network remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Network name.
    pub name: String,
}

/// Executes a `network` subcommand.
///
/// # Errors
///
/// Returns an error if the network operation fails.
pub fn execute(engine: &Engine, cmd: NetworkCommand) -> anyhow::Result<()> {
    let networks = engine.networks();
    match cmd {
        NetworkCommand::Create(args) => {
            let network = networks.create_network(&args.driver, &args.subnet, &args.name)?;
            println!("{}", network.name);
        }
        NetworkCommand::List => {
            let rows: Vec<Vec<String>> = networks
                .list()?
                .into_iter()
                .map(|n| vec![n.name, n.ip_range.to_string(), n.driver])
                .collect();
            print!("{}", output::table(&["NAME", "IPRANGE", "DRIVER"], &rows));
        }
        NetworkCommand::Remove(args) => networks.remove_network(&args.name)?,
    }
    Ok(())
}
