//! Linux bridge driver.
//!
//! A network is a bridge device named after the network, holding the
//! gateway address, plus one masquerade rule for its subnet. Containers
//! join through a veth pair whose host end is enslaved to the bridge.

use corral_common::constants::BRIDGE_DRIVER;
use corral_common::error::{CorralError, Result};
use ipnetwork::Ipv4Network;

use crate::driver::NetworkDriver;
use crate::linux::{Firewall, IpRoute, Iptables, LinkManager};
use crate::types::{Endpoint, Network};

/// Bridge driver over pluggable link and firewall backends.
pub struct BridgeDriver {
    links: Box<dyn LinkManager>,
    firewall: Box<dyn Firewall>,
}

impl BridgeDriver {
    /// Creates a driver from explicit backends.
    #[must_use]
    pub fn new(links: Box<dyn LinkManager>, firewall: Box<dyn Firewall>) -> Self {
        Self { links, firewall }
    }

    /// Driver using `ip` and `iptables` on the host.
    #[must_use]
    pub fn host() -> Self {
        Self::new(Box::new(IpRoute), Box::new(Iptables))
    }

    fn init_bridge(&self, network: &Network) -> Result<()> {
        let name = network.name.as_str();
        if self.links.exists(name)? {
            tracing::info!(bridge = name, "bridge already exists");
        } else {
            self.links.create_bridge(name)?;
        }
        self.links.add_address(name, &network.ip_range)?;
        self.links.set_up(name)?;
        self.firewall.ensure_masquerade(&network.subnet(), name)?;
        Ok(())
    }
}

impl std::fmt::Debug for BridgeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDriver").finish_non_exhaustive()
    }
}

impl NetworkDriver for BridgeDriver {
    fn name(&self) -> &'static str {
        BRIDGE_DRIVER
    }

    fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network> {
        let network = Network {
            name: name.to_string(),
            ip_range,
            driver: self.name().to_string(),
        };
        self.init_bridge(&network).inspect_err(|e| {
            tracing::error!(bridge = name, error = %e, "bridge initialization failed");
        })?;
        Ok(network)
    }

    fn delete(&self, network: &Network) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.firewall.remove_masquerade(&network.subnet(), &network.name) {
            errors.push(e);
        }
        if let Err(e) = self.links.delete(&network.name) {
            errors.push(e);
        }
        CorralError::from_collected(errors)
    }

    fn connect(&self, network: &Network, endpoint: &Endpoint, pid: i32) -> Result<()> {
        if !self.links.exists(&network.name)? {
            return Err(CorralError::NotFound {
                kind: "bridge",
                id: network.name.clone(),
            });
        }
        self.links.create_veth(&endpoint.device, &network.name)?;
        self.links.move_to_netns(&endpoint.device.peer, pid)?;

        let addr = Ipv4Network::new(endpoint.ip, network.ip_range.prefix()).map_err(|e| {
            CorralError::Config {
                message: format!("invalid endpoint address {}: {e}", endpoint.ip),
            }
        })?;
        self.links
            .configure_in_netns(pid, &endpoint.device.peer, &addr, network.gateway())
    }

    fn disconnect(&self, _network: &Network, endpoint: &Endpoint) -> Result<()> {
        // the pair disappears with the container's namespace
        if self.links.exists(&endpoint.device.host)? {
            self.links.delete(&endpoint.device.host)?;
        }
        Ok(())
    }
}
