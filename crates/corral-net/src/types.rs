//! Network and endpoint records.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

/// Number of endpoint-id characters used in device names.
pub const DEVICE_ID_LEN: usize = 5;

/// Prefix of the container-side veth name.
pub const PEER_PREFIX: &str = "cif-";

/// A named network backed by one driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Network name, also the bridge device name.
    pub name: String,
    /// Gateway address with the subnet prefix, e.g. `192.168.10.1/24`.
    pub ip_range: Ipv4Network,
    /// Driver that created the network.
    pub driver: String,
}

impl Network {
    /// Gateway address assigned to the bridge.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.ip_range.ip()
    }

    /// The subnet in canonical form, e.g. `192.168.10.0/24`.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip_range.network(), self.ip_range.prefix()).unwrap_or(self.ip_range)
    }
}

/// Host and container ends of a veth pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethPair {
    /// End attached to the bridge.
    pub host: String,
    /// End moved into the container.
    pub peer: String,
}

impl VethPair {
    /// Device names derived from the first characters of `endpoint_id`.
    #[must_use]
    pub fn for_endpoint(endpoint_id: &str) -> Self {
        let short: String = endpoint_id.chars().take(DEVICE_ID_LEN).collect();
        Self {
            peer: format!("{PEER_PREFIX}{short}"),
            host: short,
        }
    }
}

/// A container's attachment to a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// `<container-id>-<network>`.
    pub id: String,
    /// Owning network name.
    pub network: String,
    /// Address allocated to the container.
    pub ip: Ipv4Addr,
    /// Veth device names.
    pub device: VethPair,
    /// Requested `host:container` port mappings.
    pub port_mapping: Vec<String>,
}

impl Endpoint {
    /// Builds the endpoint of `container_id` on `network`.
    #[must_use]
    pub fn new(container_id: &str, network: &str, ip: Ipv4Addr, port_mapping: Vec<String>) -> Self {
        let id = format!("{container_id}-{network}");
        Self {
            device: VethPair::for_endpoint(&id),
            id,
            network: network.to_string(),
            ip,
            port_mapping,
        }
    }
}
