//! Network driver abstraction.

use corral_common::error::Result;
use ipnetwork::Ipv4Network;

use crate::types::{Endpoint, Network};

/// A way of realizing networks and attaching containers to them.
pub trait NetworkDriver: Send + Sync {
    /// Driver name stored in network records (e.g. `bridge`).
    fn name(&self) -> &'static str;

    /// Sets up network `name`; `ip_range` carries the gateway address
    /// and the subnet prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if any host resource cannot be set up.
    fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network>;

    /// Tears down the host resources of `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be removed.
    fn delete(&self, network: &Network) -> Result<()>;

    /// Attaches `endpoint` to `network` and wires it into the network
    /// namespace of the container process `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the network is missing or wiring fails.
    fn connect(&self, network: &Network, endpoint: &Endpoint, pid: i32) -> Result<()>;

    /// Detaches `endpoint` from `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint's host device cannot be removed.
    fn disconnect(&self, network: &Network, endpoint: &Endpoint) -> Result<()>;
}
