//! Network lifecycle and container attachment.

use std::net::Ipv4Addr;

use corral_common::config::RuntimeConfig;
use corral_common::error::{CorralError, Result};
use corral_common::types::validate_name;
use ipnetwork::Ipv4Network;

use crate::bridge::BridgeDriver;
use crate::driver::NetworkDriver;
use crate::ipam::Ipam;
use crate::store::NetworkStore;
use crate::types::{Endpoint, Network};

/// Longest device name the kernel accepts.
const MAX_IFNAME_LEN: usize = 15;

/// Composes the network store, the allocator and the drivers.
pub struct NetworkManager {
    store: NetworkStore,
    ipam: Ipam,
    drivers: Vec<Box<dyn NetworkDriver>>,
}

impl NetworkManager {
    /// Creates a manager from explicit parts.
    #[must_use]
    pub fn new(store: NetworkStore, ipam: Ipam, drivers: Vec<Box<dyn NetworkDriver>>) -> Self {
        Self {
            store,
            ipam,
            drivers,
        }
    }

    /// Manager over the configured directories with the host bridge driver.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            NetworkStore::new(config.networks_dir()),
            Ipam::new(config.ipam_file()),
            vec![Box::new(BridgeDriver::host())],
        )
    }

    fn driver(&self, name: &str) -> Result<&dyn NetworkDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| &**d)
            .ok_or_else(|| CorralError::NotFound {
                kind: "network driver",
                id: name.to_string(),
            })
    }

    /// Creates network `name` on `subnet` (CIDR) with `driver`.
    ///
    /// The first address of the subnet becomes the gateway. If the driver
    /// fails, the gateway is released again.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicate or invalid name, an unparsable
    /// subnet, an unknown driver, or any allocation or driver failure.
    pub fn create_network(&self, driver: &str, subnet: &str, name: &str) -> Result<Network> {
        validate_name("network name", name)?;
        if name.len() > MAX_IFNAME_LEN {
            return Err(CorralError::Config {
                message: format!("network name `{name}` must be 1 to {MAX_IFNAME_LEN} characters"),
            });
        }
        if self.store.contains(name) {
            return Err(CorralError::Config {
                message: format!("network `{name}` already exists"),
            });
        }
        let driver = self.driver(driver)?;
        let subnet: Ipv4Network = subnet.parse().map_err(|e| CorralError::Config {
            message: format!("invalid subnet `{subnet}`: {e}"),
        })?;

        let gateway = self.ipam.allocate(&subnet)?;
        let ip_range = Ipv4Network::new(gateway, subnet.prefix()).map_err(|e| CorralError::Config {
            message: format!("invalid gateway {gateway}: {e}"),
        })?;
        let network = match driver.create(ip_range, name) {
            Ok(network) => network,
            Err(e) => {
                if let Err(release) = self.ipam.release(&subnet, gateway) {
                    tracing::warn!(network = name, error = %release, "gateway release failed");
                }
                return Err(e);
            }
        };
        self.store.save(&network)?;
        tracing::info!(network = name, ip_range = %network.ip_range, "network created");
        Ok(network)
    }

    /// All recorded networks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn list(&self) -> Result<Vec<Network>> {
        self.store.list()
    }

    /// Removes network `name`: driver teardown, gateway release, record.
    ///
    /// Every step is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::NotFound`] for an unknown network, otherwise
    /// all step failures combined.
    pub fn remove_network(&self, name: &str) -> Result<()> {
        let network = self.store.load(name)?;
        let mut errors = Vec::new();
        if let Err(e) = self
            .driver(&network.driver)
            .and_then(|driver| driver.delete(&network))
        {
            errors.push(e);
        }
        if let Err(e) = self.ipam.release(&network.subnet(), network.gateway()) {
            errors.push(e);
        }
        if let Err(e) = self.store.remove(name) {
            errors.push(e);
        }
        CorralError::from_collected(errors)?;
        tracing::info!(network = name, "network removed");
        Ok(())
    }

    /// Allocates an address on `network` and wires container `pid` to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the network is unknown, the subnet is exhausted
    /// or wiring fails. The address is released again on wiring failure.
    pub fn connect(
        &self,
        network: &str,
        container_id: &str,
        pid: i32,
        port_mapping: Vec<String>,
    ) -> Result<Endpoint> {
        let network = self.store.load(network)?;
        let driver = self.driver(&network.driver)?;
        let ip = self.ipam.allocate(&network.subnet())?;
        let endpoint = Endpoint::new(container_id, &network.name, ip, port_mapping);

        if let Err(e) = driver.connect(&network, &endpoint, pid) {
            if let Err(release) = self.ipam.release(&network.subnet(), ip) {
                tracing::warn!(ip = %ip, error = %release, "address release failed");
            }
            return Err(e);
        }
        tracing::info!(network = %network.name, container = container_id, ip = %ip, "container connected");
        Ok(endpoint)
    }

    /// Detaches container `container_id` from `network` and frees `ip`.
    ///
    /// # Errors
    ///
    /// Returns all failures combined.
    pub fn disconnect(&self, network: &str, container_id: &str, ip: Ipv4Addr) -> Result<()> {
        let network = self.store.load(network)?;
        let endpoint = Endpoint::new(container_id, &network.name, ip, Vec::new());
        let mut errors = Vec::new();
        if let Err(e) = self
            .driver(&network.driver)
            .and_then(|driver| driver.disconnect(&network, &endpoint))
        {
            errors.push(e);
        }
        if let Err(e) = self.ipam.release(&network.subnet(), ip) {
            errors.push(e);
        }
        CorralError::from_collected(errors)
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("store", &self.store)
            .field("ipam", &self.ipam)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::bridge::tests::{Recorder, driver};

    fn manager(dir: &Path, rec: &Recorder) -> NetworkManager {
        NetworkManager::new(
            NetworkStore::new(dir.join("networks")),
            Ipam::new(dir.join("ipam/subnet.json")),
            vec![Box::new(driver(rec))],
        )
    }

    #[test]
    fn create_assigns_first_address_as_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let mgr = manager(dir.path(), &rec);

        let network = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();
        assert_eq!(network.gateway(), Ipv4Addr::new(192, 168, 10, 1));
        assert_eq!(mgr.list().unwrap(), vec![network]);
    }

    #[test]
    fn duplicate_and_invalid_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let mgr = manager(dir.path(), &rec);
        let _ = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();

        assert!(mgr.create_network("bridge", "192.168.11.0/24", "br0").is_err());
        assert!(mgr.create_network("bridge", "not-a-cidr", "br1").is_err());
        assert!(mgr.create_network("bridge", "192.168.12.0/24", "a-very-long-bridge-name").is_err());
        assert!(mgr.create_network("macvlan", "192.168.13.0/24", "br2").unwrap_err().is_not_found());
        assert!(matches!(
            mgr.create_network("bridge", "192.168.14.0/24", "../br3"),
            Err(CorralError::Config { .. })
        ));
        assert!(rec.calls().iter().all(|c| !c.contains("br3")));
    }

    #[test]
    fn connect_allocates_after_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let mgr = manager(dir.path(), &rec);
        let _ = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();

        let ep = mgr
            .connect("br0", "0123456789", 99, vec!["8080:80".into()])
            .unwrap();
        assert_eq!(ep.ip, Ipv4Addr::new(192, 168, 10, 2));
        assert_eq!(ep.port_mapping, vec!["8080:80"]);
        assert!(rec.calls().contains(&"netns cif-01234 99".to_string()));
    }

    #[test]
    fn disconnect_frees_address() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let mgr = manager(dir.path(), &rec);
        let _ = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();
        let ep = mgr.connect("br0", "0123456789", 99, vec![]).unwrap();

        mgr.disconnect("br0", "0123456789", ep.ip).unwrap();
        let again = mgr.connect("br0", "5555555555", 100, vec![]).unwrap();
        assert_eq!(again.ip, ep.ip);
    }

    #[test]
    fn remove_network_releases_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let mgr = manager(dir.path(), &rec);
        let _ = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();

        mgr.remove_network("br0").unwrap();
        assert!(mgr.list().unwrap().is_empty());
        assert!(mgr.remove_network("br0").unwrap_err().is_not_found());

        let recreated = mgr.create_network("bridge", "192.168.10.0/24", "br0").unwrap();
        assert_eq!(recreated.gateway(), Ipv4Addr::new(192, 168, 10, 1));
    }

    #[test]
    fn connect_to_unknown_network_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let err = manager(dir.path(), &rec)
            .connect("nope", "0123456789", 1, vec![])
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
