//! Link management through `ip(8)`.

use std::net::Ipv4Addr;

use corral_common::command;
use corral_common::error::{CorralError, Result};
use corral_core::namespace::Namespace;
use ipnetwork::Ipv4Network;

use crate::types::VethPair;

/// Operations on network devices.
pub trait LinkManager: Send + Sync {
    /// Returns `true` if a device named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Creates a bridge device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be created.
    fn create_bridge(&self, name: &str) -> Result<()>;

    /// Assigns `addr` (address and prefix) to `name`. An address already
    /// present is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be assigned.
    fn add_address(&self, name: &str, addr: &Ipv4Network) -> Result<()>;

    /// Brings `name` up.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be brought up.
    fn set_up(&self, name: &str) -> Result<()>;

    /// Deletes `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be deleted.
    fn delete(&self, name: &str) -> Result<()>;

    /// Creates `pair`, enslaves its host end to `bridge` and brings it up.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    fn create_veth(&self, pair: &VethPair, bridge: &str) -> Result<()>;

    /// Moves `name` into the network namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be moved.
    fn move_to_netns(&self, name: &str, pid: i32) -> Result<()>;

    /// Inside the network namespace of `pid`: assigns `addr` to `name`,
    /// brings `name` and `lo` up and routes by default through `gateway`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be entered or any step fails.
    fn configure_in_netns(
        &self,
        pid: i32,
        name: &str,
        addr: &Ipv4Network,
        gateway: Ipv4Addr,
    ) -> Result<()>;
}

/// [`LinkManager`] running the host `ip` program.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpRoute;

impl IpRoute {
    fn ip(args: &[&str]) -> Result<()> {
        let _ = command::run("ip", args)?;
        Ok(())
    }
}

impl LinkManager for IpRoute {
    fn exists(&self, name: &str) -> Result<bool> {
        match command::run("ip", &["link", "show", name]) {
            Ok(_) => Ok(true),
            Err(CorralError::Command { ref message, .. }) if message.contains("does not exist") => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn create_bridge(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "add", name, "type", "bridge"])?;
        tracing::info!(bridge = name, "bridge created");
        Ok(())
    }

    fn add_address(&self, name: &str, addr: &Ipv4Network) -> Result<()> {
        let cidr = addr.to_string();
        match Self::ip(&["addr", "add", &cidr, "dev", name]) {
            Err(CorralError::Command { ref message, .. }) if message.contains("File exists") => {
                tracing::debug!(dev = name, addr = %cidr, "address already assigned");
                Ok(())
            }
            other => other,
        }
    }

    fn set_up(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "set", name, "up"])
    }

    fn delete(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "delete", name])?;
        tracing::info!(dev = name, "link deleted");
        Ok(())
    }

    fn create_veth(&self, pair: &VethPair, bridge: &str) -> Result<()> {
        Self::ip(&["link", "add", &pair.host, "type", "veth", "peer", "name", &pair.peer])?;
        Self::ip(&["link", "set", &pair.host, "master", bridge])?;
        Self::ip(&["link", "set", &pair.host, "up"])?;
        tracing::info!(host = %pair.host, peer = %pair.peer, bridge, "veth attached");
        Ok(())
    }

    fn move_to_netns(&self, name: &str, pid: i32) -> Result<()> {
        Self::ip(&["link", "set", name, "netns", &pid.to_string()])
    }

    fn configure_in_netns(
        &self,
        pid: i32,
        name: &str,
        addr: &Ipv4Network,
        gateway: Ipv4Addr,
    ) -> Result<()> {
        let cidr = addr.to_string();
        let gateway = gateway.to_string();
        // setns only moves the calling thread; a scratch thread keeps the
        // caller in the host namespace
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    corral_core::namespace::join::join(pid, &[Namespace::Net])?;
                    Self::ip(&["addr", "add", &cidr, "dev", name])?;
                    Self::ip(&["link", "set", name, "up"])?;
                    Self::ip(&["link", "set", "lo", "up"])?;
                    Self::ip(&["route", "add", "default", "via", &gateway])
                })
                .join()
                .map_err(|_| CorralError::Syscall {
                    message: format!("network setup thread for pid {pid} panicked"),
                })?
        })?;
        tracing::info!(pid, dev = name, addr = %cidr, "container interface configured");
        Ok(())
    }
}
