//! NAT rules through `iptables(8)`.

use corral_common::command;
use corral_common::error::Result;
use ipnetwork::Ipv4Network;

/// Masquerading of a bridge subnet.
pub trait Firewall: Send + Sync {
    /// Installs the masquerade rule for `subnet` behind `bridge` unless it
    /// is already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot be installed.
    fn ensure_masquerade(&self, subnet: &Ipv4Network, bridge: &str) -> Result<()>;

    /// Removes the masquerade rule if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing rule cannot be removed.
    fn remove_masquerade(&self, subnet: &Ipv4Network, bridge: &str) -> Result<()>;
}

/// [`Firewall`] running the host `iptables` program.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iptables;

impl Iptables {
    /// Arguments of the rule for `action` (`-A`, `-C` or `-D`):
    /// `-t nat <action> POSTROUTING -s <subnet> ! -o <bridge> -j MASQUERADE`.
    #[must_use]
    pub fn masquerade_args(action: &str, subnet: &Ipv4Network, bridge: &str) -> Vec<String> {
        [
            "-t",
            "nat",
            action,
            "POSTROUTING",
            "-s",
            &subnet.to_string(),
            "!",
            "-o",
            bridge,
            "-j",
            "MASQUERADE",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn rule_exists(subnet: &Ipv4Network, bridge: &str) -> bool {
        command::run("iptables", &Self::masquerade_args("-C", subnet, bridge)).is_ok()
    }
}

impl Firewall for Iptables {
    fn ensure_masquerade(&self, subnet: &Ipv4Network, bridge: &str) -> Result<()> {
        if Self::rule_exists(subnet, bridge) {
            tracing::debug!(subnet = %subnet, bridge, "masquerade rule already present");
            return Ok(());
        }
        let _ = command::run("iptables", &Self::masquerade_args("-A", subnet, bridge))?;
        tracing::info!(subnet = %subnet, bridge, "masquerade rule installed");
        Ok(())
    }

    fn remove_masquerade(&self, subnet: &Ipv4Network, bridge: &str) -> Result<()> {
        if !Self::rule_exists(subnet, bridge) {
            return Ok(());
        }
        let _ = command::run("iptables", &Self::masquerade_args("-D", subnet, bridge))?;
        tracing::info!(subnet = %subnet, bridge, "masquerade rule removed");
        Ok(())
    }
}
