//! The persisted record of a container.

use std::net::Ipv4Addr;

use corral_common::constants::TIME_FORMAT;
use corral_common::types::{ContainerId, ContainerStatus};
use serde::{Deserialize, Serialize};

/// Everything recorded about a container in its `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// Host PID of the init process; cleared by `stop`.
    pub pid: Option<i32>,
    /// Container identifier.
    pub id: ContainerId,
    /// Name, the id unless one was given.
    pub name: String,
    /// User command, space-joined.
    pub command: String,
    /// Local creation time, `YYYY-MM-DD HH:MM:SS`.
    #[serde(rename = "createTime")]
    pub create_time: String,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// `host:container` volume spec, empty when none.
    #[serde(default)]
    pub volume: String,
    /// Requested `host:container` port mappings.
    #[serde(default)]
    pub port_mapping: Vec<String>,
    /// Network the container is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    /// Address allocated on that network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
}

impl ContainerInfo {
    /// Record of a container that was just started.
    #[must_use]
    pub fn running(id: ContainerId, name: Option<&str>, pid: i32, command: &[String]) -> Self {
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(|| id.to_string(), str::to_string);
        Self {
            pid: Some(pid),
            name,
            id,
            command: command.join(" "),
            create_time: chrono::Local::now().format(TIME_FORMAT).to_string(),
            status: ContainerStatus::Running,
            volume: String::new(),
            port_mapping: Vec::new(),
            network_name: None,
            ip: None,
        }
    }

    /// Whether the record claims the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}
