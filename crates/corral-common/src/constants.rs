//! System-wide constants and default paths.

/// Application name used in log output and cgroup names.
pub const APP_NAME: &str = "corral";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "corral";

/// Root directory holding one sub-directory per container.
pub const DEFAULT_STATE_DIR: &str = "/var/run/corral";

/// Root directory for per-container overlay workspaces.
pub const DEFAULT_WORKSPACE_DIR: &str = "/var/lib/corral/overlay";

/// Directory holding image archives (`<name>.tar`).
pub const DEFAULT_IMAGE_DIR: &str = "/var/lib/corral/images";

/// Root directory for network configuration and IPAM state.
pub const DEFAULT_NETWORK_DIR: &str = "/var/run/corral/network";

/// Container metadata file inside a container directory.
pub const CONFIG_NAME: &str = "config.json";

/// Redirected stdout of a detached container.
pub const LOG_FILE: &str = "container.log";

/// Length of generated container ids.
pub const ID_LENGTH: usize = 10;

/// Descriptor of the command pipe inside the init process.
///
/// The first descriptor after stdin, stdout and stderr.
pub const INIT_PIPE_FD: i32 = 3;

/// Environment key carrying the target PID for `exec`.
pub const ENV_EXEC_PID: &str = "corral_pid";

/// Environment key carrying the command line for `exec`.
pub const ENV_EXEC_CMD: &str = "corral_cmd";

/// Prefix of per-container cgroup names.
pub const CGROUP_PREFIX: &str = "corral-";

/// Mount metadata consulted to locate cgroup hierarchies.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// IPAM allocation table, relative to the network directory.
pub const IPAM_FILE: &str = "ipam/subnet.json";

/// Network configuration files, relative to the network directory.
pub const NETWORKS_SUBDIR: &str = "networks";

/// Name of the only network driver.
pub const BRIDGE_DRIVER: &str = "bridge";

/// Timestamp layout stored in `createTime`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
