//! Runtime engine that orchestrates container lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use corral_common::config::RuntimeConfig;
use corral_common::error::{CorralError, Result};
use corral_common::types::{ContainerId, ContainerStatus, ResourceConfig, validate_name};
use corral_core::cgroup::CgroupManager;
use corral_core::cgroup::mountinfo::{MountPointResolver, ProcMountInfo};
use corral_core::filesystem::overlayfs::{CommandRunner, OverlayWorkspace};
use corral_core::filesystem::volume::VolumeSpec;
use corral_core::namespace::NamespaceConfig;
use corral_net::NetworkManager;
use nix::unistd::Pid;

use crate::container::ContainerInfo;
use crate::process::{CommandPipe, LaunchSpec, Launcher, ProcessLauncher};
use crate::state::ContainerStore;

/// Everything `run` needs to start a container.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Attach the terminal and wait for the container to exit.
    pub tty: bool,
    /// Image name, looked up as `<image_dir>/<image>.tar`.
    pub image: String,
    /// User command and arguments.
    pub command: Vec<String>,
    /// Container name; defaults to the id.
    pub name: Option<String>,
    /// Resource limits.
    pub resources: ResourceConfig,
    /// `host:container` volume spec.
    pub volume: Option<String>,
    /// Extra `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// Network to attach to.
    pub network: Option<String>,
    /// `host:container` port mappings.
    pub ports: Vec<String>,
}

/// The runtime engine that coordinates all container operations.
pub struct Engine {
    config: RuntimeConfig,
    store: ContainerStore,
    networks: NetworkManager,
    launcher: Box<dyn Launcher>,
    cgroup_resolver: Arc<dyn MountPointResolver>,
    workspace_runner: Option<CommandRunner>,
}

impl Engine {
    /// Creates an engine over the directories of `config`.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let networks = NetworkManager::from_config(&config);
        Self::with_networks(config, networks)
    }

    /// Creates an engine with an explicit network manager.
    #[must_use]
    pub fn with_networks(config: RuntimeConfig, networks: NetworkManager) -> Self {
        Self {
            store: ContainerStore::new(&config.state_dir),
            config,
            networks,
            launcher: Box::new(ProcessLauncher::default()),
            cgroup_resolver: Arc::new(ProcMountInfo::new()),
            workspace_runner: None,
        }
    }

    /// Replaces how init processes are started.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces how cgroup hierarchies are located.
    #[must_use]
    pub fn with_cgroup_resolver(mut self, resolver: Arc<dyn MountPointResolver>) -> Self {
        self.cgroup_resolver = resolver;
        self
    }

    /// Replaces the runner of the workspace's `tar`/`mount`/`umount` calls.
    #[must_use]
    pub fn with_workspace_runner(mut self, runner: CommandRunner) -> Self {
        self.workspace_runner = Some(runner);
        self
    }

    /// Runtime directories in use.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Container records.
    #[must_use]
    pub const fn store(&self) -> &ContainerStore {
        &self.store
    }

    /// Network lifecycle.
    #[must_use]
    pub const fn networks(&self) -> &NetworkManager {
        &self.networks
    }

    fn workspace(&self, id: &ContainerId, image: &Path, volume: Option<VolumeSpec>) -> OverlayWorkspace {
        let workspace = OverlayWorkspace::new(&self.config.workspace_dir, id, image, volume);
        match self.workspace_runner {
            Some(runner) => workspace.with_runner(runner),
            None => workspace,
        }
    }

    fn cgroup(&self, id: &ContainerId) -> CgroupManager {
        CgroupManager::for_container_in(id, Box::new(Arc::clone(&self.cgroup_resolver)))
    }

    /// Starts a container and returns its id.
    ///
    /// With `tty` this blocks until the container exits and tears it down
    /// afterwards; otherwise it returns as soon as the command is handed
    /// over. Cgroup failures are logged and do not stop the container.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty command, an image name that is not a
    /// single path component or a malformed volume, or if
    /// the workspace, the init process, the record or the network
    /// attachment cannot be set up. Everything set up so far is torn down.
    pub fn run(&self, opts: &RunOptions) -> Result<ContainerId> {
        if opts.command.is_empty() {
            return Err(CorralError::Config {
                message: "no command given".into(),
            });
        }
        validate_name("image", &opts.image)?;
        let volume = opts.volume.as_deref().map(VolumeSpec::parse).transpose()?;

        let id = ContainerId::generate();
        let workspace = self.workspace(&id, &self.config.image_archive(&opts.image), volume);
        let merged = workspace.create()?;

        let launched = self.store.create_dir(&id).and_then(|_| {
            self.launcher.launch(&LaunchSpec {
                tty: opts.tty,
                workdir: merged,
                log_file: self.store.log_path(&id),
                env: opts.env.clone(),
                namespaces: NamespaceConfig::default(),
            })
        });
        let (pid, pipe) = match launched {
            Ok(launched) => launched,
            Err(e) => {
                self.log_teardown(&id, &workspace, None, None);
                return Err(e);
            }
        };

        let mut info = ContainerInfo::running(id.clone(), opts.name.as_deref(), pid.as_raw(), &opts.command);
        info.volume = opts.volume.clone().unwrap_or_default();
        info.port_mapping.clone_from(&opts.ports);

        let cgroup = self.cgroup(&id);
        if let Err(e) = self.start(&mut info, &cgroup, &opts.resources, opts.network.as_deref(), pipe) {
            tracing::error!(id = %id, error = %e, "container start failed");
            let _ = crate::process::wait(pid);
            self.log_teardown(&id, &workspace, Some(&cgroup), Some(&info));
            return Err(e);
        }

        if opts.tty {
            let waited = crate::process::wait(pid);
            self.log_teardown(&id, &workspace, Some(&cgroup), Some(&info));
            let _ = waited?;
        }
        Ok(id)
    }

    /// Records, constrains and connects the launched child, then sends its
    /// command. Dropping `pipe` on an early return makes the child exit.
    fn start(
        &self,
        info: &mut ContainerInfo,
        cgroup: &CgroupManager,
        resources: &ResourceConfig,
        network: Option<&str>,
        pipe: CommandPipe,
    ) -> Result<()> {
        self.store.record(info)?;
        let pid = info.pid.unwrap_or_default();

        if let Err(e) = cgroup.set(resources) {
            tracing::warn!(id = %info.id, error = %e, "cgroup limits not fully set");
        }
        if let Err(e) = cgroup.apply(u32::try_from(pid).unwrap_or_default(), resources) {
            tracing::warn!(id = %info.id, pid, error = %e, "cgroup limits not fully applied");
        }

        if let Some(network) = network {
            let endpoint = self.networks.connect(network, info.id.as_str(), pid, info.port_mapping.clone())?;
            info.network_name = Some(endpoint.network);
            info.ip = Some(endpoint.ip);
            self.store.write(info)?;
        }

        pipe.send(&command_argv(&info.command))
    }

    /// Tears down network, workspace, cgroup and state, in that order.
    ///
    /// Every step is attempted.
    fn teardown(
        &self,
        id: &ContainerId,
        workspace: &OverlayWorkspace,
        cgroup: Option<&CgroupManager>,
        info: Option<&ContainerInfo>,
    ) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(info) = info {
            if let (Some(network), Some(ip)) = (&info.network_name, info.ip) {
                if let Err(e) = self.networks.disconnect(network, id.as_str(), ip) {
                    errors.push(e);
                }
            }
        }
        if let Err(e) = workspace.destroy() {
            errors.push(e);
        }
        if let Some(cgroup) = cgroup {
            if let Err(e) = cgroup.destroy() {
                errors.push(e);
            }
        }
        if let Err(e) = self.store.delete(id) {
            errors.push(e);
        }
        CorralError::from_collected(errors)
    }

    fn log_teardown(
        &self,
        id: &ContainerId,
        workspace: &OverlayWorkspace,
        cgroup: Option<&CgroupManager>,
        info: Option<&ContainerInfo>,
    ) {
        if let Err(e) = self.teardown(id, workspace, cgroup, info) {
            tracing::error!(id = %id, error = %e, "container teardown incomplete");
        }
    }

    /// Every container, with records of vanished init processes updated
    /// to `exited`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerInfo>> {
        self.store
            .list()?
            .into_iter()
            .map(|info| self.refresh(info))
            .collect()
    }

    /// Reads container `id`, updating it to `exited` if its init process
    /// is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or cannot be updated.
    pub fn inspect(&self, id: &ContainerId) -> Result<ContainerInfo> {
        let info = self.store.read(id)?;
        self.refresh(info)
    }

    fn refresh(&self, mut info: ContainerInfo) -> Result<ContainerInfo> {
        if info.is_running() && !info.pid.is_some_and(is_alive) {
            tracing::debug!(id = %info.id, "init process gone, marking exited");
            info.status = ContainerStatus::Exited;
            self.store.write(&info)?;
        }
        Ok(info)
    }

    /// Sends `SIGTERM` to the container's init process and marks it stopped.
    ///
    /// There is no escalation; a process ignoring the signal keeps running.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown, has no recorded PID,
    /// or cannot be signalled.
    pub fn stop(&self, id: &ContainerId) -> Result<()> {
        use nix::sys::signal::{Signal, kill};

        let mut info = self.store.read(id)?;
        let pid = info.pid.ok_or_else(|| CorralError::Config {
            message: format!("container {id} is not running"),
        })?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => tracing::info!(id = %id, pid, "sent SIGTERM"),
            Err(nix::errno::Errno::ESRCH) => tracing::info!(id = %id, pid, "init process already gone"),
            Err(e) => {
                return Err(CorralError::Syscall {
                    message: format!("kill {pid} failed: {e}"),
                });
            }
        }

        info.status = ContainerStatus::Stopped;
        info.pid = None;
        self.store.write(&info)?;
        tracing::info!(id = %id, "container stopped");
        Ok(())
    }

    /// Removes a container that is not running.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or still running,
    /// otherwise all teardown failures combined.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let info = self.inspect(id)?;
        if info.is_running() {
            return Err(CorralError::Config {
                message: format!("container {id} is running, stop it first"),
            });
        }
        let volume = (!info.volume.is_empty())
            .then(|| VolumeSpec::parse(&info.volume))
            .transpose()?;
        let workspace = self.workspace(id, &PathBuf::new(), volume);
        let cgroup = self.cgroup(id);
        self.teardown(id, &workspace, Some(&cgroup), Some(&info))?;
        tracing::info!(id = %id, "container removed");
        Ok(())
    }

    /// Runs `command` inside running container `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running or the command
    /// cannot be started.
    pub fn exec(&self, id: &ContainerId, command: &[String]) -> Result<i32> {
        crate::exec::exec_in_container(&self.store, id, command)
    }

    /// Archives the container's filesystem as image `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or archiving fails.
    pub fn commit(&self, id: &ContainerId, image: &str) -> Result<PathBuf> {
        let _ = self.store.read(id)?;
        validate_name("image", image)?;
        self.workspace(id, &PathBuf::new(), None)
            .commit(&self.config.image_dir, image)
    }

    /// Captured output of a detached container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or the log is unreadable.
    pub fn logs(&self, id: &ContainerId) -> Result<String> {
        crate::logs::read_logs(&self.store, id)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn command_argv(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Whether a process with `pid` exists.
fn is_alive(pid: i32) -> bool {
    !matches!(
        nix::sys::signal::kill(Pid::from_raw(pid), None),
        Err(nix::errno::Errno::ESRCH)
    )
}

#[cfg(test)]
mod tests {
    use std::os::fd::OwnedFd;
    use std::sync::Mutex;

    use corral_core::cgroup::mountinfo::FixedHierarchy;
    use corral_net::{Ipam, store::NetworkStore};

    use super::*;

    /// Hands out the caller's own PID, which `waitpid` refuses.
    #[derive(Default)]
    struct NotAChild {
        readers: Mutex<Vec<OwnedFd>>,
    }

    impl Launcher for NotAChild {
        fn launch(&self, _spec: &LaunchSpec) -> Result<(Pid, CommandPipe)> {
            let (read, write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).unwrap();
            self.readers.lock().unwrap().push(read);
            Ok((Pid::this(), CommandPipe::from(write)))
        }
    }

    fn no_host_commands(_program: &str, _args: &[String]) -> Result<String> {
        Ok(String::new())
    }

    fn engine(root: &Path) -> Engine {
        let config = RuntimeConfig::rooted_at(root);
        let networks = NetworkManager::new(
            NetworkStore::new(config.networks_dir()),
            Ipam::new(config.ipam_file()),
            Vec::new(),
        );
        Engine::with_networks(config, networks)
    }

    fn dead_pid() -> i32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let _ = child.wait().unwrap();
        i32::try_from(child.id()).unwrap()
    }

    fn record(engine: &Engine, id: &str, pid: i32) -> ContainerInfo {
        let info = ContainerInfo::running(ContainerId::new(id), Some("t"), pid, &["sleep".into()]);
        engine.store().record(&info).unwrap();
        info
    }

    #[test]
    fn run_rejects_bad_input_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        assert!(engine.run(&RunOptions::default()).is_err());
        let bad_volume = RunOptions {
            image: "busybox".into(),
            command: vec!["ls".into()],
            volume: Some("/only/host".into()),
            ..RunOptions::default()
        };
        assert!(engine.run(&bad_volume).is_err());
        assert!(!engine.config().workspace_dir.exists());
    }

    #[test]
    fn attached_run_tears_down_when_wait_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cgroup_root = dir.path().join("cgroup");
        let engine = engine(dir.path())
            .with_launcher(Box::new(NotAChild::default()))
            .with_cgroup_resolver(Arc::new(FixedHierarchy::new(&cgroup_root)))
            .with_workspace_runner(no_host_commands);
        let opts = RunOptions {
            tty: true,
            image: "busybox".into(),
            command: vec!["true".into()],
            resources: ResourceConfig {
                memory_limit: Some("100m".into()),
                ..ResourceConfig::default()
            },
            ..RunOptions::default()
        };

        assert!(engine.run(&opts).is_err());
        assert!(engine.list().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(&engine.config().workspace_dir).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(cgroup_root.join("memory")).unwrap().count(), 0);
    }

    #[test]
    fn image_names_must_stay_in_the_image_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let opts = RunOptions {
            image: "../etc/shadow".into(),
            command: vec!["ls".into()],
            ..RunOptions::default()
        };
        assert!(matches!(engine.run(&opts), Err(CorralError::Config { .. })));
        assert!(!engine.config().workspace_dir.exists());
    }

    #[test]
    fn list_marks_vanished_containers_exited() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let info = record(&engine, "0000000001", dead_pid());

        let listed = engine.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ContainerStatus::Exited);
        assert_eq!(engine.store().read(&info.id).unwrap().status, ContainerStatus::Exited);
    }

    #[test]
    fn list_keeps_live_containers_running() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let _ = record(&engine, "0000000002", i32::try_from(std::process::id()).unwrap());
        assert_eq!(engine.list().unwrap()[0].status, ContainerStatus::Running);
    }

    #[test]
    fn stop_signals_and_clears_pid() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let info = record(&engine, "0000000003", i32::try_from(child.id()).unwrap());

        engine.stop(&info.id).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());

        let stored = engine.store().read(&info.id).unwrap();
        assert_eq!(stored.status, ContainerStatus::Stopped);
        assert_eq!(stored.pid, None);
        assert!(engine.stop(&info.id).is_err());
    }

    #[test]
    fn remove_refuses_running_container() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let info = record(&engine, "0000000004", i32::try_from(std::process::id()).unwrap());

        assert!(engine.remove(&info.id).is_err());
        assert!(engine.store().container_dir(&info.id).exists());
    }

    #[test]
    fn remove_deletes_exited_container() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let info = record(&engine, "0000000005", dead_pid());

        engine.remove(&info.id).unwrap();
        assert!(!engine.store().container_dir(&info.id).exists());
        assert!(engine.remove(&info.id).unwrap_err().is_not_found());
    }

    #[test]
    fn unknown_container_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let id = ContainerId::new("missing");
        assert!(engine.stop(&id).unwrap_err().is_not_found());
        assert!(engine.logs(&id).unwrap_err().is_not_found());
        assert!(engine.commit(&id, "img").unwrap_err().is_not_found());
    }

    #[test]
    fn command_is_split_for_hand_off() {
        assert_eq!(command_argv("echo  hi"), vec!["echo", "hi"]);
    }
}
