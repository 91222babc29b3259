//! Per-container `OverlayFS` workspaces.
//!
//! A workspace lives under `<workspace_dir>/<id>` and holds four trees:
//!
//! - `lower`: the extracted image, read-only through the overlay
//! - `upper`: the container's writes
//! - `work`: overlay bookkeeping
//! - `merged`: the mount point the container uses as its root
//!
//! Extraction and mounting go through the host `tar`, `mount` and `umount`
//! programs; their argument strings are built here and nowhere else.

use std::path::{Path, PathBuf};

use corral_common::command;
use corral_common::error::{CorralError, Result};
use corral_common::types::ContainerId;

use super::volume::VolumeSpec;

/// Runs one host program, returning its stdout.
pub type CommandRunner = fn(&str, &[String]) -> Result<String>;

/// One step of workspace teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStep {
    /// `umount <path>`, skipped when the path is already gone.
    Unmount(PathBuf),
    /// Recursive removal of a directory tree.
    RemoveTree(PathBuf),
}

/// The layered root filesystem of one container.
#[derive(Debug, Clone)]
pub struct OverlayWorkspace {
    root: PathBuf,
    image: PathBuf,
    volume: Option<VolumeSpec>,
    runner: CommandRunner,
}

impl OverlayWorkspace {
    /// Describes the workspace of `id`; nothing is touched until [`Self::create`].
    #[must_use]
    pub fn new(
        workspace_dir: &Path,
        id: &ContainerId,
        image: impl Into<PathBuf>,
        volume: Option<VolumeSpec>,
    ) -> Self {
        Self {
            root: workspace_dir.join(id.as_str()),
            image: image.into(),
            volume,
            runner: run_host_command,
        }
    }

    /// Replaces the host command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Per-container directory holding all four trees.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracted image.
    #[must_use]
    pub fn lower(&self) -> PathBuf {
        self.root.join("lower")
    }

    /// Writable layer.
    #[must_use]
    pub fn upper(&self) -> PathBuf {
        self.root.join("upper")
    }

    /// Overlay work directory.
    #[must_use]
    pub fn work(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Merged mount point.
    #[must_use]
    pub fn merged(&self) -> PathBuf {
        self.root.join("merged")
    }

    /// Bind-mount target of the volume inside the merged tree, if any.
    #[must_use]
    pub fn volume_target(&self) -> Option<PathBuf> {
        self.volume.as_ref().map(|v| v.target_in(&self.merged()))
    }

    /// Builds the workspace and returns the merged directory.
    ///
    /// On failure everything built so far is torn down before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first construction error.
    pub fn create(&self) -> Result<PathBuf> {
        if let Err(e) = self.build() {
            if let Err(cleanup) = self.destroy() {
                tracing::warn!(root = %self.root.display(), error = %cleanup, "cleanup after failed workspace creation");
            }
            return Err(e);
        }
        tracing::info!(merged = %self.merged().display(), "workspace created");
        Ok(self.merged())
    }

    fn build(&self) -> Result<()> {
        self.extract_image()?;
        create_dir(&self.upper())?;
        create_dir(&self.work())?;
        self.mount_overlay()?;
        if let Some(volume) = &self.volume {
            self.mount_volume(volume)?;
        }
        Ok(())
    }

    fn extract_image(&self) -> Result<()> {
        let lower = self.lower();
        if is_populated(&lower) {
            tracing::debug!(lower = %lower.display(), "image already extracted");
            return Ok(());
        }
        create_dir(&lower)?;
        let _ = (self.runner)("tar", &self.extract_args())?;
        Ok(())
    }

    fn mount_overlay(&self) -> Result<()> {
        create_dir(&self.merged())?;
        let _ = (self.runner)("mount", &self.overlay_mount_args())?;
        Ok(())
    }

    fn mount_volume(&self, volume: &VolumeSpec) -> Result<()> {
        let target = volume.target_in(&self.merged());
        create_dir(volume.host())?;
        create_dir(&target)?;
        let _ = (self.runner)("mount", &bind_mount_args(volume.host(), &target))?;
        tracing::info!(volume = %volume, "volume mounted");
        Ok(())
    }

    /// `tar` arguments extracting the image into `lower`.
    #[must_use]
    pub fn extract_args(&self) -> Vec<String> {
        vec![
            "-xvf".into(),
            self.image.display().to_string(),
            "-C".into(),
            self.lower().display().to_string(),
        ]
    }

    /// `mount` arguments for the overlay at `merged`.
    #[must_use]
    pub fn overlay_mount_args(&self) -> Vec<String> {
        let options = format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower().display(),
            self.upper().display(),
            self.work().display()
        );
        vec![
            "-t".into(),
            "overlay".into(),
            "overlay".into(),
            "-o".into(),
            options,
            self.merged().display().to_string(),
        ]
    }

    /// Teardown in order: volume, overlay, then the whole tree.
    ///
    /// The volume is nested under the merge point, so unmounting the
    /// overlay first fails with `EBUSY`.
    #[must_use]
    pub fn teardown_steps(&self) -> Vec<TeardownStep> {
        let mut steps = Vec::with_capacity(3);
        if let Some(target) = self.volume_target() {
            steps.push(TeardownStep::Unmount(target));
        }
        steps.push(TeardownStep::Unmount(self.merged()));
        steps.push(TeardownStep::RemoveTree(self.root.clone()));
        steps
    }

    /// Tears the workspace down.
    ///
    /// Every step is attempted even when an earlier one fails. Steps whose
    /// target is already gone are skipped, so destroying twice succeeds.
    ///
    /// # Errors
    ///
    /// Returns all step failures combined.
    pub fn destroy(&self) -> Result<()> {
        let mut errors = Vec::new();
        for step in self.teardown_steps() {
            if let Err(e) = self.run_step(&step) {
                tracing::warn!(?step, error = %e, "teardown step failed");
                errors.push(e);
            }
        }
        CorralError::from_collected(errors)
    }

    fn run_step(&self, step: &TeardownStep) -> Result<()> {
        match step {
            TeardownStep::Unmount(path) => {
                if !path.exists() {
                    return Ok(());
                }
                let _ = (self.runner)("umount", &[path.display().to_string()])?;
                tracing::debug!(path = %path.display(), "unmounted");
                Ok(())
            }
            TeardownStep::RemoveTree(path) => match std::fs::remove_dir_all(path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "workspace removed");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CorralError::Io {
                    path: path.clone(),
                    source: e,
                }),
            },
        }
    }

    /// Archives the merged tree as `<image_dir>/<name>.tar` (gzip).
    ///
    /// # Errors
    ///
    /// Returns an error if the image directory cannot be created or `tar`
    /// fails.
    pub fn commit(&self, image_dir: &Path, name: &str) -> Result<PathBuf> {
        create_dir(image_dir)?;
        let archive = image_dir.join(format!("{name}.tar"));
        let args = vec![
            "-czf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            self.merged().display().to_string(),
            ".".to_string(),
        ];
        let _ = (self.runner)("tar", &args)?;
        tracing::info!(archive = %archive.display(), "image committed");
        Ok(archive)
    }
}

/// `mount` arguments bind-mounting `host` onto `target`.
#[must_use]
pub fn bind_mount_args(host: &Path, target: &Path) -> Vec<String> {
    vec![
        "-o".into(),
        "bind".into(),
        host.display().to_string(),
        target.display().to_string(),
    ]
}

fn run_host_command(program: &str, args: &[String]) -> Result<String> {
    command::run(program, args)
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| CorralError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    thread_local! {
        static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn recording_runner(program: &str, args: &[String]) -> Result<String> {
        CALLS.with(|c| c.borrow_mut().push(format!("{program} {}", args.join(" "))));
        Ok(String::new())
    }

    fn failing_mount(program: &str, args: &[String]) -> Result<String> {
        let _ = recording_runner(program, args)?;
        if program == "mount" {
            return Err(CorralError::Command {
                program: program.into(),
                message: "denied".into(),
            });
        }
        Ok(String::new())
    }

    fn take_calls() -> Vec<String> {
        CALLS.with(|c| std::mem::take(&mut *c.borrow_mut()))
    }

    fn workspace(dir: &Path, volume: Option<VolumeSpec>) -> OverlayWorkspace {
        OverlayWorkspace::new(
            &dir.join("overlay"),
            &ContainerId::new("0123456789"),
            "/images/busybox.tar",
            volume,
        )
        .with_runner(recording_runner)
    }

    #[test]
    fn layout_is_keyed_by_id() {
        let ws = OverlayWorkspace::new(
            Path::new("/ws"),
            &ContainerId::new("abc"),
            "/img.tar",
            None,
        );
        assert_eq!(ws.root(), Path::new("/ws/abc"));
        assert_eq!(ws.lower(), PathBuf::from("/ws/abc/lower"));
        assert_eq!(ws.merged(), PathBuf::from("/ws/abc/merged"));
    }

    #[test]
    fn host_command_arguments() {
        let ws = OverlayWorkspace::new(
            Path::new("/ws"),
            &ContainerId::new("abc"),
            "/img/busybox.tar",
            None,
        );
        assert_eq!(
            ws.extract_args().join(" "),
            "-xvf /img/busybox.tar -C /ws/abc/lower"
        );
        assert_eq!(
            ws.overlay_mount_args().join(" "),
            "-t overlay overlay -o lowerdir=/ws/abc/lower,upperdir=/ws/abc/upper,workdir=/ws/abc/work /ws/abc/merged"
        );
        assert_eq!(
            bind_mount_args(Path::new("/h"), Path::new("/ws/abc/merged/c")).join(" "),
            "-o bind /h /ws/abc/merged/c"
        );
    }

    #[test]
    fn create_runs_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().join("data");
        let volume = VolumeSpec::parse(&format!("{}:/data", host.display())).unwrap();
        let ws = workspace(dir.path(), Some(volume));
        let _ = take_calls();

        let merged = ws.create().unwrap();
        assert_eq!(merged, ws.merged());
        assert!(ws.upper().is_dir());
        assert!(ws.work().is_dir());
        assert!(host.is_dir());
        assert!(merged.join("data").is_dir());

        let calls = take_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].starts_with("tar -xvf /images/busybox.tar"));
        assert!(calls[1].starts_with("mount -t overlay overlay"));
        assert!(calls[2].starts_with("mount -o bind"));
    }

    #[test]
    fn populated_lower_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), None);
        std::fs::create_dir_all(ws.lower()).unwrap();
        std::fs::write(ws.lower().join("bin"), "").unwrap();
        let _ = take_calls();

        let _ = ws.create().unwrap();
        let calls = take_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("mount"));
    }

    #[test]
    fn teardown_unmounts_volume_first() {
        let volume = VolumeSpec::parse("/h:/c").unwrap();
        let ws = OverlayWorkspace::new(Path::new("/ws"), &ContainerId::new("x"), "/i", Some(volume));
        assert_eq!(
            ws.teardown_steps(),
            vec![
                TeardownStep::Unmount(PathBuf::from("/ws/x/merged/c")),
                TeardownStep::Unmount(PathBuf::from("/ws/x/merged")),
                TeardownStep::RemoveTree(PathBuf::from("/ws/x")),
            ]
        );
    }

    #[test]
    fn destroy_twice_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), None);
        let _ = ws.create().unwrap();
        let _ = take_calls();

        ws.destroy().unwrap();
        assert!(!ws.root().exists());
        assert_eq!(take_calls(), vec![format!("umount {}", ws.merged().display())]);

        ws.destroy().unwrap();
        assert!(take_calls().is_empty());
    }

    #[test]
    fn failed_unmount_still_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), None);
        std::fs::create_dir_all(ws.merged()).unwrap();

        let ws = ws.with_runner(|program, _| {
            Err(CorralError::Command {
                program: program.into(),
                message: "not mounted".into(),
            })
        });
        assert!(ws.destroy().is_err());
        assert!(!ws.root().exists());
    }

    #[test]
    fn failed_create_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), None).with_runner(failing_mount);
        let _ = take_calls();

        assert!(ws.create().is_err());
        assert!(!ws.root().exists());
    }

    #[test]
    fn commit_archives_merged_tree() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), None);
        let images = dir.path().join("images");
        let _ = take_calls();

        let archive = ws.commit(&images, "snap").unwrap();
        assert_eq!(archive, images.join("snap.tar"));
        assert!(images.is_dir());
        assert_eq!(
            take_calls(),
            vec![format!(
                "tar -czf {} -C {} .",
                archive.display(),
                ws.merged().display()
            )]
        );
    }
}
