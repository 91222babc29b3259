//! Launching the container init process.
//!
//! The runtime re-executes itself as `corral init` inside new namespaces.
//! The child gets the read end of a pipe as descriptor 3 and blocks on it
//! until the parent, having set up cgroups and networking for the new PID,
//! sends the user command through the matching [`CommandPipe`].

use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use corral_common::constants::{BIN_NAME, INIT_PIPE_FD};
use corral_common::error::{CorralError, Result};
use corral_core::namespace::NamespaceConfig;
use nix::unistd::Pid;

/// Path the runtime re-executes itself through.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Hidden verb running the container init.
pub const INIT_VERB: &str = "init";

/// Stack given to the cloned child until it execs.
const STACK_SIZE: usize = 1024 * 1024;

/// What the init process is launched with.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Attach the caller's terminal instead of capturing output.
    pub tty: bool,
    /// Working directory of the child, the merged workspace root.
    pub workdir: PathBuf,
    /// File receiving stdout and stderr when not attached.
    pub log_file: PathBuf,
    /// Extra `KEY=VALUE` entries appended to the inherited environment.
    pub env: Vec<String>,
    /// Namespaces the child is created in.
    pub namespaces: NamespaceConfig,
}

/// Starts the init process of a container.
pub trait Launcher: Send + Sync {
    /// Starts init for `spec` and returns its host PID and command pipe.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn launch(&self, spec: &LaunchSpec) -> Result<(Pid, CommandPipe)>;
}

/// Write end of the command hand-off pipe.
///
/// It accepts exactly one message: [`CommandPipe::send`] consumes the pipe
/// and closes it, which is what lets the reader see end-of-file. Dropping
/// an unsent pipe closes it too, and the init process then fails on an
/// empty command.
#[derive(Debug)]
pub struct CommandPipe {
    write: File,
}

impl From<OwnedFd> for CommandPipe {
    fn from(fd: OwnedFd) -> Self {
        Self {
            write: File::from(fd),
        }
    }
}

impl CommandPipe {
    /// Sends `command`, space-joined, and closes the pipe.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn send(mut self, command: &[String]) -> Result<()> {
        let joined = command.join(" ");
        tracing::info!(command = %joined, "sending command to container");
        self.write
            .write_all(joined.as_bytes())
            .map_err(|e| CorralError::Io {
                path: PathBuf::from(format!("pipe:{}", self.write.as_raw_fd())),
                source: e,
            })
    }
}

/// Descriptors and strings the child needs, prepared before cloning so
/// the child only performs raw system calls.
struct ChildSetup {
    pipe_fd: i32,
    stdio: Option<(File, File)>,
    workdir: CString,
    exe: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

/// Starts init processes in fresh namespaces by re-executing the runtime.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(SELF_EXE)
    }
}

impl ProcessLauncher {
    /// Launcher re-executing `exe` as `corral init`.
    #[must_use]
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Binary run as init.
    #[must_use]
    pub fn exe(&self) -> &Path {
        &self.exe
    }
}

impl Launcher for ProcessLauncher {
    /// Clones `corral init` into the namespaces of `spec`.
    ///
    /// Returns the host PID of the child and the pipe to send its command.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe, the log file or the clone cannot be
    /// created.
    #[cfg(target_os = "linux")]
    fn launch(&self, spec: &LaunchSpec) -> Result<(Pid, CommandPipe)> {
        use nix::fcntl::OFlag;

        let (read, write): (OwnedFd, OwnedFd) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| CorralError::Syscall {
                message: format!("pipe2 failed: {e}"),
            })?;

        let setup = ChildSetup {
            pipe_fd: read.as_raw_fd(),
            stdio: if spec.tty { None } else { Some(detached_stdio(&spec.log_file)?) },
            workdir: c_path(&spec.workdir)?,
            exe: c_path(&self.exe)?,
            argv: vec![c_string(BIN_NAME)?, c_string(INIT_VERB)?],
            envp: child_env(&spec.env),
        };

        let pid = clone_child(&setup, spec.namespaces.clone_flags())?;
        drop(read);
        tracing::info!(pid = pid.as_raw(), workdir = %spec.workdir.display(), tty = spec.tty, "init process started");
        Ok((pid, CommandPipe::from(write)))
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error, namespaces require Linux.
    #[cfg(not(target_os = "linux"))]
    fn launch(&self, _spec: &LaunchSpec) -> Result<(Pid, CommandPipe)> {
        Err(CorralError::Config {
            message: "Linux required for native container operations".into(),
        })
    }
}

#[cfg(target_os = "linux")]
fn clone_child(setup: &ChildSetup, flags: nix::sched::CloneFlags) -> Result<Pid> {
    let argv = pointer_array(&setup.argv);
    let envp = pointer_array(&setup.envp);
    let mut stack = vec![0u8; STACK_SIZE];

    let child = Box::new(|| {
        // SAFETY: runs in the freshly cloned child, which owns a private copy
        // of the address space. Every pointer refers to a CString in `setup`
        // or to the null-terminated arrays built above, all alive until the
        // exec replaces the image.
        unsafe { exec_init(setup, argv.as_ptr(), envp.as_ptr()) }
    });

    // SAFETY: the child callback only performs raw system calls on
    // descriptors and strings prepared beforehand, then execs or exits.
    unsafe { nix::sched::clone(child, &mut stack, flags, Some(libc::SIGCHLD)) }.map_err(|e| {
        CorralError::Syscall {
            message: format!("clone failed: {e}"),
        }
    })
}

/// Child side of the launch: wires descriptors, enters the workspace and
/// execs the runtime binary. Returns only on failure.
///
/// # Safety
///
/// Must run in a cloned child. `argv` and `envp` must be null-terminated
/// arrays of pointers into live C strings.
#[cfg(target_os = "linux")]
unsafe fn exec_init(
    setup: &ChildSetup,
    argv: *const *const libc::c_char,
    envp: *const *const libc::c_char,
) -> isize {
    // SAFETY: plain system calls on descriptors owned by this process.
    unsafe {
        if let Some((stdin, output)) = &setup.stdio {
            if libc::dup2(stdin.as_raw_fd(), 0) < 0
                || libc::dup2(output.as_raw_fd(), 1) < 0
                || libc::dup2(output.as_raw_fd(), 2) < 0
            {
                return 1;
            }
        }
        if setup.pipe_fd == INIT_PIPE_FD {
            if libc::fcntl(INIT_PIPE_FD, libc::F_SETFD, 0) < 0 {
                return 1;
            }
        } else if libc::dup2(setup.pipe_fd, INIT_PIPE_FD) < 0 {
            return 1;
        }
        if libc::chdir(setup.workdir.as_ptr()) < 0 {
            return 1;
        }
        let _ = libc::execve(setup.exe.as_ptr(), argv, envp);
    }
    127
}

/// `/dev/null` for stdin and a fresh log file for stdout and stderr.
fn detached_stdio(log_file: &Path) -> Result<(File, File)> {
    let null = Path::new("/dev/null");
    let stdin = File::open(null).map_err(|e| CorralError::Io {
        path: null.to_path_buf(),
        source: e,
    })?;
    let output = File::create(log_file).map_err(|e| CorralError::Io {
        path: log_file.to_path_buf(),
        source: e,
    })?;
    Ok((stdin, output))
}

/// The caller's environment followed by `extra` entries.
fn child_env(extra: &[String]) -> Vec<CString> {
    std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            entry
        })
        .chain(extra.iter().map(|e| e.as_bytes().to_vec()))
        .filter_map(|entry| CString::new(entry).ok())
        .collect()
}

fn pointer_array(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| CorralError::Config {
        message: format!("`{value}` contains a NUL byte"),
    })
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| CorralError::Config {
        message: format!("path {} contains a NUL byte", path.display()),
    })
}

/// Blocks until `pid` exits and returns its exit code.
///
/// A child killed by a signal reports `128 + signal`.
///
/// # Errors
///
/// Returns an error if `waitpid(2)` fails.
#[cfg(target_os = "linux")]
pub fn wait(pid: Pid) -> Result<i32> {
    use nix::sys::wait::{WaitStatus, waitpid};

    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                tracing::info!(pid = pid.as_raw(), code, "container exited");
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                tracing::info!(pid = pid.as_raw(), %signal, "container killed");
                return Ok(128 + signal as i32);
            }
            Ok(_) | Err(nix::errno::Errno::EINTR) => {}
            Err(e) => {
                return Err(CorralError::Syscall {
                    message: format!("waitpid {pid} failed: {e}"),
                });
            }
        }
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn wait(_pid: Pid) -> Result<i32> {
    Err(CorralError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn extra_env_is_appended() {
        let env = child_env(&["FOO=bar".into()]);
        assert_eq!(env.last().unwrap().as_bytes(), b"FOO=bar");
    }

    #[test]
    fn entries_with_nul_are_dropped() {
        let env = child_env(&["BAD=a\0b".into()]);
        assert!(env.iter().all(|e| e.as_bytes() != b"BAD=a"));
    }

    #[test]
    fn pointer_array_is_null_terminated() {
        let strings = vec![c_string("corral").unwrap(), c_string("init").unwrap()];
        let ptrs = pointer_array(&strings);
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs[2].is_null());
    }

    #[test]
    fn launcher_defaults_to_own_binary() {
        assert_eq!(ProcessLauncher::default().exe(), Path::new(SELF_EXE));
        assert_eq!(ProcessLauncher::new("/usr/bin/corral").exe(), Path::new("/usr/bin/corral"));
    }

    #[test]
    fn detached_stdio_truncates_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("container.log");
        std::fs::write(&log, "stale").unwrap();
        let (_stdin, _out) = detached_stdio(&log).unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pipe_delivers_one_message_then_eof() {
        let (read, write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).unwrap();
        CommandPipe::from(write).send(&["echo".into(), "hi".into()]).unwrap();

        let mut received = String::new();
        let _ = File::from(read).read_to_string(&mut received).unwrap();
        assert_eq!(received, "echo hi");
    }
}
