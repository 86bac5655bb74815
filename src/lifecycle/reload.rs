//! Listener hand-off to a successor process.
//!
//! # Data Flow
//! ```text
//! SIGUSR2 / ServerHandle::reload
//!     → Listener::duplicate_fd (close-on-exec duplicate)
//!     → spawn current executable with the same args + marker env
//!         child, before exec: dup2(duplicate, 3), clear close-on-exec
//!     → parent closes its duplicate, keeps the original listener
//!     → controller proceeds to graceful shutdown
//! ```
//!
//! The successor is not awaited and no readiness handshake takes place.
//! Connections arriving between the parent closing its listener and the
//! child's first `accept` wait in the kernel backlog of the shared socket.

use std::ffi::OsString;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::schema::ReloadConfig;
use crate::error::ServerError;
use crate::net::listener::{Listener, INHERITED_FD};

/// Value the reload marker is set to in the successor's environment.
pub const MARKER_VALUE: &str = "true";

/// A successor process that was started with the inherited listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor {
    pub pid: Option<u32>,
}

/// How a successor process is launched.
#[derive(Debug, Clone)]
pub struct SuccessorCommand {
    program: PathBuf,
    args: Vec<OsString>,
    marker: String,
    working_dir: Option<PathBuf>,
}

impl SuccessorCommand {
    /// Re-invocation of the current process, with overrides from `config`.
    pub fn from_config(config: &ReloadConfig, marker: &str) -> Result<Self, ServerError> {
        let program = match &config.executable {
            Some(path) => path.clone(),
            None => default_program(std::env::args_os().next())?,
        };
        let args = match &config.args {
            Some(args) => args.iter().map(OsString::from).collect(),
            None => std::env::args_os().skip(1).collect(),
        };

        Ok(Self {
            program,
            args,
            marker: marker.to_string(),
            working_dir: config.working_dir.clone(),
        })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

/// The program this process was started as.
///
/// `argv[0]` is looked up again at spawn time, so a binary replaced on disk
/// since startup is the one that runs. `current_exe` is only a fallback: on
/// Linux it names the original inode, which is gone after an upgrade.
fn default_program(argv0: Option<OsString>) -> Result<PathBuf, ServerError> {
    let program = match argv0 {
        Some(arg) if !arg.is_empty() => PathBuf::from(arg),
        _ => return std::env::current_exe().map_err(ServerError::ReloadSpawn),
    };

    // A bare name goes through PATH; a relative path is pinned to the
    // directory we started in, independent of `reload.working_dir`.
    if program.is_relative() && program.components().count() > 1 {
        let cwd = std::env::current_dir().map_err(ServerError::ReloadSpawn)?;
        return Ok(cwd.join(program));
    }
    Ok(program)
}

/// Start a successor that inherits `listener` at [`INHERITED_FD`].
///
/// `listener` itself is never closed here. On error nothing was started
/// and the caller keeps serving.
pub fn spawn_successor(
    listener: &Listener,
    command: &SuccessorCommand,
) -> Result<Successor, ServerError> {
    let duplicate = listener.duplicate_fd()?;
    let fd = duplicate.as_raw_fd();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env(&command.marker, MARKER_VALUE)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }

    // SAFETY: the hook runs between fork and exec and only makes
    // async-signal-safe libc calls on descriptors it does not allocate.
    unsafe {
        cmd.pre_exec(move || place_inherited_fd(fd));
    }

    let child = cmd.spawn().map_err(ServerError::ReloadSpawn)?;
    let pid = child.id();

    // The child holds its own copy at slot 3 now.
    drop(duplicate);

    tracing::info!(
        pid = ?pid,
        program = %command.program.display(),
        fd = INHERITED_FD,
        "Successor process started"
    );

    Ok(Successor { pid })
}

/// Runs in the forked child: move `fd` to the well-known slot without
/// close-on-exec.
fn place_inherited_fd(fd: RawFd) -> io::Result<()> {
    if fd == INHERITED_FD {
        // dup2 onto itself is a no-op that would leave close-on-exec set.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    } else if unsafe { libc::dup2(fd, INHERITED_FD) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
