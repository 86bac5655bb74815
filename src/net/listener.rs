//! Listening socket acquisition and descriptor hand-off primitives.
//!
//! # Responsibilities
//! - Bind a fresh TCP or Unix listener from a configured address
//! - Adopt a listener from an inherited file descriptor
//! - Duplicate the live listener's descriptor for a successor process
//! - Accept incoming connections
//!
//! An inherited descriptor is fully validated (open, socket, stream,
//! listening, known family) before ownership is taken, so a bad slot is
//! never closed or registered with the reactor.

use std::fmt;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use crate::error::ServerError;

/// Address prefix selecting a Unix domain socket listener.
pub const UNIX_PREFIX: &str = "unix:";

/// Descriptor slot a reload successor finds its listener in: the first one
/// after stdin, stdout and stderr.
pub const INHERITED_FD: RawFd = 3;

/// The address a [`Listener`] is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(Option<PathBuf>),
}

impl ListenAddr {
    /// The TCP socket address, if this is a TCP listener.
    pub fn as_tcp(&self) -> Option<SocketAddr> {
        match self {
            ListenAddr::Tcp(addr) => Some(*addr),
            ListenAddr::Unix(_) => None,
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "{addr}"),
            ListenAddr::Unix(Some(path)) => write!(f, "{UNIX_PREFIX}{}", path.display()),
            ListenAddr::Unix(None) => write!(f, "{UNIX_PREFIX}(unnamed)"),
        }
    }
}

/// An accepted client connection.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream, SocketAddr),
    Unix(UnixStream),
}

impl Stream {
    /// Peer address for logging.
    pub fn peer(&self) -> String {
        match self {
            Stream::Tcp(_, addr) => addr.to_string(),
            Stream::Unix(_) => "unix".to_string(),
        }
    }
}

/// A bound, listening stream socket.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Bind a fresh listener.
    ///
    /// `unix:/path` binds a Unix domain socket, anything else is resolved
    /// as a TCP `host:port`.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            address: address.to_string(),
            source,
        };

        let listener = match address.strip_prefix(UNIX_PREFIX) {
            Some(path) => Listener::Unix(UnixListener::bind(path).map_err(bind_err)?),
            None => Listener::Tcp(TcpListener::bind(address).await.map_err(bind_err)?),
        };

        tracing::info!(address = %listener.display_addr(), "Listener bound");
        Ok(listener)
    }

    /// Adopt a listener from a descriptor inherited across exec.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_inherited(fd: RawFd) -> Result<Self, ServerError> {
        let kind = inspect_fd(fd)?;
        // Arrived without close-on-exec; later children must not get it.
        set_cloexec(fd)?;

        // SAFETY: inspect_fd verified `fd` is an open listening stream socket,
        // and nothing else in this process owns the inherited slot.
        let listener = match kind {
            SocketKind::Tcp => {
                let std_listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
                std_listener
                    .set_nonblocking(true)
                    .map_err(|e| ServerError::fd(fd, format!("set_nonblocking: {e}")))?;
                Listener::Tcp(
                    TcpListener::from_std(std_listener)
                        .map_err(|e| ServerError::fd(fd, format!("register: {e}")))?,
                )
            }
            SocketKind::Unix => {
                let std_listener = unsafe { std::os::unix::net::UnixListener::from_raw_fd(fd) };
                std_listener
                    .set_nonblocking(true)
                    .map_err(|e| ServerError::fd(fd, format!("set_nonblocking: {e}")))?;
                Listener::Unix(
                    UnixListener::from_std(std_listener)
                        .map_err(|e| ServerError::fd(fd, format!("register: {e}")))?,
                )
            }
        };

        tracing::info!(fd, address = %listener.display_addr(), "Inherited listener from parent process");
        Ok(listener)
    }

    /// Duplicate the underlying descriptor.
    ///
    /// The duplicate is close-on-exec; the original keeps serving.
    pub fn duplicate_fd(&self) -> Result<OwnedFd, ServerError> {
        let borrowed = match self {
            Listener::Tcp(l) => l.as_fd(),
            Listener::Unix(l) => l.as_fd(),
        };
        let fd = borrowed.as_raw_fd();
        borrowed
            .try_clone_to_owned()
            .map_err(|e| ServerError::fd(fd, format!("dup: {e}")))
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Tcp(l) => {
                let (stream, addr) = l.accept().await?;
                Ok(Stream::Tcp(stream, addr))
            }
            Listener::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok(Stream::Unix(stream))
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr().map(ListenAddr::Tcp),
            Listener::Unix(l) => Ok(ListenAddr::Unix(
                l.local_addr()?.as_pathname().map(|p| p.to_path_buf()),
            )),
        }
    }

    fn display_addr(&self) -> String {
        self.local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Tcp,
    Unix,
}

/// Check that `fd` is an open, listening stream socket of a supported family.
fn inspect_fd(fd: RawFd) -> Result<SocketKind, ServerError> {
    if fd < 0 {
        return Err(ServerError::fd(fd, "negative descriptor"));
    }

    let mut stat: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return Err(ServerError::fd(
            fd,
            format!("not open: {}", io::Error::last_os_error()),
        ));
    }
    if (stat.st_mode & libc::S_IFMT) != libc::S_IFSOCK {
        return Err(ServerError::fd(fd, "not a socket"));
    }

    let sock_type = sockopt_int(fd, libc::SO_TYPE)?;
    if sock_type != libc::SOCK_STREAM {
        return Err(ServerError::UnsupportedListener(format!(
            "descriptor {fd} is not a stream socket (type {sock_type})"
        )));
    }

    if sockopt_int(fd, libc::SO_ACCEPTCONN)? == 0 {
        return Err(ServerError::fd(fd, "socket is not listening"));
    }

    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(
            fd,
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(ServerError::fd(
            fd,
            format!("getsockname: {}", io::Error::last_os_error()),
        ));
    }

    match libc::c_int::from(storage.ss_family) {
        libc::AF_INET | libc::AF_INET6 => Ok(SocketKind::Tcp),
        libc::AF_UNIX => Ok(SocketKind::Unix),
        family => Err(ServerError::UnsupportedListener(format!(
            "descriptor {fd} has unsupported address family {family}"
        ))),
    }
}

fn set_cloexec(fd: RawFd) -> Result<(), ServerError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(ServerError::fd(
            fd,
            format!("set close-on-exec: {}", io::Error::last_os_error()),
        ));
    }
    Ok(())
}

fn sockopt_int(fd: RawFd, option: libc::c_int) -> Result<libc::c_int, ServerError> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(ServerError::fd(
            fd,
            format!("getsockopt({option}): {}", io::Error::last_os_error()),
        ));
    }
    Ok(value)
}
