//! Addresses of other agents and blocking connections to them.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};

use super::deadline::Deadline;
use super::error::InternalRequestError;

const UNIX_CONNECT_RETRY: Duration = Duration::from_millis(10);

/// `unix:/path/to/socket` or `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAddress {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl FromStr for AgentAddress {
    type Err = InternalRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InternalRequestError::InvalidAddress(s.to_string());

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let authority = s.strip_prefix("tcp://").ok_or_else(invalid)?;
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port.parse().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

impl AgentAddress {
    /// Connect, giving up when `deadline` passes.
    pub fn connect(&self, deadline: &Deadline) -> Result<AgentStream, InternalRequestError> {
        let connect_error = |source: io::Error| InternalRequestError::Connect {
            address: self.to_string(),
            source,
        };

        match self {
            Self::Unix(path) => connect_unix(path, deadline, connect_error).map(AgentStream::Unix),
            Self::Tcp { host, port } => {
                let mut last_error = None;
                for addr in (host.as_str(), *port).to_socket_addrs().map_err(connect_error)? {
                    match TcpStream::connect_timeout(&addr, deadline.remaining()?) {
                        Ok(stream) => {
                            stream.set_nodelay(true).map_err(connect_error)?;
                            return Ok(AgentStream::Tcp(stream));
                        }
                        Err(err) if Deadline::is_timeout(&err) => {
                            return Err(deadline.exceeded().into())
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(connect_error(last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
                })))
            }
        }
    }
}

/// A blocking connect to a listener with a full backlog never returns, so the
/// socket connects in non-blocking mode. Linux refuses with `EAGAIN` instead
/// of queueing; other systems may report the connect as in progress.
fn connect_unix(
    path: &Path,
    deadline: &Deadline,
    connect_error: impl Fn(io::Error) -> InternalRequestError,
) -> Result<UnixStream, InternalRequestError> {
    let from_errno = |errno: Errno| connect_error(errno.into());

    let addr = UnixAddr::new(path).map_err(from_errno)?;
    let fd = socket(AddressFamily::Unix, SockType::Stream, SockFlag::empty(), None)
        .map_err(from_errno)?;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(from_errno)?;
    let stream = UnixStream::from(fd);
    stream.set_nonblocking(true).map_err(&connect_error)?;

    loop {
        match connect(stream.as_raw_fd(), &addr) {
            Ok(()) | Err(Errno::EISCONN) => break,
            Err(Errno::EAGAIN | Errno::EINPROGRESS | Errno::EALREADY | Errno::EINTR) => {
                thread::sleep(deadline.remaining()?.min(UNIX_CONNECT_RETRY));
            }
            Err(errno) => return Err(from_errno(errno)),
        }
    }

    stream.set_nonblocking(false).map_err(&connect_error)?;
    Ok(stream)
}

/// A blocking connection to another agent.
#[derive(Debug)]
pub enum AgentStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AgentStream {
    pub fn as_unix(&self) -> Option<&UnixStream> {
        match self {
            Self::Unix(stream) => Some(stream),
            Self::Tcp(_) => None,
        }
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Self::Unix(stream) => stream.set_read_timeout(Some(timeout)),
            Self::Tcp(stream) => stream.set_read_timeout(Some(timeout)),
        }
    }

    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Self::Unix(stream) => stream.set_write_timeout(Some(timeout)),
            Self::Tcp(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }
}

impl Read for AgentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Unix(stream) => stream.read(buf),
            Self::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for AgentStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Unix(stream) => stream.write(buf),
            Self::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Unix(stream) => stream.flush(),
            Self::Tcp(stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        assert_eq!(
            "unix:/run/warden/agents.s/watchdog_api".parse::<AgentAddress>().unwrap(),
            AgentAddress::Unix(PathBuf::from("/run/warden/agents.s/watchdog_api"))
        );
        assert_eq!(
            "tcp://127.0.0.1:3000".parse::<AgentAddress>().unwrap(),
            AgentAddress::Tcp {
                host: "127.0.0.1".into(),
                port: 3000
            }
        );
        assert_eq!(
            "tcp://[::1]:3000".parse::<AgentAddress>().unwrap(),
            AgentAddress::Tcp {
                host: "::1".into(),
                port: 3000
            }
        );
    }

    #[test]
    fn test_parse_invalid_addresses() {
        for raw in ["", "unix:", "/run/socket", "tcp://host", "tcp://:80", "tcp://host:http", "http://host:80"] {
            assert!(
                matches!(raw.parse::<AgentAddress>(), Err(InternalRequestError::InvalidAddress(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["unix:/tmp/api", "tcp://localhost:80", "tcp://[::1]:8080"] {
            assert_eq!(raw.parse::<AgentAddress>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let address = AgentAddress::Unix(dir.path().join("absent"));
        let err = address
            .connect(&Deadline::after(Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, InternalRequestError::Connect { .. }));
    }

    #[test]
    fn test_connect_unix_is_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();

        let stream = AgentAddress::Unix(socket)
            .connect(&Deadline::after(Duration::from_secs(1)))
            .unwrap();
        let flags = fcntl(stream.as_unix().unwrap().as_raw_fd(), FcntlArg::F_GETFL).unwrap();
        assert!(!nix::fcntl::OFlag::from_bits_truncate(flags).contains(nix::fcntl::OFlag::O_NONBLOCK));
    }
}
