//! Unix peer credentials and the local trust policy built on them.

use std::collections::BTreeSet;
use std::os::fd::AsFd;

use nix::errno::Errno;

/// Identity of the process on the other end of a Unix socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: Option<i32>,
    pub uid: u32,
    pub gid: u32,
}

/// The platform supports peer credentials but the lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot read peer credentials: {errno}")]
pub struct PeerCredentialsError {
    pub errno: Errno,
}

/// Read the credentials of the peer connected to `socket`.
///
/// Returns `Ok(None)` when the platform or socket type has no such mechanism,
/// so callers can fall back to other means of authentication.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn read_peer_credentials<F: AsFd>(
    socket: &F,
) -> Result<Option<PeerCredentials>, PeerCredentialsError> {
    use nix::sys::socket::{getsockopt, sockopt};

    match getsockopt(socket, sockopt::PeerCredentials) {
        // Non-Unix sockets report the overflow uid
        Ok(cred) if cred.uid() == u32::MAX => Ok(None),
        Ok(cred) => Ok(Some(PeerCredentials {
            pid: Some(cred.pid()).filter(|pid| *pid > 0),
            uid: cred.uid(),
            gid: cred.gid(),
        })),
        Err(errno) if is_unsupported(errno) => Ok(None),
        Err(errno) => Err(PeerCredentialsError { errno }),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn read_peer_credentials<F: AsFd>(
    _socket: &F,
) -> Result<Option<PeerCredentials>, PeerCredentialsError> {
    Ok(None)
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn is_unsupported(errno: Errno) -> bool {
    matches!(
        errno,
        Errno::ENOSYS | Errno::EPROTONOSUPPORT | Errno::ENOPROTOOPT | Errno::EOPNOTSUPP
    )
}

/// Which local users may talk to the agent without credentials.
///
/// Root and the agent's own effective user are privileged: they may also
/// inspect state and administer. Extra trusted UIDs only get pool access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrustPolicy {
    effective_uid: u32,
    trusted_uids: BTreeSet<u32>,
    enabled: bool,
}

impl LocalTrustPolicy {
    pub fn new(effective_uid: u32) -> Self {
        Self {
            effective_uid,
            trusted_uids: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Policy for the current process's effective user.
    pub fn current() -> Self {
        Self::new(nix::unistd::geteuid().as_raw())
    }

    /// Policy that authorizes no peer by UID.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0)
        }
    }

    pub fn with_trusted_uids(mut self, uids: impl IntoIterator<Item = u32>) -> Self {
        self.trusted_uids.extend(uids);
        self
    }

    pub fn effective_uid(&self) -> u32 {
        self.effective_uid
    }

    pub fn is_privileged(&self, uid: u32) -> bool {
        self.enabled && (uid == 0 || uid == self.effective_uid)
    }

    pub fn authorizes(&self, uid: u32) -> bool {
        self.is_privileged(uid) || (self.enabled && self.trusted_uids.contains(&uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy() {
        let policy = LocalTrustPolicy::new(1000).with_trusted_uids([2000]);

        assert!(policy.is_privileged(0));
        assert!(policy.is_privileged(1000));
        assert!(!policy.is_privileged(2000));

        assert!(policy.authorizes(0));
        assert!(policy.authorizes(1000));
        assert!(policy.authorizes(2000));
        assert!(!policy.authorizes(3000));
    }

    #[test]
    fn test_disabled_policy() {
        let policy = LocalTrustPolicy::disabled().with_trusted_uids([2000]);
        assert!(!policy.authorizes(0));
        assert!(!policy.authorizes(2000));
        assert!(!policy.is_privileged(0));
    }

    #[test]
    fn test_current_policy_trusts_self() {
        let policy = LocalTrustPolicy::current();
        assert!(policy.is_privileged(policy.effective_uid()));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_read_peer_credentials_socketpair() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let creds = read_peer_credentials(&a).unwrap().unwrap();
        assert_eq!(creds.uid, nix::unistd::geteuid().as_raw());
        assert_eq!(creds.pid, Some(std::process::id() as i32));
    }

    #[test]
    fn test_unsupported_errnos() {
        assert!(is_unsupported(Errno::ENOSYS));
        assert!(is_unsupported(Errno::EPROTONOSUPPORT));
        assert!(!is_unsupported(Errno::EBADF));
    }
}
