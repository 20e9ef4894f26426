use std::io;

use super::deadline::DeadlineExceeded;
use super::fd_passing::FdPassingError;

/// Failures of an internal request. Each one completes the request with the
/// internal-error status.
#[derive(Debug, thiserror::Error)]
pub enum InternalRequestError {
    #[error("invalid agent address '{0}'")]
    InvalidAddress(String),

    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    TimedOut(#[from] DeadlineExceeded),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("response line longer than {0} bytes")]
    LineTooLong(usize),

    #[error("response body larger than {0} bytes")]
    BodyTooLarge(usize),

    #[error("file descriptor passing needs a Unix socket connection")]
    NotUnixSocket,

    #[error("file descriptor passing failed: {0}")]
    FdPassing(#[from] FdPassingError),
}
