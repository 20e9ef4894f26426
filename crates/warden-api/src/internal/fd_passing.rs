//! File descriptor passing over Unix sockets.
//!
//! Both sides negotiate with length-prefixed array messages before and after
//! the descriptor itself travels as `SCM_RIGHTS` ancillary data:
//!
//! ```text
//! receiver                    sender
//!    | --- ["pass IO"] ----------> |
//!    | <-- 1 byte + SCM_RIGHTS --- |
//!    | --- ["got IO"] -----------> |
//! ```
//!
//! An array message is a big-endian `u16` payload length followed by the
//! items, each terminated by a NUL byte.

use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

use super::deadline::{Deadline, DeadlineExceeded};

const PASS_IO: &str = "pass IO";
const GOT_IO: &str = "got IO";

#[derive(Debug, thiserror::Error)]
pub enum FdPassingError {
    #[error(transparent)]
    TimedOut(#[from] DeadlineExceeded),

    #[error("connection closed during file descriptor passing")]
    UnexpectedEof,

    #[error("unexpected negotiation message {0:?}")]
    UnexpectedMessage(Vec<String>),

    #[error("no file descriptor received")]
    NoDescriptor,

    #[error("unread data on the socket before file descriptor passing")]
    UnexpectedData,

    #[error("negotiation message too large ({0} bytes)")]
    MessageTooLarge(usize),

    #[error("socket error: {0}")]
    Socket(#[from] Errno),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Ask the peer for a descriptor and wait for it.
pub fn read_file_descriptor_with_negotiation(
    socket: &UnixStream,
    deadline: &Deadline,
) -> Result<OwnedFd, FdPassingError> {
    write_array_message(socket, &[PASS_IO], deadline)?;
    let fd = read_file_descriptor(socket, deadline)?;
    write_array_message(socket, &[GOT_IO], deadline)?;
    Ok(fd)
}

/// Hand `fd` to a peer that asks for it.
pub fn write_file_descriptor_with_negotiation(
    socket: &UnixStream,
    fd: BorrowedFd<'_>,
    deadline: &Deadline,
) -> Result<(), FdPassingError> {
    expect_array_message(socket, PASS_IO, deadline)?;
    write_file_descriptor(socket, fd, deadline)?;
    expect_array_message(socket, GOT_IO, deadline)
}

fn read_file_descriptor(socket: &UnixStream, deadline: &Deadline) -> Result<OwnedFd, FdPassingError> {
    socket.set_read_timeout(Some(deadline.remaining()?))?;

    let mut marker = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut marker)];
    let mut cmsg_buffer = nix::cmsg_space!(RawFd);
    let received: Vec<RawFd> = loop {
        match recvmsg::<()>(
            socket.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::empty(),
        ) {
            Ok(msg) => {
                if msg.bytes == 0 {
                    return Err(FdPassingError::UnexpectedEof);
                }
                let mut fds = Vec::new();
                for cmsg in msg.cmsgs()? {
                    if let ControlMessageOwned::ScmRights(rights) = cmsg {
                        fds.extend(rights);
                    }
                }
                break fds;
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => return Err(deadline.exceeded().into()),
            Err(errno) => return Err(errno.into()),
        }
    };

    // Extra descriptors are closed when the iterator drops them.
    adopt_received(received)
        .into_iter()
        .next()
        .ok_or(FdPassingError::NoDescriptor)
}

#[allow(unsafe_code)]
fn adopt_received(fds: Vec<RawFd>) -> Vec<OwnedFd> {
    fds.into_iter()
        // SAFETY: SCM_RIGHTS installs fresh descriptors in this process that
        // nothing else owns yet.
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
        .collect()
}

fn write_file_descriptor(
    socket: &UnixStream,
    fd: BorrowedFd<'_>,
    deadline: &Deadline,
) -> Result<(), FdPassingError> {
    socket.set_write_timeout(Some(deadline.remaining()?))?;

    let fds = [fd.as_raw_fd()];
    let iov = [IoSlice::new(&[0u8])];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    loop {
        match sendmsg::<()>(socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => return Err(deadline.exceeded().into()),
            Err(errno) => return Err(errno.into()),
        }
    }
}

fn write_array_message(
    socket: &UnixStream,
    items: &[&str],
    deadline: &Deadline,
) -> Result<(), FdPassingError> {
    let payload_len: usize = items.iter().map(|item| item.len() + 1).sum();
    let len = u16::try_from(payload_len).map_err(|_| FdPassingError::MessageTooLarge(payload_len))?;

    let mut frame = Vec::with_capacity(2 + payload_len);
    frame.extend_from_slice(&len.to_be_bytes());
    for item in items {
        frame.extend_from_slice(item.as_bytes());
        frame.push(0);
    }

    socket.set_write_timeout(Some(deadline.remaining()?))?;
    let mut writer = socket;
    writer
        .write_all(&frame)
        .map_err(|err| io_failure(err, deadline))
}

fn read_array_message(socket: &UnixStream, deadline: &Deadline) -> Result<Vec<String>, FdPassingError> {
    socket.set_read_timeout(Some(deadline.remaining()?))?;
    let mut reader = socket;

    let mut header = [0u8; 2];
    reader
        .read_exact(&mut header)
        .map_err(|err| io_failure(err, deadline))?;
    let mut payload = vec![0u8; usize::from(u16::from_be_bytes(header))];
    reader
        .read_exact(&mut payload)
        .map_err(|err| io_failure(err, deadline))?;

    let Some(terminated) = payload.strip_suffix(&[0]) else {
        return Ok(if payload.is_empty() {
            Vec::new()
        } else {
            vec![String::from_utf8_lossy(&payload).into_owned()]
        });
    };
    Ok(terminated
        .split(|byte| *byte == 0)
        .map(|item| String::from_utf8_lossy(item).into_owned())
        .collect())
}

fn expect_array_message(
    socket: &UnixStream,
    expected: &str,
    deadline: &Deadline,
) -> Result<(), FdPassingError> {
    let items = read_array_message(socket, deadline)?;
    if items.len() == 1 && items[0] == expected {
        Ok(())
    } else {
        Err(FdPassingError::UnexpectedMessage(items))
    }
}

fn io_failure(err: io::Error, deadline: &Deadline) -> FdPassingError {
    if Deadline::is_timeout(&err) {
        deadline.exceeded().into()
    } else if err.kind() == io::ErrorKind::UnexpectedEof {
        FdPassingError::UnexpectedEof
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File, OpenOptions};
    use std::os::fd::AsFd;
    use std::thread;
    use std::time::Duration;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[test]
    fn test_array_message_framing() {
        let (a, b) = UnixStream::pair().unwrap();
        write_array_message(&a, &["pass IO", "extra"], &deadline()).unwrap();

        let mut raw = [0u8; 16];
        (&b).read_exact(&mut raw).unwrap();
        assert_eq!(&raw[..2], &[0, 14]);
        assert_eq!(&raw[2..], b"pass IO\0extra\0");
    }

    #[test]
    fn test_array_message_roundtrip_items() {
        let (a, b) = UnixStream::pair().unwrap();
        write_array_message(&a, &["got IO"], &deadline()).unwrap();
        assert_eq!(read_array_message(&b, &deadline()).unwrap(), vec!["got IO"]);
    }

    #[test]
    fn test_descriptor_handover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handed-over.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();

        let (receiver, sender) = UnixStream::pair().unwrap();
        let sending = thread::spawn(move || {
            write_file_descriptor_with_negotiation(&sender, file.as_fd(), &deadline())
        });

        let received = read_file_descriptor_with_negotiation(&receiver, &deadline()).unwrap();
        sending.join().unwrap().unwrap();

        let mut received = File::from(received);
        received.write_all(b"through the socket\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "through the socket\n");
    }

    #[test]
    fn test_sender_rejects_unexpected_request() {
        let (a, b) = UnixStream::pair().unwrap();
        write_array_message(&a, &["give me"], &deadline()).unwrap();

        let file = tempfile::tempfile().unwrap();
        let err = write_file_descriptor_with_negotiation(&b, file.as_fd(), &deadline()).unwrap_err();
        assert!(matches!(err, FdPassingError::UnexpectedMessage(items) if items == vec!["give me"]));
    }

    #[test]
    fn test_receiver_sees_eof() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let err = read_file_descriptor_with_negotiation(&a, &deadline()).unwrap_err();
        assert!(matches!(
            err,
            FdPassingError::UnexpectedEof | FdPassingError::Io(_) | FdPassingError::Socket(_)
        ));
    }

    #[test]
    fn test_receiver_times_out() {
        let (a, _b) = UnixStream::pair().unwrap();
        let short = Deadline::after(Duration::from_millis(50));
        let err = read_file_descriptor_with_negotiation(&a, &short).unwrap_err();
        assert!(matches!(err, FdPassingError::TimedOut(_)));
    }
}
