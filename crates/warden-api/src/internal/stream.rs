use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::OwnedFd;

use super::address::AgentStream;
use super::deadline::Deadline;
use super::error::InternalRequestError;
use super::fd_passing::{read_file_descriptor_with_negotiation, FdPassingError};

/// The connection an internal request runs over, as seen by body processors.
///
/// Every read and write is bounded by the request's deadline.
#[derive(Debug)]
pub struct ResponseStream {
    reader: BufReader<AgentStream>,
    deadline: Deadline,
}

impl ResponseStream {
    pub(crate) fn new(stream: AgentStream, deadline: Deadline) -> Self {
        Self {
            reader: BufReader::new(stream),
            deadline,
        }
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), InternalRequestError> {
        let deadline = self.deadline;
        let stream = self.reader.get_mut();
        stream.set_write_timeout(deadline.remaining()?)?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|err| io_failure(err, &deadline))
    }

    /// Read one line including its terminator. At end of stream the line may
    /// be partial or empty.
    pub fn read_line(&mut self, limit: usize) -> Result<Vec<u8>, InternalRequestError> {
        let mut line = Vec::new();
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                return Ok(line);
            }
            let (used, complete) = match available.iter().position(|byte| *byte == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            line.extend_from_slice(&available[..used]);
            self.reader.consume(used);

            if complete {
                return Ok(line);
            }
            if line.len() > limit {
                return Err(InternalRequestError::LineTooLong(limit));
            }
        }
    }

    /// Read until the peer closes the connection.
    pub fn read_to_end(&mut self, limit: usize) -> Result<Vec<u8>, InternalRequestError> {
        let mut body = Vec::new();
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                return Ok(body);
            }
            if body.len() + available.len() > limit {
                return Err(InternalRequestError::BodyTooLarge(limit));
            }
            body.extend_from_slice(available);
            let used = available.len();
            self.reader.consume(used);
        }
    }

    /// Run the receiving side of the descriptor passing negotiation.
    pub fn receive_file_descriptor(&mut self) -> Result<OwnedFd, InternalRequestError> {
        if !self.reader.buffer().is_empty() {
            return Err(FdPassingError::UnexpectedData.into());
        }
        let socket = self
            .reader
            .get_ref()
            .as_unix()
            .ok_or(InternalRequestError::NotUnixSocket)?;
        Ok(read_file_descriptor_with_negotiation(socket, &self.deadline)?)
    }

    fn fill(&mut self) -> Result<&[u8], InternalRequestError> {
        let deadline = self.deadline;
        if self.reader.buffer().is_empty() {
            self.reader
                .get_ref()
                .set_read_timeout(deadline.remaining()?)?;
        }
        loop {
            match self.reader.fill_buf() {
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_failure(err, &deadline)),
            }
        }
        Ok(self.reader.buffer())
    }
}

fn io_failure(err: io::Error, deadline: &Deadline) -> InternalRequestError {
    if Deadline::is_timeout(&err) {
        deadline.exceeded().into()
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn stream_with(data: &[u8]) -> (ResponseStream, UnixStream) {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        theirs.write_all(data).unwrap();
        let stream = ResponseStream::new(
            AgentStream::Unix(ours),
            Deadline::after(Duration::from_secs(5)),
        );
        (stream, theirs)
    }

    #[test]
    fn test_read_lines_then_body() {
        let (mut stream, theirs) = stream_with(b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nbody");
        drop(theirs);

        assert_eq!(stream.read_line(1024).unwrap(), b"HTTP/1.1 200 OK\r\n");
        assert_eq!(stream.read_line(1024).unwrap(), b"A: b\r\n");
        assert_eq!(stream.read_line(1024).unwrap(), b"\r\n");
        assert_eq!(stream.read_to_end(1024).unwrap(), b"body");
        assert_eq!(stream.read_line(1024).unwrap(), b"");
    }

    #[test]
    fn test_partial_line_at_eof() {
        let (mut stream, theirs) = stream_with(b"Partial");
        drop(theirs);
        assert_eq!(stream.read_line(1024).unwrap(), b"Partial");
    }

    #[test]
    fn test_line_limit() {
        let (mut stream, _theirs) = stream_with(&[b'x'; 64]);
        assert!(matches!(
            stream.read_line(16),
            Err(InternalRequestError::LineTooLong(16))
        ));
    }

    #[test]
    fn test_body_limit() {
        let (mut stream, theirs) = stream_with(&[b'x'; 64]);
        drop(theirs);
        assert!(matches!(
            stream.read_to_end(16),
            Err(InternalRequestError::BodyTooLarge(16))
        ));
    }

    #[test]
    fn test_read_times_out() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut stream = ResponseStream::new(
            AgentStream::Unix(ours),
            Deadline::after(Duration::from_millis(50)),
        );
        assert!(matches!(
            stream.read_line(1024),
            Err(InternalRequestError::TimedOut(_))
        ));
    }
}
