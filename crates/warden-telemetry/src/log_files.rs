//! Reopenable log outputs.
//!
//! An agent writes to a main log file and, optionally, to a separate
//! file-descriptor log file. Both can be re-opened in place after rotation or
//! replaced by a descriptor handed over by the supervising process.
//!
//! Writers only take a read lock on the sink, so worker threads keep logging
//! while the event loop swaps the underlying file under the write lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Default)]
struct SinkState {
    path: Option<PathBuf>,
    file: Option<File>,
}

/// A log output whose backing file can be swapped at runtime.
///
/// Clones share the same output. With no file installed, writes go to stderr.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    state: Arc<RwLock<SinkState>>,
}

impl LogSink {
    /// Sink that writes to stderr until a file is installed.
    pub fn stderr() -> Self {
        Self::default()
    }

    /// Sink appending to `path`, created if missing.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let sink = Self::default();
        sink.set_path(path)?;
        Ok(sink)
    }

    /// Path of the current output, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.state.read().path.clone()
    }

    /// Whether writes currently go to a file rather than stderr.
    pub fn has_file(&self) -> bool {
        self.state.read().file.is_some()
    }

    /// Open `path` in append mode and make it the output.
    ///
    /// On failure the previous output stays in place.
    pub fn set_path(&self, path: impl Into<PathBuf>) -> io::Result<()> {
        let path = path.into();
        let file = open_append(&path)?;
        let mut state = self.state.write();
        state.path = Some(path);
        state.file = Some(file);
        Ok(())
    }

    /// Re-open the current path, picking up a rotated file.
    pub fn reopen(&self) -> io::Result<()> {
        let Some(path) = self.path() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no log file configured",
            ));
        };
        self.set_path(path)
    }

    /// Make a duplicate of `fd` the output and record `path` as its name.
    ///
    /// The caller keeps ownership of `fd` and is expected to close it.
    pub fn install_fd(&self, path: impl Into<PathBuf>, fd: BorrowedFd<'_>) -> io::Result<()> {
        let file = File::from(fd.try_clone_to_owned()?);
        let mut state = self.state.write();
        state.path = Some(path.into());
        state.file = Some(file);
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer handed to the fmt layer for a single event.
pub struct SinkWriter<'a> {
    state: RwLockReadGuard<'a, SinkState>,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state.file.as_ref() {
            Some(mut file) => file.write(buf),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.state.file.as_ref() {
            Some(mut file) => file.flush(),
            None => io::stderr().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            state: self.state.read(),
        }
    }
}

/// The log outputs of one agent process.
#[derive(Debug, Clone, Default)]
pub struct LogFiles {
    main: LogSink,
    fd_log: Option<LogSink>,
}

impl LogFiles {
    pub fn new(main: LogSink, fd_log: Option<LogSink>) -> Self {
        Self { main, fd_log }
    }

    /// Open the configured files. A missing main log file means stderr.
    pub fn open(log_file: Option<&Path>, fd_log_file: Option<&Path>) -> io::Result<Self> {
        let main = match log_file {
            Some(path) => LogSink::open(path)?,
            None => LogSink::stderr(),
        };
        let fd_log = fd_log_file.map(LogSink::open).transpose()?;
        Ok(Self { main, fd_log })
    }

    /// The main log output.
    pub fn main(&self) -> &LogSink {
        &self.main
    }

    /// The file-descriptor log output, when configured.
    pub fn fd_log(&self) -> Option<&LogSink> {
        self.fd_log.as_ref()
    }
}
