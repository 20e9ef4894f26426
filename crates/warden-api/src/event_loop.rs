//! Single-threaded event loop that background work posts completions to.
//!
//! Handlers and completion callbacks all run on the task that drives
//! [`EventLoop`], so request state is never touched from two threads at once.

use std::fmt;

use tokio::sync::mpsc;

/// Work scheduled onto the event loop.
pub type LoopTask = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle for posting tasks to an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<LoopTask>,
}

impl LoopHandle {
    /// Schedule `task` to run on the loop. Returns `false`, dropping the
    /// task, if the loop is gone.
    pub fn run_later<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_run_later(task).is_ok()
    }

    /// Like [`run_later`](Self::run_later), but hands the task back when the
    /// loop is gone instead of dropping it on the calling thread.
    pub fn try_run_later<F>(&self, task: F) -> Result<(), LoopTask>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|rejected| rejected.0)
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Receiving side; runs posted tasks in submission order.
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<LoopTask>,
    handle: LoopHandle,
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: LoopHandle { tx },
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Wait for the next task and run it.
    ///
    /// The loop keeps a handle of its own, so this never runs dry.
    pub async fn turn(&mut self) {
        if let Some(task) = self.rx.recv().await {
            task();
        }
    }

    /// Run every task already queued without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop").finish_non_exhaustive()
    }
}
