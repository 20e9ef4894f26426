use std::io;
use std::time::{Duration, Instant};

/// Time budget shared by every step of one exchange.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
    budget: Duration,
}

/// The budget of a [`Deadline`] ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {budget:?}")]
pub struct DeadlineExceeded {
    pub budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left, or an error once the deadline has passed.
    pub fn remaining(&self) -> Result<Duration, DeadlineExceeded> {
        let remaining = self.expires_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            Err(self.exceeded())
        } else {
            Ok(remaining)
        }
    }

    pub fn exceeded(&self) -> DeadlineExceeded {
        DeadlineExceeded {
            budget: self.budget,
        }
    }

    /// Whether `err` is a socket timeout caused by this deadline.
    pub fn is_timeout(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }
}
