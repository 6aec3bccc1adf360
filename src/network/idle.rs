//! Idle-Timeout Monitor
//!
//! Tracks how long a session has been waiting for its next command.
//!
//! The monitor itself is passive: the session arms it when it starts waiting,
//! asks `remaining()` before every read, and uses the answer as the socket
//! read timeout. A peer that never sends anything is therefore dropped at the
//! deadline, not at the next byte. Frame transfers are not covered; those are
//! bounded by `Config::transfer_timeout` instead.

use std::time::{Duration, Instant};

/// Smallest read timeout handed to the socket (zero is rejected by std)
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Per-session inactivity deadline
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    timeout: Duration,
    armed_at: Instant,
}

impl IdleMonitor {
    /// Create a monitor, armed as of now
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed_at: Instant::now(),
        }
    }

    /// Restart the deadline from now
    pub fn arm(&mut self) {
        self.armed_at = Instant::now();
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since the monitor was last armed
    pub fn elapsed(&self) -> Duration {
        self.armed_at.elapsed()
    }

    /// Time left before the deadline, or None once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .checked_sub(self.elapsed())
            .filter(|left| !left.is_zero())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Read timeout to use for the next wait, or None if already expired
    pub fn next_read_timeout(&self) -> Option<Duration> {
        self.remaining().map(|left| left.max(MIN_READ_TIMEOUT))
    }
}
