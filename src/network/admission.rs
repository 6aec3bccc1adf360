//! Admission Control
//!
//! Gates new connections on two limits:
//! - `max_users`: concurrent sessions across all peers
//! - `rate_limit`: admitted connections per peer IP within a sliding window
//!
//! ## Concurrency:
//! - `active`: Atomic counter shared with every outstanding permit
//! - `history`: Mutex-protected, touched only by the acceptor thread in
//!   practice, but kept `&self` so tests can drive it from anywhere

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{Config, RateLimit};

/// Why a connection was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("server is full ({max} concurrent users)")]
    TooManyUsers { max: usize },

    #[error("rate limit exceeded ({max} connections per {}s)", window.as_secs())]
    RateLimited { max: usize, window: Duration },
}

/// Tracks live sessions and recent connections
pub struct Admission {
    max_users: usize,
    rate_limit: RateLimit,

    /// Sessions currently holding a permit
    active: Arc<AtomicUsize>,

    /// Admission times per peer, oldest first
    history: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl Admission {
    pub fn new(max_users: usize, rate_limit: RateLimit) -> Self {
        Self {
            max_users,
            rate_limit,
            active: Arc::new(AtomicUsize::new(0)),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_users, config.rate_limit)
    }

    /// Number of sessions currently admitted
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Try to admit a connection from `ip`
    pub fn try_admit(&self, ip: IpAddr) -> Result<AdmissionPermit, Rejection> {
        self.try_admit_at(ip, Instant::now())
    }

    /// Try to admit a connection from `ip` as of `now`
    ///
    /// Refused attempts do not count toward the rate window.
    pub fn try_admit_at(&self, ip: IpAddr, now: Instant) -> Result<AdmissionPermit, Rejection> {
        let window = self.rate_limit.window;
        let mut history = self.history.lock();

        for times in history.values_mut() {
            while times
                .front()
                .is_some_and(|t| now.saturating_duration_since(*t) >= window)
            {
                times.pop_front();
            }
        }
        history.retain(|_, times| !times.is_empty());

        let recent = history.get(&ip).map_or(0, VecDeque::len);
        if recent >= self.rate_limit.max_connections {
            return Err(Rejection::RateLimited {
                max: self.rate_limit.max_connections,
                window,
            });
        }

        let max = self.max_users;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| Rejection::TooManyUsers { max })?;

        history.entry(ip).or_default().push_back(now);

        Ok(AdmissionPermit {
            active: Arc::clone(&self.active),
        })
    }
}

/// Held by a session for its whole lifetime; frees the user slot on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
