//! Sliding-window rate limiter for login attempts
//!
//! Tracks attempt timestamps per client IP inside a trailing window. Once the
//! window holds the maximum number of attempts, further attempts are denied
//! without being recorded. State is in-memory only and resets on restart.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum number of attempts inside the window
    pub max_attempts: usize,

    /// Trailing window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter keyed by client IP
///
/// Entries for idle clients are never proactively expired; memory grows with
/// the number of distinct clients over the process lifetime.
pub struct RateLimiter {
    config: RateLimitConfig,
    attempts: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new rate limiter with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Check whether an attempt from this client is allowed
    ///
    /// Prunes attempts older than the window, then denies without recording
    /// when the window is already full; otherwise records the attempt.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let mut attempts = self.attempts.lock().unwrap();
        let now = Instant::now();
        let window = self.config.window;

        let entry = attempts.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= self.config.max_attempts {
            return false;
        }

        entry.push(now);
        true
    }

    /// Number of attempts currently inside the window for this client
    pub fn attempt_count(&self, ip: IpAddr) -> usize {
        let attempts = self.attempts.lock().unwrap();
        let now = Instant::now();

        attempts
            .get(&ip)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.config.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of clients with recorded attempts
    pub fn tracked_clients_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}
