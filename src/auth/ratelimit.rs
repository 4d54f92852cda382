//! Per-address login rate limiting
//!
//! Failed logins are tracked per client IP in a sliding window. Once an
//! address reaches `max_failures` inside the window it is blocked for
//! `block_duration`, and every login attempt from it is refused until the
//! block lapses. A successful login clears the address.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LoginRateLimitConfig;

/// Limits applied by [`RateLimiter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Failed attempts inside one window that trigger a block
    pub max_failures: u32,

    /// Sliding window length
    pub window: Duration,

    /// How long a blocked address stays blocked
    pub block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&LoginRateLimitConfig::default())
    }
}

impl From<&LoginRateLimitConfig> for RateLimitConfig {
    fn from(config: &LoginRateLimitConfig) -> Self {
        Self {
            max_failures: config.max_attempts,
            window: Duration::from_secs(config.window_secs),
            block_duration: Duration::from_secs(config.block_duration_secs),
        }
    }
}

#[derive(Debug, Default)]
struct AddressState {
    failures: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl AddressState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        if matches!(self.blocked_until, Some(until) if now >= until) {
            self.blocked_until = None;
        }
    }

    fn is_idle(&self) -> bool {
        self.failures.is_empty() && self.blocked_until.is_none()
    }
}

/// Thread-safe login limiter keyed by client address
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<IpAddr, AddressState>>,
}

impl RateLimiter {
    /// Create a limiter with the given limits
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record a failed login
    ///
    /// Returns `true` if the address is blocked after this failure.
    pub fn record_failure(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let state = entries.entry(ip).or_default();
        state.prune(now, self.config.window);

        if state.blocked_until.is_some() {
            return true;
        }

        state.failures.push_back(now);
        if state.failures.len() >= self.config.max_failures as usize {
            state.blocked_until = Some(now + self.config.block_duration);
            state.failures.clear();
            tracing::warn!(
                client_ip = %ip,
                block_secs = self.config.block_duration.as_secs(),
                "Too many failed logins, blocking address"
            );
            return true;
        }

        false
    }

    /// Remaining block time, or `None` if the address may attempt a login
    pub fn blocked_for(&self, ip: IpAddr) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&ip)
            .and_then(|state| state.blocked_until)
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Check if an address is currently blocked
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocked_for(ip).is_some()
    }

    /// Forget an address (after a successful login)
    pub fn reset(&self, ip: IpAddr) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ip);
    }

    /// Failures recorded for an address inside the current window
    pub fn failure_count(&self, ip: IpAddr) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&ip).map_or(0, |state| {
            state
                .failures
                .iter()
                .filter(|at| now.duration_since(**at) < self.config.window)
                .count()
        })
    }

    /// Drop addresses with no live failures or blocks
    ///
    /// Returns the number of addresses removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, state| {
            state.prune(now, self.config.window);
            !state.is_idle()
        });
        before - entries.len()
    }

    /// Number of addresses currently tracked
    pub fn tracked_ips_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Configured limits
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
