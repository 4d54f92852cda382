//! Revocation registry for logged-out session tokens
//!
//! Maps a token's `jti` to its expiry. Entries only need to outlive the token
//! they revoke, so [`RevocationRegistry::purge_expired`] drops every entry
//! whose expiry has passed and a background sweeper calls it periodically.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

/// Process-wide denylist of revoked token IDs
#[derive(Debug, Default)]
pub struct RevocationRegistry {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevocationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token ID until `expires_at`
    ///
    /// Idempotent: revoking an ID twice keeps the later expiry.
    pub fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(jti.to_string())
            .and_modify(|existing| {
                if expires_at > *existing {
                    *existing = expires_at;
                }
            })
            .or_insert(expires_at);
    }

    /// Check whether a token ID has been revoked
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }

    /// Remove entries whose token expired at or before `now`
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of revoked IDs held
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is revoked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every revocation
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Purge expired revocations every `every` until shutdown is signalled
pub fn spawn_sweeper(
    registry: Arc<RevocationRegistry>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "Starting revocation sweeper");
        let mut ticker = interval_at(Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Revocation sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let purged = registry.purge_expired(Utc::now());
                    if purged > 0 {
                        debug!(purged, remaining = registry.len(), "Purged expired revocations");
                    }
                }
            }
        }
    })
}
