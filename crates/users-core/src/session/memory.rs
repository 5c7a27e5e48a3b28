//! In-process session cache

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::cache::SessionCache;
use crate::{Result, User};

struct Entry {
    user: User,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Writes between two full sweeps of expired entries
pub const SWEEP_EVERY: usize = 256;

/// `DashMap`-backed cache.
///
/// Expired entries are dropped on access and by a sweep that runs every
/// [`SWEEP_EVERY`] writes.
pub struct MemoryCache {
    mode: String,
    entries: DashMap<String, Entry>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Entries held, live or not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    fn mode(&self) -> &str {
        &self.mode
    }

    fn has_error(&self) -> bool {
        false
    }

    async fn get(&self, key: &str) -> Result<Option<User>> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.user.clone()));

        match found {
            Some(Some(user)) => Ok(Some(user)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, user: &User, ttl: Option<Duration>) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                user: user.clone(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let swept = self.sweep();
            if swept > 0 {
                debug!("SESSION: swept {} expired entries", swept);
            }
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        self.sweep();
        Ok(self.entries.len() as i64)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn close(&self) {
        self.entries.clear();
    }
}
