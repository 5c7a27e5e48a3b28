//! Pluggable session cache backends

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, Result, User};

/// Backend selected by the session mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// In-process map
    Memory,
    /// Shared remote cache
    Redis,
}

impl FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "map" | "memory" => Ok(CacheMode::Memory),
            "redis" => Ok(CacheMode::Redis),
            other => Err(Error::UnknownSessionMode(other.to_string())),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::Memory => f.write_str("memory"),
            CacheMode::Redis => f.write_str("redis"),
        }
    }
}

/// Token-keyed storage of user snapshots.
///
/// Values always come back as owned [`User`] copies. `ttl` of `None` keeps an
/// entry until it is removed or the cache is cleared.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Mode name as requested at initialization
    fn mode(&self) -> &str;

    /// True when the last backend operation failed
    fn has_error(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<User>>;

    async fn set(&self, key: &str, user: &User, ttl: Option<Duration>) -> Result<()>;

    async fn contains(&self, key: &str) -> Result<bool>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Number of live entries
    async fn count(&self) -> Result<i64>;

    async fn clear(&self) -> Result<()>;

    async fn close(&self);
}
