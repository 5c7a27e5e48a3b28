//! Redis-backed session cache
//!
//! Snapshots are stored as JSON under `session:<token>`. Counting and clearing
//! walk the prefix with `SCAN` so other data in the same database is untouched.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use tracing::{debug, error, info};

use super::cache::SessionCache;
use crate::{Error, Result, User};

const KEY_PREFIX: &str = "session:";
const SCAN_BATCH: usize = 500;

pub struct RedisCache {
    mode: String,
    pool: Pool,
    error: AtomicBool,
}

impl RedisCache {
    /// Build a pool of at most `max_connections` and check it answers `PING`
    pub async fn connect(url: &str, max_connections: usize) -> Result<Self> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(PoolConfig::new(max_connections.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::SessionBackend(format!("Failed to create pool for {}: {}", url, e)))?;

        let mut conn = pool.get().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("SESSION: redis answered {}", pong);
        info!("SESSION: redis connected ({} connections max)", max_connections);

        Ok(Self {
            mode: "redis".to_string(),
            pool,
            error: AtomicBool::new(false),
        })
    }

    fn key(token: &str) -> String {
        format!("{}{}", KEY_PREFIX, token)
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("SESSION: redis operation failed: {}", e);
        }
        self.error.store(result.is_err(), Ordering::Relaxed);
        result
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Every session key, each once even if `SCAN` repeats it
    async fn scan_keys(&self, conn: &mut Connection) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        self.scan_batches(conn, |keys| found.extend(keys)).await?;
        Ok(found)
    }

    async fn scan_batches(&self, conn: &mut Connection, mut visit: impl FnMut(Vec<String>)) -> Result<()> {
        let pattern = format!("{}*", KEY_PREFIX);
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            visit(keys);
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl SessionCache for RedisCache {
    fn mode(&self) -> &str {
        &self.mode
    }

    fn has_error(&self) -> bool {
        self.error.load(Ordering::Relaxed)
    }

    async fn get(&self, key: &str) -> Result<Option<User>> {
        let result: Result<Option<User>> = async {
            let mut conn = self.conn().await?;
            let raw: Option<String> = conn.get(Self::key(key)).await?;
            raw.map(|raw| User::from_json(&raw)).transpose()
        }
        .await;
        self.track(result)
    }

    async fn set(&self, key: &str, user: &User, ttl: Option<Duration>) -> Result<()> {
        let result: Result<()> = async {
            let raw = user.to_json()?;
            let mut conn = self.conn().await?;
            match ttl {
                Some(ttl) => {
                    let _: () = conn.set_ex(Self::key(key), raw, ttl.as_secs().max(1)).await?;
                }
                None => {
                    let _: () = conn.set(Self::key(key), raw).await?;
                }
            }
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let result: Result<bool> = async {
            let mut conn = self.conn().await?;
            let exists: bool = conn.exists(Self::key(key)).await?;
            Ok(exists)
        }
        .await;
        self.track(result)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let result: Result<()> = async {
            let mut conn = self.conn().await?;
            let _: () = conn.del(Self::key(key)).await?;
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn count(&self) -> Result<i64> {
        let result: Result<i64> = async {
            let mut conn = self.conn().await?;
            Ok(self.scan_keys(&mut conn).await?.len() as i64)
        }
        .await;
        self.track(result)
    }

    async fn clear(&self) -> Result<()> {
        let result: Result<()> = async {
            let mut conn = self.conn().await?;
            let found: Vec<String> = self.scan_keys(&mut conn).await?.into_iter().collect();
            for batch in found.chunks(SCAN_BATCH) {
                let _: () = conn.del(batch).await?;
            }
            debug!("SESSION: cleared {} redis sessions", found.len());
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn close(&self) {
        self.pool.close();
        info!("SESSION: redis pool closed");
    }
}
