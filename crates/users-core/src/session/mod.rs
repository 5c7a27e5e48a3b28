//! Server-held sessions keyed by opaque tokens
//!
//! A session is created for every first contact as an anonymous placeholder
//! and later bound to a user on login. Logout rebinds the token to the
//! placeholder instead of deleting it so the client keeps its cookie.
//!
//! Backend failures never escape as errors: they are logged, reported through
//! `bool`/`Option` results and reflected by [`SessionStore::has_error`].

pub mod cache;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use cache::{CacheMode, SessionCache};
pub use memory::MemoryCache;
pub use redis::RedisCache;

use crate::config::SessionConfig;
use crate::User;

/// Attempts at finding an unused token before the last candidate is accepted
pub const MAX_TOKEN_ATTEMPTS: usize = 10;

/// Outcome of [`SessionStore::start_http_session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub token: String,
    /// True when a new anonymous session was recorded
    pub created: bool,
}

/// Token-keyed session storage over a pluggable cache.
///
/// Safe to share between request handlers; writes to the same token are
/// last-writer-wins.
pub struct SessionStore {
    cache: RwLock<Option<Arc<dyn SessionCache>>>,
    expiry: RwLock<Option<Duration>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// An uninitialized store: mode `undefined`, count `-1`, in error
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
            expiry: RwLock::new(None),
        }
    }

    /// Wrap an already connected cache
    pub fn with_cache(cache: Arc<dyn SessionCache>, expiry_seconds: u64) -> Self {
        let store = Self::new();
        store.install(cache, expiry_seconds);
        store
    }

    /// Select and connect the backend named by `mode`.
    ///
    /// `expiry_seconds` of 0 keeps sessions until cleared. Returns false when
    /// the mode is unknown or the backend cannot be reached.
    pub async fn init(&self, mode: &str, expiry_seconds: u64, backend_url: &str, max_connections: usize) -> bool {
        debug!("SESSION: init (mode={}, expiry={}s)", mode, expiry_seconds);

        let cache: Arc<dyn SessionCache> = match mode.parse::<CacheMode>() {
            Ok(CacheMode::Memory) => Arc::new(MemoryCache::new(mode)),
            Ok(CacheMode::Redis) => match RedisCache::connect(backend_url, max_connections).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    error!("SESSION: init({}) error: {}", mode, e);
                    return false;
                }
            },
            Err(e) => {
                error!("SESSION: init({}) error: {}", mode, e);
                return false;
            }
        };

        self.install(cache, expiry_seconds);
        info!("SESSION: mode is {}", mode);
        !self.has_error()
    }

    pub async fn init_from(&self, config: &SessionConfig) -> bool {
        self.init(
            &config.mode,
            config.expiry_time,
            &config.redis.url,
            config.redis.max_connections,
        )
        .await
    }

    fn install(&self, cache: Arc<dyn SessionCache>, expiry_seconds: u64) {
        *self.expiry.write() = (expiry_seconds > 0).then(|| Duration::from_secs(expiry_seconds));
        *self.cache.write() = Some(cache);
    }

    fn cache(&self) -> Option<Arc<dyn SessionCache>> {
        self.cache.read().clone()
    }

    /// Session lifetime, `None` when sessions do not expire
    pub fn expiry(&self) -> Option<Duration> {
        *self.expiry.read()
    }

    pub fn mode(&self) -> String {
        self.cache()
            .map(|cache| cache.mode().to_string())
            .unwrap_or_else(|| "undefined".to_string())
    }

    pub fn has_error(&self) -> bool {
        self.cache().map_or(true, |cache| cache.has_error())
    }

    /// Live sessions, `-1` without a backend
    pub async fn count(&self) -> i64 {
        let Some(cache) = self.cache() else {
            return -1;
        };
        match cache.count().await {
            Ok(count) => count,
            Err(e) => {
                error!("SESSION: count failed: {}", e);
                -1
            }
        }
    }

    /// Drop every session
    pub async fn clear(&self) {
        if let Some(cache) = self.cache() {
            if let Err(e) = cache.clear().await {
                error!("SESSION: clear failed: {}", e);
            }
        }
    }

    /// Alias kept for callers that think in terms of destroying sessions
    pub async fn destroy_all(&self) {
        self.clear().await
    }

    /// Release the backend; the store returns to the uninitialized state
    pub async fn close(&self) {
        let cache = self.cache.write().take();
        if let Some(cache) = cache {
            cache.close().await;
            info!("SESSION: closed ({})", cache.mode());
        }
    }

    /// Fresh time-ordered token, regenerated on collision.
    ///
    /// After [`MAX_TOKEN_ATTEMPTS`] collisions the last candidate is used
    /// anyway, so uniqueness is probabilistic.
    async fn generate_token(&self, cache: Option<&Arc<dyn SessionCache>>) -> String {
        let mut token = Uuid::now_v7().to_string();
        if let Some(cache) = cache {
            for _ in 0..MAX_TOKEN_ATTEMPTS {
                match cache.contains(&token).await {
                    Ok(false) => break,
                    Ok(true) => {
                        warn!("SESSION: token collision, regenerating");
                        token = Uuid::now_v7().to_string();
                    }
                    Err(e) => {
                        error!("SESSION: collision check failed: {}", e);
                        break;
                    }
                }
            }
        }
        debug!("SESSION: generated token {}", token);
        token
    }

    /// Reuse a presented token that is still tracked, otherwise drop whatever
    /// is left of it and mint a new token bound to an anonymous placeholder.
    pub async fn start_http_session(&self, presented: Option<&str>) -> SessionStart {
        let cache = self.cache();

        if let (Some(token), Some(cache)) = (presented.filter(|t| !t.is_empty()), cache.as_ref()) {
            match cache.get(token).await {
                Ok(Some(_)) => {
                    debug!("SESSION: reusing token {}", token);
                    return SessionStart {
                        token: token.to_string(),
                        created: false,
                    };
                }
                Ok(None) => {
                    debug!("SESSION: presented token {} is not tracked, dropping it", token);
                    if let Err(e) = cache.remove(token).await {
                        error!("SESSION: cannot drop presented token {}: {}", token, e);
                    }
                }
                Err(e) => error!("SESSION: lookup of presented token failed: {}", e),
            }
        }

        let token = self.generate_token(cache.as_ref()).await;
        if let Some(cache) = cache {
            if let Err(e) = cache.set(&token, &User::anonymous(), self.expiry()).await {
                error!("SESSION: cannot record new session: {}", e);
            }
        } else {
            warn!("SESSION: no backend, token {} is not tracked", token);
        }

        SessionStart { token, created: true }
    }

    /// Bind `user` to `token` with a refreshed expiry; mints a token when none
    /// is given. Returns the token used, or `None` if the write failed.
    pub async fn login(&self, token: Option<&str>, mut user: User) -> Option<String> {
        let Some(cache) = self.cache() else {
            error!("SESSION: login without backend");
            return None;
        };

        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self.generate_token(Some(&cache)).await,
        };

        user.time_login = Some(Utc::now());
        match cache.set(&token, &user, self.expiry()).await {
            Ok(()) => {
                debug!("SESSION: user '{}' bound to {}", user.login, token);
                Some(token)
            }
            Err(e) => {
                error!("SESSION: login of '{}' failed: {}", user.login, e);
                None
            }
        }
    }

    /// Rebind `token` to the anonymous placeholder
    pub async fn logout(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let Some(cache) = self.cache() else {
            return false;
        };
        match cache.set(token, &User::default(), self.expiry()).await {
            Ok(()) => {
                debug!("SESSION: token {} logged out", token);
                true
            }
            Err(e) => {
                error!("SESSION: logout of {} failed: {}", token, e);
                false
            }
        }
    }

    /// The user bound to `token`; `None` when the token is unknown, expired
    /// or anonymous
    pub async fn lookup(&self, token: &str) -> Option<User> {
        if token.is_empty() {
            return None;
        }
        let cache = self.cache()?;
        match cache.get(token).await {
            Ok(Some(user)) if !user.is_anonymous() => Some(user),
            Ok(Some(_)) => {
                debug!("SESSION: token {} is anonymous", token);
                None
            }
            Ok(None) => None,
            Err(e) => {
                error!("SESSION: lookup of {} failed: {}", token, e);
                None
            }
        }
    }

    /// True while the token is tracked, anonymous or not
    pub async fn contains(&self, token: &str) -> bool {
        let Some(cache) = self.cache() else {
            return false;
        };
        cache.contains(token).await.unwrap_or_else(|e| {
            error!("SESSION: check of {} failed: {}", token, e);
            false
        })
    }
}
