//! Configuration for users-core

use serde::Deserialize;
pub use crate::jwt::JwtConfig;

/// Session store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cache backend: `map`, `memory` or `redis`
    pub mode: String,
    /// Session lifetime in seconds, 0 keeps sessions until cleared
    pub expiry_time: u64,
    pub redis: RedisConfig,
}

/// Remote cache connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: "memory".to_string(),
            expiry_time: 3600,
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            max_connections: 16,
        }
    }
}
