//! Error types for users-core

use thiserror::Error;

/// Errors raised by the session store and its backends
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown session mode: {0}")]
    UnknownSessionMode(String),

    #[error("Session backend error: {0}")]
    SessionBackend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Errors raised while issuing or verifying bearer tokens
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Unsupported signing algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("No signing key configured")]
    MissingKey,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Token lifetime of {0}s is out of range")]
    InvalidLifetime(u64),

    #[error("Token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// Signature mismatch, expiry or a token minted for another algorithm
    #[error("Token rejected: {0}")]
    Unauthorized(String),

    /// Structurally broken token or claims
    #[error("Malformed token: {0}")]
    BadRequest(String),
}

impl TokenError {
    /// Coarse HTTP status class for the failure
    pub fn status_code(&self) -> u16 {
        match self {
            TokenError::Unauthorized(_) | TokenError::MissingKey => 401,
            TokenError::BadRequest(_) => 400,
            _ => 500,
        }
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::SessionBackend(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for Error {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        Error::SessionBackend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub type TokenResult<T> = std::result::Result<T, TokenError>;
