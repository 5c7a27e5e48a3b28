//! Error types for authentication operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {0} does not support password login")]
    Unsupported(String),

    /// Uniform answer for bad credentials and unknown or ambiguous identities
    #[error("Authentication rejected")]
    Rejected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown provider type '{type_tag}' for '{code}'")]
    UnknownProviderType { code: String, type_tag: String },

    #[error("Provider initialization failed: {0}")]
    Initialization(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error(transparent)]
    Users(#[from] gatekeep_users_core::Error),

    #[error(transparent)]
    Token(#[from] gatekeep_users_core::TokenError),
}

impl From<ldap3::LdapError> for AuthError {
    fn from(e: ldap3::LdapError) -> Self {
        AuthError::Directory(e.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::OAuth(e.to_string())
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(e: config::ConfigError) -> Self {
        AuthError::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for AuthError {
    fn from(e: serde_yaml::Error) -> Self {
        AuthError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
