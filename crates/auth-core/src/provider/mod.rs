//! Identity providers
//!
//! Every configured backend is one [`Provider`] variant behind the
//! [`AuthProvider`] capability set. Variants that lack a capability answer
//! with a uniform refusal (`None` for password login, [`AuthError::Unsupported`]
//! for OAuth calls).

pub mod directory;
pub mod ldap;
pub mod oauth;
pub mod postgres;
pub mod relational;

use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_users_core::User;

pub use directory::{DirectoryConnection, DirectoryConnector, DirectoryEntry, DirectoryProvider};
pub use ldap::LdapConnector;
pub use oauth::{OAuthProvider, OAuthVendor};
pub use postgres::PgConnector;
pub use relational::{
    hash_password, CredentialConnector, CredentialRecord, CredentialStore, HashParams, RelationalProvider,
};

use crate::config::ProviderConfig;
use crate::{AuthError, Result};

/// Capability set shared by all providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Connect to the backend and prepare derived state
    async fn init(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn type_tag(&self) -> &str;

    fn display_name(&self) -> &str;

    fn image(&self) -> &str;

    /// Backend reachable and initialized
    fn connected(&self) -> bool;

    fn enabled(&self) -> bool;

    fn supports_password_login(&self) -> bool {
        false
    }

    /// Resolve a login/password pair. Every failure is `None`; the reason is
    /// only logged.
    async fn login(&self, login: &str, password: &str) -> Option<User>;

    /// Authorization redirect for OAuth providers
    fn auth_url(&self) -> Option<&str> {
        None
    }

    /// Exchange an authorization code and resolve the profile
    async fn exchange_code(&self, _code: &str) -> Result<User> {
        Err(AuthError::Unsupported(self.type_tag().to_string()))
    }

    /// Resolve the profile behind an access token
    async fn fetch_profile(&self, _access_token: &str) -> Result<User> {
        Err(AuthError::Unsupported(self.type_tag().to_string()))
    }
}

/// Backend family named by a type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Directory,
    Relational,
    OAuth(OAuthVendor),
}

impl ProviderKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "openldap" | "ldap" => Some(ProviderKind::Directory),
            "pg" | "postgres" => Some(ProviderKind::Relational),
            "mail.ru" | "mailru" => Some(ProviderKind::OAuth(OAuthVendor::MailRu)),
            "yandex.ru" | "yandex" => Some(ProviderKind::OAuth(OAuthVendor::Yandex)),
            _ => None,
        }
    }
}

/// Connectors used to reach provider backends
#[derive(Clone)]
pub struct ProviderBackends {
    pub directory: Arc<dyn DirectoryConnector>,
    pub credentials: Arc<dyn CredentialConnector>,
    pub http: reqwest::Client,
}

impl Default for ProviderBackends {
    fn default() -> Self {
        Self {
            directory: Arc::new(LdapConnector),
            credentials: Arc::new(PgConnector),
            http: reqwest::Client::new(),
        }
    }
}

/// A constructed provider
pub enum Provider {
    Directory(DirectoryProvider),
    Relational(RelationalProvider),
    OAuth(OAuthProvider),
}

impl Provider {
    /// Build the variant matching `config.type_tag`; nothing is connected yet
    pub fn from_config(code: &str, config: ProviderConfig, backends: &ProviderBackends) -> Result<Self> {
        let kind = ProviderKind::from_tag(&config.type_tag).ok_or_else(|| AuthError::UnknownProviderType {
            code: code.to_string(),
            type_tag: config.type_tag.clone(),
        })?;

        Ok(match kind {
            ProviderKind::Directory => {
                Provider::Directory(DirectoryProvider::new(config, backends.directory.clone())?)
            }
            ProviderKind::Relational => {
                Provider::Relational(RelationalProvider::new(config, backends.credentials.clone())?)
            }
            ProviderKind::OAuth(vendor) => {
                Provider::OAuth(OAuthProvider::new(vendor, config, backends.http.clone())?)
            }
        })
    }

    fn inner(&self) -> &dyn AuthProvider {
        match self {
            Provider::Directory(p) => p,
            Provider::Relational(p) => p,
            Provider::OAuth(p) => p,
        }
    }

    pub fn is_oauth(&self) -> bool {
        matches!(self, Provider::OAuth(_))
    }
}

#[async_trait]
impl AuthProvider for Provider {
    async fn init(&self) -> Result<()> {
        self.inner().init().await
    }

    async fn close(&self) -> Result<()> {
        self.inner().close().await
    }

    fn type_tag(&self) -> &str {
        self.inner().type_tag()
    }

    fn display_name(&self) -> &str {
        self.inner().display_name()
    }

    fn image(&self) -> &str {
        self.inner().image()
    }

    fn connected(&self) -> bool {
        self.inner().connected()
    }

    fn enabled(&self) -> bool {
        self.inner().enabled()
    }

    fn supports_password_login(&self) -> bool {
        self.inner().supports_password_login()
    }

    async fn login(&self, login: &str, password: &str) -> Option<User> {
        self.inner().login(login, password).await
    }

    fn auth_url(&self) -> Option<&str> {
        self.inner().auth_url()
    }

    async fn exchange_code(&self, code: &str) -> Result<User> {
        self.inner().exchange_code(code).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<User> {
        self.inner().fetch_profile(access_token).await
    }
}
