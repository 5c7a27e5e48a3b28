//! Explicit wiring of registry, session store and token minter

use std::path::Path;

use gatekeep_users_core::{SessionStore, TokenMinter, User};
use tracing::{debug, info};

use crate::config::GatekeepConfig;
use crate::logging::init_logging;
use crate::provider::ProviderBackends;
use crate::registry::{Credentials, ProviderRegistry};
use crate::{AuthError, Result};

/// Outcome of a session login
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLogin {
    pub token: String,
    pub user: User,
}

/// Everything a request handler needs to authenticate callers.
///
/// Built once at startup and shared (typically behind an `Arc`).
pub struct AuthContext {
    registry: ProviderRegistry,
    sessions: SessionStore,
    tokens: Option<TokenMinter>,
}

impl AuthContext {
    pub fn new(registry: ProviderRegistry, sessions: SessionStore, tokens: Option<TokenMinter>) -> Self {
        Self {
            registry,
            sessions,
            tokens,
        }
    }

    /// Build the registry (loading `providers_file` when set), connect the
    /// session store and set up the optional token minter
    pub async fn from_config(config: &GatekeepConfig, backends: ProviderBackends) -> Result<Self> {
        let mut registry = ProviderRegistry::with_backends(backends);
        if let Some(path) = &config.providers_file {
            registry.load_file(path).await?;
        }

        let sessions = SessionStore::new();
        if !sessions.init_from(&config.session).await {
            return Err(AuthError::Initialization(format!(
                "session store ({}) is unavailable",
                config.session.mode
            )));
        }

        let tokens = config.jwt.clone().map(TokenMinter::new).transpose()?;

        info!(
            "AUTH: context ready ({} providers, sessions={}, tokens={})",
            registry.len(),
            sessions.mode(),
            tokens.as_ref().map_or("off", |t| t.algorithm().as_str())
        );
        Ok(Self::new(registry, sessions, tokens))
    }

    /// Process startup: read the configuration file, install logging from
    /// its `[log]` section, then build the context
    pub async fn start(path: impl AsRef<Path>, backends: ProviderBackends) -> Result<Self> {
        let config = GatekeepConfig::from_file(path.as_ref())?;
        if !init_logging(&config.log)? {
            debug!("AUTH: logging was configured by the host application");
        }
        Self::from_config(&config, backends).await
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tokens(&self) -> Option<&TokenMinter> {
        self.tokens.as_ref()
    }

    fn minter(&self) -> Result<&TokenMinter> {
        self.tokens
            .as_ref()
            .ok_or_else(|| AuthError::Config("bearer tokens are not configured".to_string()))
    }

    async fn bind_session(&self, user: User, presented: Option<&str>) -> Result<SessionLogin> {
        let token = self.sessions.login(presented, user.clone()).await.ok_or_else(|| {
            AuthError::Users(gatekeep_users_core::Error::SessionBackend(
                "session write failed".to_string(),
            ))
        })?;
        debug!("AUTH: session {} opened for '{}'", token, user.login);
        Ok(SessionLogin { token, user })
    }

    /// Authenticate with a password provider and bind the user to a session
    pub async fn login_session(
        &self,
        code: &str,
        credentials: &Credentials,
        presented_token: Option<&str>,
    ) -> Result<SessionLogin> {
        let user = self.registry.auth_user(code, credentials).await?;
        self.bind_session(user, presented_token).await
    }

    /// Complete an OAuth callback and bind the user to a session
    pub async fn login_oauth_session(
        &self,
        code: &str,
        authorization_code: &str,
        presented_token: Option<&str>,
    ) -> Result<SessionLogin> {
        let user = self.registry.oauth_callback(code, authorization_code).await?;
        self.bind_session(user, presented_token).await
    }

    /// Authenticate with a password provider and issue a bearer token
    pub async fn login_bearer(&self, code: &str, credentials: &Credentials) -> Result<String> {
        let minter = self.minter()?;
        let user = self.registry.auth_user(code, credentials).await?;
        Ok(minter.issue(&user, minter.issuer())?)
    }

    /// Resolve a bearer token
    pub fn verify_bearer(&self, token: &str) -> Result<User> {
        Ok(self.minter()?.verify(token)?)
    }

    pub async fn current_user(&self, token: &str) -> Option<User> {
        self.sessions.lookup(token).await
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.logout(token).await
    }

    pub async fn close(&self) {
        self.registry.close().await;
        self.sessions.close().await;
    }
}
