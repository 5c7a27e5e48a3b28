//! Provider registry
//!
//! Maps provider codes to constructed, initialized providers. Population
//! happens at startup through [`ProviderRegistry::load`]; afterwards the
//! registry is read-only and shared by every request.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use chrono::Utc;
use gatekeep_users_core::User;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{parse_provider_list, ProviderConfig};
use crate::provider::{AuthProvider, Provider, ProviderBackends};
use crate::{AuthError, Result};

/// Login/password pair submitted to a password provider
#[derive(Clone, Default)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Read `login` and `password` from form or query parameters
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            login: params.get("login").cloned().unwrap_or_default(),
            password: params.get("password").cloned().unwrap_or_default(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// UI-facing description of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub code: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub display_name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize)]
struct Listing<'a> {
    count: usize,
    data: BTreeMap<&'a str, &'a ProviderSummary>,
}

fn render_listing(summaries: &[ProviderSummary]) -> Result<String> {
    let listing = Listing {
        count: summaries.len(),
        data: summaries.iter().map(|s| (s.code.as_str(), s)).collect(),
    };
    serde_json::to_string(&listing).map_err(|e| AuthError::Users(e.into()))
}

pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
    backends: ProviderBackends,
}

impl ProviderRegistry {
    /// Empty registry using the production backends
    pub fn new() -> Self {
        Self::with_backends(ProviderBackends::default())
    }

    pub fn with_backends(backends: ProviderBackends) -> Self {
        Self {
            providers: BTreeMap::new(),
            backends,
        }
    }

    /// Construct and initialize one provider.
    ///
    /// Returns `false` when the type is unknown or initialization fails; the
    /// provider is then left out and the reason logged.
    pub async fn add_provider(&mut self, code: &str, config: ProviderConfig) -> bool {
        debug!("AUTH: add ({}:{}) '{}'", code, config.type_tag, config.display_name);

        let provider = match Provider::from_config(code, config, &self.backends) {
            Ok(provider) => provider,
            Err(e) => {
                error!("AUTH: can't create '{}': {}", code, e);
                return false;
            }
        };

        if let Err(e) = provider.init().await {
            error!("AUTH: can't init '{}': {}", code, e);
            return false;
        }

        if let Some(previous) = self.providers.insert(code.to_string(), provider) {
            warn!("AUTH: '{}' replaced an existing provider", code);
            if let Err(e) = previous.close().await {
                warn!("AUTH: closing replaced '{}' failed: {}", code, e);
            }
        }
        true
    }

    /// Load a YAML provider list.
    ///
    /// Returns the number of entries parsed, including disabled and failed
    /// ones. Malformed input is an error and leaves the registry unchanged.
    pub async fn load(&mut self, bytes: &[u8]) -> Result<usize> {
        let entries = parse_provider_list(bytes)?;
        let parsed = entries.len();

        for (code, config) in entries {
            if config.disabled {
                debug!("AUTH: '{}' is disabled", code);
                continue;
            }
            self.add_provider(&code, config).await;
        }

        info!("AUTH: {} provider(s) parsed, {} active", parsed, self.providers.len());
        Ok(parsed)
    }

    pub async fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AuthError::Config(format!("{}: {}", path.display(), e)))?;
        self.load(&bytes).await
    }

    pub fn get(&self, code: &str) -> Option<&Provider> {
        self.providers.get(code)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn has_oauth(&self) -> bool {
        self.providers.values().any(Provider::is_oauth)
    }

    /// Authenticate through a password provider.
    pub async fn auth_user(&self, code: &str, credentials: &Credentials) -> Result<User> {
        let provider = self.get(code).ok_or_else(|| {
            error!("AUTH: provider '{}' not found", code);
            AuthError::ProviderNotFound(code.to_string())
        })?;

        if !provider.supports_password_login() {
            return Err(AuthError::Unsupported(code.to_string()));
        }

        if !provider.connected() {
            warn!("AUTH: provider '{}' is not connected", code);
            return Err(AuthError::Rejected);
        }

        let mut user = provider
            .login(&credentials.login, &credentials.password)
            .await
            .ok_or(AuthError::Rejected)?;

        user.auth_code = code.to_string();
        user.time_login = Some(Utc::now());
        info!("AUTH: '{}' authenticated by '{}'", user.login, code);
        Ok(user)
    }

    /// Complete an OAuth callback through an OAuth provider
    pub async fn oauth_callback(&self, code: &str, authorization_code: &str) -> Result<User> {
        let provider = self
            .get(code)
            .ok_or_else(|| AuthError::ProviderNotFound(code.to_string()))?;

        if !provider.is_oauth() {
            return Err(AuthError::Unsupported(code.to_string()));
        }

        let mut user = provider.exchange_code(authorization_code).await?;
        user.auth_code = code.to_string();
        user.time_login = Some(Utc::now());
        info!("AUTH: '{}' authenticated by '{}'", user.login, code);
        Ok(user)
    }

    fn summaries(&self, oauth: bool) -> Vec<ProviderSummary> {
        self.providers
            .iter()
            .filter(|(_, p)| p.enabled())
            .filter(|(_, p)| {
                if oauth {
                    p.is_oauth()
                } else {
                    p.supports_password_login()
                }
            })
            .map(|(code, p)| ProviderSummary {
                code: code.clone(),
                type_tag: p.type_tag().to_string(),
                display_name: p.display_name().to_string(),
                image: p.image().to_string(),
                url: if oauth { p.auth_url().map(str::to_string) } else { None },
            })
            .collect()
    }

    /// Enabled providers accepting a login/password pair, ordered by code
    pub fn password_providers(&self) -> Vec<ProviderSummary> {
        self.summaries(false)
    }

    /// Enabled OAuth providers with their authorization URLs, ordered by code
    pub fn oauth_providers(&self) -> Vec<ProviderSummary> {
        self.summaries(true)
    }

    pub fn password_providers_json(&self) -> Result<String> {
        render_listing(&self.password_providers())
    }

    pub fn oauth_providers_json(&self) -> Result<String> {
        render_listing(&self.oauth_providers())
    }

    /// Close every provider; failures are logged and do not stop the rest
    pub async fn close(&self) {
        for (code, provider) in &self.providers {
            if let Err(e) = provider.close().await {
                warn!("AUTH: closing '{}' failed: {}", code, e);
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
