//! Credential-table provider
//!
//! Password hashes are Argon2id PHC strings. Verification runs on the blocking
//! pool. Unknown logins are checked against a fixed dummy hash so they cost the
//! same as a wrong password.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use gatekeep_users_core::User;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AuthProvider;
use crate::config::{DatabaseSettings, ProviderConfig};
use crate::{AuthError, Result};

/// One row of the credential table
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub groups: Vec<String>,
    pub disabled: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exactly one matching row, or `None`
    async fn find_by_login(&self, login: &str) -> Result<Option<CredentialRecord>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait CredentialConnector: Send + Sync {
    async fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn CredentialStore>>;
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl HashParams {
    fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| AuthError::Config(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a password into a PHC string for the credential table
pub fn hash_password(password: &str, params: &HashParams) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::Config(format!("Invalid salt: {}", e)))?;
    params
        .hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Config(format!("Password hashing failed: {}", e)))
}

static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("gatekeep-dummy-password", &HashParams::default()).ok());

fn verify_hash(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("PG: stored password hash is not a PHC string: {}", e);
            false
        }
    }
}

pub struct RelationalProvider {
    config: ProviderConfig,
    database: DatabaseSettings,
    connector: Arc<dyn CredentialConnector>,
    store: RwLock<Option<Arc<dyn CredentialStore>>>,
    connected: AtomicBool,
}

impl RelationalProvider {
    pub fn new(config: ProviderConfig, connector: Arc<dyn CredentialConnector>) -> Result<Self> {
        let database = config.database.clone().ok_or_else(|| {
            AuthError::Config(format!("Provider '{}' has no database section", config.code))
        })?;
        Ok(Self {
            config,
            database,
            connector,
            store: RwLock::new(None),
            connected: AtomicBool::new(false),
        })
    }

    fn store(&self) -> Option<Arc<dyn CredentialStore>> {
        self.store.read().clone()
    }

    async fn try_login(&self, login: &str, password: &str) -> Result<User> {
        let store = self.store().ok_or_else(|| AuthError::Database("not connected".to_string()))?;
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::Rejected);
        }

        let record = store.find_by_login(login).await?;

        let (phc, record) = match record {
            Some(record) => (Some(record.password_hash.clone()), Some(record)),
            None => (DUMMY_HASH.clone(), None),
        };

        let password = password.to_string();
        let valid = match phc {
            Some(phc) => tokio::task::spawn_blocking(move || verify_hash(&password, &phc))
                .await
                .map_err(|e| AuthError::Database(format!("verification task failed: {}", e)))?,
            None => false,
        };

        let record = match record {
            Some(record) if valid => record,
            Some(_) => {
                debug!("PG: wrong password for '{}'", login);
                return Err(AuthError::Rejected);
            }
            None => {
                debug!("PG: user '{}' not found", login);
                return Err(AuthError::Rejected);
            }
        };

        if record.disabled {
            warn!("PG: user '{}' is disabled", login);
            return Err(AuthError::Rejected);
        }

        Ok(User {
            id: record.id,
            login: record.login,
            email: record.email,
            groups: record.groups,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AuthProvider for RelationalProvider {
    async fn init(&self) -> Result<()> {
        let store = self.connector.connect(&self.database).await.map_err(|e| {
            error!("PG ({}): {}", self.config.code, e);
            AuthError::Initialization(format!("{}: {}", self.config.code, e))
        })?;
        *self.store.write() = Some(store);
        self.connected.store(true, Ordering::SeqCst);
        info!("PG provider '{}' connected", self.config.code);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let store = self.store.write().take();
        match store {
            Some(store) => store.close().await,
            None => Ok(()),
        }
    }

    fn type_tag(&self) -> &str {
        &self.config.type_tag
    }

    fn display_name(&self) -> &str {
        &self.config.display_name
    }

    fn image(&self) -> &str {
        &self.config.image
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn enabled(&self) -> bool {
        !self.config.disabled
    }

    fn supports_password_login(&self) -> bool {
        true
    }

    async fn login(&self, login: &str, password: &str) -> Option<User> {
        match self.try_login(login, password).await {
            Ok(user) => Some(user),
            Err(AuthError::Rejected) => None,
            Err(e) => {
                error!("PG: login of '{}' failed: {}", login, e);
                None
            }
        }
    }
}
