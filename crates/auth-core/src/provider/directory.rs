//! Directory-service provider
//!
//! Holds two independent connections. The service connection is bound as the
//! configured service account and runs searches under a read/write lock, so
//! searches proceed concurrently. The verification connection is used only to
//! bind as the end user; its exclusive lock serializes password checks without
//! touching search traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_users_core::User;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::AuthProvider;
use crate::config::{LdapSettings, ProviderConfig};
use crate::{AuthError, Result};

const USER_ATTRS: &[&str] = &["dn", "mail", "givenName", "uid", "cn"];
const GROUP_ATTRS: &[&str] = &["cn"];

/// One search result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// First value of an attribute, empty when absent
    pub fn attr(&self, name: &str) -> &str {
        self.attrs
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A live directory session
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    async fn bind(&self, dn: &str, password: &str) -> Result<()>;

    /// Subtree search below `base_dn`
    async fn search(&self, base_dn: &str, filter: &str, attrs: &[&str]) -> Result<Vec<DirectoryEntry>>;

    async fn close(&self) -> Result<()>;
}

/// Opens directory sessions
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DirectoryConnection>>;
}

/// Escape a value for use inside a search filter
pub fn escape_filter_value(value: &str) -> String {
    ldap3::ldap_escape(value).into_owned()
}

fn render_filter(template: &str, login: &str) -> String {
    template.replace("%s", &escape_filter_value(login))
}

pub struct DirectoryProvider {
    config: ProviderConfig,
    ldap: LdapSettings,
    connector: Arc<dyn DirectoryConnector>,
    search_conn: RwLock<Option<Box<dyn DirectoryConnection>>>,
    bind_conn: Mutex<Option<Box<dyn DirectoryConnection>>>,
    connected: AtomicBool,
}

impl DirectoryProvider {
    pub fn new(config: ProviderConfig, connector: Arc<dyn DirectoryConnector>) -> Result<Self> {
        let ldap = config.ldap.clone().ok_or_else(|| {
            AuthError::Config(format!("Provider '{}' has no ldap section", config.code))
        })?;
        Ok(Self {
            config,
            ldap,
            connector,
            search_conn: RwLock::new(None),
            bind_conn: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    fn address(&self) -> String {
        format!("{}:{}", self.ldap.host, self.ldap.port)
    }

    async fn search(&self, filter: &str, attrs: &[&str]) -> Result<Vec<DirectoryEntry>> {
        let guard = self.search_conn.read().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| AuthError::Directory(format!("{} not connected", self.address())))?;
        debug!("LDAP: search ({})", filter);
        conn.search(&self.ldap.base_dn, filter, attrs).await
    }

    async fn groups_of(&self, login: &str) -> Result<Vec<String>> {
        let filter = render_filter(&self.ldap.filter_group, login);
        let entries = self.search(&filter, GROUP_ATTRS).await?;
        Ok(entries
            .iter()
            .map(|entry| entry.attr("cn").to_string())
            .filter(|cn| !cn.is_empty())
            .collect())
    }

    async fn verify_password(&self, dn: &str, password: &str) -> Result<()> {
        let guard = self.bind_conn.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| AuthError::Directory(format!("{} not connected", self.address())))?;
        conn.bind(dn, password).await
    }

    fn display_name_of(&self, entry: &DirectoryEntry) -> String {
        let first = self.ldap.attr_first_name.as_deref().map(|a| entry.attr(a)).unwrap_or("");
        let last = self.ldap.attr_last_name.as_deref().map(|a| entry.attr(a)).unwrap_or("");
        let name = format!("{} {}", first, last).trim().to_string();
        if name.is_empty() {
            entry.attr("cn").to_string()
        } else {
            name
        }
    }

    async fn try_login(&self, login: &str, password: &str) -> Result<User> {
        if !self.connected() {
            return Err(AuthError::Directory(format!("{} not connected", self.address())));
        }
        if login.is_empty() || password.is_empty() {
            // An empty password would be an anonymous bind
            return Err(AuthError::Rejected);
        }

        let filter = render_filter(&self.ldap.filter_user, login);
        let entries = self.search(&filter, USER_ATTRS).await?;
        if entries.len() != 1 {
            warn!(
                "LDAP: user '{}' does not exist or too many entries returned ({})",
                login,
                entries.len()
            );
            return Err(AuthError::Rejected);
        }
        let entry = &entries[0];

        let groups = self.groups_of(login).await?;
        debug!("LDAP: user '{}' has groups {:?}", login, groups);

        self.verify_password(&entry.dn, password).await.map_err(|e| {
            warn!("LDAP: bind as {} failed: {}", entry.dn, e);
            AuthError::Rejected
        })?;

        Ok(User {
            id: User::stable_id(login),
            login: login.to_string(),
            email: entry.attr(&self.ldap.attr_email).to_string(),
            display_name: self.display_name_of(entry),
            groups,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AuthProvider for DirectoryProvider {
    async fn init(&self) -> Result<()> {
        let address = self.address();

        let bind_conn = self.connector.connect(&self.ldap.host, self.ldap.port).await.map_err(|e| {
            error!("LDAP ({}): {}", address, e);
            AuthError::Initialization(format!("{}: {}", address, e))
        })?;

        let search_conn = self.connector.connect(&self.ldap.host, self.ldap.port).await.map_err(|e| {
            error!("LDAP ({}): {}", address, e);
            AuthError::Initialization(format!("{}: {}", address, e))
        })?;

        search_conn
            .bind(&self.ldap.bind_user, &self.ldap.bind_pwd)
            .await
            .map_err(|e| {
                error!("LDAP BIND ({}): {}", self.ldap.bind_user, e);
                AuthError::Initialization(format!("service bind as {}: {}", self.ldap.bind_user, e))
            })?;

        *self.bind_conn.lock().await = Some(bind_conn);
        *self.search_conn.write().await = Some(search_conn);
        self.connected.store(true, Ordering::SeqCst);

        info!("LDAP {} connected", address);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);

        let bind_conn = self.bind_conn.lock().await.take();
        let search_conn = self.search_conn.write().await.take();

        let mut first_error = None;
        for conn in [bind_conn, search_conn].into_iter().flatten() {
            if let Err(e) = conn.close().await {
                warn!("LDAP ({}): close failed: {}", self.address(), e);
                first_error.get_or_insert(e);
            }
        }

        info!("LDAP {} disconnected", self.address());
        first_error.map_or(Ok(()), Err)
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
            Ok(user) => {
                debug!("LDAP: user '{}' authenticated", login);
                Some(user)
            }
            Err(AuthError::Rejected) => None,
            Err(e) => {
                error!("LDAP: login of '{}' failed: {}", login, e);
                None
            }
        }
    }
}
