//! Provider list and application configuration
//!
//! The provider list is a YAML mapping of provider code to [`ProviderConfig`]:
//!
//! ```yaml
//! corp.ldap:
//!   type: openldap
//!   display_name: Corporate directory
//!   ldap:
//!     host: ldap.corp.local
//!     port: 389
//!     base_dn: dc=corp,dc=local
//!     bind_user: cn=admin,dc=corp,dc=local
//!     bind_pwd: secret
//!     filter_user: "(&(objectClass=organizationalPerson)(uid=%s))"
//!     filter_group: "(memberUid=%s)"
//! mail.ru:
//!   type: mail.ru
//!   image: mail-ru.png
//!   oauth:
//!     client_id: "11111"
//!     secret: "22222"
//!     redirect: https://auth.example.org/oauth/mailru/callback
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use gatekeep_users_core::{JwtConfig, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::logging::LogSettings;
use crate::Result;

/// One entry of the provider list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Unique key; defaults to the entry's map key
    pub code: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub display_name: String,
    pub image: String,
    pub disabled: bool,
    pub ldap: Option<LdapSettings>,
    pub database: Option<DatabaseSettings>,
    pub oauth: Option<OAuthSettings>,
}

/// Directory connection and search settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapSettings {
    pub host: String,
    pub port: u16,
    pub base_dn: String,
    pub bind_user: String,
    pub bind_pwd: String,
    /// User search filter, `%s` is replaced by the escaped login
    pub filter_user: String,
    /// Group search filter, `%s` is replaced by the escaped login
    pub filter_group: String,
    pub attr_email: String,
    pub attr_first_name: Option<String>,
    pub attr_last_name: Option<String>,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 389,
            base_dn: String::new(),
            bind_user: String::new(),
            bind_pwd: String::new(),
            filter_user: "(uid=%s)".to_string(),
            filter_group: "(memberUid=%s)".to_string(),
            attr_email: "mail".to_string(),
            attr_first_name: None,
            attr_last_name: None,
        }
    }
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_dn", &self.base_dn)
            .field("bind_user", &self.bind_user)
            .field("bind_pwd", &"<redacted>")
            .field("filter_user", &self.filter_user)
            .field("filter_group", &self.filter_group)
            .finish()
    }
}

/// Credential table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub table: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            table: "auth_user".to_string(),
            max_connections: 10,
        }
    }
}

/// OAuth client registration; endpoints default to the vendor's
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    pub secret: String,
    pub redirect: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub profile_url: Option<String>,
    pub scopes: Vec<String>,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .field("redirect", &self.redirect)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Parse a provider list, ordered by code.
///
/// Malformed YAML is a configuration error; an empty document is an empty list.
pub fn parse_provider_list(bytes: &[u8]) -> Result<Vec<(String, ProviderConfig)>> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let entries: BTreeMap<String, ProviderConfig> = serde_yaml::from_slice(bytes)?;
    Ok(entries
        .into_iter()
        .map(|(code, mut config)| {
            if config.code.is_empty() {
                config.code = code.clone();
            }
            (code, config)
        })
        .collect())
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatekeepConfig {
    pub session: SessionConfig,
    pub jwt: Option<JwtConfig>,
    /// YAML provider list loaded into the registry at startup
    pub providers_file: Option<PathBuf>,
    pub log: LogSettings,
}

impl GatekeepConfig {
    /// Load from a file (format by extension) with `GATEKEEP__SECTION__KEY`
    /// environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("GATEKEEP").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
