//! # Auth-Core - Pluggable identity providers for gatekeep
//!
//! Authenticates users against interchangeable backends and hands the
//! resulting [`User`](gatekeep_users_core::User) to the session store or the
//! token minter from `gatekeep-users-core`.
//!
//! - Directory login over LDAP (search, group lookup, bind verification)
//! - Credential-table login over PostgreSQL with Argon2 hashes
//! - OAuth2 delegation to mail.ru and yandex.ru
//! - A [`ProviderRegistry`] loaded from a YAML provider list
//! - An [`AuthContext`] wiring registry, sessions and bearer tokens
//!
//! ```no_run
//! use gatekeep_auth_core::{AuthContext, Credentials, ProviderBackends};
//!
//! # async fn run() -> gatekeep_auth_core::Result<()> {
//! let ctx = AuthContext::start("gatekeep.toml", ProviderBackends::default()).await?;
//!
//! let login = ctx
//!     .login_session("corp.ldap", &Credentials::new("u.user", "secret"), None)
//!     .await?;
//! let user = ctx.current_user(&login.token).await;
//! assert_eq!(user.map(|u| u.login), Some(login.user.login));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod provider;
pub mod registry;

pub use config::{parse_provider_list, DatabaseSettings, GatekeepConfig, LdapSettings, OAuthSettings, ProviderConfig};
pub use context::{AuthContext, SessionLogin};
pub use error::{AuthError, Result};
pub use logging::{init_logging, LogFormat, LogSettings};
pub use provider::{AuthProvider, Provider, ProviderBackends, ProviderKind};
pub use registry::{Credentials, ProviderRegistry, ProviderSummary};
