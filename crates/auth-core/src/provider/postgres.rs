//! PostgreSQL credential store
//!
//! Expected table layout:
//!
//! ```sql
//! CREATE TABLE auth_user (
//!     id       UUID PRIMARY KEY,
//!     login    TEXT NOT NULL UNIQUE,
//!     email    TEXT NOT NULL DEFAULT '',
//!     pwd      TEXT NOT NULL,
//!     groups   TEXT[] NOT NULL DEFAULT '{}',
//!     disabled BOOLEAN NOT NULL DEFAULT FALSE
//! );
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::relational::{CredentialConnector, CredentialRecord, CredentialStore};
use crate::config::DatabaseSettings;
use crate::{AuthError, Result};

static TABLE_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").ok());

fn valid_table_name(table: &str) -> bool {
    TABLE_NAME.as_ref().map_or(false, |re| re.is_match(table))
}

/// Connects a pooled [`PgCredentialStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl CredentialConnector for PgConnector {
    async fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn CredentialStore>> {
        Ok(Arc::new(PgCredentialStore::connect(settings).await?))
    }
}

#[derive(sqlx::FromRow, Debug)]
struct CredentialRow {
    id: Uuid,
    login: String,
    email: String,
    pwd: String,
    groups: Vec<String>,
    disabled: bool,
}

impl From<CredentialRow> for CredentialRecord {
    fn from(row: CredentialRow) -> Self {
        CredentialRecord {
            id: row.id,
            login: row.login,
            email: row.email,
            password_hash: row.pwd,
            groups: row.groups,
            disabled: row.disabled,
        }
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    query: String,
}

impl PgCredentialStore {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        if !valid_table_name(&settings.table) {
            return Err(AuthError::Config(format!("Invalid table name '{}'", settings.table)));
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.url)
            .await?;
        info!("PG pool ready ({} connections max)", settings.max_connections);

        Ok(Self {
            pool,
            query: format!(
                "SELECT id, login, email, pwd, groups, disabled FROM {} WHERE login = $1 LIMIT 2",
                settings.table
            ),
        })
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<CredentialRecord>> {
        let mut rows: Vec<CredentialRow> = sqlx::query_as(&self.query)
            .bind(login)
            .fetch_all(&self.pool)
            .await?;

        debug!("PG: {} row(s) for '{}'", rows.len(), login);
        if rows.len() > 1 {
            warn!("PG: login '{}' is not unique", login);
            return Ok(None);
        }
        Ok(rows.pop().map(CredentialRecord::from))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
