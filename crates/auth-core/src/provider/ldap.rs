//! ldap3-backed directory connections

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, Scope, SearchEntry};
use tracing::{debug, warn};

use super::directory::{DirectoryConnection, DirectoryConnector, DirectoryEntry};
use crate::Result;

/// Opens plain `ldap://` connections
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DirectoryConnection>> {
        let url = format!("ldap://{}:{}", host, port);
        let (conn, ldap) = LdapConnAsync::new(&url).await?;

        let driver_url = url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection {} terminated: {}", driver_url, e);
            }
        });

        debug!("LDAP connection to {} established", url);
        Ok(Box::new(LdapConnection { ldap }))
    }
}

struct LdapConnection {
    ldap: Ldap,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn bind(&self, dn: &str, password: &str) -> Result<()> {
        let mut ldap = self.ldap.clone();
        ldap.simple_bind(dn, password).await?.success()?;
        Ok(())
    }

    async fn search(&self, base_dn: &str, filter: &str, attrs: &[&str]) -> Result<Vec<DirectoryEntry>> {
        let mut ldap = self.ldap.clone();
        let (entries, _) = ldap
            .search(base_dn, Scope::Subtree, filter, attrs.to_vec())
            .await?
            .success()?;

        Ok(entries
            .into_iter()
            .map(|raw| {
                let entry = SearchEntry::construct(raw);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let mut ldap = self.ldap.clone();
        ldap.unbind().await?;
        Ok(())
    }
}
