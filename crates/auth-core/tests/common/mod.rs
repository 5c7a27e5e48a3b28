//! In-memory backends shared by the auth-core integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_auth_core::config::{DatabaseSettings, LdapSettings, ProviderConfig};
use gatekeep_auth_core::provider::{
    hash_password, CredentialConnector, CredentialRecord, CredentialStore, DirectoryConnection,
    DirectoryConnector, DirectoryEntry, HashParams,
};
use gatekeep_auth_core::{AuthError, ProviderBackends, Result};
use uuid::Uuid;

pub const BASE_DN: &str = "dc=test,dc=dig,dc=center";
pub const SERVICE_DN: &str = "cn=admin,dc=test,dc=dig,dc=center";
pub const SERVICE_PWD: &str = "password";

pub const FAST_HASH: HashParams = HashParams {
    memory_cost_kib: 8,
    time_cost: 1,
    parallelism: 1,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct DirectoryUser {
    dn: String,
    uid: String,
    password: String,
    attrs: HashMap<String, Vec<String>>,
}

/// A tiny directory: people under `ou=People`, posix groups under `ou=Groups`
#[derive(Default)]
pub struct FakeDirectory {
    users: Vec<DirectoryUser>,
    groups: Vec<(String, Vec<String>)>,
    pub refuse_connections: AtomicBool,
    pub fail_group_search: AtomicBool,
    pub connects: AtomicUsize,
    pub user_binds: AtomicUsize,
    pub searches: AtomicUsize,
    pub closed: AtomicUsize,
}

impl FakeDirectory {
    /// `u.user` (member of `Users`) and `j.doe` (member of `Users` and `Admins`)
    pub fn standard() -> Self {
        let mut dir = Self::default();
        dir.add_user("u.user", "123123123", "u.user@test.dig.center", "User", "Test");
        dir.add_user("j.doe", "secret", "j.doe@test.dig.center", "John", "Doe");
        dir.add_group("Users", &["u.user", "j.doe"]);
        dir.add_group("Admins", &["j.doe"]);
        dir
    }

    pub fn add_user(&mut self, uid: &str, password: &str, mail: &str, given_name: &str, surname: &str) {
        let mut attrs = HashMap::new();
        attrs.insert("uid".to_string(), vec![uid.to_string()]);
        attrs.insert("mail".to_string(), vec![mail.to_string()]);
        attrs.insert("givenName".to_string(), vec![given_name.to_string()]);
        attrs.insert("sn".to_string(), vec![surname.to_string()]);
        attrs.insert("cn".to_string(), vec![format!("{} {}", given_name, surname)]);
        self.users.push(DirectoryUser {
            dn: format!("uid={},ou=People,{}", uid, BASE_DN),
            uid: uid.to_string(),
            password: password.to_string(),
            attrs,
        });
    }

    pub fn add_group(&mut self, cn: &str, members: &[&str]) {
        self.groups
            .push((cn.to_string(), members.iter().map(|m| m.to_string()).collect()));
    }

    fn value_after<'a>(filter: &'a str, prefix: &str) -> Option<&'a str> {
        let start = filter.find(prefix)? + prefix.len();
        let rest = &filter[start..];
        let end = rest.find(')')?;
        Some(&rest[..end])
    }

    fn search(&self, filter: &str) -> Result<Vec<DirectoryEntry>> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        if let Some(member) = Self::value_after(filter, "(memberUid=") {
            if self.fail_group_search.load(Ordering::SeqCst) {
                return Err(AuthError::Directory("size limit exceeded".to_string()));
            }
            return Ok(self
                .groups
                .iter()
                .filter(|(_, members)| members.iter().any(|m| m == member))
                .map(|(cn, _)| {
                    let mut attrs = HashMap::new();
                    attrs.insert("cn".to_string(), vec![cn.clone()]);
                    DirectoryEntry {
                        dn: format!("cn={},ou=Groups,{}", cn, BASE_DN),
                        attrs,
                    }
                })
                .collect());
        }

        if let Some(uid) = Self::value_after(filter, "(uid=") {
            return Ok(self
                .users
                .iter()
                .filter(|u| u.uid == uid)
                .map(|u| DirectoryEntry {
                    dn: u.dn.clone(),
                    attrs: u.attrs.clone(),
                })
                .collect());
        }

        Ok(Vec::new())
    }

    fn bind(&self, dn: &str, password: &str) -> Result<()> {
        if dn == SERVICE_DN && password == SERVICE_PWD {
            return Ok(());
        }
        self.user_binds.fetch_add(1, Ordering::SeqCst);
        match self.users.iter().find(|u| u.dn == dn) {
            Some(u) if u.password == password => Ok(()),
            _ => Err(AuthError::Directory("invalidCredentials (49)".to_string())),
        }
    }
}

#[derive(Clone)]
pub struct FakeDirectoryConnector(pub Arc<FakeDirectory>);

struct FakeDirectoryConnection(Arc<FakeDirectory>);

#[async_trait]
impl DirectoryConnector for FakeDirectoryConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DirectoryConnection>> {
        if self.0.refuse_connections.load(Ordering::SeqCst) {
            return Err(AuthError::Directory(format!("{}:{} connection refused", host, port)));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDirectoryConnection(self.0.clone())))
    }
}

#[async_trait]
impl DirectoryConnection for FakeDirectoryConnection {
    async fn bind(&self, dn: &str, password: &str) -> Result<()> {
        self.0.bind(dn, password)
    }

    async fn search(&self, base_dn: &str, filter: &str, _attrs: &[&str]) -> Result<Vec<DirectoryEntry>> {
        assert_eq!(base_dn, BASE_DN);
        self.0.search(filter)
    }

    async fn close(&self) -> Result<()> {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Credential rows keyed by login
#[derive(Default)]
pub struct FakeCredentials {
    rows: Vec<CredentialRecord>,
    pub refuse_connections: AtomicBool,
    pub closed: AtomicUsize,
}

impl FakeCredentials {
    pub fn standard() -> Self {
        let mut creds = Self::default();
        creds.add("db.user", "db-secret", "db.user@test.dig.center", &["Staff"], false);
        creds.add("db.locked", "db-secret", "locked@test.dig.center", &[], true);
        creds
    }

    pub fn add(&mut self, login: &str, password: &str, email: &str, groups: &[&str], disabled: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.rows.push(CredentialRecord {
            id,
            login: login.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password, &FAST_HASH).unwrap(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            disabled,
        });
        id
    }

    pub fn add_raw(&mut self, record: CredentialRecord) {
        self.rows.push(record);
    }

    pub fn id_of(&self, login: &str) -> Option<Uuid> {
        self.rows.iter().find(|r| r.login == login).map(|r| r.id)
    }
}

#[derive(Clone)]
pub struct FakeCredentialConnector(pub Arc<FakeCredentials>);

#[async_trait]
impl CredentialConnector for FakeCredentialConnector {
    async fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn CredentialStore>> {
        if self.0.refuse_connections.load(Ordering::SeqCst) {
            return Err(AuthError::Database(format!("{}: connection refused", settings.url)));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CredentialStore for FakeCredentialConnector {
    async fn find_by_login(&self, login: &str) -> Result<Option<CredentialRecord>> {
        let mut matches = self.0.rows.iter().filter(|r| r.login == login);
        match (matches.next(), matches.next()) {
            (Some(row), None) => Ok(Some(row.clone())),
            _ => Ok(None),
        }
    }

    async fn close(&self) -> Result<()> {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn backends(directory: Arc<FakeDirectory>, credentials: Arc<FakeCredentials>) -> ProviderBackends {
    ProviderBackends {
        directory: Arc::new(FakeDirectoryConnector(directory)),
        credentials: Arc::new(FakeCredentialConnector(credentials)),
        http: reqwest::Client::new(),
    }
}

pub fn standard_backends() -> ProviderBackends {
    backends(
        Arc::new(FakeDirectory::standard()),
        Arc::new(FakeCredentials::standard()),
    )
}

pub fn ldap_config(code: &str) -> ProviderConfig {
    ProviderConfig {
        code: code.to_string(),
        type_tag: "openldap".to_string(),
        display_name: code.to_string(),
        ldap: Some(LdapSettings {
            host: "ldap.test.dig.center".to_string(),
            base_dn: BASE_DN.to_string(),
            bind_user: SERVICE_DN.to_string(),
            bind_pwd: SERVICE_PWD.to_string(),
            filter_user: "(&(objectClass=organizationalPerson)(uid=%s))".to_string(),
            attr_first_name: Some("givenName".to_string()),
            attr_last_name: Some("sn".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pg_config(code: &str) -> ProviderConfig {
    ProviderConfig {
        code: code.to_string(),
        type_tag: "pg".to_string(),
        display_name: "Corporate DB".to_string(),
        database: Some(DatabaseSettings {
            url: "postgres://auth@db.test.dig.center/auth".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
