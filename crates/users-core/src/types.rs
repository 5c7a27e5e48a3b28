//! Core types for users-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Canonical identity record shared by providers, sessions and tokens.
///
/// The JSON form carries exactly `ID, login, email, display_name, avatar,
/// lang, group, groups, disable`. Login time and the provider code are
/// runtime-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub avatar: String,
    #[serde(rename = "lang")]
    pub language: String,
    #[serde(rename = "group")]
    pub primary_group: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub groups: Vec<String>,
    #[serde(rename = "disable")]
    pub disabled: bool,
    #[serde(skip)]
    pub time_login: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub auth_code: String,
}

/// Snapshots written by other services may carry `"groups": null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl User {
    /// Placeholder bound to a session before login and after logout
    pub fn anonymous() -> Self {
        Self {
            time_login: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// A snapshot without an email carries no identity
    pub fn is_anonymous(&self) -> bool {
        self.email.is_empty()
    }

    /// Deterministic user ID for a login: UUIDv5 in the nil namespace over
    /// the hex SHA-1 of the login.
    ///
    /// Not namespaced by provider, so the same login from two providers maps
    /// to the same ID.
    pub fn stable_id(login: &str) -> Uuid {
        let digest = hex::encode(Sha1::digest(login.as_bytes()));
        Uuid::new_v5(&Uuid::nil(), digest.as_bytes())
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
