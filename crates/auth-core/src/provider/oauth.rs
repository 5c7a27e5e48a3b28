//! OAuth2-delegated providers
//!
//! No password path. [`AuthProvider::init`] builds the OAuth2 client and the
//! authorization redirect once; [`AuthProvider::exchange_code`] trades the
//! callback code for an access token and resolves the vendor profile.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gatekeep_users_core::User;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::AuthProvider;
use crate::config::{OAuthSettings, ProviderConfig};
use crate::{AuthError, Result};

/// Supported identity vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthVendor {
    MailRu,
    Yandex,
}

impl OAuthVendor {
    pub fn default_auth_url(&self) -> &'static str {
        match self {
            OAuthVendor::MailRu => "https://o2.mail.ru/login",
            OAuthVendor::Yandex => "https://oauth.yandex.ru/authorize",
        }
    }

    pub fn default_token_url(&self) -> &'static str {
        match self {
            OAuthVendor::MailRu => "https://o2.mail.ru/token",
            OAuthVendor::Yandex => "https://oauth.yandex.ru/token",
        }
    }

    pub fn default_profile_url(&self) -> &'static str {
        match self {
            OAuthVendor::MailRu => "https://oauth.mail.ru/userinfo",
            OAuthVendor::Yandex => "https://login.yandex.ru/info?format=json",
        }
    }
}

impl fmt::Display for OAuthVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuthVendor::MailRu => write!(f, "mail.ru"),
            OAuthVendor::Yandex => write!(f, "yandex.ru"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MailRuProfile {
    email: String,
    name: String,
    image: String,
    locale: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YandexProfile {
    login: String,
    default_email: String,
    display_name: String,
    real_name: String,
    default_avatar_id: String,
    is_avatar_empty: bool,
}

fn user_from_mailru(profile: MailRuProfile) -> User {
    User {
        id: User::stable_id(&profile.email),
        login: profile.email.clone(),
        email: profile.email,
        display_name: profile.name,
        avatar: profile.image,
        language: profile.locale,
        ..Default::default()
    }
}

fn user_from_yandex(profile: YandexProfile) -> User {
    let avatar = if profile.is_avatar_empty || profile.default_avatar_id.is_empty() {
        String::new()
    } else {
        format!(
            "https://avatars.yandex.net/get-yapic/{}/islands-200",
            profile.default_avatar_id
        )
    };
    let display_name = if profile.real_name.is_empty() {
        profile.display_name
    } else {
        profile.real_name
    };
    User {
        id: User::stable_id(&profile.login),
        login: profile.login,
        email: profile.default_email,
        display_name,
        avatar,
        ..Default::default()
    }
}

pub struct OAuthProvider {
    vendor: OAuthVendor,
    config: ProviderConfig,
    oauth: OAuthSettings,
    http: reqwest::Client,
    client: OnceCell<BasicClient>,
    auth_url: OnceCell<String>,
    connected: AtomicBool,
}

impl OAuthProvider {
    pub fn new(vendor: OAuthVendor, config: ProviderConfig, http: reqwest::Client) -> Result<Self> {
        let oauth = config.oauth.clone().ok_or_else(|| {
            AuthError::Config(format!("Provider '{}' has no oauth section", config.code))
        })?;
        Ok(Self {
            vendor,
            config,
            oauth,
            http,
            client: OnceCell::new(),
            auth_url: OnceCell::new(),
            connected: AtomicBool::new(false),
        })
    }

    pub fn vendor(&self) -> OAuthVendor {
        self.vendor
    }

    fn build_client(&self) -> Result<BasicClient> {
        let auth_url = self
            .oauth
            .auth_url
            .clone()
            .unwrap_or_else(|| self.vendor.default_auth_url().to_string());
        let token_url = self
            .oauth
            .token_url
            .clone()
            .unwrap_or_else(|| self.vendor.default_token_url().to_string());

        let invalid = |what: &str, e: url::ParseError| AuthError::Config(format!("Invalid {} URL: {}", what, e));

        Ok(BasicClient::new(
            ClientId::new(self.oauth.client_id.clone()),
            Some(ClientSecret::new(self.oauth.secret.clone())),
            AuthUrl::new(auth_url).map_err(|e| invalid("authorization", e))?,
            Some(TokenUrl::new(token_url).map_err(|e| invalid("token", e))?),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(RedirectUrl::new(self.oauth.redirect.clone()).map_err(|e| invalid("redirect", e))?))
    }

    fn profile_url(&self) -> &str {
        self.oauth
            .profile_url
            .as_deref()
            .unwrap_or_else(|| self.vendor.default_profile_url())
    }
}

#[async_trait]
impl AuthProvider for OAuthProvider {
    async fn init(&self) -> Result<()> {
        let client = self.build_client().map_err(|e| {
            error!("OAuth ({}): {}", self.vendor, e);
            AuthError::Initialization(e.to_string())
        })?;

        let (url, _state) = client
            .authorize_url(|| CsrfToken::new("state".to_string()))
            .add_scopes(self.oauth.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "online")
            .url();

        let _ = self.auth_url.set(url.to_string());
        let _ = self.client.set(client);
        self.connected.store(true, Ordering::SeqCst);

        info!("OAuth provider '{}' ready ({})", self.config.code, self.vendor);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
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

    async fn login(&self, _login: &str, _password: &str) -> Option<User> {
        None
    }

    fn auth_url(&self) -> Option<&str> {
        self.auth_url.get().map(String::as_str)
    }

    async fn exchange_code(&self, code: &str) -> Result<User> {
        let client = self
            .client
            .get()
            .ok_or_else(|| AuthError::OAuth(format!("{} is not initialized", self.config.code)))?;

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AuthError::OAuth(format!("code exchange failed: {}", e)))?;

        debug!("OAuth ({}): code exchanged", self.vendor);
        self.fetch_profile(token.access_token().secret()).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<User> {
        let request = self.http.get(self.profile_url());
        let request = match self.vendor {
            OAuthVendor::MailRu => request.query(&[("access_token", access_token)]),
            OAuthVendor::Yandex => request.header("Authorization", format!("OAuth {}", access_token)),
        };

        let response = request.send().await?.error_for_status()?;
        let user = match self.vendor {
            OAuthVendor::MailRu => user_from_mailru(response.json::<MailRuProfile>().await?),
            OAuthVendor::Yandex => user_from_yandex(response.json::<YandexProfile>().await?),
        };

        if user.login.is_empty() || user.email.is_empty() {
            return Err(AuthError::OAuth(format!(
                "{} profile lacks login or email",
                self.vendor
            )));
        }
        Ok(user)
    }
}
