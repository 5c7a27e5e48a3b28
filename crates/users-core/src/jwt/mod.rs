//! JWT token issuance and verification
//!
//! Bearer tokens are self-contained: the claims carry the identity, nothing is
//! stored server-side, and a token stays valid until its `exp` passes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{TokenError, TokenResult};
use crate::User;

/// Signing algorithms accepted by the minter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwtAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
}

impl JwtAlgorithm {
    pub fn is_symmetric(&self) -> bool {
        matches!(self, JwtAlgorithm::HS256 | JwtAlgorithm::HS384 | JwtAlgorithm::HS512)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JwtAlgorithm::HS256 => "HS256",
            JwtAlgorithm::HS384 => "HS384",
            JwtAlgorithm::HS512 => "HS512",
            JwtAlgorithm::RS256 => "RS256",
            JwtAlgorithm::RS384 => "RS384",
            JwtAlgorithm::RS512 => "RS512",
        }
    }

    fn signer(self) -> Algorithm {
        match self {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
            JwtAlgorithm::RS256 => Algorithm::RS256,
            JwtAlgorithm::RS384 => Algorithm::RS384,
            JwtAlgorithm::RS512 => Algorithm::RS512,
        }
    }
}

impl FromStr for JwtAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(JwtAlgorithm::HS256),
            "HS384" => Ok(JwtAlgorithm::HS384),
            "HS512" => Ok(JwtAlgorithm::HS512),
            "RS256" => Ok(JwtAlgorithm::RS256),
            "RS384" => Ok(JwtAlgorithm::RS384),
            "RS512" => Ok(JwtAlgorithm::RS512),
            other => Err(TokenError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims for user tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub login: String,
    pub email: String,
    #[serde(rename = "displayname")]
    pub display_name: String,
    pub avatar: String,
    pub group: String,
    pub groups: Vec<String>,
    pub iss: String,
    pub exp: u64,
}

impl UserClaims {
    fn from_user(user: &User, issuer: &str, exp: u64) -> Self {
        Self {
            sub: user.id.to_string(),
            login: user.login.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
            group: user.primary_group.clone(),
            groups: user.groups.clone(),
            iss: issuer.to_string(),
            exp,
        }
    }

    fn into_user(self, id: Uuid) -> User {
        User {
            id,
            login: self.login,
            email: self.email,
            display_name: self.display_name,
            avatar: self.avatar,
            primary_group: self.group,
            groups: self.groups,
            ..Default::default()
        }
    }
}

/// JWT configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// One of HS256, HS384, HS512, RS256, RS384, RS512
    #[serde(alias = "jwt_type")]
    pub algorithm: String,
    /// Shared secret for HS*, PEM private key for RS*
    #[serde(alias = "jwt_key")]
    pub key: String,
    /// PEM public key for RS*; derived from `key` when absent
    pub public_key: Option<String>,
    /// Token lifetime in seconds
    pub expiry_time: u64,
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            key: String::new(),
            public_key: None,
            expiry_time: 3600,
            issuer: "system".to_string(),
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("key", &if self.key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("public_key", &self.public_key.as_ref().map(|_| "<pem>"))
            .field("expiry_time", &self.expiry_time)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Issues and verifies signed bearer tokens.
///
/// Configured once; holds no per-token state.
pub struct TokenMinter {
    config: JwtConfig,
    algorithm: JwtAlgorithm,
    lifetime: TimeDelta,
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
    header: Header,
}

impl TokenMinter {
    /// Resolve the configured algorithm and load key material.
    ///
    /// An unknown algorithm name or an unrepresentable lifetime is an error.
    /// An empty key is accepted here but every later `issue` fails with
    /// [`TokenError::MissingKey`].
    pub fn new(config: JwtConfig) -> TokenResult<Self> {
        let algorithm: JwtAlgorithm = config.algorithm.parse().map_err(|e| {
            error!("JWT: undefined signing algorithm '{}'", config.algorithm);
            e
        })?;

        let lifetime = token_lifetime(config.expiry_time)?;

        let (encoding_key, decoding_key) = if config.key.is_empty() {
            warn!("JWT: no signing key configured for {}", algorithm);
            (None, None)
        } else if algorithm.is_symmetric() {
            (
                Some(EncodingKey::from_secret(config.key.as_bytes())),
                Some(DecodingKey::from_secret(config.key.as_bytes())),
            )
        } else {
            let encoding_key = EncodingKey::from_rsa_pem(config.key.as_bytes())
                .map_err(|e| TokenError::InvalidKey(format!("Invalid RSA key: {}", e)))?;
            let public_pem = match &config.public_key {
                Some(pem) => pem.clone(),
                None => extract_public_key_from_private(&config.key)?,
            };
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| TokenError::InvalidKey(format!("Invalid public key: {}", e)))?;
            (Some(encoding_key), Some(decoding_key))
        };

        debug!("JWT: minter ready ({}, ttl {}s)", algorithm, config.expiry_time);

        Ok(Self {
            header: Header::new(algorithm.signer()),
            config,
            algorithm,
            lifetime,
            encoding_key,
            decoding_key,
        })
    }

    pub fn algorithm(&self) -> JwtAlgorithm {
        self.algorithm
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.config.expiry_time)
    }

    /// Issuer from configuration
    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// Sign a token for `user` that expires after the configured lifetime
    pub fn issue(&self, user: &User, issuer: &str) -> TokenResult<String> {
        let key = self.encoding_key.as_ref().ok_or_else(|| {
            error!("JWT: cannot sign token for '{}': no key", user.login);
            TokenError::MissingKey
        })?;

        let exp = Utc::now().checked_add_signed(self.lifetime).ok_or_else(|| {
            error!("JWT: expiry overflows for ttl {}s", self.config.expiry_time);
            TokenError::InvalidLifetime(self.config.expiry_time)
        })?;
        let claims = UserClaims::from_user(user, issuer, exp.timestamp().max(0) as u64);

        encode(&self.header, &claims, key).map_err(|e| {
            error!("JWT: signing failed: {}", e);
            TokenError::Signing(e)
        })
    }

    /// Check signature, structure and expiry, then rebuild the user from claims
    pub fn verify(&self, token: &str) -> TokenResult<User> {
        let key = self.decoding_key.as_ref().ok_or(TokenError::MissingKey)?;

        let mut validation = Validation::new(self.header.alg);
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<UserClaims>(token, key, &validation).map_err(classify)?;
        let claims = data.claims;

        let id = Uuid::parse_str(&claims.sub).map_err(|e| {
            warn!("JWT: user id <{}> error: {}", claims.sub, e);
            TokenError::BadRequest(format!("Invalid subject '{}': {}", claims.sub, e))
        })?;

        Ok(claims.into_user(id))
    }
}

/// Lifetimes must fit a timestamp; anything past year 9999 is refused
fn token_lifetime(seconds: u64) -> TokenResult<TimeDelta> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .filter(|lifetime| Utc::now().checked_add_signed(*lifetime).is_some())
        .ok_or_else(|| {
            error!("JWT: token lifetime {}s is out of range", seconds);
            TokenError::InvalidLifetime(seconds)
        })
}

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience => {
            warn!("JWT: token rejected: {}", e);
            TokenError::Unauthorized(e.to_string())
        }
        _ => {
            warn!("JWT: cannot parse token: {}", e);
            TokenError::BadRequest(e.to_string())
        }
    }
}

fn extract_public_key_from_private(private_pem: &str) -> TokenResult<String> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
        .map_err(|e| TokenError::InvalidKey(format!("Failed to parse private key: {}", e)))?;

    let public_key = RsaPublicKey::from(&private_key);

    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| TokenError::InvalidKey(format!("Failed to encode public key: {}", e)))
}
