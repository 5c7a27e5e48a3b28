//! # Users-Core
//!
//! Identity and authenticated-state primitives for gatekeep.
//!
//! This crate provides:
//! - The canonical [`User`] record and its JSON form
//! - Server-held sessions keyed by opaque tokens ([`SessionStore`]) over an
//!   in-process map or a shared Redis cache
//! - Stateless signed bearer tokens ([`TokenMinter`])
//!
//! ## Architecture
//!
//! Users-Core does not authenticate anybody. auth-core resolves credentials
//! through its providers and hands the resulting [`User`] to the session
//! store or the token minter defined here.

pub mod error;
pub mod types;
pub mod session;
pub mod jwt;
pub mod config;

pub use error::{Error, Result, TokenError, TokenResult};
pub use types::User;
pub use session::{SessionCache, SessionStart, SessionStore};
pub use jwt::{JwtAlgorithm, JwtConfig, TokenMinter, UserClaims};
pub use config::{RedisConfig, SessionConfig};
