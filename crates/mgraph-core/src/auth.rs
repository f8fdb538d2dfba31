//! Token provider port (driven/secondary port)
//!
//! Authentication lives outside this subsystem: an MSAL wrapper, a device
//! code flow, or anything else that can mint Graph access tokens implements
//! [`TokenProvider`], and the executor fetches a bearer token per attempt.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification; the
//!   executor maps any failure to an AUTHENTICATION taxonomy error.
//! - Uses `#[async_trait]` for async trait methods.

use chrono::{DateTime, Utc};

/// A bearer token for Microsoft Graph plus its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Returns true if the token has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the token will expire within the given duration.
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

/// Port trait supplying access tokens for the configured scopes.
///
/// Implementations are expected to cache and silently refresh tokens; the
/// executor calls this once per network attempt.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, scopes: &[String]) -> anyhow::Result<AccessToken>;
}

/// Provider returning a fixed, pre-acquired token.
///
/// Useful for tests and for service principals whose token lifecycle is
/// managed elsewhere.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self, _scopes: &[String]) -> anyhow::Result<AccessToken> {
        Ok(self.token.clone())
    }
}
