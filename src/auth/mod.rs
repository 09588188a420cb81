//! Auth provider contract: session snapshot and bearer tokens.
//!
//! DESIGN
//! ======
//! The hosted auth provider is consumed through the [`AuthProvider`] trait
//! so the session bootstrap and the data-client binder can run against a
//! fake in tests. [`http::HttpAuthProvider`] is the production adapter.

pub mod http;

use serde::{Deserialize, Serialize};

use crate::session::User;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth provider operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider answered but reports it has not finished loading.
    #[error("auth provider not loaded")]
    NotLoaded,

    /// The HTTP request to the auth backend failed.
    #[error("auth request failed: {0}")]
    Request(String),

    /// The auth backend returned a non-success HTTP status.
    #[error("auth response error: status {status}")]
    Response { status: u16, body: String },

    /// The auth backend response body could not be deserialized.
    #[error("auth response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// TOKEN
// =============================================================================

/// Opaque, time-limited bearer credential. Held only in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Options forwarded to [`AuthProvider::get_token`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOptions {
    /// Named token template (audience/claims preset) on the provider side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Bypass the provider's token cache.
    #[serde(default)]
    pub skip_cache: bool,
}

impl TokenOptions {
    #[must_use]
    pub fn with_template(template: impl Into<String>) -> Self {
        Self { template: Some(template.into()), skip_cache: false }
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

/// What the auth provider reports once its handshake settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub is_loaded: bool,
    pub is_signed_in: bool,
    pub user: Option<User>,
}

impl AuthSnapshot {
    #[must_use]
    pub fn signed_out() -> Self {
        Self { is_loaded: true, is_signed_in: false, user: None }
    }

    #[must_use]
    pub fn signed_in(user: User) -> Self {
        Self { is_loaded: true, is_signed_in: true, user: Some(user) }
    }
}

/// Hosted authentication collaborator.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Run the authentication handshake and report the resulting state.
    async fn load(&self) -> Result<AuthSnapshot, AuthError>;

    /// Fetch a fresh bearer token. `Ok(None)` means the provider has no
    /// token to give (signed out, expired session).
    async fn get_token(&self, options: &TokenOptions) -> Result<Option<AuthToken>, AuthError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
