//! REST adapter for the hosted auth backend.
//!
//! Thin HTTP wrapper around two endpoints:
//! - `GET  {auth_url}/v1/session` → current user for the session key
//! - `POST {auth_url}/v1/session/tokens` → short-lived data-API token
//!
//! Both authenticate with the long-lived session key as a bearer. A 401 is
//! not an error here: it means "signed out" (or "no token").

use std::time::Duration;

use reqwest::StatusCode;

use super::{AuthError, AuthProvider, AuthSnapshot, AuthToken, TokenOptions};
use crate::config::HttpTimeouts;
use crate::session::User;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpAuthProvider {
    http: reqwest::Client,
    base_url: String,
    session_key: Option<String>,
}

impl HttpAuthProvider {
    /// Build a provider for `base_url`. A missing session key means every
    /// `load` reports signed out without touching the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, session_key: Option<String>, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), session_key })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait::async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn load(&self) -> Result<AuthSnapshot, AuthError> {
        let Some(key) = &self.session_key else {
            return Ok(AuthSnapshot::signed_out());
        };

        let response = self
            .http
            .get(self.url("/v1/session"))
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            return Ok(AuthSnapshot::signed_out());
        }
        if !status.is_success() {
            return Err(AuthError::Response { status: status.as_u16(), body: text });
        }

        parse_session(&text)
    }

    async fn get_token(&self, options: &TokenOptions) -> Result<Option<AuthToken>, AuthError> {
        let Some(key) = &self.session_key else {
            return Ok(None);
        };

        let response = self
            .http
            .post(self.url("/v1/session/tokens"))
            .bearer_auth(key)
            .json(options)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Response { status: status.as_u16(), body: text });
        }

        parse_token(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct SessionResponse {
    user_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    jwt: Option<String>,
}

fn parse_session(text: &str) -> Result<AuthSnapshot, AuthError> {
    let body: SessionResponse = serde_json::from_str(text).map_err(|e| AuthError::Parse(e.to_string()))?;
    Ok(match body.user_id.filter(|id| !id.is_empty()) {
        Some(id) => AuthSnapshot::signed_in(User { id, email: body.email, name: body.name }),
        None => AuthSnapshot::signed_out(),
    })
}

fn parse_token(text: &str) -> Result<Option<AuthToken>, AuthError> {
    let body: TokenResponse = serde_json::from_str(text).map_err(|e| AuthError::Parse(e.to_string()))?;
    Ok(body.jwt.filter(|jwt| !jwt.is_empty()).map(AuthToken::new))
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
