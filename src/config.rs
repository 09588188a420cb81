//! Application configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob is read through a lookup function so the binary can use the
//! process environment (after `dotenvy` has loaded `.env`) while tests feed a
//! plain map without touching global state.

use std::collections::HashMap;

use crate::binder::RefreshOrdering;

pub const DEFAULT_TOKEN_TEMPLATE: &str = "data-api";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required env var {var}")]
    Missing { var: &'static str },

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the hosted data API (REST endpoint lives under `/rest/v1`).
    pub data_url: String,
    /// Public API key sent as `apikey` with every data request.
    pub data_key: String,
    /// Base URL of the auth backend.
    pub auth_url: String,
    /// Long-lived session key identifying the signed-in browser session.
    pub session_key: Option<String>,
    /// Token template requested from the auth provider for data access.
    pub token_template: String,
    /// Where the route guard sends unauthenticated users.
    pub login_path: String,
    pub timeouts: HttpTimeouts,
    pub ordering: RefreshOrdering,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_url", &self.data_url)
            .field("data_key", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("session_key", &self.session_key.as_ref().map(|_| "<redacted>"))
            .field("token_template", &self.token_template)
            .field("login_path", &self.login_path)
            .field("timeouts", &self.timeouts)
            .field("ordering", &self.ordering)
            .finish()
    }
}

impl AppConfig {
    /// Build config from the process environment.
    ///
    /// Required:
    /// - `METRICBOARD_DATA_URL`
    /// - `METRICBOARD_DATA_KEY`
    /// - `METRICBOARD_AUTH_URL`
    ///
    /// Optional:
    /// - `METRICBOARD_SESSION_KEY`: absent means "signed out"
    /// - `METRICBOARD_TOKEN_TEMPLATE`: default `data-api`
    /// - `METRICBOARD_LOGIN_PATH`: default `/login`
    /// - `METRICBOARD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `METRICBOARD_CONNECT_TIMEOUT_SECS`: default 10
    /// - `TOKEN_REFRESH_ORDERING`: `last_resolved` (default) or `sequenced`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an explicit key/value map.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let data_url = trim_url(get("METRICBOARD_DATA_URL").ok_or(ConfigError::Missing { var: "METRICBOARD_DATA_URL" })?);
        let data_key = get("METRICBOARD_DATA_KEY").ok_or(ConfigError::Missing { var: "METRICBOARD_DATA_KEY" })?;
        let auth_url = trim_url(get("METRICBOARD_AUTH_URL").ok_or(ConfigError::Missing { var: "METRICBOARD_AUTH_URL" })?);

        let login_path = get("METRICBOARD_LOGIN_PATH").unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_owned());
        if !login_path.starts_with('/') {
            return Err(ConfigError::Invalid { var: "METRICBOARD_LOGIN_PATH", value: login_path });
        }

        let ordering = match get("TOKEN_REFRESH_ORDERING") {
            None => RefreshOrdering::default(),
            Some(raw) => raw
                .parse()
                .map_err(|()| ConfigError::Invalid { var: "TOKEN_REFRESH_ORDERING", value: raw })?,
        };

        let timeouts = HttpTimeouts {
            request_secs: parse_u64(
                get("METRICBOARD_REQUEST_TIMEOUT_SECS"),
                "METRICBOARD_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            connect_secs: parse_u64(
                get("METRICBOARD_CONNECT_TIMEOUT_SECS"),
                "METRICBOARD_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
        };

        Ok(Self {
            data_url,
            data_key,
            auth_url,
            session_key: get("METRICBOARD_SESSION_KEY"),
            token_template: get("METRICBOARD_TOKEN_TEMPLATE").unwrap_or_else(|| DEFAULT_TOKEN_TEMPLATE.to_owned()),
            login_path,
            timeouts,
            ordering,
        })
    }
}

fn trim_url(raw: String) -> String {
    raw.trim_end_matches('/').to_owned()
}

fn parse_u64(raw: Option<String>, var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::Invalid { var, value }),
            Ok(parsed) => Ok(parsed),
        },
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
