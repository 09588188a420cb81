//! Data-access client for the hosted REST data API.
//!
//! ARCHITECTURE
//! ============
//! A client is built by a [`ClientFactory`] from a [`TokenSupplier`]. The
//! supplier is awaited before every request and the request is sent with
//! the client's authorization header as it stands afterwards. The client
//! never writes that header itself: whoever owns the supplier installs
//! fetched tokens through [`AuthorizedClient::set_authorization`], so there
//! is exactly one writer per client.
//!
//! ERROR HANDLING
//! ==============
//! Writes are validated against the entity's schema before any network
//! call. 401/403 surface as [`ClientError::Unauthorized`]: a missing token is
//! not an error here, the data API decides.

pub mod error;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;

pub use error::ClientError;

use crate::auth::AuthToken;
use crate::config::HttpTimeouts;
use crate::schema::{Entity, Operation};

const REST_PREFIX: &str = "/rest/v1";

// =============================================================================
// CONTRACT
// =============================================================================

pub type TokenFuture = BoxFuture<'static, Option<AuthToken>>;

/// Refreshes the client's credential on demand. Resolves once the fetched
/// token (if any) has been installed, yielding the token now in effect.
pub type TokenSupplier = Arc<dyn Fn() -> TokenFuture + Send + Sync>;

/// Supplier for clients whose header is managed by hand.
#[must_use]
pub fn no_refresh() -> TokenSupplier {
    Arc::new(|| Box::pin(async { None }))
}

/// A client whose outgoing requests carry a replaceable credential.
pub trait AuthorizedClient: Send + Sync + 'static {
    /// Install `token` (or clear credentials when `None`).
    fn set_authorization(&self, token: Option<&AuthToken>);

    /// Current `Authorization` header value.
    fn authorization(&self) -> Option<String>;
}

/// Builds clients bound to a token supplier.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: AuthorizedClient;

    fn create(&self, supplier: TokenSupplier) -> Self::Client;
}

// =============================================================================
// REST CLIENT
// =============================================================================

/// PostgREST-style client: `{data_url}/rest/v1/{table}`.
pub struct DataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    authorization: Mutex<Option<String>>,
    supplier: TokenSupplier,
}

impl DataClient {
    /// Let the supplier refresh the credential, then read the header to
    /// send with.
    async fn refresh_authorization(&self) -> Option<String> {
        let _ = (self.supplier)().await;
        self.authorization()
    }

    fn table_url(&self, entity: Entity) -> String {
        format!("{}{REST_PREFIX}/{}", self.base_url, entity.table())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ClientError> {
        let mut request = request.header("apikey", &self.api_key);
        if let Some(header) = self.refresh_authorization().await {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized { status: status.as_u16(), body: text });
        }
        if !status.is_success() {
            return Err(ClientError::Response { status: status.as_u16(), body: text });
        }
        Ok(text)
    }

    /// Rows matching the equality filter `where_eq`, restricted to `select`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed filter or selection, or a
    /// transport/response error from the data API.
    pub async fn select(&self, entity: Entity, select: Option<&Value>, where_eq: Option<&Value>) -> Result<Vec<Value>, ClientError> {
        let schema = entity.schema();
        let mut query = vec![("select".to_owned(), select_columns(select))];
        if let Some(select) = select {
            schema.validate(Operation::Select, select.clone())?;
        }
        if let Some(filter) = where_eq {
            let filter = schema.validate(Operation::Where, filter.clone())?;
            query.extend(filter_pairs(&filter));
        }

        let text = self.send(self.http.get(self.table_url(entity)).query(&query)).await?;
        parse_rows(&text)
    }

    /// Single row identified by `where_unique`.
    ///
    /// # Errors
    ///
    /// Same as [`DataClient::select`].
    pub async fn find_unique(&self, entity: Entity, where_unique: &Value, select: Option<&Value>) -> Result<Option<Value>, ClientError> {
        let filter = entity.schema().validate(Operation::WhereUnique, where_unique.clone())?;
        let rows = self.select(entity, select, Some(&filter)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call if `data` does not
    /// satisfy the entity's create contract.
    pub async fn insert(&self, entity: Entity, data: &Value) -> Result<Value, ClientError> {
        let data = entity.schema().validate(Operation::Create, data.clone())?;
        let request = self
            .http
            .post(self.table_url(entity))
            .header("Prefer", "return=representation")
            .json(&data);
        let text = self.send(request).await?;
        first_row(&text)
    }

    /// Update the row identified by `where_unique` and return it.
    ///
    /// # Errors
    ///
    /// Validation errors for either argument, or data-API errors.
    pub async fn update(&self, entity: Entity, where_unique: &Value, data: &Value) -> Result<Value, ClientError> {
        let schema = entity.schema();
        let filter = schema.validate(Operation::WhereUnique, where_unique.clone())?;
        let data = schema.validate(Operation::Update, data.clone())?;
        let request = self
            .http
            .patch(self.table_url(entity))
            .query(&filter_pairs(&filter))
            .header("Prefer", "return=representation")
            .json(&data);
        let text = self.send(request).await?;
        first_row(&text)
    }

    /// Delete the row identified by `where_unique`.
    ///
    /// # Errors
    ///
    /// Validation errors, or data-API errors.
    pub async fn delete(&self, entity: Entity, where_unique: &Value) -> Result<(), ClientError> {
        let filter = entity.schema().validate(Operation::WhereUnique, where_unique.clone())?;
        let request = self.http.delete(self.table_url(entity)).query(&filter_pairs(&filter));
        self.send(request).await?;
        Ok(())
    }

    /// Row count under the equality filter `where_eq`.
    ///
    /// # Errors
    ///
    /// Validation errors, or data-API errors.
    pub async fn count(&self, entity: Entity, where_eq: Option<&Value>) -> Result<u64, ClientError> {
        let mut args = serde_json::json!({ "_count": true });
        if let Some(filter) = where_eq {
            args["where"] = filter.clone();
        }
        let args = entity.schema().validate(Operation::Aggregate, args)?;

        let mut query = vec![("select".to_owned(), "count()".to_owned())];
        if let Some(filter) = args.get("where") {
            query.extend(filter_pairs(filter));
        }
        let text = self.send(self.http.get(self.table_url(entity)).query(&query)).await?;
        let rows = parse_rows(&text)?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Parse(format!("unexpected count response: {text}")))
    }
}

impl AuthorizedClient for DataClient {
    fn set_authorization(&self, token: Option<&AuthToken>) {
        *self.authorization.lock().unwrap_or_else(PoisonError::into_inner) = token.map(AuthToken::bearer);
    }

    fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// =============================================================================
// FACTORY
// =============================================================================

#[derive(Clone)]
pub struct DataClientFactory {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DataClientFactory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), api_key: api_key.into() })
    }
}

impl ClientFactory for DataClientFactory {
    type Client = DataClient;

    fn create(&self, supplier: TokenSupplier) -> DataClient {
        DataClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            authorization: Mutex::new(None),
            supplier,
        }
    }
}

// =============================================================================
// WIRE HELPERS
// =============================================================================

fn select_columns(select: Option<&Value>) -> String {
    let Some(obj) = select.and_then(Value::as_object) else {
        return "*".to_owned();
    };
    let columns: Vec<&str> = obj
        .iter()
        .filter(|(_, on)| on.as_bool() == Some(true))
        .map(|(col, _)| col.as_str())
        .collect();
    if columns.is_empty() { "*".to_owned() } else { columns.join(",") }
}

/// `{"project_id": "p1", "group_id": null}` → `project_id=eq.p1&group_id=is.null`.
fn filter_pairs(filter: &Value) -> Vec<(String, String)> {
    let Some(obj) = filter.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .map(|(col, value)| {
            let op = match value {
                Value::Null => "is.null".to_owned(),
                Value::String(s) => format!("eq.{s}"),
                other => format!("eq.{other}"),
            };
            (col.clone(), op)
        })
        .collect()
}

fn parse_rows(text: &str) -> Result<Vec<Value>, ClientError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(ClientError::Parse(format!("expected array, got {other}"))),
        Err(e) => Err(ClientError::Parse(e.to_string())),
    }
}

fn first_row(text: &str) -> Result<Value, ClientError> {
    parse_rows(text)?
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Parse("empty representation".to_owned()))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
