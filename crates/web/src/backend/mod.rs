//! Managed backend client.
//!
//! # Architecture
//!
//! - The backend owns persistence, authentication and row-level security
//! - Three HTTP surfaces under one project URL:
//!   - `/rest/v1` - table reads and writes ([`Query`] filters)
//!   - `/auth/v1` - password sign-up/sign-in and token refresh
//!   - `/storage/v1` - uploaded media
//! - Every request carries the project's public key in `apikey`; the bearer
//!   token is picked per call with [`Access`]
//! - Public storefront and product reads are cached via `moka` (5 minute TTL)
//!
//! Table-specific reads and writes live in one `impl BackendClient` block per
//! table group (`profiles.rs`, `posts.rs`, ...).

mod auth;
mod cache;
mod cart;
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fake;
mod groups;
mod orders;
mod payments;
mod posts;
mod profiles;
mod query;
mod storage;
mod stores;
mod wallets;

pub use auth::{AuthSession, AuthUser, SignUpOutcome};
pub use posts::{FeedCursor, PostSource};
pub use query::Query;
pub use stores::{NewProduct, NewStore};
pub use wallets::LedgerEntry;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use crate::config::BackendConfig;

use cache::{CacheKey, CacheValue};

/// Postgres unique-violation code, surfaced by the REST layer.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur when talking to the managed backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("API error: {status} {}: {message}", code.as_deref().unwrap_or("-"))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Failed to parse a response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Row or object not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or concurrent update.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, expired or insufficient token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// Which bearer token a request is made with.
#[derive(Debug, Clone, Copy)]
pub enum Access<'a> {
    /// The public key; row-level security applies as an anonymous visitor.
    Anon,
    /// A signed-in user's access token; row-level security applies as them.
    User(&'a str),
    /// The service-role key; bypasses row-level security. Server-side only.
    Service,
}

/// Client for the managed backend.
///
/// Cheap to clone; all clones share one connection pool and cache.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    http: reqwest::Client,
    url: String,
    anon_key: SecretString,
    service_key: SecretString,
    media_bucket: String,
    cache: Cache<CacheKey, CacheValue>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                url: config.url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                service_key: config.service_key.clone(),
                media_bucket: config.media_bucket.clone(),
                cache,
            }),
        })
    }

    /// Project URL without trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn bearer<'a>(&'a self, access: Access<'a>) -> &'a str {
        match access {
            Access::Anon => self.inner.anon_key.expose_secret(),
            Access::User(token) => token,
            Access::Service => self.inner.service_key.expose_secret(),
        }
    }

    /// Build a request with the project key and the chosen bearer token.
    fn request(&self, method: Method, url: &str, access: Access<'_>) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(self.bearer(access))
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.inner.url)
    }

    // =========================================================================
    // REST
    // =========================================================================

    /// Fetch all rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or rows do not deserialize.
    #[instrument(skip(self, access), fields(table = query.table_name()))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &Query,
        access: Access<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let response = self
            .request(Method::GET, &self.rest_url(query.table_name()), access)
            .query(&query.read_params())
            .send()
            .await?;
        read_json(response).await
    }

    /// Fetch the first row matching `query`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn select_optional<T: DeserializeOwned>(
        &self,
        query: &Query,
        access: Access<'_>,
    ) -> Result<Option<T>, BackendError> {
        let rows = self.select(&query.clone().limit(1), access).await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        query: &Query,
        access: Access<'_>,
    ) -> Result<T, BackendError> {
        self.select_optional(query, access)
            .await?
            .ok_or_else(|| BackendError::NotFound(query.table_name().to_string()))
    }

    /// Insert one or more rows and return them as stored.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a uniqueness violation.
    #[instrument(skip(self, body, access))]
    pub async fn insert<B, T>(
        &self,
        table: &str,
        body: &B,
        access: Access<'_>,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, &self.rest_url(table), access)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Insert a single row and return it.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a uniqueness violation.
    pub async fn insert_one<B, T>(
        &self,
        table: &str,
        body: &B,
        access: Access<'_>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.insert::<B, T>(table, body, access)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Parse(format!("insert into {table} returned no row")))
    }

    /// Patch matching rows and return the updated rows.
    ///
    /// An empty result means no row matched the filters; conditional
    /// updates use that to detect a lost race.
    ///
    /// # Errors
    ///
    /// Refuses unfiltered updates.
    #[instrument(skip(self, body, access), fields(table = query.table_name()))]
    pub async fn update<B, T>(
        &self,
        query: &Query,
        body: &B,
        access: Access<'_>,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if !query.has_filters() {
            return Err(BackendError::Parse(format!(
                "refusing unfiltered update of {}",
                query.table_name()
            )));
        }
        let response = self
            .request(Method::PATCH, &self.rest_url(query.table_name()), access)
            .header("Prefer", "return=representation")
            .query(&query.write_params())
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Delete matching rows.
    ///
    /// # Errors
    ///
    /// Refuses unfiltered deletes.
    #[instrument(skip(self, access), fields(table = query.table_name()))]
    pub async fn delete(&self, query: &Query, access: Access<'_>) -> Result<(), BackendError> {
        if !query.has_filters() {
            return Err(BackendError::Parse(format!(
                "refusing unfiltered delete of {}",
                query.table_name()
            )));
        }
        let response = self
            .request(Method::DELETE, &self.rest_url(query.table_name()), access)
            .query(&query.write_params())
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Count rows matching `query` without fetching them.
    ///
    /// # Errors
    ///
    /// Returns `Parse` when the `Content-Range` header is missing.
    #[instrument(skip(self, access), fields(table = query.table_name()))]
    pub async fn count(&self, query: &Query, access: Access<'_>) -> Result<u64, BackendError> {
        let response = self
            .request(Method::HEAD, &self.rest_url(query.table_name()), access)
            .header("Prefer", "count=exact")
            .query(&query.read_params())
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::Parse("missing Content-Range total".to_string()))
    }

    /// Call a database function.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails or the result does not deserialize.
    #[instrument(skip(self, args, access))]
    pub async fn rpc<A, T>(
        &self,
        function: &str,
        args: &A,
        access: Access<'_>,
    ) -> Result<T, BackendError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, &self.rest_url(&format!("rpc/{function}")), access)
            .json(args)
            .send()
            .await?;
        read_json(response).await
    }

    /// Check that the backend answers.
    ///
    /// # Errors
    ///
    /// Returns error if the health endpoint is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<(), BackendError> {
        let url = format!("{}/auth/v1/health", self.inner.url);
        let response = self.request(Method::GET, &url, Access::Anon).send().await?;
        check_status(response).await.map(|_| ())
    }
}

// =============================================================================
// Response handling
// =============================================================================

/// Body shapes the REST and auth layers use for errors.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => self.error.clone(),
        })
    }

    fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

/// Map an error status and body to a `BackendError`.
fn api_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code();
    let message = parsed
        .message()
        .unwrap_or_else(|| body.chars().take(200).collect());

    let conflict_code = matches!(
        code.as_deref(),
        Some(UNIQUE_VIOLATION | "user_already_exists" | "email_exists")
    );
    if conflict_code || status == StatusCode::CONFLICT {
        return BackendError::Conflict(message);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        _ => BackendError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

/// Pass successful responses through; turn the rest into errors.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        status = %status,
        body = %body.chars().take(500).collect::<String>(),
        "Backend returned non-success status"
    );
    Err(api_error(status, &body))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e.to_string())
    })
}

/// Total from a `Content-Range` header such as `0-19/342` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.parse().ok()
}
