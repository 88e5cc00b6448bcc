//! Remote query client for grantsync.
//!
//! This crate provides:
//!
//! - The field-selection query builder ([`build_organization_query`])
//! - The [`QueryTransport`] seam the engine resolves organizations through
//! - [`GrantClient`], a `reqwest`-backed transport with a bounded timeout
//! - [`ClientConfig`], read from `GRANTSYNC_QUERY_URL` and
//!   `GRANTSYNC_QUERY_TIMEOUT_SECS`
//!
//! # Example
//!
//! ```ignore
//! use grantsync_api::{ClientConfig, GrantClient, QueryTransport, build_organization_query};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let client = GrantClient::new(ClientConfig::from_env()?)?;
//!     if let Some(query) = build_organization_query("abc123") {
//!         let response = client.execute(&query).await?;
//!         println!("{response}");
//!     }
//!     Ok(())
//! }
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use grantsync_util::redact_sensitive;
use reqwest::{Client, Url, header};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod query;

pub use query::{GRANT_KEY_PARAM, QueryDocument, build_organization_query};

/// Environment variable overriding the query endpoint.
pub const QUERY_URL_ENV: &str = "GRANTSYNC_QUERY_URL";
/// Environment variable overriding the resolution timeout, in seconds.
pub const QUERY_TIMEOUT_ENV: &str = "GRANTSYNC_QUERY_TIMEOUT_SECS";
pub const DEFAULT_QUERY_URL: &str = "https://api.jobtread.com/pave";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Hostnames allowed over plain HTTP for local development.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];
/// Upper bound on how much of an error body is kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Failure of a single remote query.
///
/// Values are plain data so they can be cloned into published resolution
/// states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Invalid response body: {message}")]
    Decode { message: String },

    #[error("Query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl QueryError {
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("request timed out: {error}")
        } else {
            error.to_string()
        };
        Self::Network { message }
    }
}

/// Issues field-selection queries against the remote endpoint.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Post `query` and return the decoded JSON response.
    ///
    /// Non-2xx statuses are reported as [`QueryError::Status`].
    async fn execute(&self, query: &QueryDocument) -> Result<Value, QueryError>;
}

/// Endpoint and timeout used by [`GrantClient`] and the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_QUERY_URL.to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Read the configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var(QUERY_URL_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_QUERY_URL.to_string());
        validate_endpoint(&endpoint)?;

        let timeout = match env::var(QUERY_TIMEOUT_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let seconds: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{QUERY_TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'"))?;
                if seconds == 0 {
                    return Err(anyhow!("{QUERY_TIMEOUT_ENV} must be greater than zero"));
                }
                Duration::from_secs(seconds)
            }
            _ => DEFAULT_QUERY_TIMEOUT,
        };

        Ok(Self { endpoint, timeout })
    }
}

/// Thin wrapper around a configured `reqwest::Client` posting to the query
/// endpoint.
#[derive(Debug, Clone)]
pub struct GrantClient {
    endpoint: String,
    http: Client,
}

impl GrantClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        validate_endpoint(&config.endpoint)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        default_headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&format!("grantsync/0.1; {}", env::consts::OS))?,
        );

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            endpoint: config.endpoint,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryTransport for GrantClient {
    async fn execute(&self, query: &QueryDocument) -> Result<Value, QueryError> {
        debug!(endpoint = %self.endpoint, "posting field-selection query");
        let response = self.http.post(&self.endpoint).json(&query.request_body()).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "query endpoint returned an error status");
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: error_body(&text),
            });
        }

        parse_response_body(&text)
    }
}

/// Decode a successful response body. An empty body decodes to `null`.
pub fn parse_response_body(text: &str) -> Result<Value, QueryError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|error| QueryError::Decode {
        message: error.to_string(),
    })
}

/// Error body as stored in [`QueryError::Status`]: grant keys echoed back by
/// the endpoint are redacted, then the text is truncated.
fn error_body(text: &str) -> String {
    truncate_body(&redact_sensitive(text))
}

fn truncate_body(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut truncated: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push('…');
    truncated
}

/// Validate that an endpoint URL is acceptable.
///
/// Rules:
/// - must parse and carry a host
/// - `localhost` or `127.0.0.1`: any scheme
/// - otherwise: scheme must be HTTPS
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let parsed = Url::parse(endpoint).map_err(|e| anyhow!("Invalid {QUERY_URL_ENV} '{}': {}", endpoint, e))?;

    let host_name = parsed
        .host_str()
        .ok_or_else(|| anyhow!("{QUERY_URL_ENV} must include a host"))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed.scheme() != "https" {
        return Err(anyhow!(
            "{QUERY_URL_ENV} must use https for non-localhost hosts; got '{}://'",
            parsed.scheme()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_default_and_localhost_endpoints() {
        assert!(validate_endpoint(DEFAULT_QUERY_URL).is_ok());
        assert!(validate_endpoint("http://localhost:3000/api/jtfetch").is_ok());
        assert!(validate_endpoint("http://127.0.0.1/pave").is_ok());
    }

    #[test]
    fn rejects_plain_http_for_remote_hosts() {
        let error = validate_endpoint("http://api.example.com/pave").unwrap_err();
        assert!(error.to_string().contains("must use https"), "{error}");
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn config_defaults_without_env() {
        temp_env::with_vars([(QUERY_URL_ENV, None::<&str>), (QUERY_TIMEOUT_ENV, None)], || {
            let config = ClientConfig::from_env().unwrap();
            assert_eq!(config, ClientConfig::default());
        });
    }

    #[test]
    fn config_honors_env_overrides() {
        temp_env::with_vars(
            [
                (QUERY_URL_ENV, Some("http://localhost:8080/pave")),
                (QUERY_TIMEOUT_ENV, Some("5")),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.endpoint, "http://localhost:8080/pave");
                assert_eq!(config.timeout, Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn config_rejects_zero_or_garbage_timeout() {
        temp_env::with_var(QUERY_TIMEOUT_ENV, Some("0"), || {
            assert!(ClientConfig::from_env().is_err());
        });
        temp_env::with_var(QUERY_TIMEOUT_ENV, Some("soon"), || {
            assert!(ClientConfig::from_env().is_err());
        });
    }

    #[test]
    fn parses_json_and_empty_bodies() {
        assert_eq!(parse_response_body("").unwrap(), Value::Null);
        assert_eq!(parse_response_body(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_response_body("<html>"), Err(QueryError::Decode { .. })));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 1);
    }

    #[test]
    fn echoed_grant_keys_are_redacted_from_error_bodies() {
        let echoed = r#"{"error":"invalid grant","query":{"$":{"grantKey":"abc123"}}}"#;

        let body = error_body(echoed);

        assert!(!body.contains("abc123"), "{body}");
        assert!(body.contains(r#""grantKey":"[REDACTED]""#), "{body}");
        assert!(body.contains("invalid grant"));
    }

    #[test]
    fn timeout_error_reports_milliseconds() {
        let error = QueryError::timeout(Duration::from_secs(2));
        assert_eq!(error.to_string(), "Query timed out after 2000ms");
    }
}
