//! Authenticated request proxy.
//!
//! Every outbound provider call goes through `RequestProxy::execute`: it
//! resolves a valid credential for the connection (refreshing transparently
//! when the stored one is stale), builds the URL and headers from the
//! endpoint template, performs one HTTP call and decodes the response into a
//! uniform [`ResultEnvelope`]. Failures never cross the proxy boundary as
//! errors — every outcome is an envelope.
//!
//! # Refresh concurrency
//!
//! Refresh tokens are often single-use upstream, so two concurrent calls on
//! the same expired connection must not both hit the token endpoint. The
//! proxy keeps one async mutex per connection id in a `DashMap`; the first
//! caller through the lock refreshes and replaces the stored credential,
//! waiters re-check freshness after acquiring and reuse the replaced record.
//! Unrelated connections refresh fully in parallel.

use crate::connector::{ConnectorConfig, EndpointTemplate, ResponseType};
use crate::credentials::{Credential, TokenStore};
use crate::oauth::{self, OAuthCoordinator, OAuthError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fixed timeout for proxied upstream calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Failure categories surfaced by the proxy.
///
/// All of these are folded into a [`ResultEnvelope`] at the boundary. An
/// upstream HTTP status >= 400 is NOT one of them: that is a completed
/// exchange, surfaced with `success: false` and the status preserved.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No authentication token found for this connection")]
    NoCredential,

    #[error("Token expired and no refresh token available")]
    ExpiredNoRefresh,

    #[error(transparent)]
    RefreshFailed(#[from] OAuthError),

    #[error("Request failed: {0}")]
    TransportFailed(String),

    #[error("Credential store error: {0}")]
    Storage(String),
}

/// Uniform result of every proxy call.
///
/// `status` is present only when an HTTP exchange completed; `error` only on
/// failure. Which fields are absent tells the caller what happened.
#[derive(Clone, Debug, Serialize)]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub data: Value,
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    fn failure(error: &ProxyError) -> Self {
        Self {
            success: false,
            status: None,
            data: Value::Null,
            headers: HashMap::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Generic authenticated request proxy.
pub struct RequestProxy {
    token_store: Arc<dyn TokenStore>,
    coordinator: Arc<OAuthCoordinator>,
    http_client: reqwest::Client,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RequestProxy {
    pub fn new(token_store: Arc<dyn TokenStore>, coordinator: Arc<OAuthCoordinator>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            token_store,
            coordinator,
            http_client,
            refresh_locks: DashMap::new(),
        }
    }

    /// Executes one authenticated call for a connection.
    ///
    /// Resolves a valid credential (refreshing if needed), substitutes path
    /// parameters into the endpoint template, performs the HTTP call and
    /// decodes the body per the template's declared response type.
    pub async fn execute(
        &self,
        connection_id: &str,
        connector: &ConnectorConfig,
        endpoint: &EndpointTemplate,
        params: Option<&HashMap<String, String>>,
        body: Option<&Value>,
        path_params: Option<&HashMap<String, String>>,
    ) -> ResultEnvelope {
        let credential = match self.resolve_credential(connection_id, connector).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Proxy call failed before upstream");
                return ResultEnvelope::failure(&e);
            }
        };

        let url = build_url(&connector.base_url, &endpoint.path, path_params);
        let headers = build_headers(&credential, &endpoint.headers);
        let method = match reqwest::Method::from_bytes(endpoint.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                let e = ProxyError::TransportFailed(format!(
                    "invalid HTTP method '{}'",
                    endpoint.method
                ));
                return ResultEnvelope::failure(&e);
            }
        };

        debug!(connection_id = %connection_id, method = %method, url = %url, "Proxying request");

        let mut request = self.http_client.request(method.clone(), &url);
        for (key, value) in &headers {
            request = request.header(key, value);
        }
        if let Some(params) = params {
            request = request.query(params);
        }
        // Only body-carrying methods get a JSON body
        if matches!(
            method,
            reqwest::Method::POST | reqwest::Method::PUT | reqwest::Method::PATCH
        ) {
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Upstream call failed");
                return ResultEnvelope::failure(&ProxyError::TransportFailed(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let content_type = response_headers.get("content-type").cloned();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return ResultEnvelope::failure(&ProxyError::TransportFailed(e.to_string()));
            }
        };

        ResultEnvelope {
            success: status < 400,
            status: Some(status),
            data: decode_body(endpoint.response_type, &bytes, content_type),
            headers: response_headers,
            error: None,
        }
    }

    /// Returns a credential that is valid right now, refreshing if needed.
    ///
    /// At most one upstream refresh is in flight per connection: the
    /// per-connection lock serializes refreshers, and the re-check after
    /// acquiring lets waiters reuse the already-replaced credential.
    async fn resolve_credential(
        &self,
        connection_id: &str,
        connector: &ConnectorConfig,
    ) -> Result<Credential, ProxyError> {
        let credential = self
            .token_store
            .get(connection_id)
            .map_err(|e| ProxyError::Storage(e.to_string()))?
            .ok_or(ProxyError::NoCredential)?;

        if !oauth::is_expired(credential.expires_at) {
            return Ok(credential);
        }

        let lock = self
            .refresh_locks
            .entry(connection_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Re-check under the lock: a racing caller may have refreshed and
        // replaced the record while we waited.
        let credential = self
            .token_store
            .get(connection_id)
            .map_err(|e| ProxyError::Storage(e.to_string()))?
            .ok_or(ProxyError::NoCredential)?;
        if !oauth::is_expired(credential.expires_at) {
            return Ok(credential);
        }

        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(ProxyError::ExpiredNoRefresh)?;

        debug!(connection_id = %connection_id, "Access token expired, refreshing");
        let fresh = self.coordinator.refresh(connector, refresh_token).await?;

        self.token_store
            .replace(connection_id, &fresh)
            .map_err(|e| ProxyError::Storage(e.to_string()))?;

        // Reload so the request uses exactly what was stored, not a stale
        // in-memory copy.
        self.token_store
            .get(connection_id)
            .map_err(|e| ProxyError::Storage(e.to_string()))?
            .ok_or(ProxyError::NoCredential)
    }
}

/// Concatenates the base URL and path, substituting `{name}` placeholders.
///
/// Placeholders with no matching path parameter stay verbatim; completeness
/// is the caller's responsibility.
fn build_url(base_url: &str, path: &str, path_params: Option<&HashMap<String, String>>) -> String {
    let mut path = path.to_string();
    if let Some(params) = path_params {
        for (key, value) in params {
            path = path.replace(&format!("{{{}}}", key), value);
        }
    }
    format!("{}{}", base_url, path)
}

/// Default headers overlaid with the endpoint's static headers.
///
/// The endpoint wins on conflicts, so a provider needing a custom
/// Content-Type (e.g. binary upload) can override the default.
fn build_headers(
    credential: &Credential,
    static_headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "Authorization".to_string(),
        format!("{} {}", credential.token_type, credential.access_token),
    );
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    for (key, value) in static_headers {
        headers.insert(key.clone(), value.clone());
    }

    headers
}

/// Decodes a response body per the endpoint's declared response type.
///
/// An empty body is `null` regardless of declaration. Undecodable JSON
/// degrades to the raw text rather than erroring.
fn decode_body(response_type: ResponseType, bytes: &[u8], content_type: Option<String>) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }

    match response_type {
        ResponseType::Json => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ResponseType::Binary => serde_json::json!({
            "content": BASE64.encode(bytes),
            "content_type": content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
        }),
        ResponseType::Text => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}
