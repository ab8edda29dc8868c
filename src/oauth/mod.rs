//! OAuth 2.0 authorization-code flow against external providers.
//!
//! The coordinator is stateless given its inputs: it builds authorization
//! URLs, exchanges authorization codes for tokens and refreshes expired
//! tokens. Persistence and refresh serialization live elsewhere (token
//! store, request proxy). Only the authorization-code grant is supported.

use crate::connector::ConnectorConfig;
use crate::credentials::Credential;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

mod state;

pub use state::{run_state_cleanup, StateManager};

/// Fixed timeout for token endpoint calls.
const TOKEN_TIMEOUT_SECS: u64 = 30;

/// Errors from the OAuth coordinator.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Authorization-code exchange failed (transport error or non-2xx).
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// Refresh-token grant failed (transport error or non-2xx).
    #[error("Failed to refresh token: {0}")]
    RefreshFailed(String),
}

/// Result of building an authorization URL.
#[derive(Clone, Debug, Serialize)]
pub struct AuthorizationUrl {
    pub authorization_url: String,
    pub state: String,
}

/// Standard OAuth 2.0 token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, previous_refresh_token: Option<String>) -> Credential {
        Credential {
            access_token: self.access_token,
            // Providers often omit the refresh token on a refresh grant;
            // the original one stays valid in that case.
            refresh_token: self.refresh_token.or(previous_refresh_token),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: self.expires_in.map(compute_expiry),
            scope: self.scope,
        }
    }
}

/// Returns true iff the token is stale at the current instant.
///
/// A `None` expiry means the token never expires.
pub fn is_expired(expires_at: Option<DateTime<Utc>>) -> bool {
    match expires_at {
        None => false,
        Some(expiry) => Utc::now() >= expiry,
    }
}

/// Absolute expiry instant for a token valid for `expires_in_secs` from now.
pub fn compute_expiry(expires_in_secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in_secs)
}

/// Stateless OAuth coordinator.
pub struct OAuthCoordinator {
    http_client: reqwest::Client,
}

impl Default for OAuthCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthCoordinator {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self { http_client }
    }

    /// Builds the provider authorization URL.
    ///
    /// Generates a random state token when none is supplied. The query
    /// string requests offline access and forced consent so providers hand
    /// out refresh tokens on every authorization.
    pub fn build_authorization_url(
        &self,
        config: &ConnectorConfig,
        redirect_uri: &str,
        state: Option<String>,
    ) -> AuthorizationUrl {
        let state = state.unwrap_or_else(|| Uuid::new_v4().to_string());
        let scope = config.scopes.join(" ");

        let authorization_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            config.auth_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&state),
        );

        AuthorizationUrl {
            authorization_url,
            state,
        }
    }

    /// Exchanges an authorization code for a credential.
    pub async fn exchange_code(
        &self,
        config: &ConnectorConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, OAuthError> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "authorization_code");
        form_data.insert("code", code);
        form_data.insert("redirect_uri", redirect_uri);
        form_data.insert("client_id", config.client_id.as_str());
        form_data.insert("client_secret", config.client_secret.as_str());

        tracing::debug!(connector = %config.name, "Exchanging authorization code for token");

        let response = self
            .token_grant(&config.token_url, &form_data)
            .await
            .map_err(OAuthError::ExchangeFailed)?;

        Ok(response.into_credential(None))
    }

    /// Performs a refresh-token grant and returns the fresh credential.
    ///
    /// Transient timeouts are reported as failures like any other: a
    /// refresh-token grant is not assumed safe to retry.
    pub async fn refresh(
        &self,
        config: &ConnectorConfig,
        refresh_token: &str,
    ) -> Result<Credential, OAuthError> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "refresh_token");
        form_data.insert("refresh_token", refresh_token);
        form_data.insert("client_id", config.client_id.as_str());
        form_data.insert("client_secret", config.client_secret.as_str());

        tracing::debug!(connector = %config.name, "Refreshing access token");

        let response = self
            .token_grant(&config.token_url, &form_data)
            .await
            .map_err(OAuthError::RefreshFailed)?;

        Ok(response.into_credential(Some(refresh_token.to_string())))
    }

    async fn token_grant(
        &self,
        token_url: &str,
        form_data: &HashMap<&str, &str>,
    ) -> Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(token_url)
            .header("Accept", "application/json")
            .form(form_data)
            .send()
            .await
            .map_err(|e| format!("request to token endpoint failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("token endpoint returned {}: {}", status, body));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| format!("failed to parse token response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(token_url: &str) -> ConnectorConfig {
        ConnectorConfig {
            name: "dropbox".to_string(),
            auth_url: "https://example.com/oauth/authorize".to_string(),
            token_url: token_url.to_string(),
            base_url: "https://api.example.com".to_string(),
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            scopes: vec!["files.read".to_string(), "files.write".to_string()],
        }
    }

    #[test]
    fn test_build_authorization_url() {
        let coordinator = OAuthCoordinator::new();
        let config = test_config("https://example.com/oauth/token");

        let result = coordinator.build_authorization_url(
            &config,
            "http://localhost:8686/api/oauth/callback",
            Some("fixed_state".to_string()),
        );

        assert!(result
            .authorization_url
            .starts_with("https://example.com/oauth/authorize?"));
        assert!(result.authorization_url.contains("client_id=test_client_id"));
        assert!(result
            .authorization_url
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8686%2Fapi%2Foauth%2Fcallback"));
        assert!(result.authorization_url.contains("response_type=code"));
        // Scopes space-joined, URL encoding turns the space into %20
        assert!(result
            .authorization_url
            .contains("scope=files.read%20files.write"));
        assert!(result.authorization_url.contains("state=fixed_state"));
        assert!(result.authorization_url.contains("access_type=offline"));
        assert!(result.authorization_url.contains("prompt=consent"));
        assert_eq!(result.state, "fixed_state");
    }

    #[test]
    fn test_build_authorization_url_generates_state() {
        let coordinator = OAuthCoordinator::new();
        let config = test_config("https://example.com/oauth/token");

        let first = coordinator.build_authorization_url(&config, "http://cb", None);
        let second = coordinator.build_authorization_url(&config, "http://cb", None);

        assert!(!first.state.is_empty());
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_is_expired() {
        // Null expiry means never expires
        assert!(!is_expired(None));
        assert!(is_expired(Some(Utc::now() - Duration::seconds(1))));
        assert!(!is_expired(Some(Utc::now() + Duration::hours(1))));
    }

    #[test]
    fn test_compute_expiry() {
        let before = Utc::now() + Duration::seconds(3600);
        let expiry = compute_expiry(3600);
        let after = Utc::now() + Duration::seconds(3600);
        assert!(expiry >= before && expiry <= after);
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "at_1234567890",
            "refresh_token": "rt_0987654321",
            "expires_in": 3600,
            "token_type": "bearer",
            "scope": "files.read"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "at_1234567890");
        assert_eq!(response.refresh_token, Some("rt_0987654321".to_string()));
        assert_eq!(response.expires_in, Some(3600));
    }

    #[test]
    fn test_token_response_minimal() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "token_12345"}"#).unwrap();

        let credential = response.into_credential(None);
        assert_eq!(credential.access_token, "token_12345");
        assert_eq!(credential.refresh_token, None);
        assert_eq!(credential.token_type, "Bearer");
        assert_eq!(credential.expires_at, None);
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "new_at", "expires_in": 60}"#).unwrap();

        let credential = response.into_credential(Some("old_rt".to_string()));
        assert_eq!(credential.refresh_token, Some("old_rt".to_string()));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(
                r#"{"access_token": "at_new", "refresh_token": "rt_new", "expires_in": 3600, "token_type": "Bearer"}"#,
            )
            .create_async()
            .await;

        let coordinator = OAuthCoordinator::new();
        let config = test_config(&format!("{}/oauth/token", server.url()));

        let credential = coordinator
            .exchange_code(&config, "auth_code_abc", "http://localhost/cb")
            .await
            .expect("exchange failed");

        assert_eq!(credential.access_token, "at_new");
        assert_eq!(credential.refresh_token, Some("rt_new".to_string()));
        assert!(credential.expires_at.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let coordinator = OAuthCoordinator::new();
        let config = test_config(&format!("{}/oauth/token", server.url()));

        let err = coordinator
            .exchange_code(&config, "bad_code", "http://localhost/cb")
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::ExchangeFailed(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"error": "invalid_token"}"#)
            .create_async()
            .await;

        let coordinator = OAuthCoordinator::new();
        let config = test_config(&format!("{}/oauth/token", server.url()));

        let err = coordinator.refresh(&config, "stale_rt").await.unwrap_err();
        assert!(matches!(err, OAuthError::RefreshFailed(_)));
        assert!(err.to_string().starts_with("Failed to refresh token"));
    }
}
