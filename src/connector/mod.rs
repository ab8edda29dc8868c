//! Declarative connector configuration.
//!
//! A connector describes one external provider: its OAuth endpoints, API base
//! URL and client credentials. An endpoint template describes a single
//! operation against that provider (method, path pattern, static headers,
//! response shape). Both are supplied by callers per request — the gateway
//! never hardcodes provider business logic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one external provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Provider tag (lowercase, e.g. "onedrive", "dropbox", "gmail").
    pub name: String,

    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Base URL for proxied API calls (no trailing slash)
    pub base_url: String,

    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Required OAuth scopes
    pub scopes: Vec<String>,
}

/// Declared response encoding for an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Json,
    Binary,
    Text,
}

impl Default for ResponseType {
    fn default() -> Self {
        ResponseType::Json
    }
}

/// Template for a single provider operation.
///
/// The path pattern may contain `{name}` placeholders which the proxy
/// substitutes from the caller's path parameters. Static headers take
/// precedence over the proxy's defaults, so an endpoint can override
/// `Content-Type` for e.g. binary uploads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointTemplate {
    /// HTTP method ("GET", "POST", ...). Case-insensitive.
    pub method: String,

    /// Path pattern appended to the connector's base URL.
    pub path: String,

    /// Static headers overlaid on the proxy defaults.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Declared response encoding (defaults to json).
    #[serde(default)]
    pub response_type: ResponseType,
}

/// Returns the builtin connector configuration by provider tag.
///
/// Client ID and secret are loaded from `PRISM_OAUTH_{NAME}_CLIENT_ID` and
/// `PRISM_OAUTH_{NAME}_CLIENT_SECRET`. Returns `None` for unknown tags or
/// when the environment variables are not set.
pub fn get_connector_config(name: &str) -> Option<ConnectorConfig> {
    let env_prefix = name.to_uppercase();
    let client_id = std::env::var(format!("PRISM_OAUTH_{}_CLIENT_ID", env_prefix)).ok()?;
    let client_secret = std::env::var(format!("PRISM_OAUTH_{}_CLIENT_SECRET", env_prefix)).ok()?;

    let (auth_url, token_url, base_url, scopes) = match name {
        "onedrive" => (
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            "https://graph.microsoft.com/v1.0",
            vec!["Files.Read", "offline_access"],
        ),
        "dropbox" => (
            "https://www.dropbox.com/oauth2/authorize",
            "https://api.dropboxapi.com/oauth2/token",
            "https://api.dropboxapi.com/2",
            vec!["files.metadata.read"],
        ),
        "gmail" => (
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            "https://gmail.googleapis.com/gmail/v1",
            vec!["https://www.googleapis.com/auth/gmail.readonly"],
        ),
        _ => return None,
    };

    Some(ConnectorConfig {
        name: name.to_string(),
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        base_url: base_url.to_string(),
        client_id,
        client_secret,
        scopes: scopes.into_iter().map(|s| s.to_string()).collect(),
    })
}

/// Check if a provider tag has a builtin configuration.
pub fn is_known_connector(name: &str) -> bool {
    matches!(name, "onedrive" | "dropbox" | "gmail")
}
