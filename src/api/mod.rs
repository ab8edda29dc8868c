//! HTTP surface for the gateway.
//!
//! Thin transport layer over the core: connection management, the OAuth
//! authorization flow and proxied execution. Handlers translate between
//! HTTP and the core types; they hold no business rules of their own.

use crate::connection::{ConnectionStore, ConnectionStatus};
use crate::connector::{get_connector_config, is_known_connector, EndpointTemplate};
use crate::credentials::TokenStore;
use crate::normalize::NormalizerRegistry;
use crate::oauth::{OAuthCoordinator, StateManager};
use crate::proxy::{RequestProxy, ResultEnvelope};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the API
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub connection_store: Arc<ConnectionStore>,
    pub token_store: Arc<dyn TokenStore>,
    pub coordinator: Arc<OAuthCoordinator>,
    pub proxy: Arc<RequestProxy>,
    pub normalizer: Arc<NormalizerRegistry>,
    pub state_manager: StateManager,
    pub callback_base_url: String,
}

#[derive(Deserialize)]
struct CreateConnectionRequest {
    connector: String,
    name: String,
    user_id: String,
    config: Option<Value>,
}

#[derive(Deserialize)]
struct ListConnectionsParams {
    user_id: String,
    connector: Option<String>,
}

#[derive(Deserialize)]
struct OAuthCallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct OAuthSuccessResponse {
    success: bool,
    message: String,
    connection_id: String,
}

/// Proxy execution request.
///
/// `normalize` optionally names a domain and logical operation; when set
/// and the call succeeds, the envelope's data is the canonical object (or
/// the tagged pass-through for unknown combinations).
#[derive(Deserialize)]
struct ExecuteRequest {
    endpoint: EndpointTemplate,
    params: Option<HashMap<String, String>>,
    body: Option<Value>,
    path_params: Option<HashMap<String, String>>,
    normalize: Option<NormalizeRequest>,
}

#[derive(Deserialize)]
struct NormalizeRequest {
    domain: String,
    operation: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/connections",
            post(create_connection).get(list_connections),
        )
        .route(
            "/api/connections/:id",
            get(get_connection).delete(delete_connection),
        )
        .route("/api/connections/:id/oauth/start", get(oauth_start))
        .route("/api/oauth/callback", get(oauth_callback))
        .route("/api/connections/:id/execute", post(execute))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

/// POST /api/connections
async fn create_connection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateConnectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !is_known_connector(&request.connector) {
        return Err(AppError::NotFound(format!(
            "Connector '{}' not found",
            request.connector
        )));
    }

    let connection = state
        .connection_store
        .create(
            &request.connector,
            &request.name,
            &request.user_id,
            request.config,
        )
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    info!(
        connection_id = %connection.id,
        connector = %connection.connector,
        "Connection created"
    );

    Ok((StatusCode::CREATED, Json(connection)))
}

/// GET /api/connections/:id
async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let connection = state
        .connection_store
        .get(&id)
        .map_err(|e| AppError::ServerError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", id)))?;
    Ok(Json(connection))
}

/// GET /api/connections?user_id=...&connector=...
async fn list_connections(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListConnectionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let connections = state
        .connection_store
        .list_by_user(&params.user_id, params.connector.as_deref())
        .map_err(|e| AppError::ServerError(e.to_string()))?;
    Ok(Json(serde_json::json!({ "connections": connections })))
}

/// DELETE /api/connections/:id
///
/// Also discards the stored credential.
async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .token_store
        .delete(&id)
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    let deleted = state
        .connection_store
        .delete(&id)
        .map_err(|e| AppError::ServerError(e.to_string()))?;
    if !deleted {
        return Err(AppError::NotFound(format!("Connection '{}' not found", id)));
    }

    info!(connection_id = %id, "Connection deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/connections/:id/oauth/start
///
/// Returns the provider authorization URL and the CSRF state tied to this
/// connection. The caller sends the user to the URL; the provider comes
/// back via the callback endpoint.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let connection = state
        .connection_store
        .get(&id)
        .map_err(|e| AppError::ServerError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", id)))?;

    let connector_config = get_connector_config(&connection.connector).ok_or_else(|| {
        AppError::ServerError(format!(
            "OAuth not configured for connector '{}'. Set PRISM_OAUTH_{}_CLIENT_ID and PRISM_OAUTH_{}_CLIENT_SECRET.",
            connection.connector,
            connection.connector.to_uppercase(),
            connection.connector.to_uppercase()
        ))
    })?;

    let csrf_state = state
        .state_manager
        .create_state(&connection.id, &connection.connector);
    let redirect_uri = format!("{}/api/oauth/callback", state.callback_base_url);

    let authorization =
        state
            .coordinator
            .build_authorization_url(&connector_config, &redirect_uri, Some(csrf_state));

    debug!(
        connection_id = %connection.id,
        connector = %connection.connector,
        "Authorization URL issued"
    );

    Ok(Json(authorization))
}

/// GET /api/oauth/callback
///
/// Exchanges the authorization code, persists the credential and activates
/// the connection. The state parameter is single-use.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(callback): Query<OAuthCallbackParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!(state = %csrf_state, "Invalid or expired OAuth state");
            AppError::Unauthorized("Invalid or expired OAuth state".to_string())
        })?;

    let connector_config = get_connector_config(&entry.connector).ok_or_else(|| {
        AppError::ServerError(format!(
            "OAuth not configured for connector '{}'",
            entry.connector
        ))
    })?;

    // Must match the redirect_uri used at start
    let redirect_uri = format!("{}/api/oauth/callback", state.callback_base_url);

    let credential = state
        .coordinator
        .exchange_code(&connector_config, &code, &redirect_uri)
        .await
        .map_err(|e| AppError::BadRequest(format!("OAuth callback failed: {}", e)))?;

    state
        .token_store
        .replace(&entry.connection_id, &credential)
        .map_err(|e| AppError::ServerError(e.to_string()))?;
    state
        .connection_store
        .update_status(&entry.connection_id, ConnectionStatus::Active)
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    info!(
        connection_id = %entry.connection_id,
        connector = %entry.connector,
        "OAuth flow completed, connection active"
    );

    Ok(Json(OAuthSuccessResponse {
        success: true,
        message: "OAuth flow completed successfully".to_string(),
        connection_id: entry.connection_id,
    }))
}

/// POST /api/connections/:id/execute
///
/// Runs one proxied call. Always responds 200 with a result envelope —
/// upstream failures are data, not HTTP errors — except when the
/// connection itself is unknown.
async fn execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ResultEnvelope>, AppError> {
    let connection = state
        .connection_store
        .get(&id)
        .map_err(|e| AppError::ServerError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", id)))?;

    let connector_config = get_connector_config(&connection.connector).ok_or_else(|| {
        AppError::ServerError(format!(
            "OAuth not configured for connector '{}'",
            connection.connector
        ))
    })?;

    let mut envelope = state
        .proxy
        .execute(
            &connection.id,
            &connector_config,
            &request.endpoint,
            request.params.as_ref(),
            request.body.as_ref(),
            request.path_params.as_ref(),
        )
        .await;

    if let Some(normalize) = request.normalize {
        if envelope.success {
            envelope.data = state.normalizer.transform(
                &normalize.domain,
                &envelope.data,
                &normalize.operation,
                &connection.connector,
            );
        }
    }

    Ok(Json(envelope))
}
