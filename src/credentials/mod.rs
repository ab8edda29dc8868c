//! Credential records and encrypted token storage.
//!
//! One credential record per connection: access token, optional refresh
//! token, token type, absolute expiry and granted scope. Records are
//! replaced wholesale — never mutated field by field — so a reader always
//! observes either the old or the new complete record. The SQLite store
//! keeps a per-connection version counter that `replace` bumps atomically,
//! giving monotonic credential visibility per connection.
//!
//! Tokens are encrypted at rest with AES-256-GCM (unique nonce per value);
//! the master key comes from `PRISM_ENCRYPTION_KEY`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::{open_sealed, seal, validate_key};
pub use storage::SqliteTokenStore;

/// OAuth credential for one connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// OAuth access token (sent on every proxied request)
    pub access_token: String,

    /// OAuth refresh token, if the provider granted one
    pub refresh_token: Option<String>,

    /// Token type for the Authorization header (normally "Bearer")
    pub token_type: String,

    /// Absolute expiry instant. `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scope, as reported by the provider
    pub scope: Option<String>,
}

/// Durable, keyed storage of one credential record per connection.
///
/// Pure data access — expiry evaluation and refresh orchestration live in
/// the OAuth coordinator and the request proxy.
pub trait TokenStore: Send + Sync {
    /// Returns the credential for a connection, or `None` if nothing is stored.
    fn get(&self, connection_id: &str) -> Result<Option<Credential>>;

    /// Atomically replaces the credential for a connection.
    ///
    /// Any prior record is discarded, never merged. Returns the stored value.
    fn replace(&self, connection_id: &str, credential: &Credential) -> Result<Credential>;

    /// Deletes the credential for a connection. No-op if none is stored.
    fn delete(&self, connection_id: &str) -> Result<()>;
}
