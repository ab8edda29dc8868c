//! Connections — a user's stored authorization to call one provider's API.
//!
//! A connection is created `pending`, moves to `active` on its first
//! successful token exchange, and to `revoked` when the user disconnects.
//! `expired` exists as coarse application state but is never written by a
//! clock: token staleness is always derived at use time by comparing the
//! credential's expiry instant to now.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod store;

pub use store::ConnectionStore;

/// Coarse application-level connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Active,
    Expired,
    Revoked,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Expired => "expired",
            ConnectionStatus::Revoked => "revoked",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ConnectionStatus::Pending),
            "active" => Some(ConnectionStatus::Active),
            "expired" => Some(ConnectionStatus::Expired),
            "revoked" => Some(ConnectionStatus::Revoked),
            _ => None,
        }
    }
}

/// One user's authorization against one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    /// Opaque connection ID (UUIDv4)
    pub id: String,
    /// Provider tag (e.g. "onedrive")
    pub connector: String,
    /// Human-readable label
    pub name: String,
    /// Owning user
    pub user_id: String,
    /// Coarse lifecycle state
    pub status: ConnectionStatus,
    /// Opaque per-connection configuration
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
