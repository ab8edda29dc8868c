//! CSRF state management for the authorization flow.
//!
//! State tokens tie a provider callback back to the connection that started
//! the flow. Single-use, expiring, cleaned up periodically.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Pending authorization tracked by its state token.
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub connection_id: String,
    pub connector: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth state manager with automatic expiration.
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (600 = 10 minutes)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    /// Generates a state token (UUID v4) and records the pending authorization.
    pub fn create_state(&self, connection_id: &str, connector: &str) -> String {
        let state = Uuid::new_v4().to_string();
        let entry = StateEntry {
            connection_id: connection_id.to_string(),
            connector: connector.to_string(),
            created_at: Utc::now(),
        };

        let mut states = self.states.lock().unwrap();
        states.insert(state.clone(), entry);

        state
    }

    /// Validates and consumes a state token.
    ///
    /// Returns the entry if the token is known and unexpired; the token is
    /// removed either way (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let mut states = self.states.lock().unwrap();
        let entry = states.remove(state)?;

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Drops expired entries.
    pub fn cleanup_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();
        states.retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    /// Number of pending authorizations.
    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Background task that periodically drops expired states.
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(
            remaining = manager.count(),
            "OAuth state cleanup complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate_state() {
        let manager = StateManager::new(600);

        let state = manager.create_state("conn-1", "onedrive");
        assert!(!state.is_empty());

        let entry = manager.validate_and_consume(&state).unwrap();
        assert_eq!(entry.connection_id, "conn-1");
        assert_eq!(entry.connector, "onedrive");
    }

    #[test]
    fn test_state_is_single_use() {
        let manager = StateManager::new(600);
        let state = manager.create_state("conn-1", "dropbox");

        assert!(manager.validate_and_consume(&state).is_some());
        assert!(manager.validate_and_consume(&state).is_none());
    }

    #[test]
    fn test_unknown_state_rejected() {
        let manager = StateManager::new(600);
        assert!(manager.validate_and_consume("made-up").is_none());
    }

    #[test]
    fn test_expired_state_rejected() {
        let manager = StateManager::new(0);
        let state = manager.create_state("conn-1", "gmail");

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(manager.validate_and_consume(&state).is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = StateManager::new(0);
        manager.create_state("conn-1", "gmail");
        manager.create_state("conn-2", "gmail");

        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.cleanup_expired();
        assert_eq!(manager.count(), 0);
    }
}
