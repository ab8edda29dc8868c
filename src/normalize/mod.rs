//! Response normalization into provider-agnostic domain objects.
//!
//! A registry maps a domain tag ("file-storage", "messaging") to a
//! transformer. Transformers inspect the logical operation name to pick the
//! payload shape (list vs. single item) and the provider tag to pick the
//! field mapping, then emit a canonical object. Normalization is a
//! best-effort overlay: unknown domain/operation/provider combinations
//! yield a tagged pass-through wrapper, never an error, so callers that
//! only want the raw payload are unaffected.
//!
//! The registry is an explicit value built once at startup and handed to
//! whoever needs it — there is no ambient global transformer table.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;

mod file_storage;
mod messaging;

pub use file_storage::{FileStorageTransformer, StorageFile, StorageFileList};
pub use messaging::{Message, MessageList, MessagingTransformer};

/// Provider identity, parsed from the connection's connector tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provider {
    OneDrive,
    Dropbox,
    Gmail,
}

impl Provider {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "onedrive" => Some(Provider::OneDrive),
            "dropbox" => Some(Provider::Dropbox),
            "gmail" => Some(Provider::Gmail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OneDrive => "onedrive",
            Provider::Dropbox => "dropbox",
            Provider::Gmail => "gmail",
        }
    }
}

/// Normalization domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    FileStorage,
    Messaging,
}

impl Domain {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "file-storage" => Some(Domain::FileStorage),
            "messaging" => Some(Domain::Messaging),
            _ => None,
        }
    }
}

/// Per-domain payload transformer.
///
/// Must be pure: identical (payload, operation, provider) inputs produce
/// identical output.
pub trait Transformer: Send + Sync {
    fn transform(&self, payload: &Value, operation: &str, provider: Provider) -> Value;
}

/// Wraps a payload that no transformer claimed.
pub fn passthrough(payload: &Value) -> Value {
    json!({
        "raw_data": payload,
        "transformed": false,
    })
}

/// Registry of transformers, one per domain.
pub struct NormalizerRegistry {
    transformers: HashMap<Domain, Box<dyn Transformer>>,
}

impl NormalizerRegistry {
    /// An empty registry (everything passes through).
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// A registry with the builtin file-storage and messaging transformers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Domain::FileStorage, Box::new(FileStorageTransformer));
        registry.register(Domain::Messaging, Box::new(MessagingTransformer));
        registry
    }

    pub fn register(&mut self, domain: Domain, transformer: Box<dyn Transformer>) {
        self.transformers.insert(domain, transformer);
    }

    /// Dispatches a raw payload to the domain's transformer.
    ///
    /// Unknown domain or provider tags yield the pass-through wrapper.
    pub fn transform(
        &self,
        domain_tag: &str,
        payload: &Value,
        operation: &str,
        provider_tag: &str,
    ) -> Value {
        let Some(domain) = Domain::parse(domain_tag) else {
            return passthrough(payload);
        };
        let Some(transformer) = self.transformers.get(&domain) else {
            return passthrough(payload);
        };
        let Some(provider) = Provider::parse(provider_tag) else {
            return passthrough(payload);
        };
        transformer.transform(payload, operation, provider)
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Parses a provider timestamp, tolerant of a trailing literal `Z`
/// (treated as UTC offset `+00:00`). Unparsable or absent input is `None`,
/// never an error.
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let normalized = if let Some(stripped) = raw.strip_suffix('Z') {
        format!("{}+00:00", stripped)
    } else {
        raw.to_string()
    };
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
