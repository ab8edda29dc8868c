//! Canonical messaging objects and the Gmail field mapping.

use super::{passthrough, Provider, Transformer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Canonical email message, provider-agnostic.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Option<Vec<String>>,
    pub snippet: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub metadata: Value,
}

/// Canonical message list.
///
/// When the provider only reports an estimated total (Gmail's
/// `resultSizeEstimate`), `total_count` carries the estimate and the list is
/// marked `estimated` — callers must not assume it equals `messages.len()`
/// in that case.
#[derive(Clone, Debug, Serialize)]
pub struct MessageList {
    pub messages: Vec<Message>,
    pub total_count: u64,
    pub has_more: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
    pub next_page_token: Option<String>,
    pub metadata: Value,
}

/// Transformer for email providers (Gmail).
pub struct MessagingTransformer;

impl Transformer for MessagingTransformer {
    fn transform(&self, payload: &Value, operation: &str, provider: Provider) -> Value {
        match operation {
            "list_messages" => self.transform_list(payload, provider),
            "get_message" => self.transform_single(payload, provider),
            _ => passthrough(payload),
        }
    }
}

impl MessagingTransformer {
    fn transform_list(&self, payload: &Value, provider: Provider) -> Value {
        if provider != Provider::Gmail {
            return passthrough(payload);
        }

        let stubs = payload["messages"].as_array().cloned().unwrap_or_default();
        let messages: Vec<Message> = stubs.iter().map(gmail_message_stub).collect();

        // The list endpoint reports an estimate, not an exact total
        let estimate = payload["resultSizeEstimate"].as_u64();
        let list = MessageList {
            total_count: estimate.unwrap_or(messages.len() as u64),
            estimated: estimate.is_some(),
            has_more: payload.get("nextPageToken").is_some(),
            next_page_token: payload["nextPageToken"].as_str().map(String::from),
            metadata: json!({"connector": "gmail"}),
            messages,
        };

        serde_json::to_value(list).unwrap_or_else(|_| passthrough(payload))
    }

    fn transform_single(&self, payload: &Value, provider: Provider) -> Value {
        if provider != Provider::Gmail {
            return passthrough(payload);
        }
        serde_json::to_value(gmail_message(payload)).unwrap_or_else(|_| passthrough(payload))
    }
}

/// List responses carry only id and thread id per message; the rest comes
/// from a follow-up `get_message`.
fn gmail_message_stub(msg: &Value) -> Message {
    let id = msg["id"].as_str().unwrap_or_default().to_string();
    Message {
        thread_id: msg["threadId"].as_str().map(String::from),
        subject: String::new(),
        from_address: String::new(),
        to_addresses: Vec::new(),
        cc_addresses: None,
        snippet: None,
        received_at: None,
        labels: Vec::new(),
        is_read: false,
        is_starred: false,
        metadata: json!({"gmail_id": id}),
        id,
    }
}

/// Maps a full Gmail message resource to the canonical shape.
fn gmail_message(msg: &Value) -> Message {
    let headers: HashMap<&str, &str> = msg["payload"]["headers"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|h| Some((h["name"].as_str()?, h["value"].as_str()?)))
                .collect()
        })
        .unwrap_or_default();

    let labels: Vec<String> = msg["labelIds"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|l| l.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let id = msg["id"].as_str().unwrap_or_default().to_string();
    Message {
        thread_id: msg["threadId"].as_str().map(String::from),
        subject: headers.get("Subject").unwrap_or(&"").to_string(),
        from_address: headers.get("From").unwrap_or(&"").to_string(),
        to_addresses: vec![headers.get("To").unwrap_or(&"").to_string()],
        cc_addresses: headers.get("Cc").map(|cc| vec![cc.to_string()]),
        snippet: msg["snippet"].as_str().map(String::from),
        received_at: parse_rfc2822(headers.get("Date").copied()),
        is_read: !labels.iter().any(|l| l == "UNREAD"),
        is_starred: labels.iter().any(|l| l == "STARRED"),
        metadata: json!({
            "gmail_id": id,
            "history_id": msg["historyId"],
            "internal_date": msg["internalDate"],
        }),
        labels,
        id,
    }
}

/// The Date header is RFC 2822; unparsable or absent means no timestamp.
fn parse_rfc2822(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(payload: &Value, operation: &str) -> Value {
        MessagingTransformer.transform(payload, operation, Provider::Gmail)
    }

    #[test]
    fn test_list_uses_estimate_and_marks_it() {
        let payload = json!({
            "messages": [
                {"id": "m1", "threadId": "t1"},
                {"id": "m2", "threadId": "t1"}
            ],
            "resultSizeEstimate": 201,
            "nextPageToken": "page-2"
        });

        let result = transform(&payload, "list_messages");

        // Estimate wins over the item count, and the list says so
        assert_eq!(result["total_count"], 201);
        assert_eq!(result["estimated"], true);
        assert_eq!(result["has_more"], true);
        assert_eq!(result["next_page_token"], "page-2");
        assert_eq!(result["messages"].as_array().unwrap().len(), 2);
        assert_eq!(result["messages"][0]["id"], "m1");
        assert_eq!(result["messages"][0]["thread_id"], "t1");
    }

    #[test]
    fn test_list_without_estimate_counts_items() {
        let payload = json!({
            "messages": [{"id": "m1"}]
        });

        let result = transform(&payload, "list_messages");
        assert_eq!(result["total_count"], 1);
        assert!(result.get("estimated").is_none());
        assert_eq!(result["has_more"], false);
        assert_eq!(result["next_page_token"], Value::Null);
    }

    #[test]
    fn test_single_message_mapping() {
        let payload = json!({
            "id": "m42",
            "threadId": "t9",
            "snippet": "Quarterly numbers attached",
            "labelIds": ["INBOX", "STARRED"],
            "historyId": "88123",
            "internalDate": "1767225600000",
            "payload": {
                "headers": [
                    {"name": "Subject", "value": "Q4 report"},
                    {"name": "From", "value": "cfo@example.com"},
                    {"name": "To", "value": "team@example.com"},
                    {"name": "Cc", "value": "audit@example.com"},
                    {"name": "Date", "value": "Thu, 01 Jan 2026 12:00:00 +0000"}
                ]
            }
        });

        let result = transform(&payload, "get_message");

        assert_eq!(result["subject"], "Q4 report");
        assert_eq!(result["from_address"], "cfo@example.com");
        assert_eq!(result["to_addresses"][0], "team@example.com");
        assert_eq!(result["cc_addresses"][0], "audit@example.com");
        // No UNREAD label means read; STARRED present
        assert_eq!(result["is_read"], true);
        assert_eq!(result["is_starred"], true);
        assert_eq!(result["received_at"], "2026-01-01T12:00:00Z");
        assert_eq!(result["metadata"]["gmail_id"], "m42");
    }

    #[test]
    fn test_unread_message() {
        let payload = json!({
            "id": "m1",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {"headers": []}
        });

        let result = transform(&payload, "get_message");
        assert_eq!(result["is_read"], false);
        assert_eq!(result["is_starred"], false);
    }

    #[test]
    fn test_bad_date_header_is_null() {
        let payload = json!({
            "id": "m1",
            "payload": {"headers": [{"name": "Date", "value": "yesterday-ish"}]}
        });

        let result = transform(&payload, "get_message");
        assert_eq!(result["received_at"], Value::Null);
    }

    #[test]
    fn test_non_gmail_provider_passes_through() {
        let payload = json!({"messages": []});
        let result =
            MessagingTransformer.transform(&payload, "list_messages", Provider::Dropbox);
        assert_eq!(result["transformed"], false);
    }

    #[test]
    fn test_unknown_operation_passes_through() {
        let payload = json!({"messages": []});
        let result = transform(&payload, "archive_message");
        assert_eq!(result["transformed"], false);
    }
}
