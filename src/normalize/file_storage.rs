//! Canonical file-storage objects and the per-provider field mappings.

use super::{parse_timestamp, passthrough, Provider, Transformer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Canonical file or folder, provider-agnostic.
#[derive(Clone, Debug, Serialize)]
pub struct StorageFile {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub mime_type: Option<String>,
    pub is_folder: bool,
    /// Immediate containing folder, or `None` at the root.
    pub parent_id: Option<String>,
    pub download_url: Option<String>,
    pub shared: bool,
    pub metadata: Value,
}

/// Canonical file list.
///
/// `total_count` equals `files.len()` for every builtin file-storage
/// mapping; the `estimated` flag exists for providers that only report an
/// estimate and is omitted from the wire form when false.
#[derive(Clone, Debug, Serialize)]
pub struct StorageFileList {
    pub files: Vec<StorageFile>,
    pub total_count: u64,
    pub has_more: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
    pub next_cursor: Option<String>,
    pub metadata: Value,
}

/// Transformer for cloud storage providers (OneDrive, Dropbox).
pub struct FileStorageTransformer;

impl Transformer for FileStorageTransformer {
    fn transform(&self, payload: &Value, operation: &str, provider: Provider) -> Value {
        match operation {
            "list_files" | "list_folder" | "search_files" => {
                self.transform_list(payload, provider)
            }
            "get_file" | "get_metadata" => self.transform_single(payload, provider),
            _ => passthrough(payload),
        }
    }
}

impl FileStorageTransformer {
    fn transform_list(&self, payload: &Value, provider: Provider) -> Value {
        let list = match provider {
            Provider::OneDrive => {
                let items = payload["value"].as_array().cloned().unwrap_or_default();
                let files: Vec<StorageFile> = items.iter().map(onedrive_file).collect();
                StorageFileList {
                    total_count: files.len() as u64,
                    // Graph paginates with an opaque next link
                    has_more: payload.get("@odata.nextLink").is_some(),
                    estimated: false,
                    next_cursor: payload["@odata.nextLink"].as_str().map(String::from),
                    metadata: json!({"connector": "onedrive", "raw_count": items.len()}),
                    files,
                }
            }
            Provider::Dropbox => {
                let entries = payload["entries"].as_array().cloned().unwrap_or_default();
                let files: Vec<StorageFile> = entries.iter().map(dropbox_file).collect();
                StorageFileList {
                    total_count: files.len() as u64,
                    // Explicit boolean marker; absent means no more pages
                    has_more: payload["has_more"].as_bool().unwrap_or(false),
                    estimated: false,
                    next_cursor: payload["cursor"].as_str().map(String::from),
                    metadata: json!({"connector": "dropbox", "raw_count": entries.len()}),
                    files,
                }
            }
            Provider::Gmail => return passthrough(payload),
        };

        serde_json::to_value(list).unwrap_or_else(|_| passthrough(payload))
    }

    fn transform_single(&self, payload: &Value, provider: Provider) -> Value {
        let file = match provider {
            Provider::OneDrive => onedrive_file(payload),
            Provider::Dropbox => dropbox_file(payload),
            Provider::Gmail => return passthrough(payload),
        };
        serde_json::to_value(file).unwrap_or_else(|_| passthrough(payload))
    }
}

/// Maps a Microsoft Graph drive item to the canonical shape.
fn onedrive_file(item: &Value) -> StorageFile {
    let name = item["name"].as_str().unwrap_or_default().to_string();
    let parent_path = item["parentReference"]["path"].as_str().unwrap_or_default();

    StorageFile {
        id: item["id"].as_str().unwrap_or_default().to_string(),
        path: format!("{}/{}", parent_path, name),
        // A drive item carries a "file" facet or a "folder" facet
        kind: if item.get("file").is_some() {
            "file".to_string()
        } else {
            "folder".to_string()
        },
        size: item["size"].as_u64(),
        created_at: parse_timestamp(item["createdDateTime"].as_str()),
        modified_at: parse_timestamp(item["lastModifiedDateTime"].as_str()),
        mime_type: item["file"]["mimeType"].as_str().map(String::from),
        is_folder: item.get("folder").is_some(),
        parent_id: item["parentReference"]["id"].as_str().map(String::from),
        download_url: item["@microsoft.graph.downloadUrl"]
            .as_str()
            .map(String::from),
        shared: item.get("shared").map_or(false, |v| !v.is_null()),
        metadata: json!({
            "web_url": item["webUrl"],
            "created_by": item["createdBy"]["user"]["displayName"],
            "modified_by": item["lastModifiedBy"]["user"]["displayName"],
        }),
        name,
    }
}

/// Maps a Dropbox metadata entry to the canonical shape.
fn dropbox_file(entry: &Value) -> StorageFile {
    let tag = entry[".tag"].as_str().unwrap_or("file");
    let path_display = entry["path_display"].as_str().unwrap_or_default();

    StorageFile {
        id: entry["id"]
            .as_str()
            .unwrap_or(path_display)
            .to_string(),
        name: entry["name"].as_str().unwrap_or_default().to_string(),
        path: path_display.to_string(),
        kind: tag.to_string(),
        size: entry["size"].as_u64(),
        // Dropbox does not report a creation time
        created_at: None,
        modified_at: parse_timestamp(
            entry["client_modified"]
                .as_str()
                .or_else(|| entry["server_modified"].as_str()),
        ),
        mime_type: None,
        is_folder: tag == "folder",
        parent_id: dropbox_parent_id(entry["path_lower"].as_str()),
        download_url: None,
        shared: entry.get("sharing_info").map_or(false, |v| !v.is_null()),
        metadata: json!({
            "rev": entry["rev"],
            "content_hash": entry["content_hash"],
        }),
    }
}

/// Derives the parent folder by trimming the last segment of the lowercase
/// path. Items directly under the root have no parent.
fn dropbox_parent_id(path_lower: Option<&str>) -> Option<String> {
    let (parent, _) = path_lower?.rsplit_once('/')?;
    if parent.is_empty() {
        None
    } else {
        Some(parent.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(payload: &Value, operation: &str, provider: Provider) -> Value {
        FileStorageTransformer.transform(payload, operation, provider)
    }

    #[test]
    fn test_onedrive_list_with_next_link() {
        let payload = json!({
            "value": [{
                "id": "item-1",
                "name": "report.pdf",
                "size": 2048,
                "createdDateTime": "2026-01-15T09:00:00Z",
                "lastModifiedDateTime": "2026-02-01T12:30:00Z",
                "file": {"mimeType": "application/pdf"},
                "parentReference": {"id": "folder-9", "path": "/drive/root:/Documents"},
                "webUrl": "https://example.sharepoint.com/report.pdf"
            }],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next-page"
        });

        let result = transform(&payload, "list_files", Provider::OneDrive);

        assert_eq!(result["total_count"], 1);
        assert_eq!(result["has_more"], true);
        assert_eq!(
            result["next_cursor"],
            "https://graph.microsoft.com/v1.0/next-page"
        );
        let file = &result["files"][0];
        assert_eq!(file["id"], "item-1");
        assert_eq!(file["type"], "file");
        assert_eq!(file["is_folder"], false);
        assert_eq!(file["parent_id"], "folder-9");
        assert_eq!(file["path"], "/drive/root:/Documents/report.pdf");
        assert_eq!(file["mime_type"], "application/pdf");
        assert_eq!(file["created_at"], "2026-01-15T09:00:00Z");
        // Exact lists never carry the estimated marker
        assert!(result.get("estimated").is_none());
    }

    #[test]
    fn test_dropbox_list_same_canonical_shape() {
        let payload = json!({
            "entries": [{
                ".tag": "file",
                "id": "id:abc123",
                "name": "notes.txt",
                "path_display": "/Work/notes.txt",
                "path_lower": "/work/notes.txt",
                "size": 512,
                "client_modified": "2026-02-10T08:00:00Z",
                "rev": "015f2a",
                "content_hash": "deadbeef"
            }],
            "has_more": false
        });

        let result = transform(&payload, "list_folder", Provider::Dropbox);

        // Same canonical shape as the OneDrive mapping despite different
        // source fields
        assert_eq!(result["total_count"], 1);
        assert_eq!(result["has_more"], false);
        let file = &result["files"][0];
        assert_eq!(file["id"], "id:abc123");
        assert_eq!(file["type"], "file");
        assert_eq!(file["parent_id"], "/work");
        assert_eq!(file["modified_at"], "2026-02-10T08:00:00Z");
        assert_eq!(file["created_at"], Value::Null);
    }

    #[test]
    fn test_dropbox_missing_has_more_means_false() {
        let payload = json!({"entries": []});
        let result = transform(&payload, "list_folder", Provider::Dropbox);
        assert_eq!(result["has_more"], false);
        assert_eq!(result["total_count"], 0);
    }

    #[test]
    fn test_dropbox_root_item_has_no_parent() {
        let payload = json!({
            ".tag": "file",
            "id": "id:root1",
            "name": "a.txt",
            "path_display": "/a.txt",
            "path_lower": "/a.txt"
        });

        let result = transform(&payload, "get_metadata", Provider::Dropbox);
        assert_eq!(result["parent_id"], Value::Null);
    }

    #[test]
    fn test_dropbox_folder_entry() {
        let payload = json!({
            ".tag": "folder",
            "id": "id:dir1",
            "name": "Work",
            "path_display": "/Work",
            "path_lower": "/work"
        });

        let result = transform(&payload, "get_metadata", Provider::Dropbox);
        assert_eq!(result["type"], "folder");
        assert_eq!(result["is_folder"], true);
    }

    #[test]
    fn test_onedrive_single_folder() {
        let payload = json!({
            "id": "item-2",
            "name": "Photos",
            "folder": {"childCount": 12},
            "parentReference": {"id": "root", "path": "/drive/root:"},
            "shared": {"scope": "users"}
        });

        let result = transform(&payload, "get_file", Provider::OneDrive);
        assert_eq!(result["type"], "folder");
        assert_eq!(result["is_folder"], true);
        assert_eq!(result["shared"], true);
    }

    #[test]
    fn test_unknown_operation_passes_through() {
        let payload = json!({"value": []});
        let result = transform(&payload, "delete_file", Provider::OneDrive);
        assert_eq!(result["transformed"], false);
        assert_eq!(result["raw_data"], payload);
    }

    #[test]
    fn test_unparsable_timestamps_become_null() {
        let payload = json!({
            "id": "item-3",
            "name": "x",
            "file": {},
            "createdDateTime": "not a date",
            "parentReference": {}
        });

        let result = transform(&payload, "get_file", Provider::OneDrive);
        assert_eq!(result["created_at"], Value::Null);
    }

    #[test]
    fn test_total_count_matches_items() {
        let payload = json!({
            "value": [
                {"id": "a", "name": "a", "file": {}},
                {"id": "b", "name": "b", "file": {}},
                {"id": "c", "name": "c", "folder": {}}
            ]
        });

        let result = transform(&payload, "search_files", Provider::OneDrive);
        assert_eq!(
            result["total_count"].as_u64().unwrap(),
            result["files"].as_array().unwrap().len() as u64
        );
        assert_eq!(result["has_more"], false);
    }
}
