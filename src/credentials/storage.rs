//! SQLite-backed token store with encryption at rest.
//!
//! One row per connection. `replace` is a single upsert statement that
//! rewrites the whole record and bumps the version counter, so concurrent
//! readers see either the old or the new record, never a mix, and a reader
//! that has observed version N can never later observe version N-1.

use super::{encryption, Credential, TokenStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     connection_id TEXT PRIMARY KEY,
///     access_token  TEXT NOT NULL,   -- sealed (nonce.ciphertext)
///     refresh_token TEXT,            -- sealed (optional)
///     token_type    TEXT NOT NULL,
///     expires_at    TEXT,            -- RFC 3339 (optional, NULL = never)
///     scope         TEXT,
///     version       INTEGER NOT NULL,
///     created_at    TEXT NOT NULL,
///     updated_at    TEXT NOT NULL
/// );
/// ```
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl SqliteTokenStore {
    /// Creates or opens a token store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open token database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                connection_id TEXT PRIMARY KEY,
                access_token  TEXT NOT NULL,
                refresh_token TEXT,
                token_type    TEXT NOT NULL,
                expires_at    TEXT,
                scope         TEXT,
                version       INTEGER NOT NULL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Returns the stored version counter for a connection.
    ///
    /// Starts at 1 on first store and increases by exactly one per `replace`.
    pub fn version(&self, connection_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT version FROM credentials WHERE connection_id = ?1",
            params![connection_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read credential version")
    }
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, connection_id: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, token_type, expires_at, scope
                 FROM credentials WHERE connection_id = ?1",
                params![connection_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credential")?;

        let Some((access_sealed, refresh_sealed, token_type, expires_at, scope)) = row else {
            return Ok(None);
        };

        let access_token = encryption::open_sealed(&access_sealed, &self.encryption_key)
            .context("Failed to decrypt access token")?;
        let refresh_token = refresh_sealed
            .map(|sealed| {
                encryption::open_sealed(&sealed, &self.encryption_key)
                    .context("Failed to decrypt refresh token")
            })
            .transpose()?;
        let expires_at = expires_at
            .map(|raw| {
                raw.parse::<DateTime<Utc>>()
                    .context("Failed to parse stored expiry")
            })
            .transpose()?;

        Ok(Some(Credential {
            access_token,
            refresh_token,
            token_type,
            expires_at,
            scope,
        }))
    }

    fn replace(&self, connection_id: &str, credential: &Credential) -> Result<Credential> {
        let access_sealed = encryption::seal(&credential.access_token, &self.encryption_key)
            .context("Failed to encrypt access token")?;
        let refresh_sealed = credential
            .refresh_token
            .as_deref()
            .map(|token| {
                encryption::seal(token, &self.encryption_key)
                    .context("Failed to encrypt refresh token")
            })
            .transpose()?;
        let expires_at = credential.expires_at.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO credentials (
                    connection_id, access_token, refresh_token,
                    token_type, expires_at, scope,
                    version, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                ON CONFLICT(connection_id) DO UPDATE SET
                    access_token  = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    token_type    = excluded.token_type,
                    expires_at    = excluded.expires_at,
                    scope         = excluded.scope,
                    version       = credentials.version + 1,
                    updated_at    = excluded.updated_at
                "#,
                params![
                    connection_id,
                    access_sealed,
                    refresh_sealed,
                    credential.token_type,
                    expires_at,
                    credential.scope,
                    now,
                ],
            )
            .context("Failed to replace credential")?;

        Ok(credential.clone())
    }

    fn delete(&self, connection_id: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM credentials WHERE connection_id = ?1",
                params![connection_id],
            )
            .context("Failed to delete credential")?;
        Ok(())
    }
}
