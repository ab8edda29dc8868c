//! SQLite persistence for connections.

use super::{Connection, ConnectionStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Persists connections in SQLite.
pub struct ConnectionStore {
    conn: Mutex<rusqlite::Connection>,
}

impl ConnectionStore {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            rusqlite::Connection::open(db_path).context("Failed to open connection database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS connections (
                id          TEXT PRIMARY KEY,
                connector   TEXT NOT NULL,
                name        TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                status      TEXT NOT NULL,
                config_json TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_connections_user ON connections(user_id);",
        )
        .context("Failed to create connections table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a new connection in `pending` state and returns it.
    pub fn create(
        &self,
        connector: &str,
        name: &str,
        user_id: &str,
        config: Option<Value>,
    ) -> Result<Connection> {
        let now = Utc::now();
        let connection = Connection {
            id: Uuid::new_v4().to_string(),
            connector: connector.to_string(),
            name: name.to_string(),
            user_id: user_id.to_string(),
            status: ConnectionStatus::Pending,
            config: config.unwrap_or_else(|| Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };

        let config_json =
            serde_json::to_string(&connection.config).context("Failed to serialize config")?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO connections
                    (id, connector, name, user_id, status, config_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    connection.id,
                    connection.connector,
                    connection.name,
                    connection.user_id,
                    connection.status.as_str(),
                    config_json,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .context("Failed to insert connection")?;

        Ok(connection)
    }

    /// Returns a single connection by ID, or `None` if not found.
    pub fn get(&self, id: &str) -> Result<Option<Connection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, connector, name, user_id, status, config_json, created_at, updated_at
             FROM connections WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], row_to_raw)
            .optional()
            .context("Failed to query connection")?;
        row.map(raw_to_connection).transpose()
    }

    /// Returns all connections for a user, optionally filtered by connector.
    pub fn list_by_user(&self, user_id: &str, connector: Option<&str>) -> Result<Vec<Connection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, connector, name, user_id, status, config_json, created_at, updated_at
             FROM connections WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], row_to_raw)
            .context("Failed to list connections")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read connection rows")?;

        let mut connections = Vec::with_capacity(rows.len());
        for raw in rows {
            let connection = raw_to_connection(raw)?;
            if connector.map_or(true, |tag| connection.connector == tag) {
                connections.push(connection);
            }
        }
        Ok(connections)
    }

    /// Updates the coarse status and `updated_at`. Errors if the ID is unknown.
    pub fn update_status(&self, id: &str, status: ConnectionStatus) -> Result<()> {
        let updated = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE connections SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), Utc::now().to_rfc3339()],
            )
            .context("Failed to update connection status")?;
        if updated == 0 {
            return Err(anyhow!("Connection '{}' not found", id));
        }
        Ok(())
    }

    /// Deletes a connection. Returns false if the ID was unknown.
    ///
    /// The caller is responsible for deleting the associated credential.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM connections WHERE id = ?1", params![id])
            .context("Failed to delete connection")?;
        Ok(deleted > 0)
    }
}

type RawRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn raw_to_connection(raw: RawRow) -> Result<Connection> {
    let (id, connector, name, user_id, status, config_json, created_at, updated_at) = raw;
    let status = ConnectionStatus::parse(&status)
        .ok_or_else(|| anyhow!("Unknown connection status '{}'", status))?;
    let config: Value =
        serde_json::from_str(&config_json).context("Failed to parse stored config")?;
    let created_at: DateTime<Utc> = created_at.parse().context("Failed to parse created_at")?;
    let updated_at: DateTime<Utc> = updated_at.parse().context("Failed to parse updated_at")?;

    Ok(Connection {
        id,
        connector,
        name,
        user_id,
        status,
        config,
        created_at,
        updated_at,
    })
}
