//! Client rows: CRUD, token lookup, last-seen touch, token rotation

use crate::{classify, from_row_ts, from_row_ts_opt, ts, Store};
use chrono::Utc;
use ms_types::{Client, ClientConfig, StoreError, StoreResult};
use rusqlite::{params, OptionalExtension, Row};

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    let capabilities: String = row.get("capabilities")?;
    let config: String = row.get("config")?;

    let capabilities: Vec<String> = serde_json::from_str(&capabilities).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("bad capabilities json: {}", e).into(),
        )
    })?;
    let config: ClientConfig = serde_json::from_str(&config).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("bad client config json: {}", e).into(),
        )
    })?;

    Ok(Client {
        id: row.get("id")?,
        name: row.get("name")?,
        version: row.get("version")?,
        token: row.get("token")?,
        capabilities,
        config,
        created_at: from_row_ts(row, "created_at")?,
        last_seen_at: from_row_ts_opt(row, "last_seen_at")?,
    })
}

impl Store {
    pub fn create_client(&self, client: &Client) -> StoreResult<()> {
        let capabilities = serde_json::to_string(&client.capabilities)
            .map_err(|e| StoreError::Corrupt(format!("capabilities encode: {}", e)))?;
        let config = serde_json::to_string(&client.config)
            .map_err(|e| StoreError::Corrupt(format!("config encode: {}", e)))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO clients (id, name, version, token, capabilities, config, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                client.id,
                client.name,
                client.version,
                client.token,
                capabilities,
                config,
                ts(client.created_at),
                client.last_seen_at.map(ts),
            ],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub fn get_client(&self, id: &str) -> StoreResult<Client> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM clients WHERE id = ?1",
            params![id],
            client_from_row,
        )
        .map_err(classify)
    }

    /// Token lookup for authentication. Returns `None` for unknown tokens
    /// so the caller can produce its own unauthenticated error.
    pub fn get_client_by_token(&self, token: &str) -> StoreResult<Option<Client>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM clients WHERE token = ?1",
            params![token],
            client_from_row,
        )
        .optional()
        .map_err(classify)
    }

    pub fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM clients ORDER BY id")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], client_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub fn update_client_config(&self, id: &str, config: &ClientConfig) -> StoreResult<()> {
        let encoded = serde_json::to_string(config)
            .map_err(|e| StoreError::Corrupt(format!("config encode: {}", e)))?;

        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE clients SET config = ?1 WHERE id = ?2",
                params![encoded, id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_client(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM clients WHERE id = ?1", params![id])
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Stamp the client's last-seen time. Missing clients are a no-op: the
    /// touch is fire-and-forget and the client may have been deleted since
    /// the request was admitted.
    pub fn touch_client_last_seen(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE clients SET last_seen_at = ?1 WHERE id = ?2",
            params![ts(Utc::now()), id],
        )
        .map_err(classify)?;
        Ok(())
    }

    /// Replace the client's bearer token with a fresh one and return it.
    /// The old token stops authenticating in the same statement.
    pub fn rotate_client_token(&self, id: &str) -> StoreResult<String> {
        let new_token = ms_utils::crypto::generate_client_token()
            .map_err(|e| StoreError::Transient(format!("token generation: {}", e)))?;

        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE clients SET token = ?1 WHERE id = ?2",
                params![new_token, id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(new_token)
    }
}
