//! Provider CRUD

use crate::{bad_enum, classify, from_row_ts, ts, Store};
use ms_types::{ApiKey, AuthMethod, Limits, Provider, ProviderStatus, StoreError, StoreResult};
use rusqlite::{params, Connection, Row};

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    let auth_method: String = row.get("auth_method")?;
    let status: String = row.get("status")?;

    Ok(Provider {
        id: row.get("id")?,
        name: row.get("name")?,
        base_url: row.get("base_url")?,
        auth_method: AuthMethod::parse(&auth_method)
            .ok_or_else(|| bad_enum("auth_method", &auth_method))?,
        auth_header_name: row.get("auth_header_name")?,
        status: ProviderStatus::parse(&status).ok_or_else(|| bad_enum("status", &status))?,
        created_at: from_row_ts(row, "created_at")?,
    })
}

impl Store {
    pub fn create_provider(&self, provider: &Provider) -> StoreResult<()> {
        let conn = self.conn.lock();
        insert_provider(&conn, provider)
    }

    pub fn get_provider(&self, id: &str) -> StoreResult<Provider> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM providers WHERE id = ?1",
            params![id],
            provider_from_row,
        )
        .map_err(classify)
    }

    pub fn list_providers(&self) -> StoreResult<Vec<Provider>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM providers ORDER BY id")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], provider_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub fn update_provider_status(&self, id: &str, status: ProviderStatus) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE providers SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_provider(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM providers WHERE id = ?1", params![id])
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Create a provider together with its first key in one transaction.
    /// Either both rows land or neither does.
    pub fn create_provider_with_first_key(
        &self,
        provider: &Provider,
        key_hash: &str,
        key_prefix: Option<&str>,
        limits: Limits,
    ) -> StoreResult<ApiKey> {
        self.with_tx(|tx| {
            insert_provider(tx, provider)?;
            crate::keys::insert_api_key(tx, &provider.id, key_hash, key_prefix, None, limits)
        })
    }
}

fn insert_provider(conn: &Connection, provider: &Provider) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO providers (id, name, base_url, auth_method, auth_header_name, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            provider.id,
            provider.name,
            provider.base_url,
            provider.auth_method.as_str(),
            provider.auth_header_name,
            provider.status.as_str(),
            ts(provider.created_at),
        ],
    )
    .map_err(classify)?;
    Ok(())
}
