//! API key rows: CRUD, usage accounting, and health flags

use crate::{classify, from_row_ts, from_row_ts_opt, ts, Store};
use chrono::{DateTime, Utc};
use ms_types::{ApiKey, Limits, StoreError, StoreResult};
use rusqlite::{params, Connection, Row};

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<ApiKey> {
    let rpm: Option<u32> = row.get("rpm_limit")?;
    let tpm: Option<i64> = row.get("tpm_limit")?;
    let daily: Option<u32> = row.get("daily_limit")?;
    let tpm = tpm.map(|v| v as u64);

    Ok(ApiKey {
        id: row.get("id")?,
        provider_id: row.get("provider_id")?,
        key_hash: row.get("key_hash")?,
        key_prefix: row.get("key_prefix")?,
        tier: row.get("tier")?,
        limits: Limits { rpm, tpm, daily },
        reset_interval: row.get("reset_interval")?,
        requests_count: row.get::<_, i64>("requests_count")? as u64,
        tokens_count: row.get::<_, i64>("tokens_count")? as u64,
        active: row.get("active")?,
        degraded: row.get("degraded")?,
        degraded_until: from_row_ts_opt(row, "degraded_until")?,
        last_used_at: from_row_ts_opt(row, "last_used_at")?,
        last_reset: from_row_ts(row, "last_reset")?,
        created_at: from_row_ts(row, "created_at")?,
        updated_at: from_row_ts(row, "updated_at")?,
    })
}

impl Store {
    pub fn create_api_key(
        &self,
        provider_id: &str,
        key_hash: &str,
        key_prefix: Option<&str>,
        tier: Option<&str>,
        limits: Limits,
    ) -> StoreResult<ApiKey> {
        let conn = self.conn.lock();
        insert_api_key(&conn, provider_id, key_hash, key_prefix, tier, limits)
    }

    pub fn get_api_key(&self, id: i64) -> StoreResult<ApiKey> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM api_keys WHERE id = ?1",
            params![id],
            key_from_row,
        )
        .map_err(classify)
    }

    /// Keys with `active = true` for a provider, in insertion order. The
    /// key manager applies health and budget filters on top.
    pub fn list_active_api_keys(&self, provider_id: &str) -> StoreResult<Vec<ApiKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM api_keys WHERE provider_id = ?1 AND active = 1 ORDER BY id")
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![provider_id], key_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub fn list_api_keys(&self, provider_id: &str) -> StoreResult<Vec<ApiKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM api_keys WHERE provider_id = ?1 ORDER BY id")
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![provider_id], key_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }

    /// Atomic usage bump: one request, `tokens` tokens, freshly used.
    pub fn increment_key_usage(&self, key_id: i64, tokens: u64) -> StoreResult<()> {
        let now = ts(Utc::now());
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE api_keys
                 SET requests_count = requests_count + 1,
                     tokens_count = tokens_count + ?1,
                     last_used_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![tokens as i64, now, key_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn mark_key_degraded(&self, key_id: i64, until: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE api_keys
                 SET degraded = 1, degraded_until = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![ts(until), ts(Utc::now()), key_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Clear the degraded flag. Called lazily when a read observes an
    /// expired `degraded_until`, and by manual reset.
    pub fn clear_key_degraded(&self, key_id: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE api_keys
                 SET degraded = 0, degraded_until = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![ts(Utc::now()), key_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Zero the usage counters and restart the key's window.
    pub fn reset_key_limits(&self, key_id: i64) -> StoreResult<()> {
        let now = ts(Utc::now());
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE api_keys
                 SET requests_count = 0, tokens_count = 0, last_reset = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![now, key_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn set_key_active(&self, key_id: i64, active: bool) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE api_keys SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, ts(Utc::now()), key_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_api_key(&self, key_id: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM api_keys WHERE id = ?1", params![key_id])
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

pub(crate) fn insert_api_key(
    conn: &Connection,
    provider_id: &str,
    key_hash: &str,
    key_prefix: Option<&str>,
    tier: Option<&str>,
    limits: Limits,
) -> StoreResult<ApiKey> {
    let now = ts(Utc::now());
    conn.execute(
        "INSERT INTO api_keys
            (provider_id, key_hash, key_prefix, tier, rpm_limit, tpm_limit, daily_limit,
             last_reset, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)",
        params![
            provider_id,
            key_hash,
            key_prefix,
            tier,
            limits.rpm,
            limits.tpm.map(|v| v as i64),
            limits.daily,
            now,
        ],
    )
    .map_err(classify)?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT * FROM api_keys WHERE id = ?1",
        params![id],
        key_from_row,
    )
    .map_err(classify)
}
