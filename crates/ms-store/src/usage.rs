//! Append-only usage log

use crate::{classify, ts, Store};
use ms_types::{StoreResult, UsageRecord};
use rusqlite::params;

impl Store {
    /// Append one usage record. Nothing on the hot path ever reads this
    /// table; stats endpoints consume it offline.
    pub fn append_usage(&self, record: &UsageRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO usage_log
                (ts, client_id, provider_id, key_id, model_id,
                 request_tokens, response_tokens, latency_ms, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ts(record.ts),
                record.client_id,
                record.provider_id,
                record.key_id,
                record.model_id,
                record.request_tokens as i64,
                record.response_tokens as i64,
                record.latency_ms as i64,
                record.success,
            ],
        )
        .map_err(classify)?;
        Ok(())
    }

    /// Total number of usage records. Offline tooling and tests only.
    pub fn usage_count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM usage_log", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(classify)
    }
}
