//! Client rate-limit rows and the atomic admission primitive
//!
//! Windows are fixed and clock-aligned: minute counters reset at the next
//! minute boundary after `last_reset`, the daily counter at the next UTC
//! midnight. The lazy reset inside `check_and_increment_ratelimit` is
//! authoritative; the bulk sweeper helpers only keep rows tidy.

use crate::{classify, from_row_ts, ts, Store};
use chrono::{DateTime, Utc};
use ms_types::{ClientRateLimit, Limits, RateLimitDimension, StoreResult};
use rusqlite::{params, OptionalExtension, Row};

fn ratelimit_from_row(row: &Row<'_>) -> rusqlite::Result<ClientRateLimit> {
    let rpm: Option<u32> = row.get("rpm_limit")?;
    let tpm: Option<i64> = row.get("tpm_limit")?;
    let daily: Option<u32> = row.get("daily_limit")?;

    Ok(ClientRateLimit {
        client_id: row.get("client_id")?,
        limits: Limits {
            rpm,
            tpm: tpm.map(|v| v as u64),
            daily,
        },
        current_rpm: row.get("current_rpm")?,
        current_tpm: row.get::<_, i64>("current_tpm")? as u64,
        current_daily: row.get("current_daily")?,
        last_reset: from_row_ts(row, "last_reset")?,
    })
}

fn minute_expired(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.timestamp() / 60 > last_reset.timestamp() / 60
}

fn daily_expired(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.date_naive() > last_reset.date_naive()
}

impl Store {
    /// Set (or update) the limits for a client. Counters are preserved on
    /// update.
    pub fn upsert_client_rate_limit(&self, client_id: &str, limits: Limits) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO client_rate_limits (client_id, rpm_limit, tpm_limit, daily_limit, last_reset)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (client_id) DO UPDATE SET
                 rpm_limit = excluded.rpm_limit,
                 tpm_limit = excluded.tpm_limit,
                 daily_limit = excluded.daily_limit",
            params![
                client_id,
                limits.rpm,
                limits.tpm.map(|v| v as i64),
                limits.daily,
                ts(Utc::now()),
            ],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub fn get_client_rate_limit(&self, client_id: &str) -> StoreResult<Option<ClientRateLimit>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM client_rate_limits WHERE client_id = ?1",
            params![client_id],
            ratelimit_from_row,
        )
        .optional()
        .map_err(classify)
    }

    pub fn delete_client_rate_limit(&self, client_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM client_rate_limits WHERE client_id = ?1",
            params![client_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    /// The admission primitive: window-aware check and increment in one
    /// transaction.
    ///
    /// Dimensions are checked in rpm, tpm, daily order and the first one
    /// over budget denies the request. A denial writes nothing, not even
    /// the lazy window reset; the next call recomputes it. A client
    /// without a row is unlimited.
    pub fn check_and_increment_ratelimit(
        &self,
        client_id: &str,
        requests: u32,
        tokens: u64,
    ) -> StoreResult<(bool, Option<RateLimitDimension>)> {
        let now = Utc::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(classify)?;

        let row = tx
            .query_row(
                "SELECT * FROM client_rate_limits WHERE client_id = ?1",
                params![client_id],
                ratelimit_from_row,
            )
            .optional()
            .map_err(classify)?;

        let Some(row) = row else {
            return Ok((true, None));
        };

        let minute_reset = minute_expired(row.last_reset, now);
        let daily_reset = daily_expired(row.last_reset, now);

        let rpm = if minute_reset { 0 } else { row.current_rpm };
        let tpm = if minute_reset { 0 } else { row.current_tpm };
        let daily = if daily_reset { 0 } else { row.current_daily };

        if let Some(limit) = row.limits.rpm {
            if rpm + requests > limit {
                return Ok((false, Some(RateLimitDimension::Rpm)));
            }
        }
        if let Some(limit) = row.limits.tpm {
            if tpm + tokens > limit {
                return Ok((false, Some(RateLimitDimension::Tpm)));
            }
        }
        if let Some(limit) = row.limits.daily {
            if daily + requests > limit {
                return Ok((false, Some(RateLimitDimension::Daily)));
            }
        }

        let last_reset = if minute_reset || daily_reset {
            ts(now)
        } else {
            ts(row.last_reset)
        };
        tx.execute(
            "UPDATE client_rate_limits
             SET current_rpm = ?1, current_tpm = ?2, current_daily = ?3, last_reset = ?4
             WHERE client_id = ?5",
            params![
                rpm + requests,
                (tpm + tokens) as i64,
                daily + requests,
                last_reset,
                client_id,
            ],
        )
        .map_err(classify)?;
        tx.commit().map_err(classify)?;

        Ok((true, None))
    }

    /// Post-response token accounting. Best-effort by contract: the caller
    /// logs and forgives a failure here.
    pub fn record_client_tokens(&self, client_id: &str, tokens: u64) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE client_rate_limits SET current_tpm = current_tpm + ?1 WHERE client_id = ?2",
            params![tokens as i64, client_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    /// Bulk-zero minute counters whose window has lapsed. Rows whose UTC
    /// day also rolled over are left for `reset_daily_counters`; bumping
    /// their `last_reset` here would hide the day rollover from the lazy
    /// reset. Sweeper only.
    pub fn reset_minute_counters(&self) -> StoreResult<usize> {
        let now = ts(Utc::now());
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE client_rate_limits
             SET current_rpm = 0, current_tpm = 0, last_reset = ?1
             WHERE ?1 / 60 > last_reset / 60
               AND date(?1, 'unixepoch') = date(last_reset, 'unixepoch')",
            params![now],
        )
        .map_err(classify)
    }

    /// Bulk-zero daily counters whose UTC day has rolled over. A day
    /// rollover crosses a minute boundary too, so the minute counters are
    /// zeroed along with it; bumping `last_reset` alone would leave them
    /// stale but un-expired. Sweeper only.
    pub fn reset_daily_counters(&self) -> StoreResult<usize> {
        let now = ts(Utc::now());
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE client_rate_limits
             SET current_rpm = 0, current_tpm = 0, current_daily = 0, last_reset = ?1
             WHERE date(?1, 'unixepoch') > date(last_reset, 'unixepoch')",
            params![now],
        )
        .map_err(classify)
    }
}
