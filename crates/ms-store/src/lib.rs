//! SQLite persistence gateway
//!
//! One narrow, transactional interface over the store: providers, keys,
//! clients, aliases, remap rules, rate-limit rows, and the append-only
//! usage log. No business logic lives here; the gateway classifies every
//! failure into the `StoreError` taxonomy and retries nothing.

mod aliases;
mod clients;
mod keys;
mod providers;
mod ratelimits;
mod remaps;
mod schema;
mod usage;

pub use remaps::glob_match;

use chrono::{DateTime, Utc};
use ms_types::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The persistence gateway. Cheap to clone; all clones share one
/// serialized connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(classify)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(classify)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(classify)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        debug!("Store opened");
        Ok(store)
    }

    /// Run `f` inside a single transaction. Used for multi-statement
    /// mutations such as creating a provider together with its first key.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(classify)?;
        let out = f(&tx)?;
        tx.commit().map_err(classify)?;
        Ok(out)
    }
}

/// Map a rusqlite failure onto the store taxonomy. Unique-constraint
/// violations are `Conflict`, busy/locked are `Transient`, missing rows are
/// `NotFound`, decode failures are `Corrupt`; anything else is assumed
/// recoverable.
pub(crate) fn classify(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(err.to_string()),
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            rusqlite::ErrorCode::ConstraintViolation => StoreError::Conflict(err.to_string()),
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                StoreError::Transient(err.to_string())
            }
            rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Transient(err.to_string()),
        },
        _ => StoreError::Transient(err.to_string()),
    }
}

/// Build the error a row mapper returns when a stored enum value is not one
/// of ours. `classify` turns it into `Corrupt`.
pub(crate) fn bad_enum(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("bad {} value: {:?}", column, value).into(),
    )
}

/// Unix-seconds encoding used for every timestamp column.
pub(crate) fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Read a timestamp column inside a row mapper.
pub(crate) fn from_row_ts(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(column)?;
    from_row_ts_value(column, secs)
}

/// Read a nullable timestamp column inside a row mapper.
pub(crate) fn from_row_ts_opt(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let secs: Option<i64> = row.get(column)?;
    match secs {
        None => Ok(None),
        Some(secs) => from_row_ts_value(column, secs).map(Some),
    }
}

fn from_row_ts_value(column: &str, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range in {}: {}", column, secs).into(),
        )
    })
}
