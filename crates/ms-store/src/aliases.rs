//! Alias rows
//!
//! Identity is `(name, client_id)` with `client_id = NULL` meaning global.
//! Lookup prefers the client-specific row, then falls back to the global
//! one.

use crate::{classify, Store};
use ms_types::{Alias, StoreError, StoreResult};
use rusqlite::{params, OptionalExtension, Row};

fn alias_from_row(row: &Row<'_>) -> rusqlite::Result<Alias> {
    Ok(Alias {
        name: row.get("name")?,
        client_id: row.get("client_id")?,
        model_id: row.get("model_id")?,
    })
}

impl Store {
    /// Insert or replace an alias for its `(name, client_id)` identity.
    pub fn upsert_alias(&self, alias: &Alias) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO aliases (name, client_id, model_id) VALUES (?1, ?2, ?3)",
            params![alias.name, alias.client_id, alias.model_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub fn delete_alias(&self, name: &str, client_id: Option<&str>) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "DELETE FROM aliases WHERE name = ?1 AND coalesce(client_id, '') = coalesce(?2, '')",
                params![name, client_id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Resolve an alias: the client-specific entry wins over the global
    /// one. `client_id = None` sees only global aliases.
    pub fn lookup_alias(&self, name: &str, client_id: Option<&str>) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        match client_id {
            Some(cid) => conn
                .query_row(
                    "SELECT model_id FROM aliases
                     WHERE name = ?1 AND (client_id = ?2 OR client_id IS NULL)
                     ORDER BY client_id IS NULL
                     LIMIT 1",
                    params![name, cid],
                    |row| row.get(0),
                )
                .optional()
                .map_err(classify),
            None => conn
                .query_row(
                    "SELECT model_id FROM aliases WHERE name = ?1 AND client_id IS NULL",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(classify),
        }
    }

    pub fn list_aliases(&self, client_id: Option<&str>) -> StoreResult<Vec<Alias>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM aliases
                 WHERE coalesce(client_id, '') = coalesce(?1, '')
                 ORDER BY name",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![client_id], alias_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(name: &str, client_id: Option<&str>, model_id: &str) -> Alias {
        Alias {
            name: name.to_string(),
            client_id: client_id.map(str::to_string),
            model_id: model_id.to_string(),
        }
    }

    #[test]
    fn test_global_fallback() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_alias(&alias("sonnet", None, "claude-sonnet-4-5"))
            .unwrap();

        // Client without its own alias falls back to global
        assert_eq!(
            store.lookup_alias("sonnet", Some("cli-1")).unwrap(),
            Some("claude-sonnet-4-5".to_string())
        );
        // Anonymous lookups see only global
        assert_eq!(
            store.lookup_alias("sonnet", None).unwrap(),
            Some("claude-sonnet-4-5".to_string())
        );
    }

    #[test]
    fn test_client_specific_wins() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_alias(&alias("fast", None, "gpt-4o-mini"))
            .unwrap();
        store
            .upsert_alias(&alias("fast", Some("cli-1"), "claude-haiku-4-5"))
            .unwrap();

        assert_eq!(
            store.lookup_alias("fast", Some("cli-1")).unwrap(),
            Some("claude-haiku-4-5".to_string())
        );
        assert_eq!(
            store.lookup_alias("fast", Some("cli-2")).unwrap(),
            Some("gpt-4o-mini".to_string())
        );
        assert_eq!(
            store.lookup_alias("fast", None).unwrap(),
            Some("gpt-4o-mini".to_string())
        );
    }

    #[test]
    fn test_upsert_replaces_target() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_alias(&alias("m", None, "model-a")).unwrap();
        store.upsert_alias(&alias("m", None, "model-b")).unwrap();

        assert_eq!(
            store.lookup_alias("m", None).unwrap(),
            Some("model-b".to_string())
        );
        assert_eq!(store.list_aliases(None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_alias(&alias("m", None, "model-a")).unwrap();
        store.delete_alias("m", None).unwrap();
        assert_eq!(store.lookup_alias("m", None).unwrap(), None);

        let err = store.delete_alias("m", None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
