//! Remap rules and the glob matcher
//!
//! Rules are per-client and priority-ranked. `find_matching_remap` walks
//! the client's enabled rules in `priority DESC, id ASC` order and returns
//! the first whose `from_model` glob matches.

use crate::{classify, Store};
use ms_types::{RemapRule, StoreError, StoreResult};
use rusqlite::{params, Row};

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RemapRule> {
    Ok(RemapRule {
        id: row.get("id")?,
        client_id: row.get("client_id")?,
        from_model: row.get("from_model")?,
        to_model: row.get("to_model")?,
        to_provider: row.get("to_provider")?,
        priority: row.get("priority")?,
        enabled: row.get("enabled")?,
    })
}

/// Match `text` against a pattern where `*` matches one-or-more characters
/// and every other character is literal. No other metacharacters exist.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_at(&p, &t)
}

fn glob_match_at(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            // One-or-more: consume at least one character, then try every
            // remaining split point.
            (1..=text.len()).any(|i| glob_match_at(&pattern[1..], &text[i..]))
        }
        Some(c) => text.first() == Some(c) && glob_match_at(&pattern[1..], &text[1..]),
    }
}

impl Store {
    pub fn create_remap_rule(
        &self,
        client_id: &str,
        from_model: &str,
        to_model: &str,
        to_provider: &str,
        priority: i32,
    ) -> StoreResult<RemapRule> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO remap_rules (client_id, from_model, to_model, to_provider, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![client_id, from_model, to_model, to_provider, priority],
        )
        .map_err(classify)?;

        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT * FROM remap_rules WHERE id = ?1",
            params![id],
            rule_from_row,
        )
        .map_err(classify)
    }

    pub fn list_remap_rules(&self, client_id: &str) -> StoreResult<Vec<RemapRule>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM remap_rules WHERE client_id = ?1
                 ORDER BY priority DESC, id ASC",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![client_id], rule_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub fn set_remap_enabled(&self, id: i64, enabled: bool) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE remap_rules SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_remap_rule(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM remap_rules WHERE id = ?1", params![id])
            .map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Highest-priority enabled rule matching `model` for this client;
    /// ties broken by lowest id. The ordering comes from SQL so that the
    /// first glob hit is the winner.
    pub fn find_matching_remap(
        &self,
        model: &str,
        client_id: &str,
    ) -> StoreResult<Option<RemapRule>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM remap_rules WHERE client_id = ?1 AND enabled = 1
                 ORDER BY priority DESC, id ASC",
            )
            .map_err(classify)?;
        let rules = stmt
            .query_map(params![client_id], rule_from_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;

        Ok(rules
            .into_iter()
            .find(|rule| glob_match(&rule.from_model, model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use chrono::Utc;
    use ms_types::{Client, ClientConfig};

    fn store_with_client(id: &str) -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .create_client(&Client {
                id: id.to_string(),
                name: id.to_string(),
                version: "1.0.0".to_string(),
                token: format!("tok-{}", id),
                capabilities: vec![],
                config: ClientConfig::default(),
                created_at: Utc::now(),
                last_seen_at: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_glob_literal() {
        assert!(glob_match("gpt-4o", "gpt-4o"));
        assert!(!glob_match("gpt-4o", "gpt-4o-mini"));
        assert!(!glob_match("gpt-4o-mini", "gpt-4o"));
    }

    #[test]
    fn test_glob_star_one_or_more() {
        assert!(glob_match("claude-*", "claude-sonnet-4-5"));
        assert!(glob_match("*-mini", "gpt-4o-mini"));
        assert!(glob_match("gpt-*-mini", "gpt-4o-mini"));
        // One-or-more: the star cannot match the empty string
        assert!(!glob_match("claude-*", "claude-"));
        assert!(!glob_match("*", ""));
        assert!(glob_match("*", "x"));
    }

    #[test]
    fn test_glob_metacharacters_are_literal() {
        assert!(glob_match("a.b", "a.b"));
        assert!(!glob_match("a.b", "axb"));
        assert!(!glob_match("a?b", "axb"));
        assert!(glob_match("a[1]", "a[1]"));
    }

    #[test]
    fn test_priority_order_wins() {
        let store = store_with_client("cli-1");
        store
            .create_remap_rule("cli-1", "claude-*", "gpt-4o-mini", "openai", 1)
            .unwrap();
        store
            .create_remap_rule("cli-1", "claude-*", "gpt-4o", "openai", 10)
            .unwrap();

        let rule = store
            .find_matching_remap("claude-sonnet-4-5", "cli-1")
            .unwrap()
            .unwrap();
        assert_eq!(rule.to_model, "gpt-4o");
        assert_eq!(rule.priority, 10);
    }

    #[test]
    fn test_priority_tie_breaks_by_lowest_id() {
        let store = store_with_client("cli-1");
        let first = store
            .create_remap_rule("cli-1", "m", "target-a", "openai", 10)
            .unwrap();
        store
            .create_remap_rule("cli-1", "m", "target-b", "openai", 10)
            .unwrap();

        let rule = store.find_matching_remap("m", "cli-1").unwrap().unwrap();
        assert_eq!(rule.id, first.id);
        assert_eq!(rule.to_model, "target-a");
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let store = store_with_client("cli-1");
        let rule = store
            .create_remap_rule("cli-1", "m", "target-a", "openai", 10)
            .unwrap();
        store.set_remap_enabled(rule.id, false).unwrap();

        assert!(store.find_matching_remap("m", "cli-1").unwrap().is_none());
    }

    #[test]
    fn test_rules_are_per_client() {
        let store = store_with_client("cli-1");
        store
            .create_remap_rule("cli-1", "m", "target-a", "openai", 10)
            .unwrap();

        // Another client sees nothing (its rules table view is empty)
        assert!(store.find_matching_remap("m", "cli-2").unwrap().is_none());
    }
}
