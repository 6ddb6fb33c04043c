//! Database schema

use crate::{classify, Store};
use ms_types::StoreResult;

impl Store {
    /// Create all tables and indexes if they do not exist yet.
    pub(crate) fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS providers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                auth_method TEXT NOT NULL,
                auth_header_name TEXT,
                status TEXT NOT NULL DEFAULT 'unknown',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id TEXT NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
                key_hash TEXT NOT NULL UNIQUE,
                key_prefix TEXT,
                tier TEXT,
                rpm_limit INTEGER,
                tpm_limit INTEGER,
                daily_limit INTEGER,
                reset_interval TEXT,
                requests_count INTEGER NOT NULL DEFAULT 0,
                tokens_count INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                degraded INTEGER NOT NULL DEFAULT 0,
                degraded_until INTEGER,
                last_used_at INTEGER,
                last_reset INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_api_keys_provider
                ON api_keys(provider_id, active);

            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                capabilities TEXT NOT NULL DEFAULT '[]',
                config TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_clients_token ON clients(token);

            CREATE TABLE IF NOT EXISTS client_rate_limits (
                client_id TEXT PRIMARY KEY REFERENCES clients(id) ON DELETE CASCADE,
                rpm_limit INTEGER,
                tpm_limit INTEGER,
                daily_limit INTEGER,
                current_rpm INTEGER NOT NULL DEFAULT 0,
                current_tpm INTEGER NOT NULL DEFAULT 0,
                current_daily INTEGER NOT NULL DEFAULT 0,
                last_reset INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aliases (
                name TEXT NOT NULL,
                client_id TEXT,
                model_id TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_aliases_identity
                ON aliases(name, coalesce(client_id, ''));

            CREATE TABLE IF NOT EXISTS remap_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                from_model TEXT NOT NULL,
                to_model TEXT NOT NULL,
                to_provider TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_remap_client
                ON remap_rules(client_id, enabled, priority DESC, id ASC);

            CREATE TABLE IF NOT EXISTS usage_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                client_id TEXT,
                provider_id TEXT NOT NULL,
                key_id INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                request_tokens INTEGER NOT NULL,
                response_tokens INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                success INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_usage_ts ON usage_log(ts);",
        )
        .map_err(classify)
    }
}
