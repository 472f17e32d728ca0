//! Database schema definitions

/// SQL to create all tables
/// NOTE: payloads are stored as JSON text exactly as published
pub const CREATE_TABLES: &str = r#"
-- Append-only message streams (strategy_specs, backtest_results, ...)
CREATE TABLE IF NOT EXISTS stream_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream TEXT NOT NULL,
    payload TEXT NOT NULL,
    producer TEXT,
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_stream_entries_stream ON stream_entries(stream, id)
"#;
