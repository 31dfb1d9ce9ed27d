//! SQLite schema for the document store.

/// Documents plus the append-only commit log subscriptions tail.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Documents (current state)
-- ============================================================================

CREATE TABLE IF NOT EXISTS documents (
    namespace TEXT NOT NULL,
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    body TEXT NOT NULL,                           -- JSON object
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, collection, doc_id)
);

-- ============================================================================
-- Commit log (one row per committed write, in commit order)
-- ============================================================================

CREATE TABLE IF NOT EXISTS changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    body TEXT,                                    -- NULL for deletes
    committed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_changes_scope ON changes(namespace, collection, seq);
"#;
