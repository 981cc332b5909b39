//! Database schema definitions

use anyhow::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Create all tables if they don't exist
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Every collection shares one table; bodies are JSON objects
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection
        ON documents(collection, seq);

        -- Lookup fields: session tokens, account emails and activation
        -- links, page slugs and owners
        CREATE INDEX IF NOT EXISTS idx_documents_token
        ON documents(collection, json_extract(body, '$.token'));

        CREATE INDEX IF NOT EXISTS idx_documents_email
        ON documents(collection, json_extract(body, '$.email'));

        CREATE INDEX IF NOT EXISTS idx_documents_activation_token
        ON documents(collection, json_extract(body, '$.activation_token'));

        CREATE INDEX IF NOT EXISTS idx_documents_nameslug
        ON documents(collection, json_extract(body, '$.nameslug'));

        CREATE INDEX IF NOT EXISTS idx_documents_owner
        ON documents(collection, json_extract(body, '$.owner'));

        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        INSERT OR IGNORE INTO schema_version (version) VALUES (2);
        "#,
    )?;

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}
