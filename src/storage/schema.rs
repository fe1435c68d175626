//! DDL for the node/edge store. Created on first open; idempotent.

use rusqlite::Connection;

use super::StorageError;

pub fn apply(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS nodes (
            id         TEXT PRIMARY KEY,
            label      TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS edges (
            id         TEXT PRIMARY KEY,
            type       TEXT NOT NULL,
            source_id  TEXT NOT NULL REFERENCES nodes(id),
            target_id  TEXT NOT NULL REFERENCES nodes(id),
            properties TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(type);
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
        CREATE INDEX IF NOT EXISTS idx_nodes_primary_label
            ON nodes(json_extract(label, '$[0]'));
        "#,
    )?;
    Ok(())
}
