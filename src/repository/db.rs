//! Database Connection and Setup
//!
//! Opens the local SQLite database and brings its schema up to date.
//! Table and column names match databases written by earlier app versions.

use rusqlite::Connection;
use std::path::Path;

use crate::domain::{StoreError, StoreResult};

/// Open (or create) the database at the given path
pub fn open_db(db_path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(db_path)
        .map_err(|e| StoreError::Storage(format!("Failed to open {}: {}", db_path.display(), e)))?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// In-memory database (for testing)
pub fn open_in_memory_db() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| StoreError::Storage(format!("Failed to open in-memory db: {}", e)))?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let query = format!("PRAGMA table_info({})", table);
    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| StoreError::Storage(e.to_string()))?;

    for name in names {
        if name.map_err(|e| StoreError::Storage(e.to_string()))? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS inventory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_name TEXT,
            quantity INTEGER,
            category_name TEXT,
            owner_id TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_name TEXT,
            owner_id TEXT NOT NULL DEFAULT '',
            UNIQUE (owner_id, category_name)
        );",
    )
    .map_err(|e| StoreError::Storage(format!("Failed to create tables: {}", e)))?;

    // Databases from before per-user scoping: existing rows stay shared
    for table in ["inventory", "categories"] {
        if !column_exists(conn, table, "owner_id")? {
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN owner_id TEXT NOT NULL DEFAULT ''", table),
                [],
            )
            .map_err(|e| StoreError::Storage(format!("Failed to add owner_id to {}: {}", table, e)))?;
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_inventory_owner ON inventory(owner_id)",
        [],
    )
    .map_err(|e| StoreError::Storage(e.to_string()))?;

    Ok(())
}
