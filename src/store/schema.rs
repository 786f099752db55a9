use anyhow::Result;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id             TEXT PRIMARY KEY,   -- hyphenated UUID
            title          TEXT NOT NULL,
            description    TEXT,
            genres         TEXT NOT NULL DEFAULT '[]',  -- JSON array
            tags           TEXT NOT NULL DEFAULT '[]',
            release_year   INTEGER,
            director       TEXT,
            actors         TEXT NOT NULL DEFAULT '[]',
            vector         BLOB,               -- little-endian f32
            dimensions     INTEGER,
            embedded_model TEXT,
            embedded_hash  TEXT,               -- BLAKE3 of the embedded document
            embedded_at    TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_items_title ON items(title);
        CREATE INDEX IF NOT EXISTS idx_items_year ON items(release_year);

        CREATE TABLE IF NOT EXISTS likes (
            user_id  TEXT NOT NULL,
            item_id  TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            liked_at TEXT NOT NULL,
            PRIMARY KEY (user_id, item_id)
        );
        CREATE INDEX IF NOT EXISTS idx_likes_item ON likes(item_id);
    ")?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
