// Database schema for the memory store.
// Called once by MemoryStore::open(). Everything here is idempotent
// (CREATE … IF NOT EXISTS) so opening an existing database is safe.
// Adding a table or column: append a new idempotent statement at the end of
// run_migrations() - never modify existing SQL to keep upgrade paths clean.

use crate::atoms::constants::META_RETENTION_WATERMARK;
use crate::atoms::error::MemoryResult;
use log::debug;
use rusqlite::{params, Connection};

pub(crate) fn run_migrations(conn: &Connection) -> MemoryResult<()> {
    // ── Core tables ──────────────────────────────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            speaker TEXT NOT NULL,
            text TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_interactions_timestamp
            ON interactions(timestamp);

        CREATE TABLE IF NOT EXISTS user_preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS learned_facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fact TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT 'user',
            timestamp TEXT NOT NULL
        );
    ",
    )?;

    // ── Retention: summaries + metadata ──────────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS period_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            period_start TEXT,
            period_end TEXT,
            total_interactions INTEGER NOT NULL,
            summary_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS memory_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
    ",
    )?;

    // ── Append-only guards ───────────────────────────────────────────
    // Interactions and summaries are never rewritten or removed by this
    // subsystem; enforce it at the storage layer.
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS interactions_no_update
            BEFORE UPDATE ON interactions
            BEGIN SELECT RAISE(ABORT, 'interactions are append-only'); END;

        CREATE TRIGGER IF NOT EXISTS interactions_no_delete
            BEFORE DELETE ON interactions
            BEGIN SELECT RAISE(ABORT, 'interactions are append-only'); END;

        CREATE TRIGGER IF NOT EXISTS period_summaries_no_update
            BEFORE UPDATE ON period_summaries
            BEGIN SELECT RAISE(ABORT, 'period summaries are immutable'); END;

        CREATE TRIGGER IF NOT EXISTS period_summaries_no_delete
            BEFORE DELETE ON period_summaries
            BEGIN SELECT RAISE(ABORT, 'period summaries are immutable'); END;
    ",
    )?;

    // ── Retention: per-row summary membership ────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS summarized_interactions (
            interaction_id INTEGER PRIMARY KEY REFERENCES interactions(id)
        );

        CREATE TRIGGER IF NOT EXISTS summarized_interactions_no_delete
            BEFORE DELETE ON summarized_interactions
            BEGIN SELECT RAISE(ABORT, 'summarized interactions stay summarized'); END;
    ",
    )?;

    // Databases written before per-row tracking kept a single id watermark.
    // Rows at or below it were already summarized.
    let backfilled = conn.execute(
        "INSERT OR IGNORE INTO summarized_interactions (interaction_id)
         SELECT id FROM interactions
         WHERE id <= (SELECT CAST(value AS INTEGER) FROM memory_meta WHERE key = ?1)",
        params![META_RETENTION_WATERMARK],
    )?;
    if backfilled > 0 {
        debug!("[store] Backfilled {} summarized rows from legacy watermark", backfilled);
    }

    debug!("[store] Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_run_twice() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('interactions', 'user_preferences', 'learned_facts',
                              'period_summaries', 'memory_meta', 'summarized_interactions')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn interactions_reject_delete() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO interactions (timestamp, speaker, text) VALUES ('t', 'user', 'hi')",
            [],
        )
        .unwrap();
        assert!(conn.execute("DELETE FROM interactions", []).is_err());
        assert!(conn.execute("UPDATE interactions SET text = 'bye'", []).is_err());
    }

    #[test]
    fn legacy_watermark_is_backfilled() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for text in ["a", "b", "c"] {
            conn.execute(
                "INSERT INTO interactions (timestamp, speaker, text) VALUES ('t', 'user', ?1)",
                params![text],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO memory_meta (key, value) VALUES (?1, '2')",
            params![META_RETENTION_WATERMARK],
        )
        .unwrap();

        run_migrations(&conn).unwrap();
        let marked: Vec<i64> = conn
            .prepare("SELECT interaction_id FROM summarized_interactions ORDER BY interaction_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(marked, vec![1, 2]);
    }
}
