// Jarvis Durable Store (tier 2)
// Authoritative, unbounded log of interactions, preferences, learned facts
// and period summaries in SQLite via rusqlite.
//
// Module layout:
//   schema        - idempotent table/trigger creation
//   interactions  - append + recent + substring query
//   preferences   - last-write-wins upsert
//   facts         - append-only learned facts
//   summaries     - append-only PeriodSummary collection + summarized-row marks
//
// Every write commits before returning. A failing write is retried a bounded
// number of times on BUSY/LOCKED, then logged and surfaced as
// `MemoryError::Persistence`; it never panics.

use crate::atoms::constants::WRITE_RETRY_BACKOFF_MS;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::engine::config::StoreConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facts;
mod interactions;
mod preferences;
mod schema;
mod summaries;

pub use interactions::StoredInteraction;

/// Thread-safe database wrapper.
pub struct MemoryStore {
    /// One connection, one lock: all statements on this store serialize here.
    pub(crate) conn: Mutex<Connection>,
    write_retries: u32,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: &Path, config: &StoreConfig) -> MemoryResult<Self> {
        info!("[store] Opening memory store at {:?}", path);
        if let Some(parent) = path.parent() {
            crate::engine::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        // WAL + FULL sync: a committed write survives power loss.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA synchronous=FULL;").ok();

        schema::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            write_retries: config.write_retries,
            path: Some(path.to_path_buf()),
        })
    }

    /// A throwaway store for tests and ephemeral hosts.
    pub fn open_in_memory() -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_retries: 0,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a write under the connection lock with bounded BUSY/LOCKED retry.
    /// Any other failure is logged and mapped to `Persistence`.
    fn write<T>(
        &self,
        op: &str,
        mut f: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> MemoryResult<T> {
        let mut conn = self.conn.lock();
        let mut attempt = 0u32;
        loop {
            match f(&mut conn) {
                Ok(v) => return Ok(v),
                Err(e) if is_contention(&e) && attempt < self.write_retries => {
                    attempt += 1;
                    warn!("[store] {} hit lock contention (attempt {}): {}", op, attempt, e);
                    std::thread::sleep(Duration::from_millis(WRITE_RETRY_BACKOFF_MS * attempt as u64));
                }
                Err(e) => {
                    error!("[store] {} failed: {}", op, e);
                    return Err(MemoryError::persistence(op, e));
                }
            }
        }
    }
}

fn is_contention(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

// ── Timestamp encoding ─────────────────────────────────────────────────────
// Fixed-width RFC 3339 with nanoseconds, so TEXT ordering == time ordering
// and values round-trip exactly.

pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(raw: &str, what: &str) -> MemoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::MalformedRecord(format!("{}: bad timestamp '{}': {}", what, raw, e)))
}

/// Escape LIKE wildcards so user text matches literally (ESCAPE '\').
pub(crate) fn like_pattern(substring: &str) -> String {
    let mut escaped = String::with_capacity(substring.len() + 2);
    escaped.push('%');
    for c in substring.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Build an in-memory store for unit tests.
#[cfg(test)]
pub(crate) fn test_store() -> MemoryStore {
    MemoryStore::open_in_memory().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(1500);
        assert_eq!(decode_ts(&encode_ts(&a), "t").unwrap(), a);
        assert!(encode_ts(&a) < encode_ts(&b));
        assert!(matches!(decode_ts("yesterday", "t"), Err(MemoryError::MalformedRecord(_))));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("weather"), "%weather%");
    }

    #[test]
    fn open_is_idempotent_on_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("long_term.db");
        let cfg = StoreConfig::default();
        {
            let store = MemoryStore::open(&path, &cfg).unwrap();
            store.append_fact("sky is blue", "user", Utc::now()).unwrap();
        }
        let store = MemoryStore::open(&path, &cfg).unwrap();
        assert_eq!(store.fact_count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn write_failure_is_persistence_error() {
        let store = test_store();
        store.conn.lock().execute_batch("DROP TABLE learned_facts;").unwrap();
        let err = store.append_fact("lost", "user", Utc::now()).unwrap_err();
        assert!(err.is_persistence());
    }

    #[test]
    fn contention_retries_then_fails_as_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long_term.db");
        let cfg = StoreConfig { busy_timeout_ms: 0, write_retries: 2 };
        let store = MemoryStore::open(&path, &cfg).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let started = std::time::Instant::now();
        let err = store
            .append_interaction(crate::atoms::types::Speaker::User, "blocked", Utc::now())
            .unwrap_err();
        assert!(err.is_persistence());
        // Two backoffs: 1x + 2x the base delay.
        assert!(started.elapsed() >= Duration::from_millis(WRITE_RETRY_BACKOFF_MS * 3));

        blocker.execute_batch("COMMIT;").unwrap();
        store
            .append_interaction(crate::atoms::types::Speaker::User, "unblocked", Utc::now())
            .unwrap();
        assert_eq!(store.interaction_count().unwrap(), 1);
    }

    #[test]
    fn contention_is_recognized() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_contention(&busy));
        assert!(!is_contention(&rusqlite::Error::QueryReturnedNoRows));
    }
}
