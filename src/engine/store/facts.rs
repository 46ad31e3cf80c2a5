use super::{decode_ts, encode_ts, like_pattern, MemoryStore};
use crate::atoms::error::MemoryResult;
use crate::atoms::types::LearnedFact;
use chrono::{DateTime, Utc};
use rusqlite::params;

impl MemoryStore {
    // ── Learned facts (store-only, append-only) ────────────────────────

    pub fn append_fact(&self, fact: &str, source: &str, ts: DateTime<Utc>) -> MemoryResult<i64> {
        let ts = encode_ts(&ts);
        self.write("append_fact", |conn| {
            conn.execute(
                "INSERT INTO learned_facts (fact, source, timestamp) VALUES (?1, ?2, ?3)",
                params![fact, source, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Case-insensitive substring search over facts, newest first.
    /// An empty `substring` lists the newest facts.
    pub fn search_facts(&self, substring: &str, limit: usize) -> MemoryResult<Vec<LearnedFact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT fact, source, timestamp FROM learned_facts
             WHERE fact LIKE ?1 ESCAPE '\\'
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![like_pattern(substring), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(fact, source, ts)| -> MemoryResult<LearnedFact> {
                Ok(LearnedFact { timestamp: decode_ts(&ts, "learned fact")?, fact, source })
            })
            .collect()
    }

    pub fn fact_count(&self) -> MemoryResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM learned_facts", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}
