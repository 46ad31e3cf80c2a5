use super::{decode_ts, encode_ts, MemoryStore};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::Preference;
use chrono::{DateTime, Utc};
use rusqlite::params;

fn decode_pref(key: String, value: String, ts: String) -> MemoryResult<Preference> {
    let what = format!("preference '{}'", key);
    let value = serde_json::from_str(&value)
        .map_err(|e| MemoryError::MalformedRecord(format!("{}: bad JSON value: {}", what, e)))?;
    Ok(Preference { timestamp: decode_ts(&ts, &what)?, key, value })
}

impl MemoryStore {
    // ── Preferences ────────────────────────────────────────────────────

    /// Insert or replace by key. The incoming write always wins, even if its
    /// timestamp is older than the stored one.
    pub fn upsert_preference(&self, key: &str, value: &serde_json::Value, ts: DateTime<Utc>) -> MemoryResult<()> {
        let value = serde_json::to_string(value)?;
        let ts = encode_ts(&ts);
        self.write("upsert_preference", |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO user_preferences (key, value, timestamp) VALUES (?1, ?2, ?3)",
                params![key, value, ts],
            )?;
            Ok(())
        })
    }

    pub fn get_preference(&self, key: &str) -> MemoryResult<Option<Preference>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT value, timestamp FROM user_preferences WHERE key = ?1",
            params![key],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        match result {
            Ok((value, ts)) => decode_pref(key.to_string(), value, ts).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn all_preferences(&self) -> MemoryResult<Vec<Preference>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value, timestamp FROM user_preferences ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(|(k, v, ts)| decode_pref(k, v, ts)).collect()
    }
}
