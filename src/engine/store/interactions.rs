use super::{decode_ts, encode_ts, like_pattern, MemoryStore};
use crate::atoms::error::MemoryResult;
use crate::atoms::types::{Interaction, Speaker};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// An interaction together with its store row id (retention bookkeeping).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInteraction {
    pub id: i64,
    pub interaction: Interaction,
}

type RawRow = (i64, String, String, String);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Decode (id, timestamp, speaker, text). A bad timestamp or speaker is a
/// `MalformedRecord`, never silently skipped.
fn decode_row((id, ts, speaker, text): RawRow) -> MemoryResult<StoredInteraction> {
    let what = format!("interaction #{}", id);
    Ok(StoredInteraction {
        id,
        interaction: Interaction {
            timestamp: decode_ts(&ts, &what)?,
            speaker: speaker.parse::<Speaker>()?,
            text,
        },
    })
}

impl MemoryStore {
    // ── Interaction log ────────────────────────────────────────────────

    /// Append one interaction. Returns the new row id.
    pub fn append_interaction(&self, speaker: Speaker, text: &str, ts: DateTime<Utc>) -> MemoryResult<i64> {
        let ts = encode_ts(&ts);
        self.write("append_interaction", |conn| {
            conn.execute(
                "INSERT INTO interactions (timestamp, speaker, text) VALUES (?1, ?2, ?3)",
                params![ts, speaker.as_str(), text],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The newest `n` interactions in chronological order (newest last),
    /// the same orientation as `WorkingSet::recent`.
    pub fn recent_interactions(&self, n: usize) -> MemoryResult<Vec<Interaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, speaker, text FROM interactions
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![n as i64], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        let mut out = rows
            .into_iter()
            .map(|r| decode_row(r).map(|s| s.interaction))
            .collect::<MemoryResult<Vec<_>>>()?;
        out.reverse();
        Ok(out)
    }

    /// Case-insensitive substring search over interaction text, newest first.
    pub fn query_interactions(&self, substring: &str, limit: usize) -> MemoryResult<Vec<Interaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, speaker, text FROM interactions
             WHERE text LIKE ?1 ESCAPE '\\'
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![like_pattern(substring), limit as i64], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|r| decode_row(r).map(|s| s.interaction))
            .collect()
    }

    /// Every interaction not yet folded into a period summary, in id order.
    /// Row ids say nothing about timestamps, so membership is tracked per row.
    pub fn unsummarized_interactions(&self) -> MemoryResult<Vec<StoredInteraction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT i.id, i.timestamp, i.speaker, i.text FROM interactions i
             WHERE NOT EXISTS (
                 SELECT 1 FROM summarized_interactions s WHERE s.interaction_id = i.id
             )
             ORDER BY i.id ASC",
        )?;
        let rows = stmt
            .query_map([], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(decode_row).collect()
    }

    pub fn interaction_count(&self) -> MemoryResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;
    use crate::atoms::error::MemoryError;
    use chrono::Duration;

    #[test]
    fn append_and_recent_newest_last() {
        let store = test_store();
        let base = Utc::now() - Duration::hours(1);
        for i in 0..5 {
            store
                .append_interaction(Speaker::User, &format!("msg {}", i), base + Duration::minutes(i))
                .unwrap();
        }
        let recent = store.recent_interactions(3).unwrap();
        let texts: Vec<_> = recent.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
        assert_eq!(store.interaction_count().unwrap(), 5);
    }

    #[test]
    fn query_is_case_insensitive_newest_first() {
        let store = test_store();
        let base = Utc::now() - Duration::hours(1);
        store.append_interaction(Speaker::User, "What's the WEATHER?", base).unwrap();
        store.append_interaction(Speaker::Assistant, "Sunny today", base + Duration::minutes(1)).unwrap();
        store.append_interaction(Speaker::User, "weather tomorrow?", base + Duration::minutes(2)).unwrap();

        let hits = store.query_interactions("Weather", 10).unwrap();
        let texts: Vec<_> = hits.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["weather tomorrow?", "What's the WEATHER?"]);

        assert_eq!(store.query_interactions("weather", 1).unwrap().len(), 1);
        assert!(store.query_interactions("rain", 10).unwrap().is_empty());
    }

    #[test]
    fn query_treats_wildcards_literally() {
        let store = test_store();
        store.append_interaction(Speaker::User, "100% sure", Utc::now()).unwrap();
        store.append_interaction(Speaker::User, "100 percent", Utc::now()).unwrap();
        let hits = store.query_interactions("100%", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "100% sure");
    }

    #[test]
    fn unsummarized_skips_marked_rows() {
        let store = test_store();
        let first = store.append_interaction(Speaker::User, "a", Utc::now()).unwrap();
        store.append_interaction(Speaker::Assistant, "b", Utc::now()).unwrap();
        assert_eq!(store.unsummarized_interactions().unwrap().len(), 2);

        store.commit_retention(&[], &[first]).unwrap();
        let rest = store.unsummarized_interactions().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].interaction.text, "b");
        assert_eq!(rest[0].interaction.speaker, Speaker::Assistant);
    }

    #[test]
    fn malformed_row_is_reported() {
        let store = test_store();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO interactions (timestamp, speaker, text) VALUES ('not-a-date', 'user', 'x')",
                [],
            )
            .unwrap();
        let err = store.unsummarized_interactions().unwrap_err();
        assert!(matches!(err, MemoryError::MalformedRecord(_)));
    }
}
