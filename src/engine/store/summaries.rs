use super::MemoryStore;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::PeriodSummary;
use log::{debug, info};
use rusqlite::{params, Transaction};

/// Pre-serialized summary row, so the write closure cannot fail on JSON.
struct SummaryRow {
    start: Option<String>,
    end: Option<String>,
    total: i64,
    json: String,
}

fn encode_rows(summaries: &[PeriodSummary]) -> MemoryResult<Vec<SummaryRow>> {
    summaries
        .iter()
        .filter(|s| {
            if s.is_empty() {
                debug!("[store] Skipping empty period summary");
            }
            !s.is_empty()
        })
        .map(|s| -> MemoryResult<SummaryRow> {
            Ok(SummaryRow {
                start: s.period.map(|p| p.start.to_string()),
                end: s.period.map(|p| p.end.to_string()),
                total: s.total_interactions as i64,
                json: serde_json::to_string(s)?,
            })
        })
        .collect()
}

fn insert_rows(tx: &Transaction<'_>, rows: &[SummaryRow]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO period_summaries (period_start, period_end, total_interactions, summary_json)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for row in rows {
        stmt.execute(params![row.start, row.end, row.total, row.json])?;
    }
    Ok(())
}

impl MemoryStore {
    // ── Period summaries (append-only) ─────────────────────────────────

    /// Append summaries to the collection. Existing rows are never touched.
    /// Empty summaries are skipped. Returns how many rows were written.
    pub fn append_summaries(&self, summaries: &[PeriodSummary]) -> MemoryResult<usize> {
        let rows = encode_rows(summaries)?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.write("append_summaries", |conn| {
            let tx = conn.transaction()?;
            insert_rows(&tx, &rows)?;
            tx.commit()
        })?;
        info!("[store] Saved {} new period summaries", rows.len());
        Ok(rows.len())
    }

    /// Append summaries and mark the interaction rows they cover in one
    /// transaction: either both land or neither does. Returns how many
    /// summaries were written.
    pub fn commit_retention(&self, summaries: &[PeriodSummary], covered_ids: &[i64]) -> MemoryResult<usize> {
        let rows = encode_rows(summaries)?;
        if rows.is_empty() && covered_ids.is_empty() {
            return Ok(0);
        }
        self.write("commit_retention", |conn| {
            let tx = conn.transaction()?;
            insert_rows(&tx, &rows)?;
            {
                let mut mark = tx.prepare(
                    "INSERT OR IGNORE INTO summarized_interactions (interaction_id) VALUES (?1)",
                )?;
                for id in covered_ids {
                    mark.execute(params![id])?;
                }
            }
            tx.commit()
        })?;
        debug!("[store] Marked {} interactions as summarized", covered_ids.len());
        Ok(rows.len())
    }

    /// All persisted summaries, oldest first.
    pub fn load_summaries(&self) -> MemoryResult<Vec<PeriodSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, summary_json FROM period_summaries ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(id, json)| {
                serde_json::from_str(&json).map_err(|e| {
                    MemoryError::MalformedRecord(format!("period summary #{}: {}", id, e))
                })
            })
            .collect()
    }

    pub fn summary_count(&self) -> MemoryResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM period_summaries", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}
