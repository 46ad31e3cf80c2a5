// ── Jarvis Atoms: Data Types ───────────────────────────────────────────────
// Records shared by the working set, the durable store and the summarizer.
// All timestamps are stored in UTC; calendar bucketing happens in local time.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::MemoryError;

// ── Speaker ────────────────────────────────────────────────────────────────

/// Who produced a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    /// Older snapshots label the assistant "jarvis".
    #[serde(alias = "jarvis")]
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speaker {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Speaker::User),
            "assistant" | "jarvis" => Ok(Speaker::Assistant),
            other => Err(MemoryError::MalformedRecord(format!("unknown speaker '{}'", other))),
        }
    }
}

// ── Interaction ────────────────────────────────────────────────────────────

/// One conversational turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
}

impl Interaction {
    /// A turn stamped with the current time.
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self::at(Utc::now(), speaker, text)
    }

    pub fn at(timestamp: DateTime<Utc>, speaker: Speaker, text: impl Into<String>) -> Self {
        Self { timestamp, speaker, text: text.into() }
    }

    /// Calendar date of this turn in the host's local time zone.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }
}

/// The `{speaker, text}` shape a language-model collaborator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl From<&Interaction> for HistoryTurn {
    fn from(i: &Interaction) -> Self {
        Self { speaker: i.speaker, text: i.text.clone() }
    }
}

// ── Preference / LearnedFact ───────────────────────────────────────────────

/// A user preference. Last write wins, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A fact the assistant was told to keep. Store-only, append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedFact {
    pub fact: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

// ── Summaries ──────────────────────────────────────────────────────────────

/// Digest of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub interaction_count: usize,
    /// Sorted set, so iteration order is deterministic.
    pub topics: BTreeSet<String>,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Digest of a span of days. `period` is `None` only for the empty summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: Option<SummaryPeriod>,
    pub total_interactions: usize,
    pub daily_summaries: Vec<DailySummary>,
}

impl PeriodSummary {
    pub fn is_empty(&self) -> bool {
        self.total_interactions == 0
    }
}

// ── Stats ──────────────────────────────────────────────────────────────────

/// Counts across both tiers, for `jarvis stats` and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub cached_interactions: usize,
    pub cache_capacity: usize,
    pub stored_interactions: u64,
    pub learned_facts: u64,
    pub period_summaries: u64,
    pub preferences: usize,
    pub active_tasks: usize,
}
