// Jarvis - tiered conversational memory.
//
// Layout:
//   atoms   - pure types, constants and the error enum (no I/O)
//   engine  - working-set cache, durable store, summarizer, facade
//
// Hosts (voice loop, GUI, the `jarvis` CLI) talk to `MemoryManager` only.

pub mod atoms;
pub mod engine;

pub use atoms::error::{MemoryError, MemoryResult};
pub use atoms::types::{
    DailySummary, HistoryTurn, Interaction, LearnedFact, MemoryStats, PeriodSummary, Preference,
    Speaker, SummaryPeriod,
};
pub use engine::config::MemoryConfig;
pub use engine::memory::MemoryManager;
pub use engine::store::MemoryStore;
pub use engine::summarizer::{RetentionOutcome, Summarizer, SummaryRules, TopicRule};
pub use engine::working_set::WorkingSet;
