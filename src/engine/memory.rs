// Jarvis Memory - Facade
//
// The single entry point the voice loop, GUI and CLI call. Coordinates:
//   WorkingSet  - bounded, fast, what `recall` reads
//   MemoryStore - unbounded, authoritative, what `search` reads
//   Summarizer  - retention compaction into PeriodSummaries
//
// Write order for a turn is cache first, then store, so interactive recall is
// consistent even when the disk is slow or failing. Cache snapshot failures
// are logged and swallowed here (the store is authoritative); store failures
// are returned to the caller, who decides whether to warn the user.

use crate::atoms::error::MemoryResult;
use crate::atoms::types::{HistoryTurn, Interaction, LearnedFact, MemoryStats, PeriodSummary, Speaker};
use crate::engine::config::{MemoryConfig, RetentionConfig};
use crate::engine::paths;
use crate::engine::store::MemoryStore;
use crate::engine::summarizer::Summarizer;
use crate::engine::working_set::WorkingSet;
use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MemoryManager {
    cache: WorkingSet,
    store: MemoryStore,
    summarizer: Summarizer,
    retention: RetentionConfig,
    /// `record` calls since retention last ran (drives auto retention).
    records_since_retention: AtomicUsize,
    /// Held across the cache write and the store write of one mutation, so
    /// both tiers see concurrent callers in the same order.
    write_lock: Mutex<()>,
    /// One compaction at a time.
    retention_lock: Mutex<()>,
}

impl MemoryManager {
    /// Open both tiers under `config.data_dir`. A missing or corrupt cache
    /// snapshot is rebuilt from the store before this returns.
    pub fn open(config: &MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;
        info!("[memory] Initializing memory in {:?}", config.data_dir);
        paths::ensure_dir(&config.data_dir)?;

        let store = MemoryStore::open(&config.database_path(), &config.store)?;
        let (cache, snapshot) = WorkingSet::load(config.cache_max_size, config.snapshot_path());

        let manager = Self::from_parts(
            cache,
            store,
            Summarizer::new(config.summarizer.clone()),
            config.retention.clone(),
        );
        if snapshot.is_cold() {
            manager.warm_from_store()?;
        }
        info!("[memory] Memory ready ({} cached interactions)", manager.cache.len());
        Ok(manager)
    }

    /// Assemble from already-built tiers (tests, embedded hosts).
    pub fn from_parts(cache: WorkingSet, store: MemoryStore, summarizer: Summarizer, retention: RetentionConfig) -> Self {
        Self {
            cache,
            store,
            summarizer,
            retention,
            records_since_retention: AtomicUsize::new(0),
            write_lock: Mutex::new(()),
            retention_lock: Mutex::new(()),
        }
    }

    /// Rebuild the working set from the store's newest rows and preferences.
    /// An unreadable store leaves that part of the cache empty; the host
    /// still starts.
    fn warm_from_store(&self) -> MemoryResult<()> {
        let recent = self.store.recent_interactions(self.cache.max_size()).unwrap_or_else(|e| {
            error!("[memory] Cannot rebuild recent turns from store, starting empty: {}", e);
            Vec::new()
        });
        let prefs = self.store.all_preferences().unwrap_or_else(|e| {
            error!("[memory] Cannot rebuild preferences from store, starting empty: {}", e);
            Vec::new()
        });
        if let Err(e) = self.cache.seed(recent, prefs) {
            warn!("[memory] Cache rebuilt but snapshot not saved: {}", e);
        }
        Ok(())
    }

    pub fn cache(&self) -> &WorkingSet {
        &self.cache
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    // ── Conversation ───────────────────────────────────────────────────

    /// Record one turn: cache, then store. Returns the stored interaction,
    /// or the store's `Persistence` error (the cache already has the turn).
    pub fn record(&self, speaker: Speaker, text: &str) -> MemoryResult<Interaction> {
        let interaction = {
            let _guard = self.write_lock.lock();
            let interaction = Interaction::new(speaker, text);

            if let Err(e) = self.cache.append(interaction.clone()) {
                warn!("[memory] Turn cached without snapshot: {}", e);
            }
            self.store
                .append_interaction(interaction.speaker, &interaction.text, interaction.timestamp)?;
            interaction
        };

        self.maybe_auto_retain();
        Ok(interaction)
    }

    /// The last `n` turns, oldest first.
    pub fn recall(&self, n: usize) -> Vec<Interaction> {
        self.cache.recent(n)
    }

    /// The last `n` turns as `{speaker, text}` for a language model prompt.
    pub fn conversation_history(&self, n: usize) -> Vec<HistoryTurn> {
        self.cache.recent(n).iter().map(HistoryTurn::from).collect()
    }

    /// Substring search over the full log, newest first.
    pub fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<Interaction>> {
        self.store.query_interactions(query, limit)
    }

    // ── Facts ──────────────────────────────────────────────────────────

    pub fn remember_fact(&self, fact: &str, source: &str) -> MemoryResult<()> {
        self.store.append_fact(fact, source, Utc::now())?;
        info!("[memory] Learned new fact: {}", fact);
        Ok(())
    }

    pub fn search_facts(&self, query: &str, limit: usize) -> MemoryResult<Vec<LearnedFact>> {
        self.store.search_facts(query, limit)
    }

    // ── Preferences ────────────────────────────────────────────────────

    /// Set in both tiers. The cache always takes the value; a store failure
    /// is returned so the caller knows it will not survive a restart.
    pub fn set_preference<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> MemoryResult<()> {
        let value = serde_json::to_value(value)?;
        let _guard = self.write_lock.lock();
        if let Err(e) = self.cache.set_preference(key, value.clone()) {
            warn!("[memory] Preference '{}' cached without snapshot: {}", key, e);
        }
        self.store.upsert_preference(key, &value, Utc::now())
    }

    /// Read from the cache. Absent keys, or values that don't decode as `T`,
    /// yield `default`.
    pub fn get_preference<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.cache.get_preference(key) {
            Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
                warn!("[memory] Preference '{}' has unexpected shape: {}", key, e);
                default
            }),
            None => default,
        }
    }

    pub fn get_preference_value(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.get_preference(key)
    }

    // ── Active tasks (working set only) ────────────────────────────────

    pub fn add_active_task(&self, task: &str) -> MemoryResult<()> {
        self.cache.add_active_task(task)
    }

    pub fn complete_active_task(&self, task: &str) -> MemoryResult<bool> {
        self.cache.complete_active_task(task)
    }

    pub fn active_tasks(&self) -> Vec<String> {
        self.cache.active_tasks()
    }

    // ── Retention ──────────────────────────────────────────────────────

    /// Summarize store rows older than `max_age_days` that no earlier run
    /// covered, append the summary, and prune the cache. Returns the number
    /// of summaries written (0 or 1).
    ///
    /// Idempotent: each row is marked as summarized in the same transaction
    /// that appends its summary, whatever its id or timestamp.
    pub fn run_retention(&self, max_age_days: u32, max_interactions: usize) -> MemoryResult<usize> {
        let _guard = self.retention_lock.lock();

        let rows = self.store.unsummarized_interactions().map_err(|e| {
            error!("[retention] Aborted, cannot read interactions: {}", e);
            e
        })?;

        let now = Utc::now();
        let cutoff = Summarizer::cutoff(now, max_age_days);
        let covered: Vec<i64> = rows
            .iter()
            .filter(|r| r.interaction.timestamp < cutoff)
            .map(|r| r.id)
            .collect();

        let outcome = self.summarizer.cleanup_at(
            rows.into_iter().map(|r| r.interaction).collect(),
            max_age_days,
            max_interactions,
            now,
        );

        let written = self.store.commit_retention(&outcome.summaries, &covered)?;

        if let Err(e) = self.cache.prune(outcome.cutoff, max_interactions) {
            warn!("[retention] Cache pruned without snapshot: {}", e);
        }
        self.records_since_retention.store(0, Ordering::SeqCst);

        info!(
            "[retention] Wrote {} summaries, {} interactions still current",
            written,
            outcome.retained.len()
        );
        Ok(written)
    }

    /// `run_retention` with the configured window.
    pub fn run_default_retention(&self) -> MemoryResult<usize> {
        self.run_retention(self.retention.max_age_days, self.retention.max_interactions)
    }

    fn maybe_auto_retain(&self) {
        let every = self.retention.auto_every;
        if every == 0 {
            return;
        }
        let n = self.records_since_retention.fetch_add(1, Ordering::SeqCst) + 1;
        if n < every {
            return;
        }
        if let Err(e) = self.run_default_retention() {
            warn!("[retention] Auto retention failed: {}", e);
            self.records_since_retention.store(0, Ordering::SeqCst);
        }
    }

    /// Every persisted summary, oldest first.
    pub fn recall_summaries(&self) -> MemoryResult<Vec<PeriodSummary>> {
        self.store.load_summaries()
    }

    // ── Housekeeping ───────────────────────────────────────────────────

    pub fn stats(&self) -> MemoryResult<MemoryStats> {
        Ok(MemoryStats {
            cached_interactions: self.cache.len(),
            cache_capacity: self.cache.max_size(),
            stored_interactions: self.store.interaction_count()?,
            learned_facts: self.store.fact_count()?,
            period_summaries: self.store.summary_count()?,
            preferences: self.cache.preferences().len(),
            active_tasks: self.cache.active_tasks().len(),
        })
    }

    /// Rewrite the snapshot (call on shutdown).
    pub fn flush(&self) -> MemoryResult<()> {
        self.cache.flush()?;
        info!("[memory] Memory saved");
        Ok(())
    }
}
