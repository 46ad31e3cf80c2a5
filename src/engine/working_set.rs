// ── Working Set (tier 1) ────────────────────────────────────────────────────
//
// A bounded, in-memory list of the most recent interactions plus the user's
// preferences and active tasks. It is the only source `recall` reads from.
//
// Key properties:
//   - FIFO eviction: `append` drops the oldest entries once `max_size` is hit
//   - Write-through: every mutation rewrites the full snapshot file
//   - Atomic snapshot: written to `<file>.tmp`, fsynced, then renamed
//   - Best-effort durability: a failed snapshot write is logged and returned,
//     but the in-memory mutation stands (the store is authoritative)
//
// Thread-safety: state sits behind a parking_lot RwLock. Writers hold the
// write lock across the snapshot write, so concurrent mutations serialize and
// never race on the snapshot file. Readers share the read lock.

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::{Interaction, Preference};
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A preference as held in the snapshot: `{ "value": …, "timestamp": … }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Full working-set state; this is exactly what lands in the snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingSetSnapshot {
    #[serde(default)]
    pub interactions: VecDeque<Interaction>,
    #[serde(default)]
    pub user_preferences: BTreeMap<String, PreferenceEntry>,
    #[serde(default)]
    pub active_tasks: Vec<String>,
}

/// What `WorkingSet::load` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// Snapshot parsed; the cache is warm.
    Restored,
    /// No snapshot file yet.
    Missing,
    /// File present but unreadable or unparseable.
    Corrupt,
}

impl SnapshotState {
    /// The cache must be rebuilt from the store before first use.
    pub fn is_cold(&self) -> bool {
        !matches!(self, SnapshotState::Restored)
    }
}

pub struct WorkingSet {
    state: RwLock<WorkingSetSnapshot>,
    max_size: usize,
    /// `None` keeps the cache purely in memory (tests, ephemeral hosts).
    snapshot_path: Option<PathBuf>,
}

impl WorkingSet {
    /// An empty working set. Nothing is written until the first mutation.
    pub fn new(max_size: usize, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(WorkingSetSnapshot::default()),
            max_size: max_size.max(1),
            snapshot_path,
        }
    }

    /// Restore from `snapshot_path`. Missing or corrupt snapshots yield an
    /// empty cache; the caller decides whether to seed it from the store.
    pub fn load(max_size: usize, snapshot_path: PathBuf) -> (Self, SnapshotState) {
        let ws = Self::new(max_size, Some(snapshot_path.clone()));

        let raw = match std::fs::read_to_string(&snapshot_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[cache] No snapshot at {:?}, starting cold", snapshot_path);
                return (ws, SnapshotState::Missing);
            }
            Err(e) => {
                warn!("[cache] Cannot read snapshot {:?}: {}", snapshot_path, e);
                return (ws, SnapshotState::Corrupt);
            }
        };

        match serde_json::from_str::<WorkingSetSnapshot>(&raw) {
            Ok(mut snapshot) => {
                trim_front(&mut snapshot.interactions, ws.max_size);
                info!(
                    "[cache] Restored {} interactions, {} preferences from {:?}",
                    snapshot.interactions.len(),
                    snapshot.user_preferences.len(),
                    snapshot_path
                );
                *ws.state.write() = snapshot;
                (ws, SnapshotState::Restored)
            }
            Err(e) => {
                warn!("[cache] Corrupt snapshot {:?} ({}), starting cold", snapshot_path, e);
                (ws, SnapshotState::Corrupt)
            }
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.state.read().interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().interactions.is_empty()
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // ── Interactions ───────────────────────────────────────────────────

    /// Push to the tail, evicting the oldest entries past `max_size`.
    pub fn append(&self, interaction: Interaction) -> MemoryResult<()> {
        let mut state = self.state.write();
        state.interactions.push_back(interaction);
        trim_front(&mut state.interactions, self.max_size);
        self.persist(&state)
    }

    /// The newest `n` interactions, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Interaction> {
        let state = self.state.read();
        let skip = state.interactions.len().saturating_sub(n);
        state.interactions.iter().skip(skip).cloned().collect()
    }

    /// Replace the whole state (cold-start rebuild from the store).
    pub fn seed(&self, interactions: Vec<Interaction>, preferences: Vec<Preference>) -> MemoryResult<()> {
        let mut state = self.state.write();
        state.interactions = interactions.into();
        trim_front(&mut state.interactions, self.max_size);
        state.user_preferences = preferences
            .into_iter()
            .map(|p| (p.key, PreferenceEntry { value: p.value, timestamp: p.timestamp }))
            .collect();
        info!(
            "[cache] Seeded {} interactions, {} preferences from store",
            state.interactions.len(),
            state.user_preferences.len()
        );
        self.persist(&state)
    }

    /// Drop interactions older than `cutoff`, then keep at most `max_keep`.
    /// Returns how many were removed.
    pub fn prune(&self, cutoff: DateTime<Utc>, max_keep: usize) -> MemoryResult<usize> {
        let mut state = self.state.write();
        let before = state.interactions.len();
        state.interactions.retain(|i| i.timestamp >= cutoff);
        trim_front(&mut state.interactions, max_keep.min(self.max_size));
        let removed = before - state.interactions.len();
        if removed == 0 {
            return Ok(0);
        }
        info!("[cache] Pruned {} interactions older than {}", removed, cutoff);
        self.persist(&state)?;
        Ok(removed)
    }

    // ── Preferences ────────────────────────────────────────────────────

    pub fn set_preference(&self, key: &str, value: serde_json::Value) -> MemoryResult<()> {
        let mut state = self.state.write();
        state
            .user_preferences
            .insert(key.to_string(), PreferenceEntry { value, timestamp: Utc::now() });
        self.persist(&state)
    }

    pub fn get_preference(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().user_preferences.get(key).map(|e| e.value.clone())
    }

    /// The stored value, or `default` when the key was never set.
    pub fn get_preference_or(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        self.get_preference(key).unwrap_or(default)
    }

    pub fn preferences(&self) -> Vec<Preference> {
        self.state
            .read()
            .user_preferences
            .iter()
            .map(|(k, e)| Preference { key: k.clone(), value: e.value.clone(), timestamp: e.timestamp })
            .collect()
    }

    // ── Active tasks ───────────────────────────────────────────────────

    /// Track a task; duplicates are ignored.
    pub fn add_active_task(&self, task: &str) -> MemoryResult<()> {
        let mut state = self.state.write();
        if state.active_tasks.iter().any(|t| t == task) {
            return Ok(());
        }
        state.active_tasks.push(task.to_string());
        self.persist(&state)
    }

    /// Remove a task. Returns false if it was not tracked.
    pub fn complete_active_task(&self, task: &str) -> MemoryResult<bool> {
        let mut state = self.state.write();
        let before = state.active_tasks.len();
        state.active_tasks.retain(|t| t != task);
        if state.active_tasks.len() == before {
            return Ok(false);
        }
        self.persist(&state)?;
        Ok(true)
    }

    pub fn active_tasks(&self) -> Vec<String> {
        self.state.read().active_tasks.clone()
    }

    // ── Snapshot ───────────────────────────────────────────────────────

    /// Rewrite the snapshot from current state (shutdown save).
    pub fn flush(&self) -> MemoryResult<()> {
        let state = self.state.write();
        self.persist(&state)
    }

    fn persist(&self, state: &WorkingSetSnapshot) -> MemoryResult<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        write_snapshot(path, state).map_err(|e| {
            warn!("[cache] Snapshot write to {:?} failed: {}", path, e);
            MemoryError::persistence("cache snapshot", e)
        })
    }
}

fn trim_front(interactions: &mut VecDeque<Interaction>, max: usize) {
    while interactions.len() > max {
        interactions.pop_front();
    }
}

/// Serialize to `<path>.tmp`, fsync, then rename over `path`.
fn write_snapshot(path: &Path, state: &WorkingSetSnapshot) -> MemoryResult<()> {
    if let Some(parent) = path.parent() {
        crate::engine::paths::ensure_dir(parent)?;
    }
    let json = serde_json::to_vec_pretty(state)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Speaker;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    fn turn(i: usize) -> Interaction {
        Interaction::new(if i % 2 == 0 { Speaker::User } else { Speaker::Assistant }, format!("turn {}", i))
    }

    #[test]
    fn test_recent_is_newest_last() {
        let ws = WorkingSet::new(50, None);
        for i in 0..5 {
            ws.append(turn(i)).unwrap();
        }
        let recent = ws.recent(3);
        let texts: Vec<_> = recent.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 2", "turn 3", "turn 4"]);
        assert_eq!(ws.recent(100).len(), 5);
        assert!(ws.recent(0).is_empty());
    }

    #[test]
    fn test_fifo_eviction() {
        let ws = WorkingSet::new(3, None);
        for i in 0..10 {
            ws.append(turn(i)).unwrap();
        }
        assert_eq!(ws.len(), 3);
        assert_eq!(ws.recent(3)[0].text, "turn 7");
    }

    #[test]
    fn test_preference_last_write_wins() {
        let ws = WorkingSet::new(50, None);
        ws.set_preference("units", json!("metric")).unwrap();
        ws.set_preference("units", json!("imperial")).unwrap();
        assert_eq!(ws.get_preference("units"), Some(json!("imperial")));
        assert_eq!(ws.get_preference_or("voice", json!("default")), json!("default"));
        assert_eq!(ws.preferences().len(), 1);
    }

    #[test]
    fn test_active_tasks() {
        let ws = WorkingSet::new(50, None);
        ws.add_active_task("water plants").unwrap();
        ws.add_active_task("water plants").unwrap();
        ws.add_active_task("call mom").unwrap();
        assert_eq!(ws.active_tasks(), vec!["water plants", "call mom"]);
        assert!(ws.complete_active_task("water plants").unwrap());
        assert!(!ws.complete_active_task("water plants").unwrap());
        assert_eq!(ws.active_tasks(), vec!["call mom"]);
    }

    #[test]
    fn test_prune_by_age_and_count() {
        let ws = WorkingSet::new(50, None);
        let now = Utc::now();
        for days in (0..10).rev() {
            ws.append(Interaction::at(now - Duration::days(days), Speaker::User, format!("{} days ago", days)))
                .unwrap();
        }
        let removed = ws.prune(now - Duration::days(5) + Duration::hours(1), 3).unwrap();
        assert_eq!(removed, 7);
        let texts: Vec<_> = ws.recent(10).into_iter().map(|i| i.text).collect();
        assert_eq!(texts, vec!["2 days ago", "1 days ago", "0 days ago"]);
    }

    #[test]
    fn test_snapshot_restart_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short_term.json");

        let ws = WorkingSet::new(50, Some(path.clone()));
        for i in 0..7 {
            ws.append(turn(i)).unwrap();
        }
        ws.set_preference("name", json!("Tony")).unwrap();
        ws.add_active_task("build suit").unwrap();
        let before = ws.recent(5);
        drop(ws);

        let (restored, state) = WorkingSet::load(50, path.clone());
        assert_eq!(state, SnapshotState::Restored);
        assert_eq!(restored.recent(5), before);
        assert_eq!(restored.get_preference("name"), Some(json!("Tony")));
        assert_eq!(restored.active_tasks(), vec!["build suit"]);

        let mut tmp = path.into_os_string();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
    }

    #[test]
    fn test_corrupt_snapshot_starts_cold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short_term.json");
        std::fs::write(&path, "{ \"interactions\": [ truncated").unwrap();

        let (ws, state) = WorkingSet::load(50, path.clone());
        assert_eq!(state, SnapshotState::Corrupt);
        assert!(state.is_cold());
        assert!(ws.is_empty());

        let (_, state) = WorkingSet::load(50, dir.path().join("absent.json"));
        assert_eq!(state, SnapshotState::Missing);
    }

    #[test]
    fn test_load_trims_oversized_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short_term.json");
        let big = WorkingSet::new(20, Some(path.clone()));
        for i in 0..20 {
            big.append(turn(i)).unwrap();
        }
        let (small, _) = WorkingSet::load(5, path);
        assert_eq!(small.len(), 5);
        assert_eq!(small.recent(1)[0].text, "turn 19");
    }

    #[test]
    fn test_snapshot_failure_keeps_mutation() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = dir.path().join("blocked");
        std::fs::create_dir_all(path.join("child")).unwrap();

        let ws = WorkingSet::new(50, Some(path));
        let err = ws.append(turn(0)).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let ws = std::sync::Arc::new(WorkingSet::new(25, Some(dir.path().join("snap.json"))));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ws = ws.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        ws.append(turn(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ws.len(), 25);
        let (reloaded, state) = WorkingSet::load(25, dir.path().join("snap.json"));
        assert_eq!(state, SnapshotState::Restored);
        assert_eq!(reloaded.recent(25), ws.recent(25));
    }

    proptest! {
        #[test]
        fn prop_cache_never_exceeds_max(max in 1usize..60, count in 0usize..200) {
            let ws = WorkingSet::new(max, None);
            for i in 0..count {
                ws.append(turn(i)).unwrap();
                prop_assert!(ws.len() <= max);
            }
        }

        #[test]
        fn prop_recent_is_tail_of_appends(count in 0usize..120, n in 0usize..80) {
            let ws = WorkingSet::new(50, None);
            let all: Vec<_> = (0..count).map(turn).collect();
            for i in &all {
                ws.append(i.clone()).unwrap();
            }
            let take = n.min(count.min(50));
            let expected = &all[count - take..];
            prop_assert_eq!(ws.recent(n), expected.to_vec());
        }
    }
}
