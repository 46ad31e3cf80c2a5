// ── Jarvis Atoms: Constants ────────────────────────────────────────────────
// Defaults for the memory subsystem. `MemoryConfig` overrides every one of
// these at runtime; the values here are what a fresh install gets.

// ── Working set ────────────────────────────────────────────────────────────
/// Maximum interactions held in the in-memory working set.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 50;
/// Recovery snapshot file name, relative to the data directory.
pub const DEFAULT_SNAPSHOT_FILE: &str = "short_term.json";

// ── Durable store ──────────────────────────────────────────────────────────
/// SQLite database file name, relative to the data directory.
pub const DEFAULT_DATABASE_FILE: &str = "long_term.db";
/// How long SQLite waits on a locked database before reporting BUSY.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2_000;
/// Extra attempts for a write that failed with BUSY/LOCKED.
pub const DEFAULT_WRITE_RETRIES: u32 = 3;
/// Pause between write retries.
pub const WRITE_RETRY_BACKOFF_MS: u64 = 50;

// ── Retention ──────────────────────────────────────────────────────────────
pub const DEFAULT_RETENTION_MAX_AGE_DAYS: u32 = 30;
pub const DEFAULT_RETENTION_MAX_INTERACTIONS: usize = 100;
/// Run retention automatically after this many `record` calls (0 = never).
pub const DEFAULT_AUTO_RETENTION_EVERY: usize = 50;

// ── Store metadata keys ────────────────────────────────────────────────────
/// Legacy single-id retention watermark, read once to backfill per-row tracking.
pub(crate) const META_RETENTION_WATERMARK: &str = "retention_watermark";

// ── Config discovery ───────────────────────────────────────────────────────
pub const CONFIG_FILE_NAME: &str = "jarvis.toml";
