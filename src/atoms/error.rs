// ── Jarvis Atoms: Error Types ──────────────────────────────────────────────
// Single canonical error enum for the memory subsystem, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by failure class, not by call site.
//   • `#[from]` wires std/external error conversions automatically.
//   • `MemoryError` → `String` is provided so host boundaries that speak
//     `Result<T, String>` can use `?` without boilerplate.
//   • A missing preference is not an error: callers pass a default.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
    /// A write to the store or the snapshot file was rejected.
    /// In-memory cache state is NOT rolled back when this is returned.
    #[error("Persistence failure during {op}: {detail}")]
    Persistence { op: String, detail: String },

    /// A stored record could not be decoded (bad timestamp, unknown speaker…).
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// SQLite / rusqlite failure on a read path.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl MemoryError {
    /// Create a persistence failure for the named operation.
    pub fn persistence(op: impl Into<String>, detail: impl ToString) -> Self {
        Self::Persistence { op: op.into(), detail: detail.to_string() }
    }

    /// True for failures that left durable state untouched but the process
    /// healthy (the host should keep going without persistence).
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

impl From<toml::de::Error> for MemoryError {
    fn from(e: toml::de::Error) -> Self {
        MemoryError::Config(e.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

pub type MemoryResult<T> = Result<T, MemoryError>;

// ── Conversion: MemoryError → String ──────────────────────────────────────

impl From<MemoryError> for String {
    fn from(e: MemoryError) -> Self {
        e.to_string()
    }
}
