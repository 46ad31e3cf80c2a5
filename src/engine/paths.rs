// Default on-disk locations for the memory subsystem.

use std::path::PathBuf;

/// Root data directory: `<platform data dir>/jarvis/memory`.
/// Falls back to `./data/memory` when the platform has no data dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("jarvis").join("memory"))
        .unwrap_or_else(|| PathBuf::from("data").join("memory"))
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &std::path::Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
