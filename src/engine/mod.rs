// Jarvis Memory Engine
//
// Module layout:
//   paths        - default data directory resolution
//   config       - MemoryConfig (TOML-loadable, all defaults from atoms::constants)
//   working_set  - bounded in-memory cache + snapshot file (tier 1)
//   store        - SQLite log of interactions, preferences, facts, summaries (tier 2)
//   summarizer   - date bucketing, topic/key-point extraction, retention cleanup
//   memory       - MemoryManager facade coordinating the three

pub mod config;
pub mod memory;
pub mod paths;
pub mod store;
pub mod summarizer;
pub mod working_set;
