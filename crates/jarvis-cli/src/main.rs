// Jarvis CLI
// Inspect and drive the assistant's memory from the terminal.
// Each invocation opens both tiers, runs one command and flushes the snapshot.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use jarvis_lib::atoms::constants::CONFIG_FILE_NAME;
use jarvis_lib::engine::paths;
use jarvis_lib::{Interaction, MemoryConfig, MemoryManager, Speaker};
use log::debug;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jarvis")]
#[command(about = "Jarvis memory - working set, durable log and dated digests", long_about = None)]
struct Cli {
    /// Data directory (snapshot + database)
    #[arg(long, env = "JARVIS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/jarvis.toml)
    #[arg(long, env = "JARVIS_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one conversational turn
    Record {
        /// user | assistant
        speaker: Speaker,
        text: String,
    },

    /// Show the most recent turns from the working set
    Recall {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// Substring search over the full log (newest first)
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Read or write a preference
    Pref {
        #[command(subcommand)]
        action: PrefAction,
    },

    /// Store a learned fact
    Fact {
        text: String,
        #[arg(long, default_value = "user")]
        source: String,
    },

    /// Search learned facts (newest first)
    Facts {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Summarize old interactions and trim the working set
    Retention {
        /// Defaults to retention.max_age_days from config
        #[arg(long)]
        max_age_days: Option<u32>,
        /// Defaults to retention.max_interactions from config
        #[arg(long)]
        max_interactions: Option<usize>,
    },

    /// List persisted period summaries
    Summaries,

    /// Counts across both tiers
    Stats,
}

#[derive(Subcommand)]
enum PrefAction {
    /// Print a preference value
    Get {
        key: String,
        /// Printed when the key is unset
        #[arg(long)]
        default: Option<String>,
    },
    /// Set a preference (JSON value, or a bare string)
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    debug!("[cli] Using data dir {:?}", config.data_dir);

    let memory = MemoryManager::open(&config).context("failed to open memory")?;
    run(&cli, &config, &memory)?;
    memory.flush().context("failed to save working set")?;
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<MemoryConfig> {
    let config_path = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => dir.join(CONFIG_FILE_NAME),
        (None, None) => paths::default_data_dir().join(CONFIG_FILE_NAME),
    };
    let mut config = MemoryConfig::load(&config_path)
        .with_context(|| format!("invalid config {:?}", config_path))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn run(cli: &Cli, config: &MemoryConfig, memory: &MemoryManager) -> Result<()> {
    match &cli.command {
        Commands::Record { speaker, text } => {
            let interaction = memory.record(*speaker, text)?;
            emit(cli.json, &interaction, || format_interaction(&interaction));
        }
        Commands::Recall { count } => {
            let turns = memory.recall(*count);
            emit_list(cli.json, &turns, format_interaction);
        }
        Commands::Search { query, limit } => {
            let hits = memory.search(query, *limit)?;
            emit_list(cli.json, &hits, format_interaction);
        }
        Commands::Pref { action } => match action {
            PrefAction::Get { key, default } => match memory.get_preference_value(key) {
                Some(v) => emit(cli.json, &v, || v.to_string()),
                None => match default {
                    Some(d) => println!("{}", d),
                    None => anyhow::bail!("preference '{}' is not set", key),
                },
            },
            PrefAction::Set { key, value } => {
                let parsed = parse_pref_value(value);
                memory.set_preference(key, &parsed)?;
                emit(cli.json, &parsed, || format!("{} = {}", key, parsed));
            }
        },
        Commands::Fact { text, source } => {
            memory.remember_fact(text, source)?;
            if !cli.json {
                println!("Learned: {}", text);
            }
        }
        Commands::Facts { query, limit } => {
            let facts = memory.search_facts(query, *limit)?;
            emit_list(cli.json, &facts, |f| {
                format!("{}  [{}] {}", f.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"), f.source, f.fact)
            });
        }
        Commands::Retention { max_age_days, max_interactions } => {
            let days = max_age_days.unwrap_or(config.retention.max_age_days);
            let keep = max_interactions.unwrap_or(config.retention.max_interactions);
            let written = memory.run_retention(days, keep)?;
            emit(cli.json, &written, || format!("{} summaries written", written));
        }
        Commands::Summaries => {
            let summaries = memory.recall_summaries()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No summaries yet.");
            } else {
                for s in &summaries {
                    if let Some(p) = s.period {
                        println!("{} → {}  ({} interactions)", p.start, p.end, s.total_interactions);
                    }
                    for day in &s.daily_summaries {
                        let topics: Vec<_> = day.topics.iter().map(String::as_str).collect();
                        println!("  {}  {:>3}  [{}]", day.date, day.interaction_count, topics.join(", "));
                        for point in &day.key_points {
                            println!("      • {}", point);
                        }
                    }
                }
            }
        }
        Commands::Stats => {
            let stats = memory.stats()?;
            emit(cli.json, &stats, || {
                format!(
                    "working set: {}/{}\nstored interactions: {}\nlearned facts: {}\nperiod summaries: {}\npreferences: {}\nactive tasks: {}",
                    stats.cached_interactions,
                    stats.cache_capacity,
                    stats.stored_interactions,
                    stats.learned_facts,
                    stats.period_summaries,
                    stats.preferences,
                    stats.active_tasks
                )
            });
        }
    }
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_pref_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn format_interaction(i: &Interaction) -> String {
    format!(
        "{}  {:>9}: {}",
        i.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        i.speaker,
        i.text
    )
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error: cannot encode output: {}", e),
        }
    } else {
        println!("{}", human());
    }
}

fn emit_list<T: Serialize>(json: bool, items: &[T], line: impl Fn(&T) -> String) {
    if json {
        emit(true, &items, String::new);
    } else if items.is_empty() {
        println!("(nothing)");
    } else {
        for item in items {
            println!("{}", line(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_record_with_legacy_speaker() {
        let cli = Cli::try_parse_from(["jarvis", "record", "jarvis", "Good morning, sir."]).unwrap();
        match cli.command {
            Commands::Record { speaker, text } => {
                assert_eq!(speaker, Speaker::Assistant);
                assert_eq!(text, "Good morning, sir.");
            }
            _ => panic!("expected record"),
        }
        assert!(Cli::try_parse_from(["jarvis", "record", "robot", "hi"]).is_err());
    }

    #[test]
    fn pref_values_fall_back_to_strings() {
        assert_eq!(parse_pref_value("42"), serde_json::json!(42));
        assert_eq!(parse_pref_value("{\"a\":true}"), serde_json::json!({"a": true}));
        assert_eq!(parse_pref_value("metric"), serde_json::json!("metric"));
    }

    #[test]
    fn data_dir_flag_overrides_config() {
        let dir = std::env::temp_dir().join("jarvis-cli-test-missing");
        let cli = Cli::try_parse_from(["jarvis", "--data-dir", dir.to_str().unwrap(), "stats"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.data_dir, dir);
        assert_eq!(config.cache_max_size, 50);
    }
}
