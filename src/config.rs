//! Runtime configuration: command-line flags, each backed by an
//! environment variable and a default.

use crate::models::due::DEFAULT_DUE_LIMIT;
use crate::models::mastery::DEFAULT_MASTERY_TARGET_REPS;
use crate::models::sm2::SchedulerParams;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use directories::ProjectDirs;
use std::path::PathBuf;

const DB_FILE_NAME: &str = "neuros.sqlite3";
pub const DEFAULT_USER: &str = "local";
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Neuros - spaced repetition flashcards
#[derive(Parser, Clone, Debug, PartialEq)]
#[command(name = "neuros")]
#[command(version)]
#[command(about = "Spaced repetition flashcards with SM-2 scheduling", long_about = None)]
#[command(after_help = "Log level filter: RUST_LOG (e.g. debug, info, warn)")]
pub struct Config {
    /// SQLite database file
    #[arg(long = "db", env = "NEUROS_DB_PATH", value_name = "PATH", default_value_os_t = default_db_path())]
    pub db_path: PathBuf,

    /// Learner whose cards are reviewed
    #[arg(long = "user", env = "NEUROS_USER", value_name = "ID", default_value = DEFAULT_USER, value_parser = NonEmptyStringValueParser::new())]
    pub user_id: String,

    /// Cards per review queue
    #[arg(long, env = "NEUROS_DUE_LIMIT", default_value_t = DEFAULT_DUE_LIMIT)]
    pub due_limit: usize,

    /// Retries after a concurrent update of the same card
    #[arg(long = "conflict-retries", env = "NEUROS_CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    pub max_conflict_retries: u32,

    /// Consecutive successes needed for full mastery
    #[arg(
        long,
        env = "NEUROS_MASTERY_TARGET_REPS",
        default_value_t = DEFAULT_MASTERY_TARGET_REPS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mastery_target_reps: u32,
}

impl Config {
    pub fn scheduler(&self) -> SchedulerParams {
        SchedulerParams {
            mastery_target_reps: self.mastery_target_reps,
            ..SchedulerParams::default()
        }
    }
}

/// Platform data directory, falling back to the working directory.
pub fn default_db_path() -> PathBuf {
    match ProjectDirs::from("com", "neuros", "neuros") {
        Some(dirs) => dirs.data_dir().join(DB_FILE_NAME),
        None => PathBuf::from(DB_FILE_NAME),
    }
}
