//! Error type shared by the scheduler, the SQLite layer and the import code.

use chrono::{DateTime, Utc};

/// Errors surfaced by the review core and its persistence layer.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SrsError {
    /// Rating outside the 0-5 quality scale
    #[error("Invalid rating {0}: expected 0-5")]
    InvalidRating(u8),

    /// Review submitted with a timestamp before the previous review
    #[error("Clock skew: review at {now} precedes last review at {last_reviewed_at}")]
    ClockSkew {
        now: DateTime<Utc>,
        last_reviewed_at: DateTime<Utc>,
    },

    /// Optimistic version check failed while saving a review state
    #[error(
        "Concurrent update of card {card_id} for user '{user_id}' (expected version {expected_version})"
    )]
    ConcurrentUpdateConflict {
        user_id: String,
        card_id: i64,
        expected_version: i64,
    },

    /// A submission id already recorded for a different card
    #[error("Submission '{submission_id}' was already used for card {recorded_card_id}, not card {card_id}")]
    SubmissionReused {
        submission_id: String,
        card_id: i64,
        recorded_card_id: i64,
    },

    /// Another card in the deck already has this front
    #[error("Deck '{deck_name}' already has a card '{front}'")]
    DuplicateCard { deck_name: String, front: String },

    #[error("Card {card_id} is not assigned to user '{user_id}'")]
    CardNotAssigned { user_id: String, card_id: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Imported payload does not match the expected shape
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SrsError {
    /// True for failures that are resolved by re-reading state and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SrsError::ConcurrentUpdateConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, SrsError>;
