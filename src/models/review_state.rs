//! Per user and card scheduling state.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Scheduling state of one card for one user.
///
/// Created with defaults when the card is assigned and afterwards only
/// replaced by [`crate::models::sm2::apply_review`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub card_id: i64,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: DateTime<Utc>,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub mastery_level: u8,
}

impl ReviewState {
    /// Fresh state for a card assigned at `assigned_at`; due immediately.
    pub fn new(card_id: i64, assigned_at: DateTime<Utc>) -> Self {
        Self {
            card_id,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            last_reviewed_at: None,
            next_review_at: assigned_at,
            total_reviews: 0,
            correct_reviews: 0,
            mastery_level: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    pub fn is_new(&self) -> bool {
        self.last_reviewed_at.is_none()
    }

    /// Share of correct reviews in 0.0..=1.0; 0.0 before the first review.
    pub fn accuracy(&self) -> f64 {
        self.correct_reviews as f64 / self.total_reviews.max(1) as f64
    }

    /// How long the card has been overdue at `now`, zero if not yet due.
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        (now - self.next_review_at).max(Duration::zero())
    }
}

/// A stored state together with its optimistic-concurrency version.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedState {
    pub state: ReviewState,
    pub version: i64,
}
