//! Record of a single rating submission.
use super::Rating;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of entries returned by a card's review history.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    /// Row id, 0 until stored
    pub id: i64,
    pub user_id: String,
    pub card_id: i64,
    pub rating: Rating,
    pub response_time_ms: u32,
    pub session_id: Option<i64>,
    /// Client idempotency key; a replayed key is never applied twice
    pub submission_id: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// A rating submitted by the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewSubmission {
    pub user_id: String,
    pub card_id: i64,
    pub rating: u8,
    pub response_time_ms: u32,
    pub session_id: Option<i64>,
    pub submission_id: Option<String>,
}

impl ReviewSubmission {
    pub fn new(user_id: impl Into<String>, card_id: i64, rating: u8) -> Self {
        Self {
            user_id: user_id.into(),
            card_id,
            rating,
            response_time_ms: 0,
            session_id: None,
            submission_id: None,
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u32) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn in_session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_submission_id(mut self, submission_id: impl Into<String>) -> Self {
        self.submission_id = Some(submission_id.into());
        self
    }
}

/// Mean response time after adding `sample` as the `count`-th review.
pub fn running_average(average_ms: u32, sample_ms: u32, count: u32) -> u32 {
    if count <= 1 {
        return sample_ms;
    }
    let average = average_ms as f64;
    (average + (sample_ms as f64 - average) / count as f64).round() as u32
}
