//! Timed study sessions and their focus score.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds per card considered ideal pacing.
pub const IDEAL_SECONDS_PER_CARD: f64 = 30.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: i64,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cards_studied: u32,
    pub cards_correct: u32,
    pub total_time_seconds: u64,
    pub focus_score: u8,
}

impl StudySession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// 100 when the average time per card is exactly 30 s, losing 50 points per
/// 30 s of deviation; 0 when nothing was studied.
pub fn focus_score(total_seconds: u64, cards_studied: u32) -> u8 {
    if cards_studied == 0 {
        return 0;
    }
    let average = total_seconds as f64 / cards_studied as f64;
    let deviation = (average - IDEAL_SECONDS_PER_CARD).abs();
    let score = (100.0 - deviation / IDEAL_SECONDS_PER_CARD * 50.0).max(0.0);
    score.round() as u8
}
