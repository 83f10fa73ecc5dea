//! Mastery estimate shown next to each card.
//!
//! Mastery needs both sustained accuracy and enough consecutive successes to
//! have reached a long interval, so one lucky answer never reads as mastered.

use super::ReviewState;
use serde::{Deserialize, Serialize};

/// Consecutive successes at which the repetition factor saturates.
pub const DEFAULT_MASTERY_TARGET_REPS: u32 = 8;

pub const MASTERED_THRESHOLD: u8 = 80;
pub const LEARNING_THRESHOLD: u8 = 40;

pub fn estimate_mastery(state: &ReviewState) -> u8 {
    estimate_mastery_with(state, DEFAULT_MASTERY_TARGET_REPS)
}

/// `round(100 * accuracy * min(1, repetitions / target_reps))` clamped to 0-100.
pub fn estimate_mastery_with(state: &ReviewState, target_reps: u32) -> u8 {
    let accuracy = state.correct_reviews as f64 / state.total_reviews.max(1) as f64;
    let progress = (state.repetitions as f64 / target_reps.max(1) as f64).min(1.0);
    (100.0 * accuracy * progress).round().clamp(0.0, 100.0) as u8
}

/// Dashboard grouping of mastery levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasteryBand {
    Difficult,
    Learning,
    Mastered,
}

impl MasteryBand {
    pub fn from_level(level: u8) -> Self {
        if level >= MASTERED_THRESHOLD {
            MasteryBand::Mastered
        } else if level >= LEARNING_THRESHOLD {
            MasteryBand::Learning
        } else {
            MasteryBand::Difficult
        }
    }
}
