//! SM-2 (SuperMemo 2) scheduling engine.
//!
//! The SM-2 algorithm calculates review intervals from recall quality:
//! - Each card has an ease factor (EF) that adjusts based on performance
//! - Ratings 0-2 are lapses: repetitions reset and the card comes back tomorrow
//! - Ratings 3-5 grow the interval progressively (1 day → 6 days → EF multiplier)
//! - EF is adjusted after every review, lapses included, with a floor of 1.3

use super::mastery::{DEFAULT_MASTERY_TARGET_REPS, estimate_mastery_with};
use super::{Rating, ReviewState};
use super::review_state::MIN_EASE_FACTOR;
use crate::error::{Result, SrsError};
use chrono::{DateTime, Duration, Utc};

/// Upper bound on scheduled intervals (about a century).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Tunables of the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerParams {
    pub mastery_target_reps: u32,
    pub max_interval_days: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            mastery_target_reps: DEFAULT_MASTERY_TARGET_REPS,
            max_interval_days: MAX_INTERVAL_DAYS,
        }
    }
}

/// EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), floored at 1.3.
pub fn next_ease_factor(ease_factor: f64, rating: Rating) -> f64 {
    let q = rating.value() as f64;
    let updated = ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));
    updated.max(MIN_EASE_FACTOR)
}

/// Computes the state after reviewing `state` with `rating` at `now`.
///
/// Pure: the caller is responsible for `now >= state.last_reviewed_at`,
/// see [`checked_apply_review`].
pub fn apply_review(state: &ReviewState, rating: Rating, now: DateTime<Utc>) -> ReviewState {
    apply_review_with(state, rating, now, &SchedulerParams::default())
}

pub fn apply_review_with(
    state: &ReviewState,
    rating: Rating,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> ReviewState {
    let ease_factor = next_ease_factor(state.ease_factor, rating);

    let (interval_days, repetitions) = if rating.is_pass() {
        let repetitions = state.repetitions.saturating_add(1);
        let interval = match repetitions {
            1 => 1,
            2 => 6,
            _ => (state.interval_days as f64 * ease_factor).round() as u32,
        };
        (interval.min(params.max_interval_days), repetitions)
    } else {
        // Lapse: come back tomorrow, ease keeps the long-run penalty
        (1, 0)
    };

    let mut next = ReviewState {
        card_id: state.card_id,
        ease_factor,
        interval_days,
        repetitions,
        last_reviewed_at: Some(now),
        next_review_at: now + Duration::days(interval_days as i64),
        total_reviews: state.total_reviews.saturating_add(1),
        correct_reviews: if rating.is_pass() {
            state.correct_reviews.saturating_add(1)
        } else {
            state.correct_reviews
        },
        mastery_level: 0,
    };
    next.mastery_level = estimate_mastery_with(&next, params.mastery_target_reps);
    next
}

/// Rejects reviews timestamped before the previous review, then applies.
pub fn checked_apply_review(
    state: &ReviewState,
    rating: Rating,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Result<ReviewState> {
    if let Some(last_reviewed_at) = state.last_reviewed_at {
        if now < last_reviewed_at {
            return Err(SrsError::ClockSkew {
                now,
                last_reviewed_at,
            });
        }
    }
    Ok(apply_review_with(state, rating, now, params))
}

/// Outcome of every possible rating, lowest first.
pub fn preview(
    state: &ReviewState,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Vec<(Rating, ReviewState)> {
    Rating::ALL
        .iter()
        .map(|&rating| (rating, apply_review_with(state, rating, now, params)))
        .collect()
}
