//! Reporting aggregates for the dashboard.
use super::mastery::{MASTERED_THRESHOLD, MasteryBand};
use super::ReviewState;
use super::due::count_due;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cards of one user grouped by mastery band.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardStats {
    pub total_cards: usize,
    pub mastered: usize,
    pub learning: usize,
    pub difficult: usize,
    pub due_cards: usize,
}

impl CardStats {
    pub fn from_states(states: &[ReviewState], now: DateTime<Utc>) -> Self {
        let mut stats = CardStats {
            total_cards: states.len(),
            due_cards: count_due(states, now),
            ..Default::default()
        };
        for state in states {
            match MasteryBand::from_level(state.mastery_level) {
                MasteryBand::Mastered => stats.mastered += 1,
                MasteryBand::Learning => stats.learning += 1,
                MasteryBand::Difficult => stats.difficult += 1,
            }
        }
        stats
    }
}

/// Lifetime statistics of one user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_cards: usize,
    pub cards_mastered: usize,
    pub total_reviews: u64,
    pub correct_reviews: u64,
    /// Percentage of reviews rated 3 or higher
    pub average_accuracy: u8,
    pub total_study_minutes: u64,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub last_study_date: Option<NaiveDate>,
}

impl UserStats {
    pub fn compute(
        states: &[ReviewState],
        total_reviews: u64,
        correct_reviews: u64,
        total_study_seconds: u64,
        study_days: &[NaiveDate],
        today: NaiveDate,
    ) -> Self {
        let average_accuracy = if total_reviews == 0 {
            0
        } else {
            (correct_reviews as f64 / total_reviews as f64 * 100.0).round() as u8
        };
        UserStats {
            total_cards: states.len(),
            cards_mastered: states
                .iter()
                .filter(|s| s.mastery_level >= MASTERED_THRESHOLD)
                .count(),
            total_reviews,
            correct_reviews,
            average_accuracy,
            total_study_minutes: (total_study_seconds as f64 / 60.0).round() as u64,
            current_streak_days: current_streak(study_days, today),
            longest_streak_days: longest_streak(study_days),
            last_study_date: study_days.iter().max().copied(),
        }
    }
}

/// Consecutive study days ending today, or ending yesterday when nothing
/// has been studied yet today.
pub fn current_streak(study_days: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = study_days.iter().copied().collect();
    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

/// Longest run of consecutive study days ever recorded.
pub fn longest_streak(study_days: &[NaiveDate]) -> u32 {
    let days: BTreeSet<NaiveDate> = study_days.iter().copied().collect();
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        run = match previous {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }
    longest
}
