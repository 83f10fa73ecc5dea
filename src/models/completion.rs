//! Where a learner stands today, for the dashboard greeting.
use super::ReviewState;
use super::due::count_due;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionState {
    /// No cards assigned yet
    NewUser,
    HasDueCards {
        due_cards: usize,
        completed_today: bool,
    },
    /// Reviewed today and nothing left due
    CompletedToday {
        next_review_at: Option<DateTime<Utc>>,
    },
    /// Nothing due and nothing reviewed today
    NoCardsDue {
        next_review_at: Option<DateTime<Utc>>,
    },
}

impl CompletionState {
    /// Classifies `states` at `now` given the number of reviews made today.
    pub fn compute(states: &[ReviewState], reviews_today: usize, now: DateTime<Utc>) -> Self {
        if states.is_empty() {
            return CompletionState::NewUser;
        }

        let completed_today = reviews_today > 0;
        let due_cards = count_due(states, now);
        if due_cards > 0 {
            return CompletionState::HasDueCards {
                due_cards,
                completed_today,
            };
        }

        let next_review_at = states
            .iter()
            .map(|s| s.next_review_at)
            .filter(|at| *at > now)
            .min();
        if completed_today {
            CompletionState::CompletedToday { next_review_at }
        } else {
            CompletionState::NoCardsDue { next_review_at }
        }
    }

    /// One-line greeting for the dashboard.
    pub fn message(&self) -> String {
        let next = |at: &Option<DateTime<Utc>>| match at {
            Some(at) => format!("Next review {}.", at.format("%Y-%m-%d %H:%M")),
            None => "No reviews scheduled.".to_string(),
        };
        match self {
            CompletionState::NewUser => "Add a deck to start learning.".to_string(),
            CompletionState::HasDueCards { due_cards: 1, .. } => "1 card due.".to_string(),
            CompletionState::HasDueCards { due_cards, .. } => format!("{} cards due.", due_cards),
            CompletionState::CompletedToday { next_review_at } => {
                format!("All done for today! {}", next(next_review_at))
            }
            CompletionState::NoCardsDue { next_review_at } => {
                format!("Nothing due. {}", next(next_review_at))
            }
        }
    }
}
