//! Selection of the cards due for review.

use super::ReviewState;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Default size of a review queue.
pub const DEFAULT_DUE_LIMIT: usize = 20;

/// Forecast window of the upcoming-reviews view.
pub const DEFAULT_UPCOMING_DAYS: u32 = 7;

/// Most overdue first, harder cards first among equally overdue ones.
fn queue_order(a: &ReviewState, b: &ReviewState) -> Ordering {
    a.next_review_at
        .cmp(&b.next_review_at)
        .then_with(|| a.ease_factor.total_cmp(&b.ease_factor))
        .then_with(|| a.card_id.cmp(&b.card_id))
}

/// Returns every state with `next_review_at <= now` in queue order,
/// truncated to `limit` after ordering.
pub fn select_due(
    states: &[ReviewState],
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<ReviewState> {
    let mut due: Vec<ReviewState> = states.iter().filter(|s| s.is_due(now)).cloned().collect();
    due.sort_by(queue_order);
    if let Some(limit) = limit {
        due.truncate(limit);
    }
    due
}

/// Number of due states, ignoring any presentation limit.
pub fn count_due(states: &[ReviewState], now: DateTime<Utc>) -> usize {
    states.iter().filter(|s| s.is_due(now)).count()
}

/// Cards becoming due after `now` and within `days` days, grouped by UTC day.
pub fn upcoming(
    states: &[ReviewState],
    now: DateTime<Utc>,
    days: u32,
) -> BTreeMap<NaiveDate, Vec<ReviewState>> {
    let horizon = now + Duration::days(days as i64);
    let mut pending: Vec<&ReviewState> = states
        .iter()
        .filter(|s| s.next_review_at > now && s.next_review_at <= horizon)
        .collect();
    pending.sort_by(|a, b| queue_order(a, b));

    let mut grouped: BTreeMap<NaiveDate, Vec<ReviewState>> = BTreeMap::new();
    for state in pending {
        grouped
            .entry(state.next_review_at.date_naive())
            .or_default()
            .push(state.clone());
    }
    grouped
}
