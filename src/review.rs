//! Rating submission: read the stored state, apply SM-2, write back
//! conditionally, and log the review.
//!
//! An attempt that loses the version race fails with a conflict and is
//! re-run from a fresh read. Submissions carrying a `submission_id` are
//! applied at most once; replays return the stored outcome.

use crate::database::store::StateStore;
use crate::error::{Result, SrsError};
use crate::models::sm2::{SchedulerParams, checked_apply_review};
use crate::models::{Rating, ReviewLog, ReviewState, ReviewSubmission};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Result of a submitted rating.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewOutcome {
    pub state: ReviewState,
    pub version: i64,
    pub log: ReviewLog,
    /// The submission id had already been applied
    pub duplicate: bool,
}

/// One read-modify-write attempt against `store`.
pub fn apply_submission<S: StateStore + ?Sized>(
    store: &S,
    submission: &ReviewSubmission,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Result<ReviewOutcome> {
    let rating = Rating::new(submission.rating)?;

    if let Some(submission_id) = submission.submission_id.as_deref() {
        if let Some(log) = store.find_review_by_submission(&submission.user_id, submission_id)? {
            if log.card_id != submission.card_id {
                return Err(SrsError::SubmissionReused {
                    submission_id: submission_id.to_string(),
                    card_id: submission.card_id,
                    recorded_card_id: log.card_id,
                });
            }
            debug!(submission_id, card_id = log.card_id, "Submission already applied");
            let current = store.load_state(&log.user_id, log.card_id)?;
            return Ok(ReviewOutcome {
                state: current.state,
                version: current.version,
                log,
                duplicate: true,
            });
        }
    }

    let current = store.load_state(&submission.user_id, submission.card_id)?;
    let next = checked_apply_review(&current.state, rating, now, params)?;
    let version = store.save_state(
        &submission.user_id,
        submission.card_id,
        &next,
        current.version,
    )?;

    let mut log = ReviewLog {
        id: 0,
        user_id: submission.user_id.clone(),
        card_id: submission.card_id,
        rating,
        response_time_ms: submission.response_time_ms,
        session_id: submission.session_id,
        submission_id: submission.submission_id.clone(),
        reviewed_at: now,
    };
    log.id = store.append_review(&log)?;

    Ok(ReviewOutcome {
        state: next,
        version,
        log,
        duplicate: false,
    })
}

/// Runs `attempt` until it succeeds, fails with something other than a
/// conflict, or `max_retries` retries have been spent.
pub fn retry_on_conflict<T, F>(max_retries: u32, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut tries = 0;
    loop {
        match attempt(tries) {
            Err(e) if e.is_conflict() && tries < max_retries => {
                tries += 1;
                warn!(attempt = tries, max_retries, "Retrying after conflict: {}", e);
            }
            other => return other,
        }
    }
}

/// Applies a submission to an in-process store, retrying conflicts.
pub fn submit_with_retry<S: StateStore + ?Sized>(
    store: &S,
    submission: &ReviewSubmission,
    now: DateTime<Utc>,
    params: &SchedulerParams,
    max_retries: u32,
) -> Result<ReviewOutcome> {
    retry_on_conflict(max_retries, |_| {
        apply_submission(store, submission, now, params)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionedState;
    use chrono::{Duration, TimeZone};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 18, 30, 0).unwrap()
    }

    /// In-memory store that can bump a card's version behind the caller's
    /// back a given number of times, as a concurrent writer would.
    #[derive(Default)]
    struct MemoryStore {
        states: RefCell<HashMap<(String, i64), VersionedState>>,
        logs: RefCell<Vec<ReviewLog>>,
        interfering_writes: Cell<u32>,
    }

    impl MemoryStore {
        fn with_card(user_id: &str, card_id: i64) -> Self {
            let store = MemoryStore::default();
            store.states.borrow_mut().insert(
                (user_id.to_string(), card_id),
                VersionedState {
                    state: ReviewState::new(card_id, t0()),
                    version: 0,
                },
            );
            store
        }
    }

    impl StateStore for MemoryStore {
        fn load_state(&self, user_id: &str, card_id: i64) -> Result<VersionedState> {
            let loaded = self
                .states
                .borrow()
                .get(&(user_id.to_string(), card_id))
                .cloned()
                .ok_or_else(|| SrsError::CardNotAssigned {
                    user_id: user_id.to_string(),
                    card_id,
                })?;
            if self.interfering_writes.get() > 0 {
                self.interfering_writes.set(self.interfering_writes.get() - 1);
                if let Some(stored) = self.states.borrow_mut().get_mut(&(user_id.to_string(), card_id)) {
                    stored.version += 1;
                }
            }
            Ok(loaded)
        }

        fn save_state(
            &self,
            user_id: &str,
            card_id: i64,
            state: &ReviewState,
            expected_version: i64,
        ) -> Result<i64> {
            let mut states = self.states.borrow_mut();
            let stored = states
                .get_mut(&(user_id.to_string(), card_id))
                .ok_or_else(|| SrsError::NotFound(card_id.to_string()))?;
            if stored.version != expected_version {
                return Err(SrsError::ConcurrentUpdateConflict {
                    user_id: user_id.to_string(),
                    card_id,
                    expected_version,
                });
            }
            stored.state = state.clone();
            stored.version += 1;
            Ok(stored.version)
        }

        fn list_states_for_user(&self, user_id: &str) -> Result<Vec<ReviewState>> {
            Ok(self
                .states
                .borrow()
                .iter()
                .filter(|((user, _), _)| user == user_id)
                .map(|(_, v)| v.state.clone())
                .collect())
        }

        fn find_review_by_submission(
            &self,
            user_id: &str,
            submission_id: &str,
        ) -> Result<Option<ReviewLog>> {
            Ok(self
                .logs
                .borrow()
                .iter()
                .find(|l| l.user_id == user_id && l.submission_id.as_deref() == Some(submission_id))
                .cloned())
        }

        fn append_review(&self, log: &ReviewLog) -> Result<i64> {
            let mut logs = self.logs.borrow_mut();
            let id = logs.len() as i64 + 1;
            logs.push(ReviewLog { id, ..log.clone() });
            Ok(id)
        }
    }

    #[test]
    fn test_applies_and_logs() {
        let store = MemoryStore::with_card("ada", 1);
        let submission = ReviewSubmission::new("ada", 1, 4).with_response_time(2_500);

        let outcome = apply_submission(&store, &submission, t0(), &SchedulerParams::default()).unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.state.repetitions, 1);
        assert_eq!(outcome.log.id, 1);
        assert_eq!(outcome.log.response_time_ms, 2_500);
        assert_eq!(store.load_state("ada", 1).unwrap().state, outcome.state);
    }

    #[test]
    fn test_invalid_rating_rejected_before_load() {
        let store = MemoryStore::default();
        let submission = ReviewSubmission::new("ada", 99, 6);

        let result = apply_submission(&store, &submission, t0(), &SchedulerParams::default());
        assert!(matches!(result, Err(SrsError::InvalidRating(6))));
    }

    #[test]
    fn test_unassigned_card() {
        let store = MemoryStore::default();
        let submission = ReviewSubmission::new("ada", 5, 3);

        let result = apply_submission(&store, &submission, t0(), &SchedulerParams::default());
        assert!(matches!(result, Err(SrsError::CardNotAssigned { card_id: 5, .. })));
    }

    #[test]
    fn test_clock_skew_surfaces() {
        let store = MemoryStore::with_card("ada", 1);
        let params = SchedulerParams::default();
        apply_submission(&store, &ReviewSubmission::new("ada", 1, 5), t0(), &params).unwrap();

        let earlier = t0() - Duration::hours(1);
        let result = apply_submission(&store, &ReviewSubmission::new("ada", 1, 5), earlier, &params);
        assert!(matches!(result, Err(SrsError::ClockSkew { .. })));
        assert_eq!(store.load_state("ada", 1).unwrap().state.total_reviews, 1);
    }

    #[test]
    fn test_conflict_is_retried_with_fresh_state() {
        let store = MemoryStore::with_card("ada", 1);
        store.interfering_writes.set(2);

        let outcome = submit_with_retry(
            &store,
            &ReviewSubmission::new("ada", 1, 4),
            t0(),
            &SchedulerParams::default(),
            3,
        )
        .unwrap();
        assert_eq!(outcome.state.total_reviews, 1);
        assert_eq!(store.logs.borrow().len(), 1);
    }

    #[test]
    fn test_conflict_surfaces_when_retries_run_out() {
        let store = MemoryStore::with_card("ada", 1);
        store.interfering_writes.set(10);

        let result = submit_with_retry(
            &store,
            &ReviewSubmission::new("ada", 1, 4),
            t0(),
            &SchedulerParams::default(),
            2,
        );
        assert!(matches!(result, Err(SrsError::ConcurrentUpdateConflict { .. })));
        assert!(store.logs.borrow().is_empty());
    }

    #[test]
    fn test_replayed_submission_is_not_applied_twice() {
        let store = MemoryStore::with_card("ada", 1);
        let params = SchedulerParams::default();
        let submission = ReviewSubmission::new("ada", 1, 5).with_submission_id("req-1");

        let first = apply_submission(&store, &submission, t0(), &params).unwrap();
        let replay = apply_submission(&store, &submission, t0() + Duration::seconds(2), &params).unwrap();

        assert!(replay.duplicate);
        assert_eq!(replay.state, first.state);
        assert_eq!(replay.log, first.log);
        assert_eq!(store.logs.borrow().len(), 1);
        assert_eq!(store.load_state("ada", 1).unwrap().state.total_reviews, 1);
    }

    #[test]
    fn test_submission_ids_are_scoped_per_user() {
        let store = MemoryStore::with_card("alice", 1);
        store.states.borrow_mut().insert(
            ("bob".to_string(), 1),
            VersionedState {
                state: ReviewState::new(1, t0()),
                version: 0,
            },
        );
        let params = SchedulerParams::default();

        apply_submission(&store, &ReviewSubmission::new("alice", 1, 5).with_submission_id("1-1-1"), t0(), &params)
            .unwrap();
        let bob = apply_submission(&store, &ReviewSubmission::new("bob", 1, 0).with_submission_id("1-1-1"), t0(), &params)
            .unwrap();

        assert!(!bob.duplicate);
        assert_eq!(bob.log.user_id, "bob");
        assert_eq!(bob.state.correct_reviews, 0);
        assert_eq!(store.load_state("bob", 1).unwrap().state.total_reviews, 1);
        assert_eq!(store.load_state("alice", 1).unwrap().state.total_reviews, 1);
    }

    #[test]
    fn test_submission_id_reused_for_another_card() {
        let store = MemoryStore::with_card("ada", 1);
        store.states.borrow_mut().insert(
            ("ada".to_string(), 2),
            VersionedState {
                state: ReviewState::new(2, t0()),
                version: 0,
            },
        );
        let params = SchedulerParams::default();
        apply_submission(&store, &ReviewSubmission::new("ada", 1, 4).with_submission_id("req-7"), t0(), &params)
            .unwrap();

        let reused = apply_submission(&store, &ReviewSubmission::new("ada", 2, 4).with_submission_id("req-7"), t0(), &params);
        assert!(matches!(
            reused,
            Err(SrsError::SubmissionReused { card_id: 2, recorded_card_id: 1, .. })
        ));
        assert_eq!(store.load_state("ada", 2).unwrap().state.total_reviews, 0);
    }

    #[test]
    fn test_retry_stops_on_other_errors() {
        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(5, |_| {
            calls += 1;
            Err(SrsError::NotFound("card".into()))
        });
        assert!(matches!(result, Err(SrsError::NotFound(_))));
        assert_eq!(calls, 1);
    }
}
