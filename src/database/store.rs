//! Persistence boundary of the scheduler and its SQLite implementation.
//!
//! Every saved state carries a version that is bumped on each write. A save
//! only succeeds when the stored version still equals the version that was
//! read, which gives at-most-one-writer semantics per (user, card).

use crate::error::{Result, SrsError};
use crate::models::review_log::running_average;
use crate::models::{Rating, ReviewLog, ReviewState, VersionedState};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::debug;

pub trait StateStore {
    fn load_state(&self, user_id: &str, card_id: i64) -> Result<VersionedState>;

    /// Writes `state` if the stored version equals `expected_version` and
    /// returns the new version, otherwise fails with a conflict.
    fn save_state(
        &self,
        user_id: &str,
        card_id: i64,
        state: &ReviewState,
        expected_version: i64,
    ) -> Result<i64>;

    /// States of all non-archived cards assigned to the user.
    fn list_states_for_user(&self, user_id: &str) -> Result<Vec<ReviewState>>;

    /// The user's review recorded under `submission_id`, if any. Submission
    /// ids are scoped per user.
    fn find_review_by_submission(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<Option<ReviewLog>>;

    /// Stores a review log entry and returns its id. Called after the state
    /// of the same review has been saved.
    fn append_review(&self, log: &ReviewLog) -> Result<i64>;
}

pub(crate) const STATE_COLUMNS: &str = "uc.card_id, uc.ease_factor, uc.interval_days, uc.repetitions, \
     uc.last_reviewed_at, uc.next_review_at, uc.total_reviews, uc.correct_reviews, \
     uc.mastery_level, uc.version";

pub(crate) const REVIEW_COLUMNS: &str = "id, user_id, card_id, rating, response_time_ms, session_id, submission_id, reviewed_at";

pub(crate) fn to_timestamp(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

pub(crate) fn from_timestamp(secs: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, secs))
}

/// Maps a row selected with [`STATE_COLUMNS`].
pub(crate) fn row_to_versioned_state(row: &Row) -> rusqlite::Result<VersionedState> {
    let last_reviewed_at = match row.get::<_, Option<i64>>(4)? {
        Some(secs) => Some(from_timestamp(secs, 4)?),
        None => None,
    };
    Ok(VersionedState {
        state: ReviewState {
            card_id: row.get(0)?,
            ease_factor: row.get(1)?,
            interval_days: row.get(2)?,
            repetitions: row.get(3)?,
            last_reviewed_at,
            next_review_at: from_timestamp(row.get(5)?, 5)?,
            total_reviews: row.get(6)?,
            correct_reviews: row.get(7)?,
            mastery_level: row.get(8)?,
        },
        version: row.get(9)?,
    })
}

pub(crate) fn row_to_review_log(row: &Row) -> rusqlite::Result<ReviewLog> {
    let raw_rating: u8 = row.get(3)?;
    let rating = Rating::new(raw_rating).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(e))
    })?;
    Ok(ReviewLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        card_id: row.get(2)?,
        rating,
        response_time_ms: row.get(4)?,
        session_id: row.get(5)?,
        submission_id: row.get(6)?,
        reviewed_at: from_timestamp(row.get(7)?, 7)?,
    })
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Folds the log's response time into the card's running average, counting
/// the review just saved in `total_reviews`.
fn record_response_time(conn: &Connection, log: &ReviewLog) -> Result<()> {
    let current: Option<(u32, u32)> = conn
        .query_row(
            "SELECT average_response_time_ms, total_reviews FROM user_cards
             WHERE user_id = ?1 AND card_id = ?2",
            params![log.user_id, log.card_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((average, count)) = current {
        conn.execute(
            "UPDATE user_cards SET average_response_time_ms = ?1
             WHERE user_id = ?2 AND card_id = ?3",
            params![
                running_average(average, log.response_time_ms, count),
                log.user_id,
                log.card_id
            ],
        )?;
    }
    Ok(())
}

impl StateStore for Connection {
    fn load_state(&self, user_id: &str, card_id: i64) -> Result<VersionedState> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM user_cards uc WHERE uc.user_id = ?1 AND uc.card_id = ?2"
        );
        self.query_row(&sql, params![user_id, card_id], row_to_versioned_state)
            .optional()?
            .ok_or_else(|| SrsError::CardNotAssigned {
                user_id: user_id.to_string(),
                card_id,
            })
    }

    fn save_state(
        &self,
        user_id: &str,
        card_id: i64,
        state: &ReviewState,
        expected_version: i64,
    ) -> Result<i64> {
        let updated = self.execute(
            "UPDATE user_cards
             SET ease_factor = ?1, interval_days = ?2, repetitions = ?3, last_reviewed_at = ?4,
                 next_review_at = ?5, total_reviews = ?6, correct_reviews = ?7, mastery_level = ?8,
                 version = version + 1
             WHERE user_id = ?9 AND card_id = ?10 AND version = ?11",
            params![
                state.ease_factor,
                state.interval_days,
                state.repetitions,
                state.last_reviewed_at.map(to_timestamp),
                to_timestamp(state.next_review_at),
                state.total_reviews,
                state.correct_reviews,
                state.mastery_level,
                user_id,
                card_id,
                expected_version
            ],
        )?;

        if updated == 0 {
            debug!(user_id, card_id, expected_version, "Version check failed");
            return Err(SrsError::ConcurrentUpdateConflict {
                user_id: user_id.to_string(),
                card_id,
                expected_version,
            });
        }
        Ok(expected_version + 1)
    }

    fn list_states_for_user(&self, user_id: &str) -> Result<Vec<ReviewState>> {
        let sql = format!(
            "SELECT {STATE_COLUMNS}
             FROM user_cards uc
             JOIN cards c ON c.id = uc.card_id
             WHERE uc.user_id = ?1 AND c.archived_at IS NULL
             ORDER BY uc.card_id"
        );
        let mut stmt = self.prepare(&sql)?;
        let states = stmt
            .query_map(params![user_id], |row| {
                row_to_versioned_state(row).map(|v| v.state)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }

    fn find_review_by_submission(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<Option<ReviewLog>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ?1 AND submission_id = ?2"
        );
        let log = self
            .query_row(&sql, params![user_id, submission_id], row_to_review_log)
            .optional()?;
        Ok(log)
    }

    fn append_review(&self, log: &ReviewLog) -> Result<i64> {
        let inserted = self.execute(
            "INSERT INTO reviews (user_id, card_id, rating, response_time_ms, session_id, submission_id, reviewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.user_id,
                log.card_id,
                log.rating.value(),
                log.response_time_ms,
                log.session_id,
                log.submission_id,
                to_timestamp(log.reviewed_at)
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.last_insert_rowid();
                record_response_time(self, log)?;
                Ok(id)
            }
            // Another writer recorded the same submission first
            Err(e) if is_unique_violation(&e) => {
                Err(SrsError::ConcurrentUpdateConflict {
                    user_id: log.user_id.clone(),
                    card_id: log.card_id,
                    expected_version: -1,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
