//! Learning session management for spaced repetition practice.
//! Handles multi-round review of due cards with SM-2 scheduling.

use super::{LearningCard, Rating, ReviewState, ReviewSubmission, StudySession};
use crate::config::Config;
use crate::database::db;
use crate::error::{Result, SrsError};
use crate::models::Flashcard;
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

/// Manages a learning session with multiple review rounds.
/// Cards that aren't recalled (rating < 3) are repeated in subsequent rounds.
pub struct LearningSession {
    pub user_id: String,
    pub deck_name: String,
    pub all_cards: Vec<(LearningCard, ReviewState)>,
    pub current_round_cards: Vec<usize>,
    pub current_index: usize,
    pub show_answer: bool,
    pub round_number: usize,
    pub study_session: StudySession,
    conn: Arc<Mutex<Connection>>,
    config: Config,
    shown_at: Instant,
    cards_studied: u32,
    cards_correct: u32,
    finished: bool,
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| SrsError::LockPoisoned(e.to_string()))
}

impl LearningSession {
    /// Starts a session over the cards of `deck_name` that are due at the
    /// simulated current date. Returns `None` when nothing is due.
    pub fn start(
        deck_name: &str,
        conn: Arc<Mutex<Connection>>,
        config: &Config,
    ) -> Result<Option<Self>> {
        let (due_cards, study_session) = {
            let guard = lock(&conn)?;
            let now = db::get_current_date(&guard)?;
            let due = db::get_due_cards(
                &config.user_id,
                Some(deck_name),
                now,
                Some(config.due_limit),
                &guard,
            )?;
            if due.is_empty() {
                return Ok(None);
            }
            let study_session = db::start_study_session(&config.user_id, Utc::now(), &guard)?;
            (due, study_session)
        };

        info!(
            deck = deck_name,
            cards = due_cards.len(),
            session_id = study_session.id,
            "Learning session started"
        );
        Ok(Some(Self::new_from_due_cards(
            deck_name.to_string(),
            due_cards,
            study_session,
            conn,
            config.clone(),
        )))
    }

    /// Creates a new learning session from cards that are due for review.
    pub fn new_from_due_cards(
        deck_name: String,
        cards: Vec<(Flashcard, ReviewState)>,
        study_session: StudySession,
        conn: Arc<Mutex<Connection>>,
        config: Config,
    ) -> Self {
        // Wrap flashcards in LearningCard for progress tracking
        let learning_cards: Vec<_> = cards
            .into_iter()
            .map(|(fc, state)| (LearningCard::new(fc), state))
            .collect();

        let indices: Vec<usize> = (0..learning_cards.len()).collect();

        Self {
            user_id: config.user_id.clone(),
            deck_name,
            all_cards: learning_cards,
            current_round_cards: indices,
            current_index: 0,
            show_answer: false,
            round_number: 1,
            study_session,
            conn,
            config,
            shown_at: Instant::now(),
            cards_studied: 0,
            cards_correct: 0,
            finished: false,
        }
    }

    pub fn current_card(&self) -> Option<&(LearningCard, ReviewState)> {
        self.current_round_cards
            .get(self.current_index)
            .and_then(|&idx| self.all_cards.get(idx))
    }

    pub fn toggle_answer(&mut self) {
        self.show_answer = !self.show_answer;
    }

    pub fn next_card(&mut self) {
        if self.current_index + 1 < self.current_round_cards.len() {
            self.current_index += 1;
            self.show_answer = false;
            self.shown_at = Instant::now();
        } else {
            // End of round - check if there are cards to review
            self.start_next_round();
        }
    }

    /// Starts a new round with cards that weren't recalled (rating < 3).
    /// If no cards remain, the session is complete.
    fn start_next_round(&mut self) {
        let failed_indices: Vec<usize> = self
            .current_round_cards
            .iter()
            .copied()
            .filter(|&idx| {
                self.all_cards
                    .get(idx)
                    .map(|(card, _)| !card.is_learned)
                    .unwrap_or(false)
            })
            .collect();

        if !failed_indices.is_empty() {
            debug!(
                round = self.round_number + 1,
                cards = failed_indices.len(),
                "Starting retry round"
            );
            self.current_round_cards = failed_indices;
            self.current_index = 0;
            self.show_answer = false;
            self.round_number += 1;
            self.shown_at = Instant::now();
        }
        // If failed_indices is empty, session ends (is_completed() = true)
    }

    /// Grades the current card, submitting the rating at the simulated
    /// current date with the time since the card was shown.
    pub fn grade_current_card(&mut self, rating: Rating) -> Result<()> {
        let Some(&actual_idx) = self.current_round_cards.get(self.current_index) else {
            return Ok(());
        };
        let Some(card_id) = self.all_cards.get(actual_idx).map(|(_, s)| s.card_id) else {
            return Ok(());
        };

        let response_time_ms = self.shown_at.elapsed().as_millis().min(u32::MAX as u128) as u32;
        let submission = ReviewSubmission::new(self.user_id.clone(), card_id, rating.value())
            .with_response_time(response_time_ms)
            .in_session(self.study_session.id)
            .with_submission_id(format!(
                "{}-{}-{}",
                self.study_session.id, self.round_number, card_id
            ));

        let outcome = {
            let conn = lock(&self.conn)?;
            let now = db::get_current_date(&conn)?;
            db::submit_review(
                &submission,
                now,
                &self.config.scheduler(),
                self.config.max_conflict_retries,
                &conn,
            )?
        };

        if !outcome.duplicate {
            self.cards_studied += 1;
            if rating.is_pass() {
                self.cards_correct += 1;
            }
        }

        if let Some((card, state)) = self.all_cards.get_mut(actual_idx) {
            card.record(rating);
            *state = outcome.state;
        }
        Ok(())
    }

    /// Closes the study session once; later calls return `None`.
    pub fn finish(&mut self) -> Result<Option<StudySession>> {
        if self.finished {
            return Ok(None);
        }
        let ended = {
            let conn = lock(&self.conn)?;
            db::end_study_session(
                self.study_session.id,
                &self.user_id,
                self.cards_studied,
                self.cards_correct,
                Utc::now(),
                &conn,
            )?
        };
        self.finished = true;
        self.study_session = ended.clone();
        Ok(Some(ended))
    }

    pub fn learned_count(&self) -> usize {
        self.current_round_cards
            .iter()
            .filter(|&&idx| {
                self.all_cards
                    .get(idx)
                    .map(|(card, _)| card.is_learned)
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.current_round_cards.len()
    }

    pub fn remaining_count(&self) -> usize {
        self.total_count() - self.learned_count()
    }

    pub fn cards_studied(&self) -> u32 {
        self.cards_studied
    }

    pub fn cards_correct(&self) -> u32 {
        self.cards_correct
    }

    /// Returns true when all cards have been recalled or current round is empty.
    pub fn is_completed(&self) -> bool {
        self.current_round_cards.is_empty() || self.learned_count() == self.total_count()
    }

    pub fn phase_message(&self) -> String {
        if self.round_number == 1 {
            format!("Round {}: {} cards", self.round_number, self.total_count())
        } else {
            format!(
                "Round {} (Review): {} cards to retry",
                self.round_number,
                self.total_count()
            )
        }
    }
}
