//! Database operations for the review application
//!
//! Handles SQLite database initialization, CRUD operations for decks and cards,
//! per-user scheduling state, review logs, study sessions and statistics.

use super::store::{
    REVIEW_COLUMNS, STATE_COLUMNS, StateStore, from_timestamp, is_unique_violation,
    row_to_review_log, row_to_versioned_state, to_timestamp,
};
use crate::error::{Result, SrsError};
use crate::models::due::{select_due, upcoming};
use crate::models::sm2::SchedulerParams;
use crate::models::stats::{CardStats, UserStats};
use crate::models::study_session::focus_score;
use crate::models::{
    CompletionState, Deck, DeckSet, Flashcard, ReviewLog, ReviewState, ReviewSubmission,
    StudySession,
};
use crate::review::{ReviewOutcome, apply_submission, retry_on_conflict};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Opens (or creates) the database file and makes sure the schema exists.
pub fn init_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    init_schema(&conn, Utc::now())?;
    info!(path = %path.display(), "Database ready");
    Ok(conn)
}

/// Creates tables for decks, cards, per-user review state, review logs,
/// study sessions and app state. Sets the current date to `now` if not
/// already initialized.
pub fn init_schema(conn: &Connection, now: DateTime<Utc>) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS decks (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deck_name TEXT NOT NULL,
            front TEXT NOT NULL,
            back TEXT NOT NULL,
            explanation TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            archived_at INTEGER,
            FOREIGN KEY (deck_name) REFERENCES decks(name),
            UNIQUE(deck_name, front)
        );

        CREATE TABLE IF NOT EXISTS user_cards (
            user_id TEXT NOT NULL,
            card_id INTEGER NOT NULL,
            ease_factor REAL NOT NULL DEFAULT 2.5,
            interval_days INTEGER NOT NULL DEFAULT 0,
            repetitions INTEGER NOT NULL DEFAULT 0,
            last_reviewed_at INTEGER,
            next_review_at INTEGER NOT NULL,
            total_reviews INTEGER NOT NULL DEFAULT 0,
            correct_reviews INTEGER NOT NULL DEFAULT 0,
            mastery_level INTEGER NOT NULL DEFAULT 0,
            average_response_time_ms INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, card_id),
            FOREIGN KEY (card_id) REFERENCES cards(id)
        );

        CREATE INDEX IF NOT EXISTS idx_user_cards_next_review
            ON user_cards(user_id, next_review_at);

        CREATE TABLE IF NOT EXISTS reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            card_id INTEGER NOT NULL,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 0 AND 5),
            response_time_ms INTEGER NOT NULL DEFAULT 0,
            session_id INTEGER,
            submission_id TEXT,
            reviewed_at INTEGER NOT NULL,
            UNIQUE(user_id, submission_id),
            FOREIGN KEY (card_id) REFERENCES cards(id),
            FOREIGN KEY (session_id) REFERENCES study_sessions(id)
        );

        CREATE INDEX IF NOT EXISTS idx_reviews_user_card
            ON reviews(user_id, card_id, reviewed_at);

        CREATE TABLE IF NOT EXISTS study_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            cards_studied INTEGER NOT NULL DEFAULT 0,
            cards_correct INTEGER NOT NULL DEFAULT 0,
            total_time_seconds INTEGER NOT NULL DEFAULT 0,
            focus_score INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO app_state (key, value) VALUES ('current_date', ?1)",
        params![to_timestamp(now).to_string()],
    )?;

    Ok(())
}

/// Retrieves current simulated date from database
pub fn get_current_date(conn: &Connection) -> Result<DateTime<Utc>> {
    let timestamp: String = conn.query_row(
        "SELECT value FROM app_state WHERE key = 'current_date'",
        [],
        |row| row.get(0),
    )?;

    let secs = timestamp
        .parse::<i64>()
        .map_err(|e| SrsError::Schema(format!("current_date '{}': {}", timestamp, e)))?;
    Ok(from_timestamp(secs, 0)?)
}

/// Advances current date by 24 hours (for testing spaced repetition)
pub fn advance_day(conn: &Connection) -> Result<DateTime<Utc>> {
    let next_day = get_current_date(conn)? + Duration::days(1);

    conn.execute(
        "UPDATE app_state SET value = ?1 WHERE key = 'current_date'",
        params![to_timestamp(next_day).to_string()],
    )?;

    debug!(date = %next_day, "Advanced simulated date");
    Ok(next_day)
}

/// Creates a new deck in the database
pub fn new_deck(name: &str, conn: &Connection) -> Result<()> {
    conn.execute("INSERT INTO decks (name) VALUES (?1)", params![name])?;
    info!(deck = name, "Deck created");
    Ok(())
}

/// Adds a card to a deck and returns its ID.
///
/// If a card with the same front already exists in the deck it is kept and
/// its ID returned, due to the UNIQUE constraint.
pub fn add_card(deck_name: &str, card: &Flashcard, conn: &Connection) -> Result<i64> {
    let tags = serde_json::to_string(&card.tags)?;
    let now = get_current_date(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO cards (deck_name, front, back, explanation, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            deck_name,
            card.front,
            card.back,
            card.explanation,
            tags,
            to_timestamp(now)
        ],
    )?;

    let card_id: i64 = conn.query_row(
        "SELECT id FROM cards WHERE deck_name = ?1 AND front = ?2",
        params![deck_name, card.front],
        |row| row.get(0),
    )?;

    Ok(card_id)
}

/// Assigns a card to a user, creating its review state with defaults.
/// Assigning twice keeps the existing state.
pub fn assign_card(user_id: &str, card_id: i64, conn: &Connection) -> Result<()> {
    let state = ReviewState::new(card_id, get_current_date(conn)?);

    conn.execute(
        "INSERT OR IGNORE INTO user_cards
            (user_id, card_id, ease_factor, interval_days, repetitions, next_review_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            card_id,
            state.ease_factor,
            state.interval_days,
            state.repetitions,
            to_timestamp(state.next_review_at)
        ],
    )?;

    Ok(())
}

/// Creates a deck with all its cards and assigns them to `user_id`.
///
/// Returns the number of distinct cards the deck holds for these fronts;
/// repeated fronts collapse into one card.
pub fn add_deck(deck: &Deck, user_id: &str, conn: &Connection) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    new_deck(&deck.name, &tx)?;
    let mut card_ids = HashSet::new();
    for card in &deck.flashcards {
        let card_id = add_card(&deck.name, card, &tx)?;
        assign_card(user_id, card_id, &tx)?;
        card_ids.insert(card_id);
    }
    tx.commit()?;

    info!(deck = %deck.name, cards = card_ids.len(), "Deck stored");
    Ok(card_ids.len())
}

/// Replaces the content of an active card. Review state is untouched.
///
/// Renaming the front to one another card of the deck already uses fails
/// with [`SrsError::DuplicateCard`].
pub fn update_card(card_id: i64, card: &Flashcard, conn: &Connection) -> Result<()> {
    let tags = serde_json::to_string(&card.tags)?;
    let updated = conn.execute(
        "UPDATE cards SET front = ?1, back = ?2, explanation = ?3, tags = ?4
         WHERE id = ?5 AND archived_at IS NULL",
        params![card.front, card.back, card.explanation, tags, card_id],
    );

    match updated {
        Ok(0) => Err(SrsError::NotFound(format!("active card {}", card_id))),
        Ok(_) => {
            debug!(card_id, "Card updated");
            Ok(())
        }
        Err(e) if is_unique_violation(&e) => {
            let deck_name: String = conn.query_row(
                "SELECT deck_name FROM cards WHERE id = ?1",
                params![card_id],
                |row| row.get(0),
            )?;
            Err(SrsError::DuplicateCard {
                deck_name,
                front: card.front.clone(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Soft-deletes a card: it leaves the review queue but keeps its history.
pub fn archive_card(card_id: i64, conn: &Connection) -> Result<()> {
    let now = get_current_date(conn)?;
    let updated = conn.execute(
        "UPDATE cards SET archived_at = ?1 WHERE id = ?2 AND archived_at IS NULL",
        params![to_timestamp(now), card_id],
    )?;
    if updated == 0 {
        return Err(SrsError::NotFound(format!("active card {}", card_id)));
    }
    info!(card_id, "Card archived");
    Ok(())
}

fn row_to_flashcard(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Flashcard> {
    let tags: String = row.get(offset + 3)?;
    let tags = serde_json::from_str(&tags).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 3,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;
    Ok(Flashcard {
        front: row.get(offset)?,
        back: row.get(offset + 1)?,
        explanation: row.get(offset + 2)?,
        tags,
    })
}

/// Retrieves a single card by ID, archived or not.
pub fn get_card(card_id: i64, conn: &Connection) -> Result<Flashcard> {
    conn.query_row(
        "SELECT front, back, explanation, tags FROM cards WHERE id = ?1",
        params![card_id],
        |row| row_to_flashcard(row, 0),
    )
    .optional()?
    .ok_or_else(|| SrsError::NotFound(format!("card {}", card_id)))
}

/// Retrieves all active cards for a given deck
///
/// Returns vector of (card_id, Flashcard) tuples
pub fn get_cards_for_deck(deck_name: &str, conn: &Connection) -> Result<Vec<(i64, Flashcard)>> {
    let mut stmt = conn.prepare(
        "SELECT id, front, back, explanation, tags FROM cards
         WHERE deck_name = ?1 AND archived_at IS NULL
         ORDER BY id",
    )?;

    let cards = stmt
        .query_map(params![deck_name], |row| {
            Ok((row.get(0)?, row_to_flashcard(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<(i64, Flashcard)>>>()?;

    Ok(cards)
}

/// Review states of a user's active cards in one deck.
pub fn list_states_for_deck(
    user_id: &str,
    deck_name: &str,
    conn: &Connection,
) -> Result<Vec<ReviewState>> {
    let sql = format!(
        "SELECT {STATE_COLUMNS}
         FROM user_cards uc
         JOIN cards c ON c.id = uc.card_id
         WHERE uc.user_id = ?1 AND c.deck_name = ?2 AND c.archived_at IS NULL
         ORDER BY uc.card_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let states = stmt
        .query_map(params![user_id, deck_name], |row| {
            row_to_versioned_state(row).map(|v| v.state)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(states)
}

/// Retrieves cards due for review at `now`, optionally restricted to a deck.
///
/// Ordering and truncation follow [`select_due`]: most overdue first, harder
/// cards first among equally overdue ones.
pub fn get_due_cards(
    user_id: &str,
    deck_name: Option<&str>,
    now: DateTime<Utc>,
    limit: Option<usize>,
    conn: &Connection,
) -> Result<Vec<(Flashcard, ReviewState)>> {
    let states = match deck_name {
        Some(deck) => list_states_for_deck(user_id, deck, conn)?,
        None => conn.list_states_for_user(user_id)?,
    };

    select_due(&states, now, limit)
        .into_iter()
        .map(|state| Ok((get_card(state.card_id, conn)?, state)))
        .collect()
}

/// Number of cards becoming due on each of the next `days` days.
pub fn upcoming_reviews(
    user_id: &str,
    now: DateTime<Utc>,
    days: u32,
    conn: &Connection,
) -> Result<BTreeMap<NaiveDate, usize>> {
    let states = conn.list_states_for_user(user_id)?;
    Ok(upcoming(&states, now, days)
        .into_iter()
        .map(|(day, cards)| (day, cards.len()))
        .collect())
}

/// Applies a rating submission with at-most-one-writer semantics.
///
/// Every attempt runs in an immediate transaction; a version conflict rolls
/// the attempt back and re-runs it against freshly read state.
pub fn submit_review(
    submission: &ReviewSubmission,
    now: DateTime<Utc>,
    params: &SchedulerParams,
    max_retries: u32,
    conn: &Connection,
) -> Result<ReviewOutcome> {
    let outcome = retry_on_conflict(max_retries, |_| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let outcome = apply_submission(&*tx, submission, now, params)?;
        tx.commit()?;
        Ok(outcome)
    })?;

    info!(
        user_id = %submission.user_id,
        card_id = submission.card_id,
        rating = submission.rating,
        interval_days = outcome.state.interval_days,
        mastery = outcome.state.mastery_level,
        duplicate = outcome.duplicate,
        "Review applied"
    );
    Ok(outcome)
}

/// Opens a new study session at `now`.
pub fn start_study_session(
    user_id: &str,
    now: DateTime<Utc>,
    conn: &Connection,
) -> Result<StudySession> {
    conn.execute(
        "INSERT INTO study_sessions (user_id, started_at) VALUES (?1, ?2)",
        params![user_id, to_timestamp(now)],
    )?;
    let id = conn.last_insert_rowid();
    debug!(user_id, session_id = id, "Study session started");

    Ok(StudySession {
        id,
        user_id: user_id.to_string(),
        started_at: now,
        ended_at: None,
        cards_studied: 0,
        cards_correct: 0,
        total_time_seconds: 0,
        focus_score: 0,
    })
}

fn row_to_study_session(row: &rusqlite::Row) -> rusqlite::Result<StudySession> {
    let ended_at = match row.get::<_, Option<i64>>(3)? {
        Some(secs) => Some(from_timestamp(secs, 3)?),
        None => None,
    };
    Ok(StudySession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        started_at: from_timestamp(row.get(2)?, 2)?,
        ended_at,
        cards_studied: row.get(4)?,
        cards_correct: row.get(5)?,
        total_time_seconds: row.get::<_, i64>(6)?.max(0) as u64,
        focus_score: row.get(7)?,
    })
}

pub fn get_study_session(session_id: i64, user_id: &str, conn: &Connection) -> Result<StudySession> {
    conn.query_row(
        "SELECT id, user_id, started_at, ended_at, cards_studied, cards_correct,
                total_time_seconds, focus_score
         FROM study_sessions WHERE id = ?1 AND user_id = ?2",
        params![session_id, user_id],
        row_to_study_session,
    )
    .optional()?
    .ok_or_else(|| SrsError::NotFound(format!("study session {}", session_id)))
}

/// Closes a study session, recording its counts, duration and focus score.
pub fn end_study_session(
    session_id: i64,
    user_id: &str,
    cards_studied: u32,
    cards_correct: u32,
    now: DateTime<Utc>,
    conn: &Connection,
) -> Result<StudySession> {
    let session = get_study_session(session_id, user_id, conn)?;
    let total_time_seconds = (now - session.started_at).num_seconds().max(0) as u64;
    let score = focus_score(total_time_seconds, cards_studied);

    conn.execute(
        "UPDATE study_sessions
         SET ended_at = ?1, cards_studied = ?2, cards_correct = ?3,
             total_time_seconds = ?4, focus_score = ?5
         WHERE id = ?6",
        params![
            to_timestamp(now),
            cards_studied,
            cards_correct,
            total_time_seconds as i64,
            score,
            session_id
        ],
    )?;

    info!(
        session_id,
        cards_studied, cards_correct, total_time_seconds, focus_score = score, "Study session ended"
    );
    get_study_session(session_id, user_id, conn)
}

/// Most recent reviews of a card, newest first.
pub fn card_review_history(
    user_id: &str,
    card_id: i64,
    limit: usize,
    conn: &Connection,
) -> Result<Vec<ReviewLog>> {
    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews
         WHERE user_id = ?1 AND card_id = ?2
         ORDER BY reviewed_at DESC, id DESC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map(params![user_id, card_id, limit as i64], row_to_review_log)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// Mean response time over all reviews of a card, in milliseconds.
pub fn average_response_time(user_id: &str, card_id: i64, conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT average_response_time_ms FROM user_cards WHERE user_id = ?1 AND card_id = ?2",
        params![user_id, card_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| SrsError::CardNotAssigned {
        user_id: user_id.to_string(),
        card_id,
    })
}

/// Where the user stands at `now`: new, cards due, done for today or idle.
///
/// "Today" is the UTC calendar day of `now`.
pub fn completion_state(
    user_id: &str,
    now: DateTime<Utc>,
    conn: &Connection,
) -> Result<CompletionState> {
    let states = conn.list_states_for_user(user_id)?;
    let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();

    let reviews_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE user_id = ?1 AND reviewed_at >= ?2",
        params![user_id, to_timestamp(start_of_day)],
        |row| row.get(0),
    )?;

    Ok(CompletionState::compute(
        &states,
        reviews_today.max(0) as usize,
        now,
    ))
}

pub fn card_stats(user_id: &str, now: DateTime<Utc>, conn: &Connection) -> Result<CardStats> {
    let states = conn.list_states_for_user(user_id)?;
    Ok(CardStats::from_states(&states, now))
}

/// Aggregates a user's statistics from review logs and finished sessions.
pub fn user_stats(user_id: &str, today: NaiveDate, conn: &Connection) -> Result<UserStats> {
    let states = conn.list_states_for_user(user_id)?;

    let (total_reviews, correct_reviews): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN rating >= 3 THEN 1 ELSE 0 END), 0)
         FROM reviews WHERE user_id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let study_seconds: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total_time_seconds), 0) FROM study_sessions
         WHERE user_id = ?1 AND ended_at IS NOT NULL",
        params![user_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare("SELECT reviewed_at FROM reviews WHERE user_id = ?1")?;
    let study_days = stmt
        .query_map(params![user_id], |row| from_timestamp(row.get(0)?, 0))?
        .map(|r| r.map(|t| t.date_naive()))
        .collect::<rusqlite::Result<Vec<NaiveDate>>>()?;

    Ok(UserStats::compute(
        &states,
        total_reviews.max(0) as u64,
        correct_reviews.max(0) as u64,
        study_seconds.max(0) as u64,
        &study_days,
        today,
    ))
}

/// Retrieves all deck names from database
pub fn get_all_decks(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM decks ORDER BY name")?;
    let decks = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(decks)
}

/// Loads all decks with their active cards into memory
///
/// Does not load review state - that's fetched per user when starting a session.
pub fn load_all_decks(conn: &Connection) -> Result<DeckSet> {
    let mut decks = Vec::new();

    for deck_name in get_all_decks(conn)? {
        let flashcards = get_cards_for_deck(&deck_name, conn)?
            .into_iter()
            .map(|(_, card)| card)
            .collect();

        decks.push(Deck {
            name: deck_name,
            flashcards,
        });
    }

    Ok(DeckSet { decks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;
    use crate::models::review_log::DEFAULT_HISTORY_LIMIT;
    use chrono::TimeZone;

    const USER: &str = "ada";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn, t0()).unwrap();
        conn
    }

    fn polish_deck() -> Deck {
        Deck {
            name: "Polish Vocabulary".to_string(),
            flashcards: vec![
                Flashcard::new("cześć", "hello"),
                Flashcard::new("dziękuję", "thank you").with_tags(["polite"]),
                Flashcard::new("proszę", "please").with_explanation("also: you're welcome"),
            ],
        }
    }

    fn seeded() -> (Connection, Vec<i64>) {
        let conn = setup();
        add_deck(&polish_deck(), USER, &conn).unwrap();
        let ids = get_cards_for_deck("Polish Vocabulary", &conn)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        (conn, ids)
    }

    fn review(conn: &Connection, card_id: i64, rating: u8, now: DateTime<Utc>) -> ReviewOutcome {
        submit_review(
            &ReviewSubmission::new(USER, card_id, rating),
            now,
            &SchedulerParams::default(),
            3,
            conn,
        )
        .unwrap()
    }

    #[test]
    fn test_current_date_and_advance() {
        let conn = setup();
        assert_eq!(get_current_date(&conn).unwrap(), t0());

        let next = advance_day(&conn).unwrap();
        assert_eq!(next, t0() + Duration::days(1));
        assert_eq!(get_current_date(&conn).unwrap(), next);

        // Re-running the schema keeps the stored date
        init_schema(&conn, t0() + Duration::days(30)).unwrap();
        assert_eq!(get_current_date(&conn).unwrap(), next);
    }

    #[test]
    fn test_add_deck_assigns_default_state() {
        let (conn, ids) = seeded();
        assert_eq!(ids.len(), 3);

        let loaded = conn.load_state(USER, ids[0]).unwrap();
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.state, ReviewState::new(ids[0], t0()));
    }

    #[test]
    fn test_card_fields_roundtrip() {
        let (conn, ids) = seeded();
        let card = get_card(ids[2], &conn).unwrap();
        assert_eq!(card.explanation.as_deref(), Some("also: you're welcome"));
        assert_eq!(get_card(ids[1], &conn).unwrap().tags, vec!["polite".to_string()]);
        assert!(matches!(get_card(999, &conn), Err(SrsError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_front_is_ignored() {
        let (conn, ids) = seeded();
        let again = add_card("Polish Vocabulary", &Flashcard::new("cześć", "hi"), &conn).unwrap();
        assert_eq!(again, ids[0]);
        assert_eq!(get_cards_for_deck("Polish Vocabulary", &conn).unwrap().len(), 3);
    }

    #[test]
    fn test_add_deck_counts_distinct_cards() {
        let conn = setup();
        let deck = Deck {
            name: "Repeats".to_string(),
            flashcards: vec![
                Flashcard::new("kot", "cat"),
                Flashcard::new("kot", "cat again"),
                Flashcard::new("pies", "dog"),
            ],
        };
        assert_eq!(add_deck(&deck, USER, &conn).unwrap(), 2);
        assert_eq!(get_cards_for_deck("Repeats", &conn).unwrap().len(), 2);
    }

    #[test]
    fn test_update_card() {
        let (conn, ids) = seeded();
        review(&conn, ids[0], 4, t0());

        let edited = Flashcard::new("cześć!", "hi").with_tags(["greeting"]);
        update_card(ids[0], &edited, &conn).unwrap();
        assert_eq!(get_card(ids[0], &conn).unwrap(), edited);
        // Scheduling survives an edit
        assert_eq!(conn.load_state(USER, ids[0]).unwrap().state.total_reviews, 1);
    }

    #[test]
    fn test_update_card_keeps_fronts_unique() {
        let (conn, ids) = seeded();
        let clash = Flashcard::new("dziękuję", "thanks");
        assert!(matches!(
            update_card(ids[0], &clash, &conn),
            Err(SrsError::DuplicateCard { ref front, .. }) if front == "dziękuję"
        ));
        assert_eq!(get_card(ids[0], &conn).unwrap().front, "cześć");

        // Same front in another deck is fine
        new_deck("Other", &conn).unwrap();
        let other = add_card("Other", &Flashcard::new("x", "y"), &conn).unwrap();
        update_card(other, &clash, &conn).unwrap();
    }

    #[test]
    fn test_update_missing_or_archived_card() {
        let (conn, ids) = seeded();
        let card = Flashcard::new("nowy", "new");
        assert!(matches!(update_card(999, &card, &conn), Err(SrsError::NotFound(_))));

        archive_card(ids[2], &conn).unwrap();
        assert!(matches!(update_card(ids[2], &card, &conn), Err(SrsError::NotFound(_))));
    }

    #[test]
    fn test_load_missing_state() {
        let conn = setup();
        assert!(matches!(
            conn.load_state(USER, 42),
            Err(SrsError::CardNotAssigned { card_id: 42, .. })
        ));
    }

    #[test]
    fn test_save_with_stale_version_conflicts() {
        let (conn, ids) = seeded();
        let loaded = conn.load_state(USER, ids[0]).unwrap();

        let v1 = conn.save_state(USER, ids[0], &loaded.state, loaded.version).unwrap();
        assert_eq!(v1, 1);

        let stale = conn.save_state(USER, ids[0], &loaded.state, loaded.version);
        assert!(matches!(stale, Err(SrsError::ConcurrentUpdateConflict { .. })));
    }

    #[test]
    fn test_review_flow_follows_sm2() {
        let (conn, ids) = seeded();

        let first = review(&conn, ids[0], 4, t0());
        assert_eq!(first.state.interval_days, 1);
        assert_eq!(first.version, 1);

        let second = review(&conn, ids[0], 4, t0() + Duration::days(1));
        assert_eq!(second.state.interval_days, 6);
        assert_eq!(second.state.next_review_at, t0() + Duration::days(7));

        let stored = conn.load_state(USER, ids[0]).unwrap();
        assert_eq!(stored.state, second.state);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_invalid_rating_leaves_state_untouched() {
        let (conn, ids) = seeded();
        let result = submit_review(
            &ReviewSubmission::new(USER, ids[0], 8),
            t0(),
            &SchedulerParams::default(),
            3,
            &conn,
        );
        assert!(matches!(result, Err(SrsError::InvalidRating(8))));
        assert_eq!(conn.load_state(USER, ids[0]).unwrap().version, 0);
    }

    #[test]
    fn test_replayed_submission_applies_once() {
        let (conn, ids) = seeded();
        let submission = ReviewSubmission::new(USER, ids[1], 5)
            .with_response_time(1_200)
            .with_submission_id("tab-1/42");

        let params = SchedulerParams::default();
        let first = submit_review(&submission, t0(), &params, 3, &conn).unwrap();
        let replay = submit_review(&submission, t0(), &params, 3, &conn).unwrap();

        assert!(!first.duplicate);
        assert!(replay.duplicate);
        assert_eq!(replay.log.id, first.log.id);
        assert_eq!(conn.load_state(USER, ids[1]).unwrap().state.total_reviews, 1);
        assert_eq!(card_review_history(USER, ids[1], DEFAULT_HISTORY_LIMIT, &conn).unwrap().len(), 1);
    }

    #[test]
    fn test_submission_ids_are_scoped_per_user() {
        let (conn, ids) = seeded();
        assign_card("grace", ids[0], &conn).unwrap();
        let params = SchedulerParams::default();

        let ada = ReviewSubmission::new(USER, ids[0], 5).with_submission_id("1-1-1");
        let grace = ReviewSubmission::new("grace", ids[0], 0).with_submission_id("1-1-1");
        let first = submit_review(&ada, t0(), &params, 3, &conn).unwrap();
        let second = submit_review(&grace, t0(), &params, 3, &conn).unwrap();

        assert!(!second.duplicate);
        assert_ne!(second.log.id, first.log.id);
        let state = conn.load_state("grace", ids[0]).unwrap().state;
        assert_eq!(state.total_reviews, 1);
        assert_eq!(state.correct_reviews, 0);
        assert_eq!(conn.load_state(USER, ids[0]).unwrap().state.correct_reviews, 1);
    }

    #[test]
    fn test_average_response_time() {
        let (conn, ids) = seeded();
        assert_eq!(average_response_time(USER, ids[0], &conn).unwrap(), 0);

        let params = SchedulerParams::default();
        for (day, ms) in [(0, 3_000), (1, 1_000), (7, 2_600)] {
            let submission = ReviewSubmission::new(USER, ids[0], 4).with_response_time(ms);
            submit_review(&submission, t0() + Duration::days(day), &params, 3, &conn).unwrap();
        }
        assert_eq!(average_response_time(USER, ids[0], &conn).unwrap(), 2_200);

        // A replay does not count twice
        let replayed = ReviewSubmission::new(USER, ids[1], 4)
            .with_response_time(900)
            .with_submission_id("once");
        submit_review(&replayed, t0(), &params, 3, &conn).unwrap();
        submit_review(&replayed, t0(), &params, 3, &conn).unwrap();
        assert_eq!(average_response_time(USER, ids[1], &conn).unwrap(), 900);

        assert!(matches!(
            average_response_time("grace", ids[0], &conn),
            Err(SrsError::CardNotAssigned { .. })
        ));
    }

    #[test]
    fn test_completion_state() {
        let conn = setup();
        assert_eq!(completion_state(USER, t0(), &conn).unwrap(), CompletionState::NewUser);

        let (conn, ids) = seeded();
        assert_eq!(
            completion_state(USER, t0(), &conn).unwrap(),
            CompletionState::HasDueCards {
                due_cards: 3,
                completed_today: false
            }
        );

        for id in &ids {
            review(&conn, *id, 4, t0());
        }
        let tomorrow = t0() + Duration::days(1);
        assert_eq!(
            completion_state(USER, t0() + Duration::hours(2), &conn).unwrap(),
            CompletionState::CompletedToday {
                next_review_at: Some(tomorrow)
            }
        );
        // Next morning, before the cards come due at 08:00
        assert_eq!(
            completion_state(USER, tomorrow - Duration::hours(1), &conn).unwrap(),
            CompletionState::NoCardsDue {
                next_review_at: Some(tomorrow)
            }
        );
    }

    #[test]
    fn test_due_cards_ordering_and_limit() {
        let (conn, ids) = seeded();
        // Card 0 reviewed well, card 1 lapsed: both due again in a day,
        // the lapsed one has the lower ease factor and comes first.
        review(&conn, ids[0], 4, t0());
        review(&conn, ids[1], 1, t0());

        let tomorrow = t0() + Duration::days(1);
        let due = get_due_cards(USER, Some("Polish Vocabulary"), tomorrow, None, &conn).unwrap();
        let order: Vec<i64> = due.iter().map(|(_, s)| s.card_id).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

        let limited = get_due_cards(USER, None, tomorrow, Some(1), &conn).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].0.front, "proszę");

        let today = get_due_cards(USER, None, t0(), None, &conn).unwrap();
        assert_eq!(today.len(), 1);
    }

    #[test]
    fn test_upcoming_reviews_by_day() {
        let (conn, ids) = seeded();
        review(&conn, ids[0], 4, t0());
        review(&conn, ids[1], 5, t0());
        let second = review(&conn, ids[1], 5, t0() + Duration::days(1));
        assert_eq!(second.state.interval_days, 6);

        let forecast = upcoming_reviews(USER, t0() + Duration::days(1), 7, &conn).unwrap();
        // ids[0] is due exactly now, so only ids[1] is upcoming
        let expected: BTreeMap<NaiveDate, usize> =
            [((t0() + Duration::days(7)).date_naive(), 1)].into_iter().collect();
        assert_eq!(forecast, expected);
    }

    #[test]
    fn test_archived_cards_leave_queue_but_keep_history() {
        let (conn, ids) = seeded();
        review(&conn, ids[0], 2, t0());

        archive_card(ids[0], &conn).unwrap();
        let due = get_due_cards(USER, None, t0() + Duration::days(2), None, &conn).unwrap();
        assert!(due.iter().all(|(_, s)| s.card_id != ids[0]));
        assert_eq!(card_review_history(USER, ids[0], DEFAULT_HISTORY_LIMIT, &conn).unwrap().len(), 1);
        assert_eq!(conn.load_state(USER, ids[0]).unwrap().state.total_reviews, 1);

        assert!(matches!(archive_card(ids[0], &conn), Err(SrsError::NotFound(_))));
    }

    #[test]
    fn test_history_newest_first() {
        let (conn, ids) = seeded();
        review(&conn, ids[0], 3, t0());
        review(&conn, ids[0], 5, t0() + Duration::days(1));
        review(&conn, ids[0], 0, t0() + Duration::days(7));

        let history = card_review_history(USER, ids[0], 2, &conn).unwrap();
        let ratings: Vec<Rating> = history.iter().map(|l| l.rating).collect();
        assert_eq!(ratings, vec![Rating::BLACKOUT, Rating::PERFECT]);
    }

    #[test]
    fn test_study_session_lifecycle() {
        let conn = setup();
        let session = start_study_session(USER, t0(), &conn).unwrap();
        assert!(session.is_open());

        let ended = end_study_session(session.id, USER, 10, 8, t0() + Duration::minutes(5), &conn).unwrap();
        assert!(!ended.is_open());
        assert_eq!(ended.total_time_seconds, 300);
        assert_eq!(ended.focus_score, 100);
        assert_eq!(ended.cards_correct, 8);

        assert!(matches!(
            end_study_session(session.id, "someone-else", 1, 1, t0(), &conn),
            Err(SrsError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats() {
        let (conn, ids) = seeded();
        let session = start_study_session(USER, t0(), &conn).unwrap();
        review(&conn, ids[0], 5, t0());
        review(&conn, ids[1], 4, t0());
        review(&conn, ids[2], 1, t0());
        end_study_session(session.id, USER, 3, 2, t0() + Duration::minutes(2), &conn).unwrap();

        let cards = card_stats(USER, t0(), &conn).unwrap();
        assert_eq!(cards.total_cards, 3);
        assert_eq!(cards.due_cards, 0);
        assert_eq!(cards.difficult, 3);

        let user = user_stats(USER, t0().date_naive(), &conn).unwrap();
        assert_eq!(user.total_reviews, 3);
        assert_eq!(user.correct_reviews, 2);
        assert_eq!(user.average_accuracy, 67);
        assert_eq!(user.total_study_minutes, 2);
        assert_eq!(user.current_streak_days, 1);
    }

    #[test]
    fn test_load_all_decks() {
        let (conn, _) = seeded();
        new_deck("Empty", &conn).unwrap();

        let deck_set = load_all_decks(&conn).unwrap();
        assert_eq!(deck_set.decks.len(), 2);
        assert!(deck_set.contains("Polish Vocabulary"));
        assert_eq!(deck_set.total_cards(), 3);
    }
}
