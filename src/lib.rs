pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod review;

pub use config::Config;
pub use error::{Result, SrsError};
pub use models::due::select_due;
pub use models::mastery::estimate_mastery;
pub use models::sm2::{SchedulerParams, apply_review};
pub use models::{Deck, DeckSet, Flashcard, LearningSession, Rating, ReviewState};
