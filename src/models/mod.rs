pub mod completion;
pub mod deck;
pub mod deck_set;
pub mod due;
pub mod flashcard;
pub mod learning_card;
pub mod learning_session;
pub mod mastery;
pub mod rating;
pub mod review_log;
pub mod review_state;
pub mod sm2;
pub mod stats;
pub mod study_session;

pub use completion::CompletionState;
pub use deck::Deck;
pub use deck_set::DeckSet;
pub use flashcard::Flashcard;
pub use learning_card::LearningCard;
pub use learning_session::LearningSession;
pub use mastery::MasteryBand;
pub use rating::Rating;
pub use review_log::{ReviewLog, ReviewSubmission};
pub use review_state::{ReviewState, VersionedState};
pub use stats::{CardStats, UserStats};
pub use study_session::StudySession;
