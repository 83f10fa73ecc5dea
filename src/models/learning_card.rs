//! Wrapper for flashcards that tracks progress within one practice session.
use super::{Flashcard, Rating};

#[derive(Clone, Debug)]
pub struct LearningCard {
    pub flashcard: Flashcard,
    pub is_learned: bool,
    pub last_rating: Option<Rating>,
    pub attempts: u32,
}

impl LearningCard {
    pub fn new(flashcard: Flashcard) -> Self {
        Self {
            flashcard,
            is_learned: false,
            last_rating: None,
            attempts: 0,
        }
    }

    /// Records a rating; passing ratings mark the card learned for this session.
    pub fn record(&mut self, rating: Rating) {
        self.attempts += 1;
        self.last_rating = Some(rating);
        self.is_learned = rating.is_pass();
    }
}
