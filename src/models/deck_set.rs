//! Container for all available decks
use super::Deck;

#[derive(Clone, Debug, Default)]
pub struct DeckSet {
    pub decks: Vec<Deck>,
}

impl DeckSet {
    pub fn contains(&self, name: &str) -> bool {
        self.decks.iter().any(|d| d.name == name)
    }

    pub fn total_cards(&self) -> usize {
        self.decks.iter().map(|d| d.flashcards.len()).sum()
    }
}
