//! JSON import/export module for decks.
//! Saves Deck structures to JSON files and loads them back, validating the
//! payload shape instead of trusting whatever the file contains.

use crate::error::{Result, SrsError};
use crate::models::Deck;
use std::fs;
use std::path::Path;
use tracing::info;

/// Exports a deck to a pretty-printed JSON file at the specified path.
/// Returns an error if file creation or writing fails.
pub fn export_json_to_path(deck: &Deck, path: &Path) -> Result<()> {
    let json_string = serde_json::to_string_pretty(deck)?;
    fs::write(path, json_string)?;
    info!(deck = %deck.name, path = %path.display(), "Deck exported");
    Ok(())
}

/// Parses and validates a deck from a JSON string.
pub fn parse_deck(contents: &str) -> Result<Deck> {
    let deck: Deck =
        serde_json::from_str(contents).map_err(|e| SrsError::Schema(e.to_string()))?;
    validate_deck(&deck)?;
    Ok(deck)
}

/// Imports a deck from a JSON file.
/// Returns an error if the file doesn't exist, isn't valid JSON, or doesn't
/// match the deck schema.
pub fn import_json(path: &Path) -> Result<Deck> {
    let contents = fs::read_to_string(path)?;
    let deck = parse_deck(&contents)?;

    info!(deck = %deck.name, path = %path.display(), cards = deck.flashcards.len(), "Deck imported");
    Ok(deck)
}

fn validate_deck(deck: &Deck) -> Result<()> {
    if deck.name.trim().is_empty() {
        return Err(SrsError::Schema("deck name must not be empty".to_string()));
    }
    for (i, card) in deck.flashcards.iter().enumerate() {
        if card.front.trim().is_empty() || card.back.trim().is_empty() {
            return Err(SrsError::Schema(format!(
                "card {} must have a non-empty front and back",
                i + 1
            )));
        }
    }
    Ok(())
}
