//! Six-point SM-2 recall quality scale.

use crate::error::{Result, SrsError};
use serde::{Deserialize, Serialize};

/// Lowest rating that counts as a successful recall.
pub const PASSING_RATING: u8 = 3;

/// Recall quality from 0 (total blackout) to 5 (perfect recall).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const BLACKOUT: Rating = Rating(0);
    pub const WRONG: Rating = Rating(1);
    pub const FAMILIAR: Rating = Rating(2);
    pub const DIFFICULT: Rating = Rating(3);
    pub const CORRECT: Rating = Rating(4);
    pub const PERFECT: Rating = Rating(5);

    pub const ALL: [Rating; 6] = [
        Rating::BLACKOUT,
        Rating::WRONG,
        Rating::FAMILIAR,
        Rating::DIFFICULT,
        Rating::CORRECT,
        Rating::PERFECT,
    ];

    pub fn new(value: u8) -> Result<Self> {
        if value <= 5 {
            Ok(Rating(value))
        } else {
            Err(SrsError::InvalidRating(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_pass(self) -> bool {
        self.0 >= PASSING_RATING
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Blackout",
            1 => "Wrong",
            2 => "Wrong (familiar)",
            3 => "Difficult",
            4 => "Correct",
            _ => "Perfect",
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = SrsError;

    fn try_from(value: u8) -> Result<Self> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_full_scale() {
        for value in 0..=5u8 {
            assert_eq!(Rating::new(value).unwrap().value(), value);
        }
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(Rating::new(6), Err(SrsError::InvalidRating(6))));
        assert!(matches!(
            Rating::try_from(255),
            Err(SrsError::InvalidRating(255))
        ));
    }

    #[test]
    fn test_pass_threshold() {
        assert!(!Rating::FAMILIAR.is_pass());
        assert!(Rating::DIFFICULT.is_pass());
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }
}
