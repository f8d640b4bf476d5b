//! Room codes - short human-typeable session identifiers.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROOM_CODE_MIN_LEN: usize = 4;
pub const ROOM_CODE_MAX_LEN: usize = 6;
/// Generated length. Parsing accepts the full 4-6 range.
pub const ROOM_CODE_LEN: usize = 5;
/// Uppercase alphanumerics minus the lookalikes O/0 and I/1.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomCodeError {
    #[error("room code must be {min}-{max} chars, got {found}")]
    InvalidLength {
        min: usize,
        max: usize,
        found: usize,
    },
    #[error("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

/// A validated, upper-cased room code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validate and normalize a typed code. Lowercase input is accepted
    /// and upper-cased; anything non-alphanumeric is rejected.
    pub fn parse(value: &str) -> Result<Self, RoomCodeError> {
        let trimmed = value.trim();
        let len = trimmed.chars().count();
        if !(ROOM_CODE_MIN_LEN..=ROOM_CODE_MAX_LEN).contains(&len) {
            return Err(RoomCodeError::InvalidLength {
                min: ROOM_CODE_MIN_LEN,
                max: ROOM_CODE_MAX_LEN,
                found: len,
            });
        }
        for (index, ch) in trimmed.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(RoomCodeError::InvalidCharacter { ch, index });
            }
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Draw a fresh code from the unambiguous alphabet. Uniqueness is the
    /// store's concern (retry on collision at creation).
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let alphabet: Vec<char> = ROOM_CODE_ALPHABET.chars().collect();
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}
