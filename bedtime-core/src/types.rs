//! Core type definitions shared across the Bedtime crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BedtimeError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(pub Uuid);

impl EpisodeId {
    /// Create a new random episode ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EpisodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Genre
// ---------------------------------------------------------------------------

/// Story genre. The declaration order is the tie-break priority used by the
/// classifier (earlier wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    /// Quests, journeys, brave heroes.
    Adventure,
    /// Princesses, castles, magic and a happy ending.
    FairyTale,
    /// A story built around learning something.
    Educational,
    /// Relationships, cooperation, empathy.
    Friendship,
    /// Magical creatures and extraordinary worlds.
    Fantasy,
}

impl Genre {
    /// All genres in priority order.
    pub const ALL: [Genre; 5] = [
        Genre::Adventure,
        Genre::FairyTale,
        Genre::Educational,
        Genre::Friendship,
        Genre::Fantasy,
    ];

    /// Machine name (`fairy_tale`), used in prompts and config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adventure => "adventure",
            Self::FairyTale => "fairy_tale",
            Self::Educational => "educational",
            Self::Friendship => "friendship",
            Self::Fantasy => "fantasy",
        }
    }

    /// Human label (`Fairy Tale`) for the console.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Adventure => "Adventure",
            Self::FairyTale => "Fairy Tale",
            Self::Educational => "Educational",
            Self::Friendship => "Friendship",
            Self::Fantasy => "Fantasy",
        }
    }

    /// Position in the priority order (0 = highest priority).
    #[must_use]
    pub fn priority(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = BedtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "adventure" => Ok(Self::Adventure),
            "fairy_tale" | "fairytale" => Ok(Self::FairyTale),
            "educational" => Ok(Self::Educational),
            "friendship" => Ok(Self::Friendship),
            "fantasy" => Ok(Self::Fantasy),
            _ => Err(BedtimeError::UnknownGenre(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

/// A user rating on the 1-5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest valid rating.
    pub const MIN: u8 = 1;
    /// Highest valid rating.
    pub const MAX: u8 = 5;

    /// Create a rating, rejecting values outside 1-5.
    ///
    /// # Errors
    /// Returns `BedtimeError::InvalidRating` if `value` is out of range.
    pub fn new(value: u8) -> crate::error::Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(BedtimeError::InvalidRating(i64::from(value)))
        }
    }

    /// The numeric value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = BedtimeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl FromStr for Rating {
    type Err = BedtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| BedtimeError::InvalidRating(0))?;
        u8::try_from(value)
            .map_err(|_| BedtimeError::InvalidRating(value))
            .and_then(Self::new)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

// ---------------------------------------------------------------------------
// Story mode
// ---------------------------------------------------------------------------

/// Whether a cycle starts a fresh story or continues the current series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryMode {
    /// A brand new story; starts a new series.
    NewStory,
    /// The next episode of the current series, with the same characters.
    Continuation,
}

impl StoryMode {
    /// "story" or "episode", for console messages.
    #[must_use]
    pub fn noun(self) -> &'static str {
        match self {
            Self::NewStory => "story",
            Self::Continuation => "episode",
        }
    }
}
