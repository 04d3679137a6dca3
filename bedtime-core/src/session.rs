//! Session state, the single owner of everything a storytelling session
//! remembers: current genre, character table, episode history and genre
//! preference counters.
//!
//! The state is passed explicitly (`&mut SessionState`) through every step
//! of a generation cycle. It lives for the process lifetime and is never
//! persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::character::{Character, CharacterSketch};
use crate::evaluation::QualityReport;
use crate::types::{EpisodeId, Genre, Rating, StoryMode};

// ---------------------------------------------------------------------------
// Preference counters
// ---------------------------------------------------------------------------

/// Per-genre counters of positive user ratings. Never negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceCounters {
    counts: BTreeMap<Genre, u32>,
}

impl PreferenceCounters {
    /// Counter value for `genre` (0 when never touched).
    #[must_use]
    pub fn get(&self, genre: Genre) -> u32 {
        self.counts.get(&genre).copied().unwrap_or(0)
    }

    /// Add one to `genre`.
    pub fn increment(&mut self, genre: Genre) {
        let count = self.counts.entry(genre).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Subtract one from `genre`, stopping at zero.
    pub fn decrement(&mut self, genre: Genre) {
        if let Some(count) = self.counts.get_mut(&genre) {
            *count = count.saturating_sub(1);
        }
    }

    /// Genre with the highest positive counter; ties go to the genre
    /// earlier in priority order.
    #[must_use]
    pub fn preferred(&self) -> Option<Genre> {
        let mut best: Option<(Genre, u32)> = None;
        for genre in Genre::ALL {
            let count = self.get(genre);
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((genre, count));
            }
        }
        best.map(|(genre, _)| genre)
    }
}

// ---------------------------------------------------------------------------
// Episodes
// ---------------------------------------------------------------------------

/// One completed generation cycle. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique identifier.
    pub id: EpisodeId,
    /// Series this episode belongs to.
    pub series: u32,
    /// 1-based position within the series.
    pub number: u32,
    /// New story or continuation.
    pub mode: StoryMode,
    /// The user's request text.
    pub request: String,
    /// Genre the story was written in.
    pub genre: Genre,
    /// Classifier confidence for `genre`.
    pub confidence: f32,
    /// First generated text, before any refinement.
    pub draft: String,
    /// Text presented to the user (refined when the evaluator asked for it).
    pub story: String,
    /// Revision produced from user feedback, if any.
    pub revision: Option<String>,
    /// Evaluator scores for `draft`.
    pub quality: QualityReport,
    /// User rating, if given.
    pub rating: Option<Rating>,
    /// User comment; empty when none.
    pub comment: String,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// The text the user ended up with.
    #[must_use]
    pub fn final_text(&self) -> &str {
        self.revision.as_deref().unwrap_or(&self.story)
    }

    /// Whether the evaluator's refinement changed the draft.
    #[must_use]
    pub fn was_refined(&self) -> bool {
        self.story != self.draft
    }
}

/// The content of an episode, before the session assigns identity and
/// position.
#[derive(Debug, Clone)]
pub struct EpisodeRecord {
    /// New story or continuation.
    pub mode: StoryMode,
    /// The user's request text.
    pub request: String,
    /// Genre the story was written in.
    pub genre: Genre,
    /// Classifier confidence.
    pub confidence: f32,
    /// First generated text.
    pub draft: String,
    /// Presented text.
    pub story: String,
    /// Feedback revision, if any.
    pub revision: Option<String>,
    /// Evaluator scores.
    pub quality: QualityReport,
    /// User rating.
    pub rating: Option<Rating>,
    /// User comment.
    pub comment: String,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything one interactive session remembers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    genre: Option<Genre>,
    characters: BTreeMap<String, Character>,
    episodes: Vec<Episode>,
    preferences: PreferenceCounters,
    series: u32,
}

impl SessionState {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Genre of the current story, if one has been told.
    #[must_use]
    pub fn genre(&self) -> Option<Genre> {
        self.genre
    }

    /// Current series number (0 before the first story).
    #[must_use]
    pub fn series(&self) -> u32 {
        self.series
    }

    /// Start a new series; continuation prompts stop seeing the old cast.
    pub fn begin_series(&mut self) -> u32 {
        self.series += 1;
        debug!(series = self.series, "Started new story series");
        self.series
    }

    /// Make sure a series exists before continuing one.
    pub fn ensure_series(&mut self) -> u32 {
        if self.series == 0 {
            self.begin_series()
        } else {
            self.series
        }
    }

    /// All tracked characters, keyed by name.
    #[must_use]
    pub fn characters(&self) -> &BTreeMap<String, Character> {
        &self.characters
    }

    /// Characters seen in the current series, in name order.
    pub fn series_characters(&self) -> impl Iterator<Item = &Character> + '_ {
        let series = self.series;
        self.characters.values().filter(move |c| c.last_series == series)
    }

    /// Merge character sketches into the table for the current series.
    ///
    /// Returns the number of characters that were new to the table.
    pub fn merge_characters<I>(&mut self, sketches: I) -> usize
    where
        I: IntoIterator<Item = CharacterSketch>,
    {
        let series = self.series;
        let mut added = 0;
        for sketch in sketches {
            let name = sketch.name.trim();
            if name.is_empty() {
                continue;
            }
            match self.characters.get_mut(name) {
                Some(existing) => existing.absorb(&sketch, series),
                None => {
                    let mut character = Character::new(name, "", series);
                    character.absorb(&sketch, series);
                    self.characters.insert(character.name.clone(), character);
                    added += 1;
                }
            }
        }
        added
    }

    /// Full episode history in generation order.
    #[must_use]
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Episodes of the current series, oldest first.
    pub fn series_episodes(&self) -> impl DoubleEndedIterator<Item = &Episode> + '_ {
        let series = self.series;
        self.episodes.iter().filter(move |e| e.series == series)
    }

    /// Most recent episode.
    #[must_use]
    pub fn last_episode(&self) -> Option<&Episode> {
        self.episodes.last()
    }

    /// Final text of the most recent episode.
    #[must_use]
    pub fn last_story(&self) -> Option<&str> {
        self.last_episode().map(Episode::final_text)
    }

    /// Number of stories and episodes told so far.
    #[must_use]
    pub fn stories_told(&self) -> usize {
        self.episodes.len()
    }

    /// Append a finished episode to the history of the current series.
    pub fn append_episode(&mut self, record: EpisodeRecord) -> &Episode {
        let series = self.ensure_series();
        let number = u32::try_from(self.series_episodes().count())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        self.genre = Some(record.genre);

        let episode = Episode {
            id: EpisodeId::new(),
            series,
            number,
            mode: record.mode,
            request: record.request,
            genre: record.genre,
            confidence: record.confidence,
            draft: record.draft,
            story: record.story,
            revision: record.revision,
            quality: record.quality,
            rating: record.rating,
            comment: record.comment,
            created_at: Utc::now(),
        };
        debug!(
            id = %episode.id,
            series,
            number,
            genre = %episode.genre,
            rating = ?episode.rating.map(Rating::value),
            "Episode appended"
        );
        self.episodes.push(episode);
        &self.episodes[self.episodes.len() - 1]
    }

    /// Genre preference counters.
    #[must_use]
    pub fn preferences(&self) -> &PreferenceCounters {
        &self.preferences
    }

    /// Mutable access for the feedback updater.
    pub fn preferences_mut(&mut self) -> &mut PreferenceCounters {
        &mut self.preferences
    }

    /// The genre the user has rated highest, if any.
    #[must_use]
    pub fn favorite_genre(&self) -> Option<Genre> {
        self.preferences.preferred()
    }
}
