//! Genre reference data and keyword-based genre classification.
//!
//! Each genre carries a fixed keyword list plus the guidance that is
//! interpolated into story prompts. Classification counts keyword
//! occurrences in the request and adds small continuity and preference
//! bonuses on top.

use std::collections::BTreeMap;

use crate::config::ClassifierConfig;
use crate::session::PreferenceCounters;
use crate::types::Genre;

/// Immutable per-genre reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenreProfile {
    /// Words that signal this genre in a request.
    pub keywords: &'static [&'static str],
    /// Story elements the model should include.
    pub elements: &'static [&'static str],
    /// Narrative tone.
    pub tone: &'static str,
    /// Structural guidance.
    pub structure: &'static str,
    /// Vocabulary guidance.
    pub vocabulary: &'static str,
}

const ADVENTURE: GenreProfile = GenreProfile {
    keywords: &["adventure", "quest", "journey", "explore", "brave", "hero", "knight"],
    elements: &["brave protagonist", "exciting quest", "obstacles to overcome", "discovery"],
    tone: "exciting and energetic",
    structure: "journey with challenges and triumph",
    vocabulary: "action words, vivid descriptions of places and events",
};

const FAIRY_TALE: GenreProfile = GenreProfile {
    keywords: &["princess", "prince", "magic", "fairy", "castle", "witch", "dragon"],
    elements: &["magical elements", "clear good vs evil", "transformation", "happy ending"],
    tone: "whimsical and magical",
    structure: "once upon a time format with magical resolution",
    vocabulary: "magical, enchanted, sparkling, mysterious",
};

const EDUCATIONAL: GenreProfile = GenreProfile {
    keywords: &["learn", "teach", "school", "facts", "science", "math", "educational"],
    elements: &["learning opportunity", "problem-solving", "factual information", "practical lessons"],
    tone: "encouraging and informative",
    structure: "problem-discovery-learning-application",
    vocabulary: "clear explanations, age-appropriate facts",
};

const FRIENDSHIP: GenreProfile = GenreProfile {
    keywords: &["friend", "friendship", "together", "help", "kind", "caring"],
    elements: &["character relationships", "cooperation", "empathy", "shared experiences"],
    tone: "warm and heartfelt",
    structure: "relationship challenge and resolution",
    vocabulary: "emotions, caring, helping, understanding",
};

const FANTASY: GenreProfile = GenreProfile {
    keywords: &["magical", "wizard", "unicorn", "fantasy", "mystical", "enchanted"],
    elements: &["magical creatures", "fantastical settings", "special powers", "wonder"],
    tone: "mysterious and wondrous",
    structure: "magical world with extraordinary events",
    vocabulary: "mystical, enchanted, powerful, extraordinary",
};

impl Genre {
    /// Reference data for this genre.
    #[must_use]
    pub fn profile(self) -> &'static GenreProfile {
        match self {
            Self::Adventure => &ADVENTURE,
            Self::FairyTale => &FAIRY_TALE,
            Self::Educational => &EDUCATIONAL,
            Self::Friendship => &FRIENDSHIP,
            Self::Fantasy => &FANTASY,
        }
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning genre.
    pub genre: Genre,
    /// Normalized confidence in [0, 1].
    pub confidence: f32,
    /// Combined score per genre (keywords plus bonuses).
    pub scores: BTreeMap<Genre, f32>,
}

/// Keyword-counting genre classifier.
#[derive(Debug, Clone)]
pub struct GenreClassifier {
    default_genre: Genre,
    continuity_bonus: f32,
    preference_bonus: f32,
}

impl Default for GenreClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl GenreClassifier {
    /// Build a classifier from configuration.
    #[must_use]
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            default_genre: config.default_genre,
            continuity_bonus: config.continuity_bonus.max(0.0),
            preference_bonus: config.preference_bonus.max(0.0),
        }
    }

    /// Genre returned when nothing matches.
    #[must_use]
    pub fn default_genre(&self) -> Genre {
        self.default_genre
    }

    /// Classify a request with no prior context.
    #[must_use]
    pub fn classify(&self, request: &str) -> Classification {
        self.classify_with_context(request, None, None)
    }

    /// Classify a request, biased toward the previous genre and the user's
    /// preferred genre. Bonuses only apply when at least one keyword matched.
    #[must_use]
    pub fn classify_with_context(
        &self,
        request: &str,
        prior: Option<Genre>,
        preferences: Option<&PreferenceCounters>,
    ) -> Classification {
        let words = tokenize(request);
        let mut scores: BTreeMap<Genre, f32> = Genre::ALL
            .iter()
            .map(|&genre| (genre, keyword_hits(&words, genre.profile().keywords) as f32))
            .collect();

        let keyword_total: f32 = scores.values().sum();
        if keyword_total <= 0.0 {
            return Classification {
                genre: self.default_genre,
                confidence: 0.0,
                scores,
            };
        }

        if let Some(prior) = prior {
            *scores.entry(prior).or_default() += self.continuity_bonus;
        }
        if let Some(preferred) = preferences.and_then(PreferenceCounters::preferred) {
            *scores.entry(preferred).or_default() += self.preference_bonus;
        }

        // Genre::ALL is in priority order, so strict `>` keeps the earlier genre on ties.
        let mut best = Genre::ALL[0];
        let mut best_score = f32::MIN;
        for genre in Genre::ALL {
            let score = scores.get(&genre).copied().unwrap_or(0.0);
            if score > best_score {
                best = genre;
                best_score = score;
            }
        }

        let total: f32 = scores.values().sum();
        let confidence = if total > 0.0 {
            (best_score / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Classification {
            genre: best,
            confidence,
            scores,
        }
    }
}

/// Lowercase alphabetic words of `text`.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of words matching any keyword, allowing a plural `s`/`es`.
fn keyword_hits(words: &[String], keywords: &[&str]) -> usize {
    words
        .iter()
        .filter(|word| keywords.iter().any(|kw| word_matches(word, kw)))
        .count()
}

fn word_matches(word: &str, keyword: &str) -> bool {
    match word.strip_prefix(keyword) {
        Some(rest) => rest.is_empty() || rest == "s" || rest == "es",
        None => false,
    }
}
