//! Feedback rules: what a user rating does to the story and to the
//! genre preference counters.

use crate::config::FeedbackConfig;
use crate::session::PreferenceCounters;
use crate::types::{Genre, Rating};

/// What the user said about a presented story.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    /// Rating, when the user gave one.
    pub rating: Option<Rating>,
    /// Improvement request or praise; may be empty.
    pub comment: String,
}

impl Feedback {
    /// No rating, no comment.
    #[must_use]
    pub fn skipped() -> Self {
        Self::default()
    }

    /// A rating with a comment.
    #[must_use]
    pub fn rated(rating: Rating, comment: impl Into<String>) -> Self {
        Self {
            rating: Some(rating),
            comment: comment.into(),
        }
    }
}

/// Effect of a rating on a preference counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceChange {
    /// Counter went up by one.
    Increased,
    /// Counter went down by one, or was already zero.
    Decreased,
    /// Counter untouched.
    Unchanged,
}

/// Which follow-up question to ask after a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Ask what would make the story better.
    Improvement,
    /// Ask what the user liked.
    Praise,
}

impl FollowUp {
    /// Console wording.
    #[must_use]
    pub fn question(self) -> &'static str {
        match self {
            Self::Improvement => "What could make it better?",
            Self::Praise => "What did you like most?",
        }
    }
}

/// Rating thresholds.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackPolicy {
    low: u8,
    high: u8,
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self::new(&FeedbackConfig::default())
    }
}

impl FeedbackPolicy {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            low: config.low_rating_threshold,
            high: config.high_rating_threshold,
        }
    }

    /// Rating at or below the low threshold.
    #[must_use]
    pub fn is_low(&self, rating: Rating) -> bool {
        rating.value() <= self.low
    }

    /// Rating at or above the high threshold.
    #[must_use]
    pub fn is_high(&self, rating: Rating) -> bool {
        rating.value() >= self.high
    }

    /// Follow-up question for a rating, if any.
    #[must_use]
    pub fn follow_up(&self, rating: Rating) -> Option<FollowUp> {
        if self.is_low(rating) {
            Some(FollowUp::Improvement)
        } else if self.is_high(rating) {
            Some(FollowUp::Praise)
        } else {
            None
        }
    }

    /// Whether the feedback calls for a revision pass.
    ///
    /// `quality_pending` is true when the evaluator asked for revision but
    /// no refinement ran inside the cycle.
    #[must_use]
    pub fn wants_revision(&self, feedback: &Feedback, quality_pending: bool) -> bool {
        feedback.rating.is_some_and(|r| self.is_low(r)) || quality_pending
    }

    /// Adjust the counter for `genre`: up on a high rating, down (never
    /// below zero) on a low one.
    pub fn apply(
        &self,
        preferences: &mut PreferenceCounters,
        genre: Genre,
        rating: Option<Rating>,
    ) -> PreferenceChange {
        match rating {
            Some(r) if self.is_high(r) => {
                preferences.increment(genre);
                PreferenceChange::Increased
            }
            Some(r) if self.is_low(r) => {
                preferences.decrement(genre);
                PreferenceChange::Decreased
            }
            _ => PreferenceChange::Unchanged,
        }
    }
}
