//! Quality evaluation: parsing the judge model's scores and deciding
//! whether a story needs another pass.
//!
//! The judge is asked for one `dimension: score` line per dimension. Models
//! drift from that shape, so the parser accepts JSON objects, markdown
//! emphasis, numbered lists and `8/10` style scores. Dimensions that still
//! cannot be read get the neutral score and are listed in
//! [`ParseOutcome::PartiallyParsed`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EvaluationConfig;

/// The eight scored quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Does it read like a good story of its genre?
    GenreAuthenticity,
    /// Suitable for ages 5-10.
    AgeAppropriateness,
    /// Would a child want to keep listening?
    Engagement,
    /// Something worth learning.
    EducationalValue,
    /// Characters are distinct and consistent.
    CharacterDevelopment,
    /// Beginning, middle, end; pacing.
    Structure,
    /// Vocabulary, dialogue and description.
    LanguageQuality,
    /// A gentle, positive message.
    MoralContent,
}

impl Dimension {
    /// All dimensions in prompt order.
    pub const ALL: [Dimension; 8] = [
        Dimension::GenreAuthenticity,
        Dimension::AgeAppropriateness,
        Dimension::Engagement,
        Dimension::EducationalValue,
        Dimension::CharacterDevelopment,
        Dimension::Structure,
        Dimension::LanguageQuality,
        Dimension::MoralContent,
    ];

    /// Key the judge is asked to use (`genre_authenticity`).
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::GenreAuthenticity => "genre_authenticity",
            Self::AgeAppropriateness => "age_appropriateness",
            Self::Engagement => "engagement",
            Self::EducationalValue => "educational_value",
            Self::CharacterDevelopment => "character_development",
            Self::Structure => "structure",
            Self::LanguageQuality => "language_quality",
            Self::MoralContent => "moral_content",
        }
    }

    /// What the judge should look at for this dimension.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::GenreAuthenticity => "does it feel like a good {genre} story?",
            Self::AgeAppropriateness => "suitable for children ages 5-10, nothing scary or inappropriate",
            Self::Engagement => "would a child want to keep listening?",
            Self::EducationalValue => "does it teach something worthwhile?",
            Self::CharacterDevelopment => "are the characters likable, distinct and consistent?",
            Self::Structure => "clear beginning, middle and satisfying end; good pacing",
            Self::LanguageQuality => "vivid, age-appropriate vocabulary and dialogue",
            Self::MoralContent => "a gentle lesson or positive message",
        }
    }

    /// Normalized phrases that name this dimension in free text.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::GenreAuthenticity => &["genre authenticity", "genre adherence", "genre"],
            Self::AgeAppropriateness => &["age appropriateness", "age appropriate", "age"],
            Self::Engagement => &["engagement", "engaging"],
            Self::EducationalValue => &["educational value", "educational", "education"],
            Self::CharacterDevelopment => &["character development", "characters", "character"],
            Self::Structure => &["structure", "story structure", "pacing"],
            Self::LanguageQuality => &["language quality", "language", "writing quality"],
            Self::MoralContent => &["moral content", "moral", "positive message"],
        }
    }

    /// Match a normalized label against every dimension.
    fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|d| {
            d.aliases().iter().any(|alias| {
                label == *alias
                    || label
                        .strip_prefix(alias)
                        .is_some_and(|rest| rest.starts_with(' '))
            })
        })
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How completely the judge's reply was understood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseOutcome {
    /// Every dimension had a readable score.
    Parsed,
    /// Some dimensions fell back to the neutral score.
    PartiallyParsed {
        /// Dimensions that received the neutral score.
        missing: BTreeSet<Dimension>,
    },
}

impl ParseOutcome {
    /// Whether every dimension was read from the reply.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Parsed)
    }
}

/// Scores for one story text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Score per dimension; always contains all eight.
    pub scores: BTreeMap<Dimension, f32>,
    /// Whether any score is a fallback.
    pub outcome: ParseOutcome,
    /// The judge's free-text reasoning.
    pub justification: String,
}

impl QualityReport {
    /// A report giving every dimension the same score.
    #[must_use]
    pub fn uniform(score: f32) -> Self {
        Self {
            scores: Dimension::ALL.into_iter().map(|d| (d, score)).collect(),
            outcome: ParseOutcome::Parsed,
            justification: String::new(),
        }
    }

    /// Score for one dimension.
    #[must_use]
    pub fn score(&self, dimension: Dimension) -> f32 {
        self.scores.get(&dimension).copied().unwrap_or(0.0)
    }

    /// Arithmetic mean of the eight dimension scores.
    #[must_use]
    pub fn aggregate(&self) -> f32 {
        let sum: f32 = Dimension::ALL.into_iter().map(|d| self.score(d)).sum();
        sum / Dimension::ALL.len() as f32
    }

    /// The weakest dimension (first in prompt order on ties).
    #[must_use]
    pub fn lowest(&self) -> (Dimension, f32) {
        let mut lowest = (Dimension::ALL[0], self.score(Dimension::ALL[0]));
        for d in Dimension::ALL.into_iter().skip(1) {
            let s = self.score(d);
            if s < lowest.1 {
                lowest = (d, s);
            }
        }
        lowest
    }

    /// Compact `key=score` listing for logs and the console.
    #[must_use]
    pub fn summary(&self) -> String {
        Dimension::ALL
            .into_iter()
            .map(|d| format!("{}={:.1}", d.key(), self.score(d)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Why a story was sent back for revision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevisionReason {
    /// Aggregate below the threshold.
    LowAggregate(f32),
    /// One dimension below the floor.
    LowDimension(Dimension, f32),
}

impl fmt::Display for RevisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowAggregate(score) => write!(f, "aggregate score {score:.2} is below threshold"),
            Self::LowDimension(d, score) => write!(f, "{d} score {score:.1} is below floor"),
        }
    }
}

/// Parses judge replies and applies the revision trigger.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    scale_min: f32,
    scale_max: f32,
    neutral: f32,
    threshold: f32,
    floor: f32,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(&EvaluationConfig::default())
    }
}

impl QualityEvaluator {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            scale_min: config.scale_min,
            scale_max: config.scale_max,
            neutral: config.neutral_score,
            threshold: config.revision_threshold,
            floor: config.dimension_floor,
        }
    }

    /// Lowest score on the scale.
    #[must_use]
    pub fn scale_min(&self) -> f32 {
        self.scale_min
    }

    /// Highest score on the scale.
    #[must_use]
    pub fn scale_max(&self) -> f32 {
        self.scale_max
    }

    /// Parse a judge reply. Never fails: unreadable dimensions get the
    /// neutral score and are recorded as missing.
    #[must_use]
    pub fn parse(&self, response: &str) -> QualityReport {
        let (mut found, justification) = parse_json_scores(response)
            .unwrap_or_else(|| parse_line_scores(response));

        let mut missing = BTreeSet::new();
        let scores = Dimension::ALL
            .into_iter()
            .map(|d| match found.remove(&d) {
                Some(score) if score.is_finite() => (d, score.clamp(self.scale_min, self.scale_max)),
                _ => {
                    missing.insert(d);
                    (d, self.neutral)
                }
            })
            .collect();

        let outcome = if missing.is_empty() {
            ParseOutcome::Parsed
        } else {
            let names: Vec<&str> = missing.iter().map(|d| d.key()).collect();
            warn!(
                missing = %names.join(","),
                neutral = self.neutral,
                "Evaluation reply only partially parsed; using neutral scores"
            );
            ParseOutcome::PartiallyParsed { missing }
        };

        let report = QualityReport {
            scores,
            outcome,
            justification,
        };
        debug!(aggregate = report.aggregate(), scores = %report.summary(), "Parsed evaluation");
        report
    }

    /// The revision trigger: aggregate strictly below the threshold, or any
    /// dimension strictly below the floor.
    #[must_use]
    pub fn revision_reason(&self, report: &QualityReport) -> Option<RevisionReason> {
        let aggregate = report.aggregate();
        if aggregate < self.threshold {
            return Some(RevisionReason::LowAggregate(aggregate));
        }
        let (dimension, score) = report.lowest();
        (score < self.floor).then_some(RevisionReason::LowDimension(dimension, score))
    }

    /// Whether the report triggers a revision.
    #[must_use]
    pub fn needs_revision(&self, report: &QualityReport) -> bool {
        self.revision_reason(report).is_some()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

type Found = (BTreeMap<Dimension, f32>, String);

/// Lowercase, unify separators, drop markdown emphasis.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '*' | '`' | '#'))
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}

/// Scores from a JSON object embedded anywhere in the reply. Scores may sit
/// at the top level, one level down (`{"scores": {...}}`), or as
/// `{"engagement": {"score": 9}}`.
fn parse_json_scores(response: &str) -> Option<Found> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&response[start..=end]).ok()?;

    let mut scores = BTreeMap::new();
    let mut justification = String::new();
    for (key, value) in &object {
        match value.as_object() {
            Some(inner) if Dimension::from_label(&normalize(key)).is_none() => {
                for (inner_key, inner_value) in inner {
                    read_json_entry(inner_key, inner_value, &mut scores, &mut justification);
                }
            }
            _ => read_json_entry(key, value, &mut scores, &mut justification),
        }
    }
    if scores.is_empty() {
        return None;
    }
    Some((scores, justification))
}

fn read_json_entry(
    key: &str,
    value: &serde_json::Value,
    scores: &mut BTreeMap<Dimension, f32>,
    justification: &mut String,
) {
    let label = normalize(key);
    let label = label.trim();
    if label == "justification" || label == "reasoning" {
        if let Some(text) = value.as_str() {
            *justification = text.trim().to_string();
        }
        return;
    }
    let Some(dimension) = Dimension::from_label(label) else {
        return;
    };
    let value = value
        .as_object()
        .and_then(|inner| inner.get("score"))
        .unwrap_or(value);
    let score = value
        .as_f64()
        .map(|v| v as f32)
        .or_else(|| value.as_str().and_then(first_number));
    if let Some(score) = score {
        scores.entry(dimension).or_insert(score);
    }
}

/// Scores from `label: number` lines.
fn parse_line_scores(response: &str) -> Found {
    let mut scores = BTreeMap::new();
    let mut justification_lines: Vec<&str> = Vec::new();
    let mut in_justification = false;

    for raw_line in response.lines() {
        let line = normalize(raw_line);
        let line = line
            .trim_start()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | ' '))
            .trim();
        if line.is_empty() {
            continue;
        }

        let (label, rest) = split_label(line);
        if label == "justification" || label == "reasoning" || label == "summary" {
            in_justification = true;
            let text = raw_line.split_once(':').map_or("", |(_, t)| t).trim();
            if !text.is_empty() {
                justification_lines.push(text);
            }
            continue;
        }

        if let Some(dimension) = Dimension::from_label(label) {
            in_justification = false;
            if let Some(score) = first_number(rest) {
                scores.entry(dimension).or_insert(score);
            }
        } else if in_justification {
            justification_lines.push(raw_line.trim());
        }
    }

    (scores, justification_lines.join(" "))
}

/// Split `label: rest`; without a colon, the label ends at the first digit.
fn split_label(line: &str) -> (&str, &str) {
    if let Some((label, rest)) = line.split_once([':', '=']) {
        return (label.trim(), rest);
    }
    match line.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => (
            line[..idx].trim().trim_end_matches(|c: char| !c.is_alphanumeric()),
            &line[idx..],
        ),
        None => (line, ""),
    }
}

/// First decimal number in `text` (`8`, `8.5`; the `/10` of `8/10` is ignored).
fn first_number(text: &str) -> Option<f32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let tail = &text[start..];
    let mut end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tail.len());
    // "8." at the end of a sentence
    while end > 0 && tail[..end].ends_with('.') {
        end -= 1;
    }
    tail[..end].parse().ok()
}
