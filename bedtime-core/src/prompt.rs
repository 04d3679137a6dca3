//! Prompt templates and the prompt builder.
//!
//! Every prompt the storyteller sends is rendered from a template with
//! `{key}` placeholders. The built-in templates below can be overridden by
//! a directory of versioned TOML files (`prompt.prompts_dir`).
//!
//! [`PromptBuilder`] turns session state, genre guidance and user text into
//! a final prompt string, keeping it under the configured size limit by
//! dropping the oldest story context first.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::config::PromptConfig;
use crate::error::BedtimeError;
use crate::evaluation::{Dimension, QualityEvaluator, QualityReport};
use crate::session::SessionState;
use crate::types::{Genre, Rating};

/// Story generation (new story or continuation).
pub const STORY_TEMPLATE: &str = r"Create an engaging {genre} story for children ages 5-10 based on: '{request}'

GENRE-SPECIFIC REQUIREMENTS for {genre_upper}:
- Include these elements: {elements}
- Maintain a {tone} tone throughout
- Follow this structure: {structure}
- Use {vocabulary} in your language choices

GENERAL REQUIREMENTS:
- Be appropriate for children ages 5-10 (no scary or inappropriate content)
- Be approximately 200-400 words long
- Include descriptive language and dialogue
- Teach a gentle lesson or moral
- Have a clear beginning, middle, and satisfying end{continuity}
{context}
Please write the complete story now:";

/// Continuity requirement appended for continuation episodes.
pub const CONTINUITY_LINE: &str =
    "\n- This is a continuation episode, maintain consistency with established {genre} elements, characters and world from the previous story";

/// Quality evaluation ("judge") prompt.
pub const EVALUATION_TEMPLATE: &str = r"Evaluate this {genre} story for children ages 5-10:

{story}

Score each dimension from {scale_min} (poor) to {scale_max} (excellent):
{dimensions}

Reply with exactly one line per dimension in the form `key: score`, using these keys in this order:
{keys}
Then add a final line `justification: ...` with one or two sentences of specific suggestions for improvement.";

/// Refinement after a low evaluation.
pub const REFINEMENT_TEMPLATE: &str = r"Based on this evaluation of a {genre} story:

{evaluation}

Improve this story while maintaining its {genre} elements. Pay particular attention to: {weak_points}.

{story}

IMPORTANT: Provide ONLY the improved story text.";

/// Revision after user feedback.
pub const REVISION_TEMPLATE: &str = r#"The user provided this feedback about the story: "{feedback}"
They rated it {rating}.

Original request: {request}
Current story:
{story}

Please revise the story to address their feedback while maintaining the core story elements. Make specific improvements based on their comments.

IMPORTANT: Provide ONLY the revised story text, no explanations."#;

/// Feedback text used when a low rating came without a comment.
pub const UNEXPLAINED_LOW_RATING: &str =
    "The listener did not enjoy this story. Make it more engaging, warmer and more fun to hear.";

/// Character listing request.
pub const EXTRACTION_TEMPLATE: &str = r"Analyze this story and extract the main characters with their details:

{story}

For each main character, provide:
- Name
- Brief description (appearance, role)
- 2-3 personality traits
- Relationships to other characters

Format each character on its own line as: CHARACTER_NAME: description | personality: trait1, trait2, trait3 | relationships: name-relationship, name-relationship

Example: Alice: young girl with curly hair, main protagonist | personality: curious, brave, kind | relationships: Bob-best friend";

/// Episode potential yes/no question.
pub const ASSESSMENT_TEMPLATE: &str = r#"Assess this {genre} story for episode potential:

{story}

Consider:
- Character development and likability for {genre} stories
- World-building potential in the {genre} genre
- Story engagement level
- Whether characters/setting could support more {genre} adventures

Respond with only "YES" if this has good episode potential, or "NO" if it doesn't."#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value. Unknown placeholders are
/// left untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// Template set: built-in or loaded from TOML
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Story generation.
    Story,
    /// Quality evaluation.
    Evaluation,
    /// Refinement after evaluation.
    Refinement,
    /// Revision after user feedback.
    Revision,
    /// Character listing.
    CharacterExtraction,
    /// Episode potential question.
    EpisodeAssessment,
}

impl PromptId {
    /// All prompt IDs.
    pub const ALL: [PromptId; 6] = [
        Self::Story,
        Self::Evaluation,
        Self::Refinement,
        Self::Revision,
        Self::CharacterExtraction,
        Self::EpisodeAssessment,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Story => "story.toml",
            Self::Evaluation => "evaluation.toml",
            Self::Refinement => "refinement.toml",
            Self::Revision => "revision.toml",
            Self::CharacterExtraction => "character_extraction.toml",
            Self::EpisodeAssessment => "episode_assessment.toml",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            Self::Story => STORY_TEMPLATE,
            Self::Evaluation => EVALUATION_TEMPLATE,
            Self::Refinement => REFINEMENT_TEMPLATE,
            Self::Revision => REVISION_TEMPLATE,
            Self::CharacterExtraction => EXTRACTION_TEMPLATE,
            Self::EpisodeAssessment => ASSESSMENT_TEMPLATE,
        }
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Story => "story",
            Self::Evaluation => "evaluation",
            Self::Refinement => "refinement",
            Self::Revision => "revision",
            Self::CharacterExtraction => "character_extraction",
            Self::EpisodeAssessment => "episode_assessment",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = BedtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.to_string() == s)
            .ok_or_else(|| BedtimeError::Template(format!("unknown prompt id: '{s}'")))
    }
}

/// `[prompt]` file layout.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    template: String,
}

/// A loaded template and where it came from.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// "builtin" or the version string from the TOML file.
    pub version: String,
    /// Template text with `{key}` placeholders.
    pub text: String,
}

/// The full set of templates, one per [`PromptId`].
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: [PromptTemplate; PromptId::ALL.len()],
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplates {
    /// The compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            templates: PromptId::ALL.map(|id| PromptTemplate {
                version: "builtin".into(),
                text: id.builtin().into(),
            }),
        }
    }

    /// Built-in templates, overridden by any matching TOML files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a TOML file exists but cannot be read or parsed,
    /// or if the directory contains no known template file at all.
    pub fn from_directory(dir: impl AsRef<Path>) -> crate::error::Result<Self> {
        let dir = dir.as_ref();
        let mut set = Self::builtin();
        let mut loaded = 0usize;

        for id in PromptId::ALL {
            let path: PathBuf = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                BedtimeError::Template(format!("failed to read {}: {e}", path.display()))
            })?;
            let parsed: TomlPromptFile = toml::from_str(&content).map_err(|e| {
                BedtimeError::Template(format!("failed to parse {}: {e}", path.display()))
            })?;
            debug!(prompt = %id, version = %parsed.prompt.version, "Loaded prompt override");
            set.templates[id.index()] = PromptTemplate {
                version: parsed.prompt.version,
                text: parsed.prompt.template,
            };
            loaded += 1;
        }

        if loaded == 0 {
            return Err(BedtimeError::Template(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            )));
        }
        Ok(set)
    }

    /// Template for `id`.
    #[must_use]
    pub fn get(&self, id: PromptId) -> &PromptTemplate {
        &self.templates[id.index()]
    }

    fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> String {
        render_template(&self.get(id).text, vars)
    }
}

// ---------------------------------------------------------------------------
// Prompt builder
// ---------------------------------------------------------------------------

/// How the story prompt should be framed.
#[derive(Debug, Clone, Copy)]
pub enum PromptMode<'a> {
    /// A fresh story.
    NewStory,
    /// Next episode of the current series, with characters and context.
    Continuation,
    /// Rewrite `previous` to address user feedback.
    Revision {
        /// The story being revised.
        previous: &'a str,
        /// What the user asked for; may be empty.
        feedback: &'a str,
        /// The rating that prompted the revision.
        rating: Option<Rating>,
    },
}

/// Assembles prompts from session state and templates.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    templates: PromptTemplates,
    max_chars: usize,
    context_chars: usize,
    max_context_episodes: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::with_templates(PromptTemplates::builtin(), &PromptConfig::default())
    }
}

impl PromptBuilder {
    /// Build from configuration, loading template overrides if configured.
    ///
    /// # Errors
    /// Returns an error if the override directory cannot be loaded.
    pub fn new(config: &PromptConfig) -> crate::error::Result<Self> {
        let templates = match &config.prompts_dir {
            Some(dir) => PromptTemplates::from_directory(dir)?,
            None => PromptTemplates::builtin(),
        };
        Ok(Self::with_templates(templates, config))
    }

    /// Build with an explicit template set.
    #[must_use]
    pub fn with_templates(templates: PromptTemplates, config: &PromptConfig) -> Self {
        Self {
            templates,
            max_chars: config.max_prompt_chars,
            context_chars: config.context_chars_per_episode,
            max_context_episodes: config.max_context_episodes,
        }
    }

    /// Size limit in characters.
    #[must_use]
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// The story-writing prompt for `mode`.
    #[must_use]
    pub fn story(&self, state: &SessionState, genre: Genre, request: &str, mode: PromptMode<'_>) -> String {
        let request = clip_front(request.trim(), self.max_chars / 4);
        match mode {
            PromptMode::NewStory => self.render_story(genre, &request, "", ""),
            PromptMode::Continuation => {
                let continuity = render_template(CONTINUITY_LINE, &[("genre", genre_name(genre))]);
                let skeleton = self.render_story(genre, &request, &continuity, "");
                let budget = self.max_chars.saturating_sub(char_len(&skeleton));
                let context = self.continuation_context(state, budget);
                self.render_story(genre, &request, &continuity, &context)
            }
            PromptMode::Revision {
                previous,
                feedback,
                rating,
            } => self.revision(previous, feedback, rating, &request),
        }
    }

    fn render_story(&self, genre: Genre, request: &str, continuity: &str, context: &str) -> String {
        let profile = genre.profile();
        let name = genre_name(genre);
        let upper = name.to_uppercase();
        let elements = profile.elements.join(", ");
        self.templates.render(
            PromptId::Story,
            &[
                ("genre", name),
                ("genre_upper", &upper),
                ("elements", &elements),
                ("tone", profile.tone),
                ("structure", profile.structure),
                ("vocabulary", profile.vocabulary),
                ("continuity", continuity),
                ("request", request),
                ("context", context),
            ],
        )
    }

    /// Characters and prior-episode tails for a continuation, fitted into
    /// `budget` characters. Oldest episode context goes first.
    fn continuation_context(&self, state: &SessionState, budget: usize) -> String {
        let characters: Vec<String> = state.series_characters().map(|c| format!("- {}", c.summary())).collect();
        let character_block = if characters.is_empty() {
            String::new()
        } else {
            format!("\nESTABLISHED CHARACTERS:\n{}\n", characters.join("\n"))
        };

        let mut recent: Vec<String> = state
            .series_episodes()
            .rev()
            .take(self.max_context_episodes)
            .map(|e| format!("Episode {}: {}", e.number, tail_chars(e.final_text(), self.context_chars)))
            .collect();
        recent.reverse();

        let assemble = |episodes: &[String]| -> String {
            let mut out = String::new();
            if !episodes.is_empty() {
                out.push_str("\nPREVIOUS STORY CONTEXT:\n");
                out.push_str(&episodes.join("\n\n"));
                out.push('\n');
            }
            out.push_str(&character_block);
            if !episodes.is_empty() || !character_block.is_empty() {
                out.push_str("\nContinue the adventure with these established characters and world.\n");
            }
            out
        };

        let mut kept = recent.as_slice();
        let mut context = assemble(kept);
        while char_len(&context) > budget && !kept.is_empty() {
            kept = &kept[1..];
            context = assemble(kept);
        }
        if char_len(&context) > budget {
            context = clip_front(&context, budget);
        }
        if kept.len() < recent.len() {
            debug!(
                dropped = recent.len() - kept.len(),
                budget, "Dropped oldest episode context to fit prompt limit"
            );
        }
        context
    }

    fn revision(&self, previous: &str, feedback: &str, rating: Option<Rating>, request: &str) -> String {
        let feedback = if feedback.trim().is_empty() {
            UNEXPLAINED_LOW_RATING.to_string()
        } else {
            clip_front(feedback.trim(), self.max_chars / 8)
        };
        let rating = rating.map_or_else(|| "without a score".to_string(), |r| r.to_string());
        let vars = |story: &str| {
            self.templates.render(
                PromptId::Revision,
                &[
                    ("rating", &rating),
                    ("request", request),
                    ("feedback", &feedback),
                    ("story", story),
                ],
            )
        };
        self.fit_story(previous, vars)
    }

    /// The judge prompt for `story`.
    #[must_use]
    pub fn evaluation(&self, story: &str, genre: Genre, evaluator: &QualityEvaluator) -> String {
        let name = genre_name(genre);
        let dimensions: Vec<String> = Dimension::ALL
            .into_iter()
            .map(|d| {
                format!(
                    "- {}: {}",
                    d.key(),
                    render_template(d.description(), &[("genre", name)])
                )
            })
            .collect();
        let keys: Vec<&str> = Dimension::ALL.into_iter().map(Dimension::key).collect();
        let dimensions = dimensions.join("\n");
        let keys = keys.join(", ");
        let scale_min = format_score(evaluator.scale_min());
        let scale_max = format_score(evaluator.scale_max());

        self.fit_story(story, |story| {
            self.templates.render(
                PromptId::Evaluation,
                &[
                    ("genre", name),
                    ("scale_min", &scale_min),
                    ("scale_max", &scale_max),
                    ("dimensions", &dimensions),
                    ("keys", &keys),
                    ("story", story),
                ],
            )
        })
    }

    /// The refinement prompt after a low evaluation.
    #[must_use]
    pub fn refinement(&self, story: &str, genre: Genre, report: &QualityReport) -> String {
        let name = genre_name(genre);
        let mut evaluation = format!(
            "Scores: {} (average {:.1})",
            report.summary(),
            report.aggregate()
        );
        if !report.justification.is_empty() {
            evaluation.push_str("\nNotes: ");
            evaluation.push_str(&report.justification);
        }

        let mut ranked: Vec<(Dimension, f32)> = Dimension::ALL.into_iter().map(|d| (d, report.score(d))).collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let weak_points: Vec<String> = ranked
            .iter()
            .take(3)
            .map(|(d, _)| d.key().replace('_', " "))
            .collect();
        let weak_points = weak_points.join(", ");

        self.fit_story(story, |story| {
            self.templates.render(
                PromptId::Refinement,
                &[
                    ("genre", name),
                    ("evaluation", &evaluation),
                    ("weak_points", &weak_points),
                    ("story", story),
                ],
            )
        })
    }

    /// The character listing prompt.
    #[must_use]
    pub fn character_extraction(&self, story: &str) -> String {
        self.fit_story(story, |story| {
            self.templates.render(PromptId::CharacterExtraction, &[("story", story)])
        })
    }

    /// The episode potential prompt.
    #[must_use]
    pub fn episode_assessment(&self, story: &str, genre: Genre) -> String {
        self.fit_story(story, |story| {
            self.templates.render(
                PromptId::EpisodeAssessment,
                &[("genre", genre_name(genre)), ("story", story)],
            )
        })
    }

    /// Render with the full story, cutting the story's beginning if the
    /// result would exceed the limit.
    fn fit_story<F>(&self, story: &str, render: F) -> String
    where
        F: Fn(&str) -> String,
    {
        let full = render(story);
        let overflow = char_len(&full).saturating_sub(self.max_chars);
        if overflow == 0 {
            return full;
        }
        let keep = char_len(story).saturating_sub(overflow);
        debug!(overflow, keep, "Story text cut to fit prompt limit");
        render(&clip_front(story, keep))
    }
}

/// Genre name as written in prompts ("fairy tale").
fn genre_name(genre: Genre) -> &'static str {
    match genre {
        Genre::FairyTale => "fairy tale",
        other => other.as_str(),
    }
}

fn format_score(score: f32) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score}")
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

const ELLIPSIS: &str = "...";

/// The last `max` characters of `text`, prefixed by an ellipsis when cut.
fn tail_chars(text: &str, max: usize) -> String {
    let len = char_len(text);
    if len <= max {
        return text.to_string();
    }
    let skip = len - max;
    format!("{ELLIPSIS}{}", text.chars().skip(skip).collect::<String>())
}

/// Keep at most `max` characters of `text`, dropping from the front. The
/// ellipsis marker counts toward `max`.
fn clip_front(text: &str, max: usize) -> String {
    let len = char_len(text);
    if len <= max {
        return text.to_string();
    }
    let marker = char_len(ELLIPSIS);
    if max <= marker {
        return text.chars().skip(len - max).collect();
    }
    tail_chars(text, max - marker)
}
