//! The story generation cycle.
//!
//! One cycle threads the session state through
//! classify → prompt → generate → evaluate → (refine)? → present, and
//! later folds the user's feedback back in:
//!
//! ```text
//! IDLE → CLASSIFYING → PROMPTING → GENERATING → EVALUATING → (REVISING)? → PRESENTED
//!      → AWAITING_FEEDBACK → (REVISING)? → IDLE
//! ```
//!
//! Any failed model call on the main path moves the cycle to `FAILED`,
//! aborts it and returns to `IDLE`. The session is only written once
//! feedback succeeds: series, characters, preference and episode land
//! together. Character extraction and episode assessment are best effort
//! and never abort.

use std::fmt;

use bedtime_core::character::{detect_names, parse_character_listing, CharacterSketch};
use bedtime_core::config::{BedtimeConfig, CallParams, CharacterConfig, GenerationConfig};
use bedtime_core::evaluation::{QualityEvaluator, QualityReport, RevisionReason};
use bedtime_core::feedback::{Feedback, FeedbackPolicy, PreferenceChange};
use bedtime_core::genre::GenreClassifier;
use bedtime_core::prompt::{PromptBuilder, PromptMode};
use bedtime_core::session::{EpisodeRecord, SessionState};
use bedtime_core::types::{Genre, StoryMode};
use bedtime_llm::{GenerationParams, LlmError, LlmRequest, TextGenerator};
use tracing::{debug, info, warn};

use crate::error::CliError;

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for a request.
    Idle,
    /// Detecting the genre.
    Classifying,
    /// Building the story prompt.
    Prompting,
    /// Waiting for the story draft.
    Generating,
    /// Waiting for the quality evaluation.
    Evaluating,
    /// Waiting for a refined or revised story.
    Revising,
    /// Story shown to the user.
    Presented,
    /// Collecting rating and comment.
    AwaitingFeedback,
    /// A model call failed; the cycle is being abandoned.
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Classifying => "CLASSIFYING",
            Self::Prompting => "PROMPTING",
            Self::Generating => "GENERATING",
            Self::Evaluating => "EVALUATING",
            Self::Revising => "REVISING",
            Self::Presented => "PRESENTED",
            Self::AwaitingFeedback => "AWAITING_FEEDBACK",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A story that has been generated, judged and shown, but not yet rated.
#[derive(Debug, Clone)]
pub struct PresentedStory {
    /// New story or continuation.
    pub mode: StoryMode,
    /// The user's request.
    pub request: String,
    /// Detected genre, or the series genre for a continuation.
    pub genre: Genre,
    /// Classifier confidence.
    pub confidence: f32,
    /// First generated text.
    pub draft: String,
    /// Text shown to the user.
    pub story: String,
    /// Evaluation of the draft.
    pub quality: QualityReport,
    /// Why the evaluator wanted a revision, if it did.
    pub revision_reason: Option<RevisionReason>,
    /// Whether an in-cycle refinement replaced the draft.
    pub refined: bool,
    /// Whether a continuation episode should be offered.
    pub continuation_offered: bool,
    /// Characters found in the story, merged when the episode is recorded.
    pub characters: Vec<CharacterSketch>,
}

impl PresentedStory {
    /// The evaluator asked for a revision that has not happened yet.
    #[must_use]
    pub fn quality_pending(&self) -> bool {
        self.revision_reason.is_some() && !self.refined
    }
}

/// What the feedback step did.
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    /// Revised story, when the feedback triggered a revision.
    pub revision: Option<String>,
    /// Effect on the genre's preference counter.
    pub preference: PreferenceChange,
}

/// Runs story cycles against a [`TextGenerator`].
pub struct Storyteller<G> {
    generator: G,
    classifier: GenreClassifier,
    prompts: PromptBuilder,
    evaluator: QualityEvaluator,
    feedback: FeedbackPolicy,
    generation: GenerationConfig,
    characters: CharacterConfig,
    model: Option<String>,
    timeout_ms: u64,
    auto_refine: bool,
    assess_potential: bool,
    state: CycleState,
}

impl<G: TextGenerator> Storyteller<G> {
    /// Build a storyteller from configuration.
    ///
    /// # Errors
    /// Returns an error if prompt template overrides cannot be loaded.
    pub fn new(generator: G, config: &BedtimeConfig) -> Result<Self, CliError> {
        let model = Some(config.llm.model.clone()).filter(|m| !m.is_empty());
        Ok(Self {
            generator,
            classifier: GenreClassifier::new(&config.classifier),
            prompts: PromptBuilder::new(&config.prompt)?,
            evaluator: QualityEvaluator::new(&config.evaluation),
            feedback: FeedbackPolicy::new(&config.feedback),
            generation: config.generation.clone(),
            characters: config.characters.clone(),
            model,
            timeout_ms: config.llm.request_timeout_ms,
            auto_refine: config.evaluation.auto_refine,
            assess_potential: config.session.assess_episode_potential,
            state: CycleState::Idle,
        })
    }

    /// Current cycle state.
    #[must_use]
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// The underlying generator.
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Rating rules in effect.
    #[must_use]
    pub fn feedback_policy(&self) -> &FeedbackPolicy {
        &self.feedback
    }

    fn transition(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "Story cycle transition");
        self.state = next;
    }

    /// Abandon the cycle after a failed model call.
    fn fail(&mut self, err: LlmError) -> LlmError {
        warn!(state = %self.state, error = %err, "Story cycle failed");
        self.transition(CycleState::Failed);
        self.transition(CycleState::Idle);
        err
    }

    fn params(&self, call: CallParams) -> GenerationParams {
        let params = GenerationParams::new(call.max_tokens, call.temperature).with_timeout(self.timeout_ms);
        match &self.model {
            Some(model) => params.with_model(model.clone()),
            None => params,
        }
    }

    async fn call(&self, kind: &'static str, prompt: String, call: CallParams) -> Result<String, LlmError> {
        debug!(
            kind,
            prompt_chars = prompt.chars().count(),
            limit = self.prompts.max_chars(),
            backend = self.generator.backend_name(),
            "Model call"
        );
        let request = LlmRequest::new(prompt, self.params(call));
        let response = self.generator.generate(&request).await?;
        Ok(response.text.trim().to_string())
    }

    /// Generate, judge and (when needed) refine one story.
    ///
    /// A continuation keeps the genre of the series it continues; only new
    /// stories are classified. The session is read, never written.
    ///
    /// # Errors
    /// Returns the [`LlmError`] of the first failed generation, evaluation
    /// or refinement call.
    pub async fn tell(
        &mut self,
        session: &SessionState,
        request: &str,
        mode: StoryMode,
    ) -> Result<PresentedStory, LlmError> {
        self.transition(CycleState::Classifying);
        let (genre, confidence) = match (mode, session.genre()) {
            (StoryMode::Continuation, Some(series_genre)) => {
                info!(genre = %series_genre, "Continuing series genre");
                (series_genre, 1.0)
            }
            _ => {
                let classification =
                    self.classifier
                        .classify_with_context(request, session.genre(), Some(session.preferences()));
                info!(genre = %classification.genre, confidence = classification.confidence, ?mode, "Genre detected");
                (classification.genre, classification.confidence)
            }
        };

        self.transition(CycleState::Prompting);
        let prompt_mode = match mode {
            StoryMode::NewStory => PromptMode::NewStory,
            StoryMode::Continuation => PromptMode::Continuation,
        };
        let prompt = self.prompts.story(session, genre, request, prompt_mode);

        self.transition(CycleState::Generating);
        let draft = match self.call("story", prompt, self.generation.story).await {
            Ok(text) if text.is_empty() => {
                return Err(self.fail(LlmError::ParseError("model returned an empty story".into())));
            }
            Ok(text) => text,
            Err(err) => return Err(self.fail(err)),
        };

        self.transition(CycleState::Evaluating);
        let quality = match self.evaluate(&draft, genre).await {
            Ok(report) => report,
            Err(err) => return Err(self.fail(err)),
        };
        let revision_reason = self.evaluator.revision_reason(&quality);

        let mut story = draft.clone();
        let mut refined = false;
        if let Some(reason) = revision_reason {
            if self.auto_refine {
                info!(%reason, "Refining story after evaluation");
                self.transition(CycleState::Revising);
                match self.refine(&draft, genre, &quality).await {
                    Ok(text) if !text.is_empty() => {
                        story = text;
                        refined = true;
                    }
                    Ok(_) => warn!("Refinement returned empty text; keeping draft"),
                    Err(err) => return Err(self.fail(err)),
                }
            } else {
                debug!(%reason, "Evaluation flagged story; refinement deferred to feedback");
            }
        }

        let characters = self.collect_characters(&story).await;
        let continuation_offered = self.assess_episode_potential(&story, genre).await;

        self.transition(CycleState::Presented);
        Ok(PresentedStory {
            mode,
            request: request.to_string(),
            genre,
            confidence,
            draft,
            story,
            quality,
            revision_reason,
            refined,
            continuation_offered,
            characters,
        })
    }

    /// Ask the judge to score `story`.
    ///
    /// # Errors
    /// Returns the evaluation call's [`LlmError`]. Unparseable replies are
    /// not errors; they yield neutral scores.
    pub async fn evaluate(&self, story: &str, genre: Genre) -> Result<QualityReport, LlmError> {
        let prompt = self.prompts.evaluation(story, genre, &self.evaluator);
        let reply = self.call("evaluation", prompt, self.generation.evaluation).await?;
        Ok(self.evaluator.parse(&reply))
    }

    /// Rewrite `story` to address a low evaluation.
    ///
    /// # Errors
    /// Returns the refinement call's [`LlmError`].
    pub async fn refine(&self, story: &str, genre: Genre, report: &QualityReport) -> Result<String, LlmError> {
        let prompt = self.prompts.refinement(story, genre, report);
        self.call("refinement", prompt, self.generation.revision).await
    }

    /// Characters of `story`: the model's listing plus heuristic names.
    pub async fn collect_characters(&self, story: &str) -> Vec<CharacterSketch> {
        let mut sketches: Vec<CharacterSketch> = Vec::new();
        if self.characters.llm_extraction {
            let prompt = self.prompts.character_extraction(story);
            match self.call("character_extraction", prompt, self.generation.extraction).await {
                Ok(listing) => sketches = parse_character_listing(&listing),
                Err(err) => warn!(error = %err, "Character extraction failed; using name heuristic only"),
            }
        }
        if self.characters.name_heuristic {
            merge_detected_names(&mut sketches, story);
        }
        debug!(found = sketches.len(), "Characters collected");
        sketches
    }

    /// Whether `story` could carry further episodes. A failed call counts
    /// as "no"; with assessment disabled the answer is always yes.
    pub async fn assess_episode_potential(&self, story: &str, genre: Genre) -> bool {
        if !self.assess_potential {
            return true;
        }
        let prompt = self.prompts.episode_assessment(story, genre);
        match self.call("episode_assessment", prompt, self.generation.assessment).await {
            Ok(reply) => {
                let offered = reply.to_uppercase().contains("YES");
                debug!(offered, reply = %reply, "Episode potential assessed");
                offered
            }
            Err(err) => {
                warn!(error = %err, "Episode assessment failed; not offering continuation");
                false
            }
        }
    }

    /// Whether `feedback` on `presented` will trigger a revision call.
    #[must_use]
    pub fn will_revise(&self, presented: &PresentedStory, feedback: &Feedback) -> bool {
        self.feedback.wants_revision(feedback, presented.quality_pending())
    }

    /// Fold the user's feedback into the session: revise when asked for,
    /// then start the series (new stories), merge characters, update the
    /// genre preference and append the episode.
    ///
    /// # Errors
    /// Returns the revision call's [`LlmError`]; the session is then left
    /// exactly as it was before the cycle.
    pub async fn apply_feedback(
        &mut self,
        session: &mut SessionState,
        presented: PresentedStory,
        feedback: Feedback,
    ) -> Result<FeedbackOutcome, LlmError> {
        self.transition(CycleState::AwaitingFeedback);

        let mut revision = None;
        if self.will_revise(&presented, &feedback) {
            self.transition(CycleState::Revising);
            let low_rating = feedback.rating.is_some_and(|r| self.feedback.is_low(r));
            let prompt = if low_rating {
                self.prompts.story(
                    session,
                    presented.genre,
                    &presented.request,
                    PromptMode::Revision {
                        previous: &presented.story,
                        feedback: &feedback.comment,
                        rating: feedback.rating,
                    },
                )
            } else {
                self.prompts.refinement(&presented.story, presented.genre, &presented.quality)
            };
            match self.call("revision", prompt, self.generation.revision).await {
                Ok(text) if !text.is_empty() => {
                    info!(low_rating, "Story revised from feedback");
                    revision = Some(text);
                }
                Ok(_) => warn!("Revision returned empty text; keeping presented story"),
                Err(err) => return Err(self.fail(err)),
            }
        }

        let mut sketches = presented.characters;
        if let Some(text) = &revision {
            if self.characters.name_heuristic {
                merge_detected_names(&mut sketches, text);
            }
        }
        match presented.mode {
            StoryMode::NewStory => session.begin_series(),
            StoryMode::Continuation => session.ensure_series(),
        };
        let added = session.merge_characters(sketches);
        debug!(added, total = session.characters().len(), "Characters merged");

        let preference = self
            .feedback
            .apply(session.preferences_mut(), presented.genre, feedback.rating);
        debug!(genre = %presented.genre, ?preference, count = session.preferences().get(presented.genre), "Preference updated");

        let episode = session.append_episode(EpisodeRecord {
            mode: presented.mode,
            request: presented.request,
            genre: presented.genre,
            confidence: presented.confidence,
            draft: presented.draft,
            story: presented.story,
            revision: revision.clone(),
            quality: presented.quality,
            rating: feedback.rating,
            comment: feedback.comment,
        });
        info!(series = episode.series, number = episode.number, "Episode recorded");

        self.transition(CycleState::Idle);
        Ok(FeedbackOutcome { revision, preference })
    }
}

/// Add heuristic names that the listing did not already cover.
fn merge_detected_names(sketches: &mut Vec<CharacterSketch>, story: &str) {
    for name in detect_names(story) {
        if !sketches.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
            sketches.push(CharacterSketch::named(name));
        }
    }
}
