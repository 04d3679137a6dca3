//! Full story cycles driven by a scripted generator.
//!
//! Scripted reply order per cycle: story, evaluation, character listing,
//! episode assessment, then the feedback revision when one is due.

use bedtime_cli::{run_session, CliError, Console, CycleState, Storyteller};
use bedtime_core::evaluation::Dimension;
use bedtime_core::feedback::{Feedback, PreferenceChange};
use bedtime_core::types::{Genre, Rating, StoryMode};
use bedtime_core::{BedtimeConfig, BedtimeError, SessionState};
use bedtime_llm::{LlmError, ScriptedGenerator};

const MOUSE_REQUEST: &str = "A brave little mouse who wants to become a knight";

const MOUSE_STORY: &str = "Once upon a time, a little mouse named Pip dreamed of becoming a knight. \
Every morning Pip practiced with a twig sword behind the old barn. \
One day the farm cat lost her bell, and Pip bravely climbed the hay tower to find it. \
That night Pip learned that courage means helping others, even when you feel small.";

const REVISED_STORY: &str = "Once upon a time, a little mouse named Pip raced across the meadow on a quest. \
Pip leapt over streams and dodged a sleepy owl to rescue the lost bell. \
Pip learned that courage means helping others.";

const LISTING: &str = "Pip: a little grey mouse who dreams of knighthood | personality: brave, small | relationships: Whiskers-friend";

fn evaluation_reply(score: u8) -> String {
    let mut reply: Vec<String> = Dimension::ALL
        .iter()
        .map(|d| format!("{}: {score}", d.key()))
        .collect();
    reply.push("justification: A warm adventure with a clear lesson.".into());
    reply.join("\n")
}

fn storyteller(replies: Vec<String>) -> Storyteller<ScriptedGenerator> {
    storyteller_with(replies, &BedtimeConfig::default())
}

fn storyteller_with(replies: Vec<String>, config: &BedtimeConfig) -> Storyteller<ScriptedGenerator> {
    Storyteller::new(ScriptedGenerator::with_replies(replies), config).expect("storyteller")
}

fn good_cycle() -> Vec<String> {
    vec![
        MOUSE_STORY.to_string(),
        evaluation_reply(9),
        LISTING.to_string(),
        "YES".to_string(),
    ]
}

fn rating(value: u8) -> Rating {
    Rating::new(value).expect("valid rating")
}

// ---------------------------------------------------------------------------
// Story cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mouse_knight_story_without_feedback() {
    let mut teller = storyteller(good_cycle());
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");

    assert_eq!(presented.genre, Genre::Adventure);
    assert!(presented.confidence > 0.0);
    assert_eq!(presented.story, MOUSE_STORY);
    assert!((presented.quality.aggregate() - 9.0).abs() < f32::EPSILON);
    assert!(!presented.refined);
    assert!(presented.revision_reason.is_none());
    assert!(presented.continuation_offered);
    assert_eq!(teller.state(), CycleState::Presented);
    assert_eq!(teller.generator().call_count(), 4);
    assert!(session.episodes().is_empty());
    assert_eq!(session.series(), 0);

    let requests = teller.generator().requests();
    assert_eq!(requests[0].params.max_tokens, 3000);
    assert_eq!(requests[1].params.max_tokens, 1000);
    assert_eq!(requests[2].params.max_tokens, 500);
    assert_eq!(requests[3].params.max_tokens, 100);
    assert_eq!(requests[0].params.model_id.as_deref(), Some("gpt-3.5-turbo"));

    let outcome = teller
        .apply_feedback(&mut session, presented, Feedback::skipped())
        .await
        .expect("feedback applied");

    assert!(outcome.revision.is_none());
    assert_eq!(outcome.preference, PreferenceChange::Unchanged);
    assert_eq!(teller.state(), CycleState::Idle);
    assert_eq!(teller.generator().call_count(), 4);

    let episodes = session.episodes();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].rating, None);
    assert_eq!(episodes[0].story, MOUSE_STORY);
    assert!(episodes[0].revision.is_none());
    assert_eq!(session.genre(), Some(Genre::Adventure));
    assert_eq!(session.series(), 1);

    let pip = session.characters().get("Pip").expect("Pip tracked");
    assert!(pip.personality.contains("brave"));
}

#[tokio::test]
async fn low_rating_revises_once_and_keeps_both_texts() {
    let mut replies = good_cycle();
    replies.push(REVISED_STORY.to_string());
    let mut teller = storyteller(replies);
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");
    let feedback = Feedback::rated(rating(2), "more action");
    assert!(teller.will_revise(&presented, &feedback));

    let outcome = teller
        .apply_feedback(&mut session, presented, feedback)
        .await
        .expect("feedback applied");

    assert_eq!(outcome.revision.as_deref(), Some(REVISED_STORY));
    assert_eq!(outcome.preference, PreferenceChange::Decreased);
    assert_eq!(teller.generator().call_count(), 5);

    let prompts = teller.generator().prompts();
    let revision_prompt = &prompts[4];
    assert!(revision_prompt.contains("more action"));
    assert!(revision_prompt.contains(MOUSE_STORY));

    // Counters never go below zero.
    assert_eq!(session.preferences().get(Genre::Adventure), 0);

    let episode = &session.episodes()[0];
    assert_eq!(episode.story, MOUSE_STORY);
    assert_eq!(episode.revision.as_deref(), Some(REVISED_STORY));
    assert_eq!(episode.final_text(), REVISED_STORY);
    assert_eq!(episode.rating, Some(rating(2)));
    assert_eq!(episode.comment, "more action");
}

#[tokio::test]
async fn high_rating_increments_preference_without_revision() {
    let mut teller = storyteller(good_cycle());
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");
    let outcome = teller
        .apply_feedback(&mut session, presented, Feedback::rated(rating(5), "Pip was funny"))
        .await
        .expect("feedback applied");

    assert!(outcome.revision.is_none());
    assert_eq!(outcome.preference, PreferenceChange::Increased);
    assert_eq!(session.preferences().get(Genre::Adventure), 1);
    assert_eq!(session.favorite_genre(), Some(Genre::Adventure));
    assert_eq!(teller.generator().call_count(), 4);
}

#[tokio::test]
async fn generation_failure_aborts_without_episode() {
    let generator = ScriptedGenerator::new();
    generator.push_error(LlmError::Status {
        code: 503,
        message: "overloaded".into(),
    });
    let mut teller = Storyteller::new(generator, &BedtimeConfig::default()).expect("storyteller");
    let session = SessionState::new();

    let err = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect_err("generation fails");

    assert!(matches!(err, LlmError::Status { code: 503, .. }));
    assert_eq!(teller.state(), CycleState::Idle);
    assert!(session.episodes().is_empty());
    assert_eq!(session.series(), 0);
    assert_eq!(teller.generator().call_count(), 1);
}

#[tokio::test]
async fn empty_story_is_a_failure() {
    let mut teller = storyteller(vec!["   ".to_string()]);
    let session = SessionState::new();

    let err = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect_err("empty story rejected");

    assert!(matches!(err, LlmError::ParseError(_)));
    assert!(session.episodes().is_empty());
}

#[tokio::test]
async fn evaluation_failure_aborts_cycle() {
    let generator = ScriptedGenerator::with_replies([MOUSE_STORY]);
    generator.push_error(LlmError::Timeout(60_000));
    let mut teller = Storyteller::new(generator, &BedtimeConfig::default()).expect("storyteller");
    let session = SessionState::new();

    let err = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect_err("evaluation fails");

    assert!(matches!(err, LlmError::Timeout(60_000)));
    assert_eq!(teller.state(), CycleState::Idle);
    assert!(session.episodes().is_empty());
}

#[tokio::test]
async fn low_evaluation_refines_inside_cycle() {
    let mut teller = storyteller(vec![
        MOUSE_STORY.to_string(),
        evaluation_reply(4),
        REVISED_STORY.to_string(),
        LISTING.to_string(),
        "YES".to_string(),
    ]);
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");

    assert!(presented.refined);
    assert!(presented.revision_reason.is_some());
    assert!(!presented.quality_pending());
    assert_eq!(presented.draft, MOUSE_STORY);
    assert_eq!(presented.story, REVISED_STORY);

    let prompts = teller.generator().prompts();
    assert!(prompts[2].contains("Based on this evaluation"));
    assert!(prompts[2].contains(MOUSE_STORY));

    // Skipped feedback does not revise a second time.
    let outcome = teller
        .apply_feedback(&mut session, presented, Feedback::skipped())
        .await
        .expect("feedback applied");
    assert!(outcome.revision.is_none());
    assert_eq!(teller.generator().call_count(), 5);
    assert!(session.episodes()[0].was_refined());
}

#[tokio::test]
async fn deferred_refinement_happens_at_feedback() {
    let mut config = BedtimeConfig::default();
    config.evaluation.auto_refine = false;
    let mut teller = storyteller_with(
        vec![
            MOUSE_STORY.to_string(),
            evaluation_reply(4),
            LISTING.to_string(),
            "NO".to_string(),
            REVISED_STORY.to_string(),
        ],
        &config,
    );
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");
    assert!(!presented.refined);
    assert!(presented.quality_pending());
    assert!(!presented.continuation_offered);
    assert_eq!(presented.story, MOUSE_STORY);

    let outcome = teller
        .apply_feedback(&mut session, presented, Feedback::skipped())
        .await
        .expect("feedback applied");

    assert_eq!(outcome.revision.as_deref(), Some(REVISED_STORY));
    let prompts = teller.generator().prompts();
    assert!(prompts[4].contains("Based on this evaluation"));
}

#[tokio::test]
async fn failed_revision_leaves_session_untouched() {
    let generator = ScriptedGenerator::with_replies(good_cycle());
    generator.push_error(LlmError::Unavailable("offline".into()));
    let mut teller = Storyteller::new(generator, &BedtimeConfig::default()).expect("storyteller");
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle succeeds");
    let err = teller
        .apply_feedback(&mut session, presented, Feedback::rated(rating(1), "too slow"))
        .await
        .expect_err("revision fails");

    assert!(matches!(err, LlmError::Unavailable(_)));
    assert!(session.episodes().is_empty());
    assert_eq!(session.series(), 0);
    assert!(session.characters().is_empty());
    assert_eq!(session.genre(), None);
    assert_eq!(session.preferences().get(Genre::Adventure), 0);
    assert_eq!(teller.state(), CycleState::Idle);
}

#[tokio::test]
async fn extraction_and_assessment_failures_are_not_fatal() {
    let generator = ScriptedGenerator::with_replies([MOUSE_STORY.to_string(), evaluation_reply(9)]);
    generator.push_error(LlmError::Timeout(1_000));
    generator.push_error(LlmError::Timeout(1_000));
    let mut teller = Storyteller::new(generator, &BedtimeConfig::default()).expect("storyteller");
    let mut session = SessionState::new();

    let presented = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("cycle still succeeds");

    assert!(!presented.continuation_offered);
    assert!(presented.characters.iter().any(|c| c.name == "Pip"));
    assert!(session.characters().is_empty());

    teller
        .apply_feedback(&mut session, presented, Feedback::skipped())
        .await
        .expect("feedback applied");
    assert!(session.characters().contains_key("Pip"));
}

#[tokio::test]
async fn failed_revision_after_series_keeps_previous_series() {
    let generator = ScriptedGenerator::with_replies(good_cycle());
    generator.push_reply("Pip the mouse met Rosa by the mill.");
    generator.push_reply(evaluation_reply(9));
    generator.push_reply("Rosa: a kind river otter | personality: kind");
    generator.push_reply("YES");
    generator.push_error(LlmError::Timeout(60_000));
    let mut teller = Storyteller::new(generator, &BedtimeConfig::default()).expect("storyteller");
    let mut session = SessionState::new();

    let first = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("first cycle");
    teller
        .apply_feedback(&mut session, first, Feedback::skipped())
        .await
        .expect("first feedback");

    let second = teller
        .tell(&session, "A mouse and an otter", StoryMode::NewStory)
        .await
        .expect("second cycle");
    teller
        .apply_feedback(&mut session, second, Feedback::rated(rating(1), ""))
        .await
        .expect_err("revision times out");

    assert_eq!(session.series(), 1);
    assert_eq!(session.episodes().len(), 1);
    assert!(!session.characters().contains_key("Rosa"));
    assert_eq!(session.series_characters().count(), 1);
}

#[tokio::test]
async fn keywordless_continuation_keeps_series_genre() {
    let mut teller = storyteller(vec![
        "Luna the wizard rode her unicorn through the enchanted wood.".to_string(),
        evaluation_reply(9),
        "Luna: a young wizard | personality: curious".to_string(),
        "YES".to_string(),
        "Luna and her unicorn lay down beneath the stars.".to_string(),
        evaluation_reply(9),
        "Luna: a young wizard".to_string(),
        "YES".to_string(),
    ]);
    let mut session = SessionState::new();

    let first = teller
        .tell(&session, "A magical wizard and a unicorn", StoryMode::NewStory)
        .await
        .expect("first cycle");
    assert_eq!(first.genre, Genre::Fantasy);
    teller
        .apply_feedback(&mut session, first, Feedback::skipped())
        .await
        .expect("feedback");

    let next = teller
        .tell(&session, "They go to sleep under the stars", StoryMode::Continuation)
        .await
        .expect("continuation cycle");

    assert_eq!(next.genre, Genre::Fantasy);
    let prompt = &teller.generator().prompts()[4];
    assert!(prompt.starts_with("Create an engaging fantasy story"));
    assert!(prompt.contains("established fantasy elements"));
}

#[tokio::test]
async fn new_story_is_still_classified_after_a_series() {
    let mut replies = good_cycle();
    replies.extend([
        "Mia and Leo learned to share their blocks.".to_string(),
        evaluation_reply(9),
        "Mia: a girl | personality: kind".to_string(),
        "NO".to_string(),
    ]);
    let mut teller = storyteller(replies);
    let mut session = SessionState::new();

    let first = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("first cycle");
    teller
        .apply_feedback(&mut session, first, Feedback::skipped())
        .await
        .expect("feedback");

    let next = teller
        .tell(&session, "Two friends who share and help each other", StoryMode::NewStory)
        .await
        .expect("second cycle");
    assert_eq!(next.genre, Genre::Friendship);
}

#[tokio::test]
async fn continuation_prompt_carries_series_context() {
    let mut replies = good_cycle();
    replies.extend([
        "The next morning Pip met a lost duckling near the pond.".to_string(),
        evaluation_reply(8),
        LISTING.to_string(),
        "YES".to_string(),
    ]);
    let mut teller = storyteller(replies);
    let mut session = SessionState::new();

    let first = teller
        .tell(&session, MOUSE_REQUEST, StoryMode::NewStory)
        .await
        .expect("first cycle");
    teller
        .apply_feedback(&mut session, first, Feedback::rated(rating(5), ""))
        .await
        .expect("feedback");
    let series = session.series();

    let second = teller
        .tell(&session, "Pip helps a lost duckling", StoryMode::Continuation)
        .await
        .expect("continuation cycle");
    assert_eq!(second.mode, StoryMode::Continuation);

    let prompts = teller.generator().prompts();
    let continuation_prompt = &prompts[4];
    assert!(continuation_prompt.contains("PREVIOUS STORY CONTEXT"));
    assert!(continuation_prompt.contains("ESTABLISHED CHARACTERS"));
    assert!(continuation_prompt.contains("Pip"));
    assert!(continuation_prompt.contains("continuation episode"));

    teller
        .apply_feedback(&mut session, second, Feedback::skipped())
        .await
        .expect("feedback");
    assert_eq!(session.series(), series);
    let numbers: Vec<u32> = session.series_episodes().map(|e| e.number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[test]
fn unreadable_prompt_directory_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = BedtimeConfig::default();
    config.prompt.prompts_dir = Some(dir.path().join("missing"));

    let err = Storyteller::new(ScriptedGenerator::new(), &config)
        .err()
        .expect("missing prompt directory rejected");
    assert!(matches!(err, CliError::Core(BedtimeError::Template(_))));
    assert_eq!(err.exit_code(), 2);
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

async fn drive(input: &str, replies: Vec<String>) -> (String, SessionState) {
    let mut teller = storyteller(replies);
    let mut session = SessionState::new();
    let mut console = Console::new(input.as_bytes(), Vec::new());
    run_session(&mut teller, &mut session, &mut console)
        .await
        .expect("session runs");
    let output = String::from_utf8(console.into_output()).expect("utf-8 output");
    (output, session)
}

#[tokio::test]
async fn console_session_tells_one_story_and_quits() {
    let input = format!("{MOUSE_REQUEST}\n5\nI liked Pip\n3\n");
    let (output, session) = drive(&input, good_cycle()).await;

    assert!(output.contains("Welcome to the Bedtime Story Generator!"));
    assert!(output.contains("Your Adventure story"));
    assert!(output.contains(MOUSE_STORY));
    assert!(output.contains("What did you like most?"));
    assert!(output.contains("1. Continue episode"));
    assert!(output.contains("We shared 1 story tonight."));
    assert!(output.contains("Your favorite kind of story seems to be Adventure."));
    assert!(output.contains("Sweet dreams!"));

    assert_eq!(session.stories_told(), 1);
    assert_eq!(session.episodes()[0].comment, "I liked Pip");
}

#[tokio::test]
async fn console_low_rating_shows_revision() {
    let mut replies = good_cycle();
    replies.push(REVISED_STORY.to_string());
    let input = format!("{MOUSE_REQUEST}\n2\nmore action\n");
    let (output, session) = drive(&input, replies).await;

    assert!(output.contains("What could make it better?"));
    assert!(output.contains("Thank you! Let me improve the story..."));
    assert!(output.contains("Here is the improved version:"));
    assert!(output.contains(REVISED_STORY));
    assert_eq!(session.episodes()[0].revision.as_deref(), Some(REVISED_STORY));
}

#[tokio::test]
async fn console_asks_again_for_first_story_after_failure() {
    let input = format!("{MOUSE_REQUEST}\n{MOUSE_REQUEST}\n\n3\n");
    let (output, session) = drive(&input, [vec!["".to_string()], good_cycle()].concat()).await;

    assert!(output.contains("Sorry, I couldn't write that story"));
    assert_eq!(output.matches("What story would you like to hear tonight?").count(), 2);
    assert_eq!(output.matches("2. New story").count(), 1);
    assert!(output.contains("We shared 1 story tonight."));
    assert_eq!(session.stories_told(), 1);
}

#[tokio::test]
async fn console_end_of_input_quits_cleanly() {
    let (output, session) = drive("", Vec::new()).await;

    assert!(output.contains("What story would you like to hear tonight?"));
    assert!(output.contains("We shared 0 stories tonight."));
    assert!(!output.contains("favorite kind of story"));
    assert!(session.episodes().is_empty());
}

#[tokio::test]
async fn console_reprompts_on_blank_request() {
    let (output, _) = drive("\n   \nquit\n", Vec::new()).await;

    assert_eq!(output.matches("Please tell me what the story should be about.").count(), 2);
}
