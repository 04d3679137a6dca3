//! Property-based tests for the classifier, preference counters and the
//! quality revision trigger.

use std::collections::BTreeMap;

use proptest::prelude::*;

use bedtime_core::evaluation::{Dimension, ParseOutcome, QualityEvaluator, QualityReport};
use bedtime_core::feedback::FeedbackPolicy;
use bedtime_core::genre::GenreClassifier;
use bedtime_core::session::PreferenceCounters;
use bedtime_core::types::{Genre, Rating};

/// Words that appear in no genre's keyword list.
const FILLER: &[&str] = &[
    "a", "the", "little", "mouse", "who", "wants", "to", "become", "story", "about", "and", "sleepy",
    "cat", "on", "tuesday", "with", "blue", "boots",
];

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_genre() -> impl Strategy<Value = Genre> {
    prop::sample::select(Genre::ALL.to_vec())
}

/// A request whose only keywords come from `genre`.
fn arb_single_genre_request() -> impl Strategy<Value = (Genre, String)> {
    arb_genre().prop_flat_map(|genre| {
        let keywords = genre.profile().keywords.to_vec();
        (
            Just(genre),
            prop::collection::vec(prop::sample::select(keywords), 1..4),
            prop::collection::vec(prop::sample::select(FILLER.to_vec()), 0..8),
        )
            .prop_map(|(genre, keywords, filler)| {
                let mut words: Vec<&str> = filler;
                for (i, kw) in keywords.into_iter().enumerate() {
                    let at = (i * 3).min(words.len());
                    words.insert(at, kw);
                }
                (genre, words.join(" "))
            })
    })
}

fn arb_report() -> impl Strategy<Value = QualityReport> {
    prop::collection::vec(1u8..=10, 8).prop_map(|values| {
        let scores: BTreeMap<Dimension, f32> = Dimension::ALL
            .into_iter()
            .zip(values)
            .map(|(d, v)| (d, f32::from(v)))
            .collect();
        QualityReport {
            scores,
            outcome: ParseOutcome::Parsed,
            justification: String::new(),
        }
    })
}

// ---------------------------------------------------------------------------
// Property: keywords from exactly one genre classify with full confidence
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn single_genre_keywords_give_full_confidence((genre, request) in arb_single_genre_request()) {
        let result = GenreClassifier::default().classify(&request);
        prop_assert_eq!(result.genre, genre);
        prop_assert!((result.confidence - 1.0).abs() < f32::EPSILON, "confidence {}", result.confidence);
    }
}

// ---------------------------------------------------------------------------
// Property: no keyword at all falls back to the default genre
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn no_keywords_fall_back_to_default(
        words in prop::collection::vec(prop::sample::select(FILLER.to_vec()), 0..12),
        prior in prop::option::of(arb_genre()),
    ) {
        let mut prefs = PreferenceCounters::default();
        prefs.increment(Genre::Fantasy);
        let classifier = GenreClassifier::default();
        let result = classifier.classify_with_context(&words.join(" "), prior, Some(&prefs));
        prop_assert_eq!(result.genre, classifier.default_genre());
        prop_assert_eq!(result.confidence, 0.0);
    }
}

// ---------------------------------------------------------------------------
// Property: confidence always within [0, 1]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn confidence_is_bounded(request in "\\PC{0,200}", prior in prop::option::of(arb_genre())) {
        let result = GenreClassifier::default().classify_with_context(&request, prior, None);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }
}

// ---------------------------------------------------------------------------
// Property: preference counters never go below zero
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn preferences_never_negative(
        ratings in prop::collection::vec(prop::option::of(1u8..=5), 0..50),
        genre in arb_genre(),
    ) {
        let policy = FeedbackPolicy::default();
        let mut prefs = PreferenceCounters::default();
        let mut expected: u32 = 0;

        for value in ratings {
            let rating = value.map(|v| Rating::new(v).expect("1..=5 is valid"));
            policy.apply(&mut prefs, genre, rating);
            match value {
                Some(v) if v >= 4 => expected += 1,
                Some(v) if v <= 2 => expected = expected.saturating_sub(1),
                _ => {}
            }
            prop_assert_eq!(prefs.get(genre), expected);
        }
        for other in Genre::ALL.into_iter().filter(|g| *g != genre) {
            prop_assert_eq!(prefs.get(other), 0);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: revision trigger iff aggregate < 7 or any dimension < 5
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn revision_trigger_matches_rule(report in arb_report()) {
        let evaluator = QualityEvaluator::default();
        let min = Dimension::ALL
            .into_iter()
            .map(|d| report.score(d))
            .fold(f32::MAX, f32::min);
        let expected = report.aggregate() < 7.0 || min < 5.0;
        prop_assert_eq!(evaluator.needs_revision(&report), expected);
    }
}

// ---------------------------------------------------------------------------
// Property: parsing is deterministic
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn parsing_same_reply_twice_is_identical(reply in "\\PC{0,300}") {
        let evaluator = QualityEvaluator::default();
        let first = evaluator.parse(&reply);
        let second = evaluator.parse(&reply);
        prop_assert_eq!(first.aggregate().to_bits(), second.aggregate().to_bits());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn parsed_scores_stay_on_scale(values in prop::collection::vec(-50i32..50, 8)) {
        let reply: String = Dimension::ALL
            .into_iter()
            .zip(values)
            .map(|(d, v)| format!("{}: {v}\n", d.key()))
            .collect();
        let report = QualityEvaluator::default().parse(&reply);
        for d in Dimension::ALL {
            prop_assert!((1.0..=10.0).contains(&report.score(d)));
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger boundaries
// ---------------------------------------------------------------------------

#[test]
fn exact_threshold_does_not_trigger() {
    let evaluator = QualityEvaluator::default();
    assert!(!evaluator.needs_revision(&QualityReport::uniform(7.0)));
    assert!(evaluator.needs_revision(&QualityReport::uniform(6.99)));

    let mut floor = QualityReport::uniform(9.0);
    floor.scores.insert(Dimension::Engagement, 5.0);
    assert!(!evaluator.needs_revision(&floor));
    floor.scores.insert(Dimension::Engagement, 4.9);
    assert!(evaluator.needs_revision(&floor));
}
