//! Story characters: parsing, name detection and merge rules.
//!
//! Characters enter the session two ways:
//!
//! 1. A structured listing the model is asked to produce, one line per
//!    character: `Alice: young girl | personality: curious, brave | relationships: Bob-best friend`
//! 2. A heuristic scan of the story text for capitalized names.
//!
//! Both produce [`CharacterSketch`]es which are merged into the session's
//! character table. Characters are never removed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A tracked story character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Display name; also the table key.
    pub name: String,
    /// Appearance and role.
    pub description: String,
    /// Personality traits.
    pub personality: BTreeSet<String>,
    /// Other character name → relationship label.
    pub relationships: BTreeMap<String, String>,
    /// Series in which the character first appeared.
    pub first_series: u32,
    /// Most recent series the character appeared in.
    pub last_series: u32,
}

impl Character {
    /// Create a character first seen in `series`.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, series: u32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            personality: BTreeSet::new(),
            relationships: BTreeMap::new(),
            first_series: series,
            last_series: series,
        }
    }

    /// Fold a newer sighting into this character.
    ///
    /// A non-empty description replaces the old one, traits are unioned,
    /// relationships are added or relabelled.
    pub fn absorb(&mut self, sketch: &CharacterSketch, series: u32) {
        if !sketch.description.trim().is_empty() {
            self.description = sketch.description.trim().to_string();
        }
        self.personality.extend(sketch.personality.iter().cloned());
        for (other, label) in &sketch.relationships {
            self.relationships.insert(other.clone(), label.clone());
        }
        self.last_series = self.last_series.max(series);
    }

    /// One-line summary used in continuation prompts.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.description)
        };
        if !self.personality.is_empty() {
            let traits: Vec<&str> = self.personality.iter().map(String::as_str).collect();
            line.push_str(&format!(" (personality: {})", traits.join(", ")));
        }
        if !self.relationships.is_empty() {
            let rels: Vec<String> = self
                .relationships
                .iter()
                .map(|(other, label)| format!("{other} - {label}"))
                .collect();
            line.push_str(&format!(" [relationships: {}]", rels.join("; ")));
        }
        line
    }
}

/// A character as described by one source, before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterSketch {
    /// Name.
    pub name: String,
    /// Description; may be empty.
    pub description: String,
    /// Personality traits.
    pub personality: Vec<String>,
    /// Relationships as (other name, label).
    pub relationships: Vec<(String, String)>,
}

impl CharacterSketch {
    /// A sketch that carries only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Parse the model's character listing. Lines that do not follow the
/// `Name: description | ...` shape are skipped.
#[must_use]
pub fn parse_character_listing(text: &str) -> Vec<CharacterSketch> {
    text.lines().filter_map(parse_listing_line).collect()
}

fn parse_listing_line(line: &str) -> Option<CharacterSketch> {
    if !line.contains(':') || !line.contains('|') {
        return None;
    }
    let mut parts = line.split('|');
    let head = parts.next()?;
    let (raw_name, description) = head.split_once(':')?;
    let name = clean_name(raw_name);
    if name.is_empty() || name.split_whitespace().count() > 4 {
        return None;
    }

    let mut sketch = CharacterSketch {
        name,
        description: description.trim().to_string(),
        ..CharacterSketch::default()
    };

    for part in parts {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        match key.trim().to_lowercase().as_str() {
            "personality" | "traits" | "personality traits" => {
                sketch.personality = split_list(value).map(|t| t.to_lowercase()).collect();
            }
            "relationships" | "relationship" => {
                sketch.relationships = split_list(value)
                    .filter_map(|rel| {
                        let (other, label) = rel.split_once('-')?;
                        let other = clean_name(other);
                        let label = label.trim();
                        (!other.is_empty() && !label.is_empty())
                            .then(|| (other, label.to_string()))
                    })
                    .collect();
            }
            _ => {}
        }
    }

    Some(sketch)
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strip list markers, emphasis and quotes around a name.
fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '.' | ')' | '#' | ' '))
        .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | '_' | ' '))
        .to_string()
}

/// Capitalized words that are not names even when they appear mid-sentence.
const NOT_NAMES: &[&str] = &[
    "I", "I'm", "I'll", "I've", "Mr", "Mrs", "Ms", "Dr", "The", "A", "An", "And", "But", "Or",
    "Once", "Upon", "Time", "The End", "End", "Monday", "Tuesday", "Wednesday", "Thursday",
    "Friday", "Saturday", "Sunday", "Mom", "Dad", "Mommy", "Daddy", "Grandma", "Grandpa",
    "God", "Oh", "Wow", "Yes", "No", "OK", "Okay", "Hello", "Hi",
];

/// Words introducing a name ("a mouse named Pip").
const NAMING_WORDS: &[&str] = &["named", "called"];

/// Find likely character names in story text.
///
/// A capitalized word counts when it appears mid-sentence, or right after
/// "named"/"called". Results are unique, in order of first appearance.
#[must_use]
pub fn detect_names(story: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut sentence_start = true;
    let mut previous_lower = String::new();

    for raw in story.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
        let word = word.strip_suffix("'s").unwrap_or(word);

        let capitalized = word.chars().next().is_some_and(char::is_uppercase)
            && word.chars().skip(1).all(|c| c.is_lowercase() || c == '\'' || c == '-')
            && word.chars().count() > 1;
        let after_naming_word = NAMING_WORDS.contains(&previous_lower.as_str());

        if capitalized
            && (!sentence_start || after_naming_word)
            && !NOT_NAMES.contains(&word)
            && !names.iter().any(|n| n == word)
        {
            names.push(word.to_string());
        }

        let closing = raw.trim_end_matches(['"', '\'', ')']);
        sentence_start = closing.ends_with(['.', '!', '?', ':']);
        previous_lower = word.to_lowercase();
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_listing() {
        let listing = "Alice: young girl with curly hair, main protagonist | personality: curious, brave, kind | relationships: Bob-best friend\n\
                       Bob: a clever orange cat | personality: Playful | relationships: Alice-owner, Mrs Lee-neighbor";
        let sketches = parse_character_listing(listing);
        assert_eq!(sketches.len(), 2);
        assert_eq!(sketches[0].name, "Alice");
        assert_eq!(sketches[0].description, "young girl with curly hair, main protagonist");
        assert_eq!(sketches[0].personality, vec!["curious", "brave", "kind"]);
        assert_eq!(sketches[0].relationships, vec![("Bob".to_string(), "best friend".to_string())]);
        assert_eq!(sketches[1].personality, vec!["playful"]);
        assert_eq!(sketches[1].relationships.len(), 2);
    }

    #[test]
    fn skips_malformed_lines() {
        let listing = "Here are the characters:\n\
                       \n\
                       - **Pip**: a tiny mouse | personality: brave\n\
                       just some prose without separators";
        let sketches = parse_character_listing(listing);
        assert_eq!(sketches.len(), 1);
        assert_eq!(sketches[0].name, "Pip");
    }

    #[test]
    fn detects_mid_sentence_names() {
        let story = "Once upon a time, a little mouse named Pip lived in a barn. \
                     Every morning Pip visited his friend Rosa the hen. \
                     \"Hello, Pip!\" said Rosa. The End.";
        let names = detect_names(story);
        assert_eq!(names, vec!["Pip".to_string(), "Rosa".to_string()]);
    }

    #[test]
    fn sentence_initial_words_are_not_names() {
        let names = detect_names("Suddenly the wind blew. Nobody moved.");
        assert!(names.is_empty(), "got {names:?}");
    }

    #[test]
    fn absorb_merges_without_losing_data() {
        let mut alice = Character::new("Alice", "a girl", 1);
        alice.personality.insert("curious".into());
        alice.absorb(
            &CharacterSketch {
                name: "Alice".into(),
                description: String::new(),
                personality: vec!["brave".into()],
                relationships: vec![("Bob".into(), "best friend".into())],
            },
            2,
        );
        assert_eq!(alice.description, "a girl");
        assert_eq!(alice.personality.len(), 2);
        assert_eq!(alice.relationships.get("Bob").map(String::as_str), Some("best friend"));
        assert_eq!(alice.first_series, 1);
        assert_eq!(alice.last_series, 2);
    }

    #[test]
    fn summary_includes_traits_and_relationships() {
        let mut bob = Character::new("Bob", "a cat", 1);
        bob.personality.insert("playful".into());
        bob.relationships.insert("Alice".into(), "owner".into());
        let s = bob.summary();
        assert!(s.contains("Bob: a cat"));
        assert!(s.contains("playful"));
        assert!(s.contains("Alice - owner"));
    }
}
