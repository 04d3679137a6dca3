//! Interactive console surface.
//!
//! Generic over any `BufRead` / `Write` pair so the whole session can be
//! driven from memory in tests. End of input ends the session.

use std::io::{self, BufRead, Write};

use bedtime_core::feedback::{Feedback, FeedbackPolicy};
use bedtime_core::session::SessionState;
use bedtime_core::types::{Rating, StoryMode};
use bedtime_llm::TextGenerator;
use tracing::{info, warn};

use crate::error::CliError;
use crate::storyteller::{PresentedStory, Storyteller};

/// Words that end the session at a request prompt.
const QUIT_WORDS: &[&str] = &["quit", "exit", "q"];

const EXAMPLE_REQUESTS: &[&str] = &[
    "A brave little mouse who wants to become a knight",
    "A princess who discovers a secret door in her castle",
    "Two friends who learn to share their toys",
    "A curious girl who wants to learn about the stars",
    "A magical unicorn who lives in an enchanted forest",
];

const RULE: &str = "==================================================";

/// Choice from the between-stories menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Next episode of the current series.
    Continue,
    /// A fresh story.
    NewStory,
    /// End the session.
    Quit,
}

/// Line-oriented console over a reader and a writer.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Wrap a reader and a writer.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the writer (tests inspect what was printed).
    pub fn into_output(self) -> W {
        self.output
    }

    /// One trimmed line, or `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        self.read_line()
    }

    /// Print the welcome banner.
    ///
    /// # Errors
    /// Returns any write error.
    pub fn welcome(&mut self) -> io::Result<()> {
        writeln!(self.output, "{RULE}")?;
        writeln!(self.output, "  Welcome to the Bedtime Story Generator!")?;
        writeln!(self.output, "{RULE}")?;
        writeln!(self.output, "Tell me what kind of story you'd like and I'll write it just for you.")?;
        writeln!(self.output, "Here are some ideas:")?;
        for example in EXAMPLE_REQUESTS {
            writeln!(self.output, "  - {example}")?;
        }
        writeln!(self.output, "Type 'quit' at any time to leave.")?;
        writeln!(self.output)
    }

    /// Ask for a story request until a non-empty one arrives.
    ///
    /// Returns `None` when the user quits or input ends.
    ///
    /// # Errors
    /// Returns any read or write error.
    pub fn prompt_request(&mut self, question: &str) -> io::Result<Option<String>> {
        loop {
            let Some(line) = self.ask(question)? else {
                return Ok(None);
            };
            if QUIT_WORDS.contains(&line.to_lowercase().as_str()) {
                return Ok(None);
            }
            if line.is_empty() {
                writeln!(self.output, "Please tell me what the story should be about.")?;
                continue;
            }
            return Ok(Some(line));
        }
    }

    /// Show the between-stories menu and read a valid choice.
    ///
    /// # Errors
    /// Returns any read or write error.
    pub fn menu(&mut self, continuation_offered: bool) -> io::Result<MenuChoice> {
        writeln!(self.output)?;
        writeln!(self.output, "What would you like to do next?")?;
        if continuation_offered {
            writeln!(self.output, "  1. Continue episode")?;
        }
        writeln!(self.output, "  2. New story")?;
        writeln!(self.output, "  3. Quit")?;
        loop {
            let Some(line) = self.ask("Choose an option: ")? else {
                return Ok(MenuChoice::Quit);
            };
            match line.to_lowercase().as_str() {
                "1" if continuation_offered => return Ok(MenuChoice::Continue),
                "2" => return Ok(MenuChoice::NewStory),
                "3" => return Ok(MenuChoice::Quit),
                word if QUIT_WORDS.contains(&word) => return Ok(MenuChoice::Quit),
                _ => {
                    let valid = if continuation_offered { "1, 2 or 3" } else { "2 or 3" };
                    writeln!(self.output, "Please enter {valid}.")?;
                }
            }
        }
    }

    /// Print a finished story.
    ///
    /// # Errors
    /// Returns any write error.
    pub fn show_story(&mut self, presented: &PresentedStory) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{RULE}")?;
        writeln!(
            self.output,
            "  Your {} {}",
            presented.genre.label(),
            presented.mode.noun()
        )?;
        writeln!(self.output, "{RULE}")?;
        writeln!(self.output, "{}", presented.story)?;
        writeln!(self.output, "{RULE}")?;
        let note = if presented.refined { ", polished once" } else { "" };
        writeln!(
            self.output,
            "(quality {:.1}/10{note})",
            presented.quality.aggregate()
        )
    }

    /// Print a revised story.
    ///
    /// # Errors
    /// Returns any write error.
    pub fn show_revision(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "Here is the improved version:")?;
        writeln!(self.output, "{RULE}")?;
        writeln!(self.output, "{text}")?;
        writeln!(self.output, "{RULE}")
    }

    /// Print a short status line.
    ///
    /// # Errors
    /// Returns any write error.
    pub fn status(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{message}")
    }

    /// Ask for a rating and, depending on it, a comment. Enter skips the
    /// rating; end of input counts as skipped.
    ///
    /// # Errors
    /// Returns any read or write error.
    pub fn collect_feedback(&mut self, policy: &FeedbackPolicy, mode: StoryMode) -> io::Result<Feedback> {
        let question = format!("How would you rate this {}? (1-5, Enter to skip): ", mode.noun());
        let rating = loop {
            let Some(line) = self.ask(&question)? else {
                return Ok(Feedback::skipped());
            };
            if line.is_empty() {
                return Ok(Feedback::skipped());
            }
            match line.parse::<Rating>() {
                Ok(rating) => break rating,
                Err(_) => writeln!(self.output, "Please enter a number from 1 to 5, or press Enter to skip.")?,
            }
        };

        let comment = match policy.follow_up(rating) {
            Some(follow_up) => self.ask(&format!("{} ", follow_up.question()))?.unwrap_or_default(),
            None => String::new(),
        };
        Ok(Feedback::rated(rating, comment))
    }

    /// Print the farewell with session totals.
    ///
    /// # Errors
    /// Returns any write error.
    pub fn farewell(&mut self, session: &SessionState) -> io::Result<()> {
        writeln!(self.output)?;
        let told = session.stories_told();
        let plural = if told == 1 { "story" } else { "stories" };
        writeln!(self.output, "We shared {told} {plural} tonight.")?;
        if let Some(genre) = session.favorite_genre() {
            writeln!(self.output, "Your favorite kind of story seems to be {}.", genre.label())?;
        }
        writeln!(self.output, "Sweet dreams!")
    }
}

/// Run the interactive loop until the user quits or input ends.
///
/// # Errors
/// Returns console I/O errors. Story service failures are reported to the
/// user and the loop carries on.
pub async fn run_session<G, R, W>(
    storyteller: &mut Storyteller<G>,
    session: &mut SessionState,
    console: &mut Console<R, W>,
) -> Result<(), CliError>
where
    G: TextGenerator,
    R: BufRead,
    W: Write,
{
    console.welcome()?;
    let mut continuation_offered = false;

    loop {
        // Until a story is recorded there is nothing to continue or choose.
        let mode = if session.stories_told() == 0 {
            StoryMode::NewStory
        } else {
            match console.menu(continuation_offered)? {
                MenuChoice::Continue => StoryMode::Continuation,
                MenuChoice::NewStory => StoryMode::NewStory,
                MenuChoice::Quit => break,
            }
        };
        let question = match mode {
            StoryMode::NewStory => "What story would you like to hear tonight? ",
            StoryMode::Continuation => "What should happen in the next episode? ",
        };
        let Some(request) = console.prompt_request(question)? else {
            break;
        };

        console.status(&format!("Writing your {}...", mode.noun()))?;
        let presented = match storyteller.tell(session, &request, mode).await {
            Ok(presented) => presented,
            Err(err) => {
                warn!(error = %err, "Story cycle aborted");
                console.status(&format!("Sorry, I couldn't write that {}: {err}", mode.noun()))?;
                continue;
            }
        };
        console.show_story(&presented)?;

        let feedback = console.collect_feedback(storyteller.feedback_policy(), mode)?;
        if storyteller.will_revise(&presented, &feedback) {
            console.status("Thank you! Let me improve the story...")?;
        }
        let offered = presented.continuation_offered;
        match storyteller.apply_feedback(session, presented, feedback).await {
            Ok(outcome) => {
                if let Some(text) = &outcome.revision {
                    console.show_revision(text)?;
                }
                continuation_offered = offered;
            }
            Err(err) => {
                warn!(error = %err, "Feedback revision failed");
                console.status(&format!("Sorry, I couldn't revise the story: {err}"))?;
            }
        }
    }

    info!(stories = session.stories_told(), "Session finished");
    console.farewell(session)?;
    Ok(())
}
