//! Session identity acquisition.
//!
//! The display name is obtained once, before any other component starts.
//! [`acquire_step`] judges a single prompt answer; [`acquire_identity`]
//! keeps prompting until one is accepted. There is no retry limit.

use std::fmt;
use std::io::{BufRead, Write};

use tracing::debug;

use crate::error::{GopherError, Result};

/// Prompt text shown when asking for a display name.
pub const NAME_PROMPT: &str = "Enter your name: ";

/// The player's display name for this session. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    /// Wrap a display name.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::EmptyName`] for the empty string.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GopherError::EmptyName);
        }
        Ok(Self(name))
    }

    /// The display name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of judging one prompt answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// A usable name was supplied.
    Ready(SessionIdentity),
    /// Empty or cancelled; ask again.
    Retry,
}

/// Judge a single prompt answer. `None` is a cancelled prompt.
///
/// Empty input and cancellation are treated the same. Whitespace is kept
/// as typed.
pub fn acquire_step(input: Option<String>) -> Acquisition {
    match input.map(SessionIdentity::new) {
        Some(Ok(identity)) => Acquisition::Ready(identity),
        _ => Acquisition::Retry,
    }
}

/// Source of display-name answers.
pub trait NamePrompt {
    /// Show `message` and wait for an answer.
    ///
    /// Returns `Ok(None)` if the user cancelled the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error when no further answers can ever arrive, such as
    /// [`GopherError::PromptClosed`] at end of input.
    fn prompt(&mut self, message: &str) -> Result<Option<String>>;
}

/// Prompt until a non-empty name is supplied.
///
/// Blocks the calling thread for as long as the prompt does.
///
/// # Errors
///
/// Only errors reported by the prompt itself are returned.
pub fn acquire_identity(prompt: &mut impl NamePrompt) -> Result<SessionIdentity> {
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match acquire_step(prompt.prompt(NAME_PROMPT)?) {
            Acquisition::Ready(identity) => {
                debug!(attempts, name = %identity, "session identity acquired");
                return Ok(identity);
            }
            Acquisition::Retry => debug!(attempts, "empty or cancelled name, prompting again"),
        }
    }
}

/// A [`NamePrompt`] that writes the prompt to `output` and reads one line
/// from `input` per answer.
///
/// Only the trailing line terminator is removed from the answer.
#[derive(Debug)]
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> NamePrompt for LinePrompt<R, W> {
    fn prompt(&mut self, message: &str) -> Result<Option<String>> {
        self.output.write_all(message.as_bytes())?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(GopherError::PromptClosed);
        }
        let answer = line.strip_suffix('\n').unwrap_or(&line);
        let answer = answer.strip_suffix('\r').unwrap_or(answer);
        Ok(Some(answer.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Replays scripted answers and counts how often it was asked.
    struct ScriptedPrompt {
        answers: VecDeque<Option<String>>,
        asked: usize,
    }

    impl ScriptedPrompt {
        fn new(answers: Vec<Option<&str>>) -> Self {
            Self {
                answers: answers.into_iter().map(|a| a.map(String::from)).collect(),
                asked: 0,
            }
        }
    }

    impl NamePrompt for ScriptedPrompt {
        fn prompt(&mut self, message: &str) -> Result<Option<String>> {
            assert_eq!(message, NAME_PROMPT);
            self.asked += 1;
            self.answers.pop_front().ok_or(GopherError::PromptClosed)
        }
    }

    #[test]
    fn first_non_empty_answer_wins() {
        let mut prompt = ScriptedPrompt::new(vec![Some("Ava")]);
        let identity = acquire_identity(&mut prompt).unwrap();
        assert_eq!(identity.as_str(), "Ava");
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn empty_and_cancelled_answers_reprompt() {
        let mut prompt = ScriptedPrompt::new(vec![Some(""), None, Some(""), Some("Ava")]);
        let identity = acquire_identity(&mut prompt).unwrap();
        assert_eq!(identity.as_str(), "Ava");
        assert_eq!(prompt.asked, 4);
    }

    #[test]
    fn never_returns_without_a_name() {
        // Only cancellations: the loop keeps asking until the prompt itself gives up.
        let mut prompt = ScriptedPrompt::new(vec![None; 50]);
        let err = acquire_identity(&mut prompt).unwrap_err();
        assert!(matches!(err, GopherError::PromptClosed));
        assert_eq!(prompt.asked, 51);
    }

    #[test]
    fn step_judges_single_answers() {
        assert_eq!(acquire_step(None), Acquisition::Retry);
        assert_eq!(acquire_step(Some(String::new())), Acquisition::Retry);
        assert_eq!(
            acquire_step(Some("  ".into())),
            Acquisition::Ready(SessionIdentity::new("  ").unwrap())
        );
    }

    #[test]
    fn identity_rejects_empty_name() {
        assert!(matches!(
            SessionIdentity::new(""),
            Err(GopherError::EmptyName)
        ));
    }

    #[test]
    fn line_prompt_strips_line_terminator_only() {
        let input = Cursor::new("\n Ava \r\n");
        let mut output = Vec::new();
        let identity = {
            let mut prompt = LinePrompt::new(input, &mut output);
            acquire_identity(&mut prompt).unwrap()
        };
        assert_eq!(identity.as_str(), " Ava ");
        assert_eq!(String::from_utf8(output).unwrap(), NAME_PROMPT.repeat(2));
    }

    #[test]
    fn line_prompt_eof_is_prompt_closed() {
        let mut prompt = LinePrompt::new(Cursor::new(""), Vec::new());
        assert!(matches!(
            prompt.prompt(NAME_PROMPT),
            Err(GopherError::PromptClosed)
        ));
    }
}
