//! Question deck configuration
//!
//! This module defines the immutable question material for a game: the
//! [`Deck`] loaded by the host before play and the per-question
//! [`QuestionView`] projection sent to participants. The correct answer
//! index lives only in the deck; it reaches participants exclusively
//! through reveal outcomes, never inside a question broadcast.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

type ValidationResult = garde::Result;

/// Validates that a duration falls within specified bounds
///
/// # Arguments
///
/// * `field` - Name of the field being validated (for error messages)
/// * `val` - The duration value to validate
///
/// # Returns
///
/// `Ok(())` if the duration is valid, `Err` with descriptive message if not
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

/// Validates the advisory time limit for answering a question
fn validate_time_limit(val: &Duration) -> ValidationResult {
    validate_duration::<
        { crate::constants::deck::MIN_TIME_LIMIT },
        { crate::constants::deck::MAX_TIME_LIMIT },
    >("time_limit", val)
}

/// Validates that the correct answer index points at an existing option
fn validate_correct_answer(correct_answer: usize, options: &[String]) -> ValidationResult {
    if correct_answer < options.len() {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "correct_answer {correct_answer} is out of range for {} options",
            options.len()
        )))
    }
}

/// A single multiple choice question
///
/// Questions are identified by a stable numeric id that participants echo
/// back in answers and acknowledgments, which lets the engine discard
/// submissions that raced a round transition.
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Stable identifier, unique within the deck
    #[garde(skip)]
    id: u32,
    /// The question text displayed to participants
    #[garde(length(max = crate::constants::deck::MAX_TEXT_LENGTH))]
    text: String,
    /// Answer options, presented in order
    #[garde(
        length(min = crate::constants::deck::MIN_OPTION_COUNT, max = crate::constants::deck::MAX_OPTION_COUNT),
        inner(length(max = crate::constants::deck::MAX_OPTION_LENGTH))
    )]
    options: Vec<String>,
    /// Index into `options` of the correct answer
    #[garde(custom(|v: &usize, _| validate_correct_answer(*v, &self.options)))]
    correct_answer: usize,
    /// Advisory answering time, forwarded to clients for countdown display
    #[garde(custom(|v, _| validate_time_limit(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    time_limit: Duration,
}

impl Question {
    /// Creates a question; call `validate()` before putting it in play
    pub fn new(
        id: u32,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: usize,
        time_limit: Duration,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            options,
            correct_answer,
            time_limit,
        }
    }

    /// The question's stable identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The question text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The answer options in display order
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Index of the correct option
    pub fn correct_answer(&self) -> usize {
        self.correct_answer
    }

    /// The advisory answering time
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Whether the given option index is the correct one
    pub fn is_correct(&self, answer_index: usize) -> bool {
        answer_index == self.correct_answer
    }

    /// Produces the participant-facing projection of this question
    ///
    /// The view deliberately omits the correct answer index.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            text: self.text.clone(),
            options: self.options.clone(),
        }
    }
}

/// Participant-facing projection of a question
///
/// Carries everything a client needs to render the round and nothing
/// that would let it derive the answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    /// Stable identifier, echoed back in answers and acknowledgments
    pub id: u32,
    /// The question text
    pub text: String,
    /// Answer options in display order
    pub options: Vec<String>,
}

/// A complete question deck for one game
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Deck {
    /// Title of the deck (displayed on operator consoles)
    #[garde(length(max = crate::constants::deck::MAX_TITLE_LENGTH))]
    title: String,

    /// The questions in play order
    #[garde(length(max = crate::constants::deck::MAX_QUESTION_COUNT), dive)]
    questions: Vec<Question>,
}

impl Deck {
    /// Creates a deck; call `validate()` before putting it in play
    pub fn new(title: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            title: title.into(),
            questions,
        }
    }

    /// The deck title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of questions in the deck
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the deck has no questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// The question at the given play-order index
    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}
