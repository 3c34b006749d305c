//! Configuration constants for the quiz competition engine
//!
//! This module contains the limits and timing constants used throughout
//! the engine to bound input sizes and pace the phases of a round.

/// Question deck configuration constants
pub mod deck {
    /// Maximum number of questions allowed in a single deck
    pub const MAX_QUESTION_COUNT: usize = 100;
    /// Maximum length of a deck title in characters
    pub const MAX_TITLE_LENGTH: usize = 200;
    /// Maximum length of a question text in characters
    pub const MAX_TEXT_LENGTH: usize = 300;
    /// Minimum number of answer options for a question
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of answer options for a question
    pub const MAX_OPTION_COUNT: usize = 8;
    /// Maximum length of a single answer option in characters
    pub const MAX_OPTION_LENGTH: usize = 200;
    /// Minimum advisory time limit in seconds for answering a question
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum advisory time limit in seconds for answering a question
    pub const MAX_TIME_LIMIT: u64 = 240;
}

/// Participant registry configuration constants
pub mod registry {
    /// Maximum number of participants allowed in a single game
    pub const MAX_PARTICIPANT_COUNT: usize = 1000;
    /// Maximum length of a participant's first or last name
    pub const MAX_NAME_LENGTH: usize = 30;
}

/// Pacing constants for the round coordinator
pub mod timing {
    /// Seconds between the "game started" notice and the first question,
    /// giving clients time to finish their own state transition
    pub const GAME_START_SETTLE_SECONDS: u64 = 3;
    /// Seconds between a reveal pass and the next question broadcast
    pub const REVEAL_PAUSE_SECONDS: u64 = 2;
    /// Grace window in seconds before reporting "game started" acknowledgments
    pub const START_ACK_GRACE_SECONDS: u64 = 3;
    /// Grace window in seconds before reporting per-question acknowledgments
    pub const QUESTION_ACK_GRACE_SECONDS: u64 = 5;
}
