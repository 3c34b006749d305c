//! Core game logic and round coordination
//!
//! This module contains the main game struct and the logic that drives a
//! quiz competition from registration through elimination rounds to the
//! winner announcement. All progression is operator-paced: rounds open
//! when an operator broadcasts a question and close when an operator
//! advances, never on a client-side timer. The short delays between
//! phases (settling after game start, pausing after a reveal) are
//! expressed as scheduled alarm messages tagged with a generation
//! counter, so a reset invalidates everything still in flight.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use web_time::SystemTime;

use super::{
    AlarmMessage as CrateAlarmMessage, SyncMessage as CrateSyncMessage,
    UpdateMessage as CrateUpdateMessage,
    acks::{AckTracker, BroadcastKind},
    admin::{AdminChannel, AdminMessage, Snapshot},
    constants::timing,
    deck::{Deck, QuestionView},
    registry::{self, ConnectionId, Participant, Roster, SessionToken, Status, StudentId},
    session::Tunnel,
};

/// The phase of the game
///
/// The game moves forward through these phases and returns to `Waiting`
/// only by an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Accepting registrations; no question in play
    Waiting,
    /// Rounds in progress
    Playing,
    /// Winners computed and announced
    Finished,
}

/// Why a participant was eliminated during a reveal pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    /// No answer was recorded when the round closed
    Timeout,
    /// The recorded answer was incorrect
    WrongAnswer,
}

/// Rejections for host commands
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The sending connection is not a registered operator console
    #[error("connection is not an operator console")]
    Unauthorized,
    /// A start command arrived while a game was already in progress
    #[error("the game has already started")]
    GameAlreadyPlaying,
    /// An advance command arrived with no game in progress
    #[error("no game is in progress")]
    GameNotPlaying,
}

/// The main game session struct
///
/// Owns the deck, the participant roster, the operator console set, and
/// all round state. Every operation takes a `tunnel_finder` closure to
/// resolve connections into live transport tunnels, and the operations
/// that pace rounds additionally take a `schedule_message` closure for
/// deferred alarms.
pub struct Game {
    /// The question material for this game
    deck: Deck,
    /// All registered participants and their session/connection indices
    pub roster: Roster,
    /// Connected operator consoles
    pub admins: AdminChannel,
    /// Current phase of the game
    phase: Phase,
    /// Index into the deck of the question in play (valid while `Playing`)
    current_index: usize,
    /// When the current question was broadcast, for remaining-time math
    question_sent_at: Option<SystemTime>,
    /// Delivery acknowledgment bookkeeping
    acks: AckTracker,
    /// Winners of the finished game, in computation order
    winners: Vec<StudentId>,
    /// Bumped on every phase transition; stale alarms carry old values
    /// and are dropped on receipt
    generation: u64,
    /// Bumped only on reset, so delivery reports for a broadcast survive
    /// an operator advancing inside the grace window
    ack_generation: u64,
}

impl Debug for Game {
    /// Custom debug implementation that avoids printing large amounts of data
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("phase", &self.phase)
            .field("current_index", &self.current_index)
            .finish_non_exhaustive()
    }
}

/// The role the engine has on record for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SenderRole {
    /// A registered operator console
    Host,
    /// A connection bound to a registered participant
    Player,
    /// A connection with no binding yet
    Unassigned,
}

/// Messages received from connected clients
///
/// This enum categorizes incoming messages based on the sender's role,
/// ensuring that only appropriate messages are processed from each
/// connection type.
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingMessage {
    /// Messages from the game host consoles
    Host(IncomingHostMessage),
    /// Messages from connections not yet bound to a participant
    Unassigned(IncomingUnassignedMessage),
    /// Messages from registered participants
    Player(IncomingPlayerMessage),
}

impl IncomingMessage {
    /// Validates that a message matches the sender's role
    fn follows(&self, sender_role: SenderRole) -> bool {
        matches!(
            (self, sender_role),
            (IncomingMessage::Host(_), SenderRole::Host)
                | (IncomingMessage::Player(_), SenderRole::Player)
                | (IncomingMessage::Unassigned(_), SenderRole::Unassigned)
        )
    }
}

/// Messages that can be sent by connections not yet bound to a participant
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingUnassignedMessage {
    /// Request to register as a new participant
    Register {
        /// Client-chosen opaque session token
        token: SessionToken,
        /// First name as it should appear on consoles
        first_name: String,
        /// Last name as it should appear on consoles
        last_name: String,
        /// Self-asserted student identifier
        student_id: StudentId,
    },
    /// Request to restore an existing session onto this connection
    Reconnect {
        /// The token presented at original registration
        token: SessionToken,
        /// The student identifier the session was created for
        student_id: StudentId,
    },
}

/// Messages that can be sent by registered participants
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingPlayerMessage {
    /// Record (or overwrite) an answer for the question in play
    SubmitAnswer {
        /// Identifier of the question being answered
        question_id: u32,
        /// Selected option index
        answer_index: usize,
    },
    /// Acknowledge receipt of the "game started" notice
    AckGameStarted,
    /// Acknowledge receipt of a question broadcast
    AckQuestionReceived {
        /// Identifier of the received question
        question_id: u32,
    },
}

/// Messages that can be sent by operator consoles
#[derive(Debug, Deserialize, Clone, Copy)]
pub enum IncomingHostMessage {
    /// Move every waiting participant into play and begin the rounds
    StartGame,
    /// Close the current round: reveal, eliminate, and move on
    AdvanceRound,
    /// Return to the waiting phase, preserving the roster
    ResetGame,
}

/// Update messages sent to participants about game state changes
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum UpdateMessage {
    /// Registration succeeded; the connection is now a participant
    RegistrationAccepted {
        /// Initial lifecycle status (always waiting)
        status: Status,
    },
    /// Registration was rejected and the connection remains unbound
    RegistrationRejected {
        /// Machine-readable rejection
        reason: registry::Error,
        /// Human-readable rejection text
        message: String,
    },
    /// Session restore succeeded; the connection is bound again
    ReconnectAccepted {
        /// Current lifecycle status
        status: Status,
        /// Correct answers so far this game
        score: usize,
        /// One-based number of the question in play, if any
        question_number: Option<usize>,
        /// Questions in the deck
        total_questions: usize,
        /// The question in play, if the participant should be answering
        current_question: Option<QuestionView>,
        /// Advisory time left on the question in play, clamped at zero
        #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
        time_remaining: Option<web_time::Duration>,
    },
    /// Session restore failed
    ReconnectRejected {
        /// Machine-readable rejection
        reason: registry::Error,
        /// Human-readable rejection text
        message: String,
    },
    /// The game left the waiting phase; the recipient is now playing
    GameStarted {
        /// Questions in the deck
        total_questions: usize,
    },
    /// A new question is in play
    QuestionBroadcast {
        /// One-based number of this question
        question_number: usize,
        /// Questions in the deck
        total_questions: usize,
        /// The question to answer
        question: QuestionView,
    },
    /// The recipient's answer was recorded for the current round
    AnswerReceived {
        /// The recorded option index
        answer_index: usize,
    },
    /// Reveal outcome for the recipient's answer to the closed round
    AnswerOutcome {
        /// Whether the recipient answered correctly
        correct: bool,
        /// The correct option index
        correct_answer_index: usize,
        /// The recipient's recorded answer, if any
        your_answer: Option<usize>,
        /// Present and `true` when the outcome eliminated the recipient
        eliminated: Option<bool>,
    },
    /// The recipient was eliminated from the game
    Eliminated {
        /// Correct answers at the moment of elimination
        score: usize,
        /// Questions in the deck
        total_questions: usize,
        /// Why the recipient was eliminated
        reason: EliminationReason,
    },
    /// The recipient survived the whole deck and won
    Won {
        /// Correct answers (equal to the deck size)
        score: usize,
        /// Questions in the deck
        total_questions: usize,
    },
    /// The game finished
    GameFinished {
        /// Number of winners
        winner_count: usize,
    },
    /// The game was reset to the waiting phase
    GameReset,
    /// A host command was rejected
    CommandRejected(CommandError),
}

/// Sync messages sent to participants to synchronize their view
///
/// Sent when a connection needs a full picture of the current game state
/// rather than an incremental update.
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum SyncMessage {
    /// Current game status for a participant or unbound connection
    Status {
        /// Current phase of the game
        phase: Phase,
        /// One-based number of the question in play, if any
        question_number: Option<usize>,
        /// Questions in the deck
        total_questions: usize,
        /// The question in play, if one is
        current_question: Option<QuestionView>,
    },
}

/// Alarm messages scheduled by the round coordinator
///
/// Each alarm carries the generation it was scheduled under; an alarm
/// whose generation no longer matches the game's is stale and dropped.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum AlarmMessage {
    /// Broadcast the question at the current index
    ProceedToQuestion {
        /// Generation the alarm was scheduled under
        generation: u64,
    },
    /// Report the acknowledgment tally for a tracked broadcast
    AckReportDue {
        /// Which broadcast the report covers
        kind: BroadcastKind,
        /// Generation the alarm was scheduled under
        generation: u64,
    },
}

impl Game {
    /// Creates a game in the waiting phase with an empty roster
    ///
    /// The deck should be validated before it is handed over.
    pub fn new(deck: Deck) -> Self {
        Self {
            deck,
            roster: Roster::default(),
            admins: AdminChannel::default(),
            phase: Phase::Waiting,
            current_index: 0,
            question_sent_at: None,
            acks: AckTracker::default(),
            winners: Vec::new(),
            generation: 0,
            ack_generation: 0,
        }
    }

    /// The current phase of the game
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The question currently in play, when there is one
    pub fn current_question(&self) -> Option<&crate::deck::Question> {
        match self.phase {
            Phase::Playing => self.deck.get(self.current_index),
            _ => None,
        }
    }

    /// Advisory time left on the question in play, clamped at zero
    pub fn time_remaining(&self) -> Option<web_time::Duration> {
        let question = self.current_question()?;
        let sent_at = self.question_sent_at?;
        let elapsed = sent_at.elapsed().unwrap_or_default();
        Some(question.time_limit().saturating_sub(elapsed))
    }

    /// Winners of the finished game
    pub fn winners(&self) -> &[StudentId] {
        &self.winners
    }

    /// Determines the role on record for a connection
    fn sender_role(&self, connection: ConnectionId) -> SenderRole {
        if self.admins.contains(&connection) {
            SenderRole::Host
        } else if self.roster.student_by_connection(&connection).is_some() {
            SenderRole::Player
        } else {
            SenderRole::Unassigned
        }
    }

    /// Sends an update message directly to a connection, bound or not
    fn send_to_connection<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        message: &CrateUpdateMessage,
        connection: ConnectionId,
        tunnel_finder: F,
    ) {
        if let Some(session) = tunnel_finder(connection) {
            session.send_message(message);
        }
    }

    /// Builds the operator console snapshot of the whole engine state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            participant_count: self.roster.len(),
            current_question: match self.phase {
                Phase::Playing => Some(self.current_index + 1),
                _ => None,
            },
            total_questions: self.deck.len(),
            participants: self.roster.overview(),
            winners: self
                .winners
                .iter()
                .filter_map(|id| self.roster.get(id))
                .map(Participant::overview)
                .collect(),
        }
    }

    /// Returns the message necessary to synchronize a connection's view
    ///
    /// Operator consoles get the full snapshot; everyone else gets the
    /// participant-grade status.
    pub fn state_message(&self, connection: ConnectionId) -> CrateSyncMessage {
        match self.sender_role(connection) {
            SenderRole::Host => CrateSyncMessage::Admin(self.snapshot()),
            SenderRole::Player | SenderRole::Unassigned => SyncMessage::Status {
                phase: self.phase,
                question_number: match self.phase {
                    Phase::Playing => Some(self.current_index + 1),
                    _ => None,
                },
                total_questions: self.deck.len(),
                current_question: self.current_question().map(crate::deck::Question::view),
            }
            .into(),
        }
    }

    /// Registers a connection as an operator console and synchronizes it
    pub fn connect_admin<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        connection: ConnectionId,
        tunnel_finder: F,
    ) {
        self.admins.connect(connection);
        self.admins.send_state(
            &CrateSyncMessage::Admin(self.snapshot()),
            connection,
            tunnel_finder,
        );
    }

    /// Handles a dropped connection, console or participant
    ///
    /// Participant sessions survive this; only the live binding goes away.
    pub fn disconnect<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        connection: ConnectionId,
        tunnel_finder: F,
    ) {
        self.admins.disconnect(&connection);
        if let Some(student_id) = self.roster.disconnect(&connection) {
            self.admins.broadcast(
                &AdminMessage::ParticipantDisconnected { student_id }.into(),
                tunnel_finder,
            );
        }
    }

    /// Registers a new participant on an unbound connection
    fn register<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        connection: ConnectionId,
        token: SessionToken,
        first_name: &str,
        last_name: &str,
        student_id: StudentId,
        tunnel_finder: F,
    ) {
        let result = if self.phase == Phase::Waiting {
            self.roster
                .register(connection, token, first_name, last_name, student_id.clone())
        } else {
            Err(registry::Error::GameAlreadyStarted)
        };

        match result {
            Ok(()) => {
                Self::send_to_connection(
                    &UpdateMessage::RegistrationAccepted {
                        status: Status::Waiting,
                    }
                    .into(),
                    connection,
                    &tunnel_finder,
                );
                if let Some(participant) = self.roster.get(&student_id) {
                    self.admins.broadcast(
                        &AdminMessage::ParticipantJoined {
                            participant: participant.overview(),
                            total_participants: self.roster.len(),
                        }
                        .into(),
                        &tunnel_finder,
                    );
                }
            }
            Err(reason) => {
                let message = reason.to_string();
                Self::send_to_connection(
                    &UpdateMessage::RegistrationRejected { reason, message }.into(),
                    connection,
                    &tunnel_finder,
                );
            }
        }
    }

    /// Restores a session onto an unbound connection
    fn reconnect<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        connection: ConnectionId,
        token: &SessionToken,
        student_id: &StudentId,
        tunnel_finder: F,
    ) {
        let overview = match self.roster.reconnect(token, student_id, connection) {
            Ok(participant) => participant.overview(),
            Err(reason) => {
                let message = reason.to_string();
                Self::send_to_connection(
                    &UpdateMessage::ReconnectRejected { reason, message }.into(),
                    connection,
                    &tunnel_finder,
                );
                return;
            }
        };

        // A participant mid-round gets the question again along with
        // what is left of its advisory timer. During the pause between
        // a reveal and the next broadcast no question is in flight, so
        // nothing is resumed.
        let in_round = overview.status == Status::Playing
            && self.phase == Phase::Playing
            && self.question_sent_at.is_some();
        let current_question = if in_round {
            self.current_question().map(crate::deck::Question::view)
        } else {
            None
        };
        let time_remaining = if in_round { self.time_remaining() } else { None };

        Self::send_to_connection(
            &UpdateMessage::ReconnectAccepted {
                status: overview.status,
                score: overview.correct_answers,
                question_number: if in_round {
                    Some(self.current_index + 1)
                } else {
                    None
                },
                total_questions: self.deck.len(),
                current_question,
                time_remaining,
            }
            .into(),
            connection,
            &tunnel_finder,
        );
        self.admins.broadcast(
            &AdminMessage::ParticipantReconnected {
                participant: overview,
            }
            .into(),
            &tunnel_finder,
        );
    }

    /// Moves every waiting participant into play and begins the rounds
    ///
    /// The first question goes out after a settle delay; a delivery
    /// report for the start notice goes out after its grace window.
    ///
    /// # Errors
    ///
    /// `CommandError::GameAlreadyPlaying` if the game is not waiting.
    pub fn start_game<
        T: Tunnel,
        F: Fn(ConnectionId) -> Option<T>,
        S: FnMut(CrateAlarmMessage, web_time::Duration),
    >(
        &mut self,
        mut schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), CommandError> {
        if self.phase != Phase::Waiting {
            return Err(CommandError::GameAlreadyPlaying);
        }

        self.phase = Phase::Playing;
        self.current_index = 0;
        self.question_sent_at = None;
        self.winners.clear();
        self.generation += 1;

        let started = self.roster.start_all_waiting();
        self.acks
            .begin(BroadcastKind::GameStart, started.iter().cloned());

        let notice: CrateUpdateMessage = UpdateMessage::GameStarted {
            total_questions: self.deck.len(),
        }
        .into();
        for student_id in &started {
            self.roster
                .send_message(&notice, student_id, &tunnel_finder);
        }

        self.admins.broadcast(
            &AdminMessage::GameStarted {
                participant_count: started.len(),
                total_questions: self.deck.len(),
            }
            .into(),
            &tunnel_finder,
        );

        schedule_message(
            AlarmMessage::ProceedToQuestion {
                generation: self.generation,
            }
            .into(),
            web_time::Duration::from_secs(timing::GAME_START_SETTLE_SECONDS),
        );
        schedule_message(
            AlarmMessage::AckReportDue {
                kind: BroadcastKind::GameStart,
                generation: self.ack_generation,
            }
            .into(),
            web_time::Duration::from_secs(timing::START_ACK_GRACE_SECONDS),
        );

        Ok(())
    }

    /// Broadcasts the question at the current index to every playing
    /// participant
    ///
    /// Ends the game instead when the deck is exhausted or nobody is
    /// left playing.
    fn broadcast_question<
        T: Tunnel,
        F: Fn(ConnectionId) -> Option<T>,
        S: FnMut(CrateAlarmMessage, web_time::Duration),
    >(
        &mut self,
        mut schedule_message: S,
        tunnel_finder: F,
    ) {
        if self.phase != Phase::Playing {
            return;
        }

        let playing = self.roster.playing();
        let Some(question) = self.deck.get(self.current_index) else {
            self.end_game(tunnel_finder);
            return;
        };
        if playing.is_empty() {
            self.end_game(tunnel_finder);
            return;
        }

        let view = question.view();
        self.question_sent_at = Some(SystemTime::now());

        for student_id in &playing {
            self.roster.clear_answer(student_id);
        }
        self.acks
            .begin(BroadcastKind::Question, playing.iter().cloned());

        let broadcast: CrateUpdateMessage = UpdateMessage::QuestionBroadcast {
            question_number: self.current_index + 1,
            total_questions: self.deck.len(),
            question: view,
        }
        .into();
        for student_id in &playing {
            self.roster
                .send_message(&broadcast, student_id, &tunnel_finder);
        }

        self.admins.broadcast(
            &AdminMessage::QuestionSent {
                question_number: self.current_index + 1,
                total_questions: self.deck.len(),
                sent_count: playing.len(),
            }
            .into(),
            &tunnel_finder,
        );

        schedule_message(
            AlarmMessage::AckReportDue {
                kind: BroadcastKind::Question,
                generation: self.ack_generation,
            }
            .into(),
            web_time::Duration::from_secs(timing::QUESTION_ACK_GRACE_SECONDS),
        );
    }

    /// Records (or overwrites) a participant's answer for the round
    ///
    /// Submissions for any question other than the one in play are
    /// discarded; they raced a round transition and arrived late.
    fn submit_answer<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        student_id: &StudentId,
        question_id: u32,
        answer_index: usize,
        tunnel_finder: F,
    ) {
        if self.phase != Phase::Playing {
            return;
        }
        let Some(question) = self.current_question() else {
            return;
        };
        if question.id() != question_id {
            return;
        }
        if self.roster.get(student_id).map(Participant::status) != Some(Status::Playing) {
            return;
        }

        self.roster.record_answer(student_id, answer_index);
        self.roster.send_message(
            &UpdateMessage::AnswerReceived { answer_index }.into(),
            student_id,
            &tunnel_finder,
        );

        if let Some(participant) = self.roster.get(student_id) {
            self.admins.broadcast(
                &AdminMessage::ParticipantAnswered {
                    participant: participant.overview(),
                    answered_count: self.roster.answered_count(),
                    playing_count: self.roster.status_count(Status::Playing),
                }
                .into(),
                &tunnel_finder,
            );
        }
    }

    /// Closes the current round: reveals the outcome to every playing
    /// participant, eliminates the ones that missed, and moves on
    ///
    /// The next question follows after a reveal pause; if the deck is
    /// exhausted the game ends instead.
    ///
    /// # Errors
    ///
    /// `CommandError::GameNotPlaying` if no round is in progress.
    pub fn advance_round<
        T: Tunnel,
        F: Fn(ConnectionId) -> Option<T>,
        S: FnMut(CrateAlarmMessage, web_time::Duration),
    >(
        &mut self,
        mut schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), CommandError> {
        if self.phase != Phase::Playing {
            return Err(CommandError::GameNotPlaying);
        }
        let Some(question) = self.deck.get(self.current_index) else {
            self.end_game(tunnel_finder);
            return Ok(());
        };
        let correct_answer_index = question.correct_answer();
        let total_questions = self.deck.len();

        for student_id in self.roster.playing() {
            let answer = self
                .roster
                .get(&student_id)
                .and_then(Participant::current_answer);

            match answer {
                Some(answer_index) if answer_index == correct_answer_index => {
                    self.roster.record_correct(&student_id);
                    self.roster.send_message(
                        &UpdateMessage::AnswerOutcome {
                            correct: true,
                            correct_answer_index,
                            your_answer: Some(answer_index),
                            eliminated: None,
                        }
                        .into(),
                        &student_id,
                        &tunnel_finder,
                    );
                    if let Some(participant) = self.roster.get(&student_id) {
                        self.admins.broadcast(
                            &AdminMessage::ScoreUpdated {
                                participant: participant.overview(),
                            }
                            .into(),
                            &tunnel_finder,
                        );
                    }
                }
                answer => {
                    let reason = match answer {
                        None => EliminationReason::Timeout,
                        Some(_) => EliminationReason::WrongAnswer,
                    };
                    self.roster.mark_eliminated(&student_id);

                    let (score, overview) = match self.roster.get(&student_id) {
                        Some(participant) => {
                            (participant.correct_answers(), participant.overview())
                        }
                        None => continue,
                    };

                    self.roster.send_message(
                        &UpdateMessage::AnswerOutcome {
                            correct: false,
                            correct_answer_index,
                            your_answer: answer,
                            eliminated: Some(true),
                        }
                        .into(),
                        &student_id,
                        &tunnel_finder,
                    );
                    self.roster.send_message(
                        &UpdateMessage::Eliminated {
                            score,
                            total_questions,
                            reason,
                        }
                        .into(),
                        &student_id,
                        &tunnel_finder,
                    );
                    self.admins.broadcast(
                        &AdminMessage::ParticipantEliminated {
                            participant: overview,
                            reason,
                            remaining_players: self.roster.status_count(Status::Playing),
                        }
                        .into(),
                        &tunnel_finder,
                    );
                }
            }

            self.roster.clear_answer(&student_id);
        }

        self.current_index += 1;
        self.question_sent_at = None;
        self.generation += 1;

        if self.current_index >= self.deck.len() || self.roster.status_count(Status::Playing) == 0
        {
            self.end_game(tunnel_finder);
        } else {
            schedule_message(
                AlarmMessage::ProceedToQuestion {
                    generation: self.generation,
                }
                .into(),
                web_time::Duration::from_secs(timing::REVEAL_PAUSE_SECONDS),
            );
        }

        Ok(())
    }

    /// Finishes the game: computes winners, announces them, and mirrors
    /// the result to operator consoles
    ///
    /// A winner is a participant still playing with a correct answer for
    /// every question in the deck.
    fn end_game<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.phase = Phase::Finished;
        self.question_sent_at = None;
        self.generation += 1;

        let total_questions = self.deck.len();
        self.winners = self
            .roster
            .playing()
            .into_iter()
            .filter(|id| {
                self.roster
                    .get(id)
                    .is_some_and(|p| p.correct_answers() == total_questions)
            })
            .collect();

        for student_id in self.winners.clone() {
            let score = self
                .roster
                .get(&student_id)
                .map(Participant::correct_answers)
                .unwrap_or_default();
            self.roster.send_message(
                &UpdateMessage::Won {
                    score,
                    total_questions,
                }
                .into(),
                &student_id,
                &tunnel_finder,
            );
            self.roster.set_status(&student_id, Status::Winner);
        }

        let winner_overviews: Vec<_> = self
            .winners
            .iter()
            .filter_map(|id| self.roster.get(id))
            .map(Participant::overview)
            .collect();

        self.roster.announce_all(
            &UpdateMessage::GameFinished {
                winner_count: self.winners.len(),
            }
            .into(),
            &tunnel_finder,
        );
        self.admins.broadcast(
            &AdminMessage::GameEnded {
                winner_count: winner_overviews.len(),
                winners: winner_overviews,
            }
            .into(),
            &tunnel_finder,
        );
    }

    /// Returns the game to the waiting phase, preserving the roster
    ///
    /// All per-game state is discarded: scores, answers, eliminations,
    /// acknowledgment tallies, and any alarms still in flight (their
    /// generation no longer matches).
    pub fn reset_game<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.phase = Phase::Waiting;
        self.current_index = 0;
        self.question_sent_at = None;
        self.winners.clear();
        self.acks.clear_all();
        self.generation += 1;
        self.ack_generation += 1;
        self.roster.reset_all();

        self.roster
            .announce_all(&UpdateMessage::GameReset.into(), &tunnel_finder);
        self.admins
            .broadcast(&AdminMessage::GameReset.into(), &tunnel_finder);
        self.admins.broadcast_state(
            &CrateSyncMessage::Admin(self.snapshot()),
            &tunnel_finder,
        );
    }

    /// Records an acknowledgment from a participant
    fn record_ack<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &mut self,
        kind: BroadcastKind,
        student_id: &StudentId,
        tunnel_finder: F,
    ) {
        if self.acks.record(kind, student_id) {
            self.admins.broadcast(
                &AdminMessage::AckProgress {
                    kind,
                    acked: self.acks.acked_count(kind),
                    targeted: self.acks.targeted_count(kind),
                }
                .into(),
                &tunnel_finder,
            );
        }
    }

    /// Handles a message from a connected client
    ///
    /// The engine checks the sender's role first: host commands from
    /// anyone but a registered console are rejected with `Unauthorized`,
    /// and role-mismatched participant messages are dropped.
    pub fn receive_message<
        T: Tunnel,
        F: Fn(ConnectionId) -> Option<T>,
        S: FnMut(CrateAlarmMessage, web_time::Duration),
    >(
        &mut self,
        connection: ConnectionId,
        message: IncomingMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        let role = self.sender_role(connection);

        if !message.follows(role) {
            if matches!(message, IncomingMessage::Host(_)) {
                Self::send_to_connection(
                    &UpdateMessage::CommandRejected(CommandError::Unauthorized).into(),
                    connection,
                    &tunnel_finder,
                );
            }
            return;
        }

        match message {
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Register {
                token,
                first_name,
                last_name,
                student_id,
            }) => {
                self.register(
                    connection,
                    token,
                    &first_name,
                    &last_name,
                    student_id,
                    tunnel_finder,
                );
            }
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Reconnect {
                token,
                student_id,
            }) => {
                self.reconnect(connection, &token, &student_id, tunnel_finder);
            }
            IncomingMessage::Player(player_message) => {
                let Some(student_id) = self.roster.student_by_connection(&connection).cloned()
                else {
                    return;
                };
                match player_message {
                    IncomingPlayerMessage::SubmitAnswer {
                        question_id,
                        answer_index,
                    } => {
                        self.submit_answer(&student_id, question_id, answer_index, tunnel_finder);
                    }
                    IncomingPlayerMessage::AckGameStarted => {
                        self.record_ack(BroadcastKind::GameStart, &student_id, tunnel_finder);
                    }
                    IncomingPlayerMessage::AckQuestionReceived { question_id } => {
                        if self.current_question().map(crate::deck::Question::id)
                            == Some(question_id)
                        {
                            self.record_ack(BroadcastKind::Question, &student_id, tunnel_finder);
                        }
                    }
                }
            }
            IncomingMessage::Host(host_message) => {
                let result = match host_message {
                    IncomingHostMessage::StartGame => {
                        self.start_game(schedule_message, &tunnel_finder)
                    }
                    IncomingHostMessage::AdvanceRound => {
                        self.advance_round(schedule_message, &tunnel_finder)
                    }
                    IncomingHostMessage::ResetGame => {
                        self.reset_game(&tunnel_finder);
                        Ok(())
                    }
                };
                if let Err(error) = result {
                    Self::send_to_connection(
                        &UpdateMessage::CommandRejected(error).into(),
                        connection,
                        &tunnel_finder,
                    );
                }
            }
        }
    }

    /// Handles a scheduled alarm message
    ///
    /// Alarms scheduled under an older generation are stale (a reset or
    /// phase transition happened since) and are silently dropped.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(ConnectionId) -> Option<T>,
        S: FnMut(CrateAlarmMessage, web_time::Duration),
    >(
        &mut self,
        message: CrateAlarmMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        match message {
            CrateAlarmMessage::Game(AlarmMessage::ProceedToQuestion { generation }) => {
                if generation == self.generation {
                    self.broadcast_question(schedule_message, tunnel_finder);
                }
            }
            CrateAlarmMessage::Game(AlarmMessage::AckReportDue { kind, generation }) => {
                if generation == self.ack_generation {
                    self.admins.broadcast(
                        &AdminMessage::AckReport {
                            kind,
                            report: self.acks.report(kind),
                        }
                        .into(),
                        tunnel_finder,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Duration};

    use crate::deck::Question;

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        messages: Rc<RefCell<Vec<String>>>,
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &CrateUpdateMessage) {
            self.messages.borrow_mut().push(message.to_message());
        }

        fn send_state(&self, state: &CrateSyncMessage) {
            self.messages.borrow_mut().push(state.to_message());
        }

        fn close(self) {}
    }

    struct Harness {
        game: Game,
        tunnels: Rc<RefCell<HashMap<ConnectionId, MockTunnel>>>,
        alarms: Rc<RefCell<Vec<(CrateAlarmMessage, Duration)>>>,
    }

    impl Harness {
        fn new(deck: Deck) -> Self {
            Self {
                game: Game::new(deck),
                tunnels: Rc::new(RefCell::new(HashMap::new())),
                alarms: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn finder(&self) -> impl Fn(ConnectionId) -> Option<MockTunnel> + 'static + use<> {
            let tunnels = Rc::clone(&self.tunnels);
            move |id| tunnels.borrow().get(&id).cloned()
        }

        fn scheduler(&self) -> impl FnMut(CrateAlarmMessage, Duration) + 'static + use<> {
            let alarms = Rc::clone(&self.alarms);
            move |message, duration| alarms.borrow_mut().push((message, duration))
        }

        fn connect(&mut self) -> ConnectionId {
            let connection = ConnectionId::new();
            self.tunnels
                .borrow_mut()
                .insert(connection, MockTunnel::default());
            connection
        }

        fn connect_admin(&mut self) -> ConnectionId {
            let connection = self.connect();
            let finder = self.finder();
            self.game.connect_admin(connection, finder);
            connection
        }

        fn register(&mut self, token: &str, student_id: &str) -> ConnectionId {
            let connection = self.connect();
            let finder = self.finder();
            let scheduler = self.scheduler();
            self.game.receive_message(
                connection,
                IncomingMessage::Unassigned(IncomingUnassignedMessage::Register {
                    token: SessionToken::new(token),
                    first_name: "Test".to_owned(),
                    last_name: format!("Player{student_id}"),
                    student_id: StudentId::new(student_id),
                }),
                scheduler,
                finder,
            );
            connection
        }

        fn send(&mut self, connection: ConnectionId, message: IncomingMessage) {
            let finder = self.finder();
            let scheduler = self.scheduler();
            self.game
                .receive_message(connection, message, scheduler, finder);
        }

        /// Fires every scheduled alarm in order, draining the queue once
        fn fire_pending(&mut self) {
            let pending: Vec<_> = self.alarms.borrow_mut().drain(..).collect();
            for (message, _) in pending {
                let finder = self.finder();
                let scheduler = self.scheduler();
                self.game.receive_alarm(message, scheduler, finder);
            }
        }

        fn messages_of(&self, connection: ConnectionId) -> Vec<String> {
            self.tunnels
                .borrow()
                .get(&connection)
                .map(|tunnel| tunnel.messages.borrow().clone())
                .unwrap_or_default()
        }

        fn last_message_of(&self, connection: ConnectionId) -> String {
            self.messages_of(connection)
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    fn three_question_deck() -> Deck {
        // Correct answers are option 1, option 0, option 2
        Deck::new(
            "Trivia",
            vec![
                Question::new(
                    10,
                    "First?",
                    vec!["a".into(), "b".into(), "c".into()],
                    1,
                    Duration::from_secs(30),
                ),
                Question::new(
                    11,
                    "Second?",
                    vec!["a".into(), "b".into(), "c".into()],
                    0,
                    Duration::from_secs(30),
                ),
                Question::new(
                    12,
                    "Third?",
                    vec!["a".into(), "b".into(), "c".into()],
                    2,
                    Duration::from_secs(30),
                ),
            ],
        )
    }

    fn answer(question_id: u32, answer_index: usize) -> IncomingMessage {
        IncomingMessage::Player(IncomingPlayerMessage::SubmitAnswer {
            question_id,
            answer_index,
        })
    }

    #[test]
    fn test_registration_accepted_and_mirrored() {
        let mut harness = Harness::new(three_question_deck());
        let admin = harness.connect_admin();
        let player = harness.register("tok-a", "1001");

        assert!(harness.last_message_of(player).contains("RegistrationAccepted"));
        assert!(harness.last_message_of(admin).contains("ParticipantJoined"));
        assert_eq!(harness.game.roster.len(), 1);
    }

    #[test]
    fn test_registration_rejected_after_start() {
        let mut harness = Harness::new(three_question_deck());
        harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));

        let late = harness.register("tok-b", "1002");
        let last = harness.last_message_of(late);
        assert!(last.contains("RegistrationRejected"));
        assert!(last.contains("GameAlreadyStarted"));
    }

    #[test]
    fn test_duplicate_identity_rejected_same_token_rebinds() {
        let mut harness = Harness::new(three_question_deck());
        harness.register("tok-a", "1001");

        let imposter = harness.register("tok-b", "1001");
        assert!(harness.last_message_of(imposter).contains("DuplicateIdentity"));

        let retry = harness.register("tok-a", "1001");
        assert!(harness.last_message_of(retry).contains("RegistrationAccepted"));
        assert_eq!(harness.game.roster.len(), 1);
    }

    #[test]
    fn test_host_command_from_player_rejected() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");

        harness.send(player, IncomingMessage::Host(IncomingHostMessage::StartGame));
        assert!(harness.last_message_of(player).contains("Unauthorized"));
        assert_eq!(harness.game.phase(), Phase::Waiting);
    }

    #[test]
    fn test_start_game_twice_rejected() {
        let mut harness = Harness::new(three_question_deck());
        harness.register("tok-a", "1001");
        let admin = harness.connect_admin();

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        assert_eq!(harness.game.phase(), Phase::Playing);

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        assert!(harness.last_message_of(admin).contains("GameAlreadyPlaying"));
    }

    #[test]
    fn test_start_schedules_question_and_ack_report() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        assert!(harness
            .messages_of(player)
            .iter()
            .any(|m| m.contains("GameStarted")));
        assert_eq!(harness.alarms.borrow().len(), 2);

        harness.fire_pending();
        let broadcast = harness.last_message_of(player);
        assert!(broadcast.contains("QuestionBroadcast"));
        assert!(broadcast.contains("First?"));
        // The question broadcast never carries the correct answer index
        assert!(!broadcast.contains("correct_answer"));
        // The start-ack report reached the console
        assert!(harness
            .messages_of(admin)
            .iter()
            .any(|m| m.contains("AckReport")));
    }

    #[test]
    fn test_answer_overwrite_last_wins() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        harness.send(player, answer(10, 0));
        harness.send(player, answer(10, 1));

        let scheduler = harness.scheduler();
        let finder = harness.finder();
        harness.game.advance_round(scheduler, finder).unwrap();

        let messages = harness.messages_of(player);
        let outcome = messages
            .iter()
            .find(|m| m.contains("AnswerOutcome"))
            .expect("outcome sent");
        assert!(outcome.contains("\"correct\":true"));
        assert_eq!(harness.game.phase(), Phase::Playing);
    }

    #[test]
    fn test_stale_question_answer_discarded() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        harness.send(player, answer(99, 1));
        assert_eq!(harness.game.roster.answered_count(), 0);
        assert!(!harness
            .messages_of(player)
            .iter()
            .any(|m| m.contains("AnswerReceived")));
    }

    #[test]
    fn test_no_answer_eliminated_with_timeout() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );

        let messages = harness.messages_of(player);
        let eliminated = messages
            .iter()
            .find(|m| m.contains("Eliminated"))
            .expect("elimination sent");
        assert!(eliminated.contains("timeout"));
        // Nobody left playing, so the game ends
        assert_eq!(harness.game.phase(), Phase::Finished);
        assert!(harness.game.winners().is_empty());
    }

    #[test]
    fn test_wrong_answer_eliminated_with_reason() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        harness.send(player, answer(10, 0));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );

        let messages = harness.messages_of(player);
        let eliminated = messages
            .iter()
            .find(|m| m.contains("Eliminated"))
            .expect("elimination sent");
        assert!(eliminated.contains("wrong_answer"));
        assert!(harness
            .messages_of(admin)
            .iter()
            .any(|m| m.contains("ParticipantEliminated")));
    }

    #[test]
    fn test_full_game_winner_survives_every_round() {
        let mut harness = Harness::new(three_question_deck());
        let alice = harness.register("tok-a", "1001");
        let bob = harness.register("tok-b", "1002");
        let carol = harness.register("tok-c", "1003");
        let admin = harness.connect_admin();

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        // Round 1 (correct: 1): alice right, bob right, carol silent
        harness.send(alice, answer(10, 1));
        harness.send(bob, answer(10, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );
        assert!(harness
            .messages_of(carol)
            .iter()
            .any(|m| m.contains("timeout")));
        harness.fire_pending();

        // Round 2 (correct: 0): alice right, bob wrong
        harness.send(alice, answer(11, 0));
        harness.send(bob, answer(11, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );
        assert!(harness
            .messages_of(bob)
            .iter()
            .any(|m| m.contains("wrong_answer")));
        harness.fire_pending();

        // Round 3 (correct: 2): alice right and wins
        harness.send(alice, answer(12, 2));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );

        assert_eq!(harness.game.phase(), Phase::Finished);
        assert_eq!(harness.game.winners(), &[StudentId::new("1001")]);
        assert!(harness.messages_of(alice).iter().any(|m| m.contains("Won")));
        assert!(harness
            .messages_of(admin)
            .iter()
            .any(|m| m.contains("GameEnded")));
        assert_eq!(
            harness
                .game
                .roster
                .get(&StudentId::new("1001"))
                .unwrap()
                .status(),
            Status::Winner
        );
    }

    #[test]
    fn test_eliminated_cannot_reregister_until_reset() {
        let mut harness = Harness::new(three_question_deck());
        harness.register("tok-a", "1001");
        harness.register("tok-b", "1002");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        // 1001 silent, eliminated; 1002 keeps the game alive
        let bob_conn = harness
            .game
            .roster
            .get(&StudentId::new("1002"))
            .unwrap()
            .connection()
            .unwrap();
        harness.send(bob_conn, answer(10, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );
        assert!(harness.game.roster.is_eliminated(&StudentId::new("1001")));

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::ResetGame));
        assert_eq!(harness.game.phase(), Phase::Waiting);
        assert!(!harness.game.roster.is_eliminated(&StudentId::new("1001")));

        // After the reset the same identity registers cleanly again
        let fresh = harness.register("tok-z", "1099");
        assert!(harness.last_message_of(fresh).contains("RegistrationAccepted"));
    }

    #[test]
    fn test_reset_invalidates_pending_alarms() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));

        // Reset before the settle alarm fires; the stale alarm must not
        // broadcast a question into the waiting phase
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::ResetGame));
        harness.fire_pending();

        assert_eq!(harness.game.phase(), Phase::Waiting);
        assert!(!harness
            .messages_of(player)
            .iter()
            .any(|m| m.contains("QuestionBroadcast")));
    }

    #[test]
    fn test_reset_preserves_roster_and_clears_scores() {
        let mut harness = Harness::new(three_question_deck());
        let alice = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();
        harness.send(alice, answer(10, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );

        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::ResetGame));

        assert_eq!(harness.game.roster.len(), 1);
        let participant = harness.game.roster.get(&StudentId::new("1001")).unwrap();
        assert_eq!(participant.status(), Status::Waiting);
        assert_eq!(participant.correct_answers(), 0);
        assert!(harness
            .messages_of(alice)
            .iter()
            .any(|m| m.contains("GameReset")));

        // The game can be played again
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        assert_eq!(harness.game.phase(), Phase::Playing);
    }

    #[test]
    fn test_reconnect_mid_round_restores_question_and_timer() {
        let mut harness = Harness::new(three_question_deck());
        let old_conn = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        let finder = harness.finder();
        harness.game.disconnect(old_conn, finder);

        let fresh = harness.connect();
        harness.send(
            fresh,
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Reconnect {
                token: SessionToken::new("tok-a"),
                student_id: StudentId::new("1001"),
            }),
        );

        let last = harness.last_message_of(fresh);
        assert!(last.contains("ReconnectAccepted"));
        assert!(last.contains("First?"));
        assert!(last.contains("time_remaining"));

        let remaining = harness.game.time_remaining().expect("question in play");
        assert!(remaining <= Duration::from_secs(30));
    }

    #[test]
    fn test_time_remaining_never_increases_between_reconnects() {
        let mut harness = Harness::new(three_question_deck());
        let old_conn = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        let first = harness.game.time_remaining().expect("question in play");

        std::thread::sleep(Duration::from_millis(30));
        let finder = harness.finder();
        harness.game.disconnect(old_conn, finder);
        let fresh = harness.connect();
        harness.send(
            fresh,
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Reconnect {
                token: SessionToken::new("tok-a"),
                student_id: StudentId::new("1001"),
            }),
        );

        let second = harness
            .game
            .time_remaining()
            .expect("question still in play");
        assert!(second <= first);
        assert!(first <= Duration::from_secs(30));
    }

    #[test]
    fn test_reconnect_during_reveal_pause_resumes_no_question() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        harness.send(player, answer(10, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );

        // The next question is scheduled but not yet broadcast; a resume
        // here must not hand it out early
        let finder = harness.finder();
        harness.game.disconnect(player, finder);
        let fresh = harness.connect();
        harness.send(
            fresh,
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Reconnect {
                token: SessionToken::new("tok-a"),
                student_id: StudentId::new("1001"),
            }),
        );

        let last = harness.last_message_of(fresh);
        assert!(last.contains("ReconnectAccepted"));
        assert!(last.contains("playing"));
        assert!(!last.contains("current_question"));
        assert!(!last.contains("Second?"));
        assert!(!last.contains("time_remaining"));
    }

    #[test]
    fn test_reconnect_with_unknown_token_rejected() {
        let mut harness = Harness::new(three_question_deck());
        let connection = harness.connect();
        harness.send(
            connection,
            IncomingMessage::Unassigned(IncomingUnassignedMessage::Reconnect {
                token: SessionToken::new("missing"),
                student_id: StudentId::new("1001"),
            }),
        );

        let last = harness.last_message_of(connection);
        assert!(last.contains("ReconnectRejected"));
        assert!(last.contains("InvalidSession"));
    }

    #[test]
    fn test_acks_recorded_and_reported_without_gating() {
        let mut harness = Harness::new(three_question_deck());
        let alice = harness.register("tok-a", "1001");
        harness.register("tok-b", "1002");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));

        harness.send(
            alice,
            IncomingMessage::Player(IncomingPlayerMessage::AckGameStarted),
        );
        assert!(harness
            .messages_of(admin)
            .iter()
            .any(|m| m.contains("AckProgress")));

        // The grace-window report names the silent participant
        harness.fire_pending();
        let report = harness
            .messages_of(admin)
            .iter()
            .filter(|m| m.contains("AckReport"))
            .last()
            .cloned()
            .expect("report sent");
        assert!(report.contains("1002"));

        // Progression never waited on the missing ack
        assert_eq!(harness.game.phase(), Phase::Playing);
    }

    #[test]
    fn test_question_ack_report_survives_round_advance() {
        let mut harness = Harness::new(three_question_deck());
        let alice = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        // Advance inside the grace window, before the question report fired
        harness.send(alice, answer(10, 1));
        harness.send(
            admin,
            IncomingMessage::Host(IncomingHostMessage::AdvanceRound),
        );
        harness.fire_pending();

        assert!(harness
            .messages_of(admin)
            .iter()
            .any(|m| m.contains("AckReport") && m.contains("\"kind\":\"question\"")));
    }

    #[test]
    fn test_zero_participant_start_finishes_immediately() {
        let mut harness = Harness::new(three_question_deck());
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        assert_eq!(harness.game.phase(), Phase::Finished);
        assert!(harness.game.winners().is_empty());
    }

    #[test]
    fn test_admin_snapshot_on_connect() {
        let mut harness = Harness::new(three_question_deck());
        harness.register("tok-a", "1001");
        let admin = harness.connect_admin();

        let snapshot = harness.last_message_of(admin);
        assert!(snapshot.contains("waiting"));
        assert!(snapshot.contains("\"participant_count\":1"));
        assert!(snapshot.contains("\"total_questions\":3"));
    }

    #[test]
    fn test_state_message_for_participant_mid_game() {
        let mut harness = Harness::new(three_question_deck());
        let player = harness.register("tok-a", "1001");
        let admin = harness.connect_admin();
        harness.send(admin, IncomingMessage::Host(IncomingHostMessage::StartGame));
        harness.fire_pending();

        let state = harness.game.state_message(player).to_message();
        assert!(state.contains("playing"));
        assert!(state.contains("\"question_number\":1"));
        assert!(state.contains("First?"));
    }
}
