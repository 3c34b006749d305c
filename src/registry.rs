//! Participant registry and session directory
//!
//! This module owns every participant record in the game. A single table
//! keyed by student identifier holds each [`Participant`]; the session
//! token and live connection handle are secondary indices into that table,
//! so a reconnect can never leave two diverging copies of the same
//! participant behind. The registry also tracks which identifiers have
//! been eliminated, which is what prevents an eliminated student from
//! slipping back in through a fresh registration.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use super::{TruncatedVec, UpdateMessage, session::Tunnel};

/// A unique identifier for a live connection
///
/// Each connection (participant socket or operator console) gets a unique
/// handle that is valid until the connection drops. A participant that
/// reconnects gets a fresh `ConnectionId`; their identity lives in their
/// student identifier, not here.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random connection handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    /// Creates a new random connection handle (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    /// Formats the handle as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    /// Parses a connection handle from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A self-asserted student identifier, unique per game
///
/// Identity in this system is not cryptographically verified; the student
/// identifier is whatever the participant claims at registration, and the
/// registry enforces that each one maps to exactly one participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Wraps a raw identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A client-chosen opaque session token
///
/// The token is generated and stored by the client and presented again on
/// reconnect; it is the durable key under which a participant's session
/// survives socket disconnects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a participant
///
/// Every participant starts out `Waiting`; a game start moves them to
/// `Playing`, a failed reveal pass moves them to `Eliminated`, and
/// surviving the whole deck moves them to `Winner`. A game reset returns
/// everyone to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Registered, waiting for the game to start
    Waiting,
    /// Actively competing in the current game
    Playing,
    /// Knocked out by a reveal pass; may not re-register until a reset
    Eliminated,
    /// Survived the whole deck with every answer correct
    Winner,
}

/// One registered competitor
///
/// The record is created at registration and mutated by the round
/// coordinator (status, score, answer) and by reconnection handling
/// (connection rebinding). It is destroyed only by dropping the whole
/// registry; a game reset merely returns it to its initial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    first_name: String,
    last_name: String,
    student_id: StudentId,
    token: SessionToken,
    /// Live connection, if any; `None` while disconnected
    connection: Option<ConnectionId>,
    status: Status,
    correct_answers: usize,
    /// Selected option index for the current round; `None` means no answer
    current_answer: Option<usize>,
}

impl Participant {
    /// The participant's first name
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// The participant's last name
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// The participant's student identifier
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    /// The session token this participant registered under
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// The live connection handle, if the participant is connected
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// The participant's current lifecycle status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of questions answered correctly so far this game
    pub fn correct_answers(&self) -> usize {
        self.correct_answers
    }

    /// The answer recorded for the current round, if any
    pub fn current_answer(&self) -> Option<usize> {
        self.current_answer
    }

    /// Produces the operator-facing projection of this participant
    pub fn overview(&self) -> ParticipantOverview {
        ParticipantOverview {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            student_id: self.student_id.clone(),
            status: self.status,
            correct_answers: self.correct_answers,
        }
    }
}

/// Operator-facing projection of a participant
///
/// Carries only what operator consoles display; never the session token
/// or connection handle.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantOverview {
    /// First name as registered
    pub first_name: String,
    /// Last name as registered
    pub last_name: String,
    /// The participant's student identifier
    pub student_id: StudentId,
    /// Current lifecycle status
    pub status: Status,
    /// Correct answers so far this game
    pub correct_answers: usize,
}

/// Errors that can occur when registering or restoring a session
///
/// These are rejections, not faults: each one is surfaced to the
/// requesting connection with its human-readable message and leaves the
/// engine untouched.
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Registration arrived after the game left the waiting phase
    #[error("the game has already started, new registrations are closed")]
    GameAlreadyStarted,
    /// The student identifier is registered under a different session
    #[error("this student identifier is already registered")]
    DuplicateIdentity,
    /// The student identifier was eliminated earlier in this game
    #[error("this student identifier was eliminated and cannot rejoin")]
    AlreadyEliminated,
    /// The game has reached the maximum number of participants
    #[error("maximum number of participants reached")]
    MaximumParticipants,
    /// A name was empty after trimming whitespace
    #[error("name cannot be empty")]
    EmptyName,
    /// A name exceeded the maximum allowed length
    #[error("name is too long")]
    NameTooLong,
    /// A name contains inappropriate content
    #[error("name is inappropriate")]
    InappropriateName,
    /// No session is stored under the presented token
    #[error("session is not valid, please register again")]
    InvalidSession,
    /// The stored session belongs to a different student identifier
    #[error("session does not match the student identifier")]
    SessionMismatch,
}

/// Validates and cleans a registered name
///
/// Names are trimmed, bounded in length, and content-filtered the same
/// way for first and last names.
fn clean_name(name: &str) -> Result<String, Error> {
    if name.len() > crate::constants::registry::MAX_NAME_LENGTH {
        return Err(Error::NameTooLong);
    }
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    if name.is_inappropriate() {
        return Err(Error::InappropriateName);
    }
    Ok(name.to_owned())
}

/// The single owning table of participants plus its secondary indices
///
/// Lookups by session token or live connection resolve to a student
/// identifier first and then into the owning table, so every view of a
/// participant observes the same record. The status index mirrors the
/// table for efficient "all playing participants" queries.
#[derive(Debug, Default)]
pub struct Roster {
    /// Owning table: student identifier to participant record
    participants: HashMap<StudentId, Participant>,
    /// Secondary index: session token to student identifier
    tokens: HashMap<SessionToken, StudentId>,
    /// Secondary index: live connection to student identifier
    connections: HashMap<ConnectionId, StudentId>,
    /// Reverse index by status for efficient filtering
    by_status: EnumMap<Status, HashSet<StudentId>>,
    /// Identifiers eliminated in the current game; cleared only by reset
    eliminated: HashSet<StudentId>,
}

impl Roster {
    /// Registers a new participant with status `Waiting`
    ///
    /// Re-presenting the same token with the same student identifier is
    /// treated as a connection rebind rather than a duplicate, so a client
    /// that retries registration after a flaky connect does not lock
    /// itself out.
    ///
    /// # Errors
    ///
    /// * `Error::AlreadyEliminated` - the identifier was eliminated this game
    /// * `Error::DuplicateIdentity` - the identifier is registered under a
    ///   different token
    /// * `Error::MaximumParticipants` - the roster is full
    /// * `Error::EmptyName` / `Error::NameTooLong` / `Error::InappropriateName` -
    ///   name validation failed
    pub fn register(
        &mut self,
        connection: ConnectionId,
        token: SessionToken,
        first_name: &str,
        last_name: &str,
        student_id: StudentId,
    ) -> Result<(), Error> {
        if self.eliminated.contains(&student_id) {
            return Err(Error::AlreadyEliminated);
        }

        if self.participants.contains_key(&student_id) {
            if self.tokens.get(&token) == Some(&student_id) {
                self.rebind_connection(&student_id, connection);
                return Ok(());
            }
            return Err(Error::DuplicateIdentity);
        }

        if self.participants.len() >= crate::constants::registry::MAX_PARTICIPANT_COUNT {
            return Err(Error::MaximumParticipants);
        }

        let first_name = clean_name(first_name)?;
        let last_name = clean_name(last_name)?;

        self.participants.insert(
            student_id.clone(),
            Participant {
                first_name,
                last_name,
                student_id: student_id.clone(),
                token: token.clone(),
                connection: Some(connection),
                status: Status::Waiting,
                correct_answers: 0,
                current_answer: None,
            },
        );
        self.tokens.insert(token, student_id.clone());
        self.connections.insert(connection, student_id.clone());
        self.by_status[Status::Waiting].insert(student_id);

        Ok(())
    }

    /// Restores a session onto a new connection
    ///
    /// On success the participant's connection reference is rebound to
    /// `connection` and the old binding is dropped; status and score are
    /// untouched.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidSession` - no session is stored under the token
    /// * `Error::SessionMismatch` - the session belongs to another identifier
    /// * `Error::AlreadyEliminated` - the identifier is in the eliminated set
    ///   and its session was discarded
    pub fn reconnect(
        &mut self,
        token: &SessionToken,
        student_id: &StudentId,
        connection: ConnectionId,
    ) -> Result<&Participant, Error> {
        if self.eliminated.contains(student_id) {
            return Err(Error::AlreadyEliminated);
        }
        let stored = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(Error::InvalidSession)?;
        if &stored != student_id {
            return Err(Error::SessionMismatch);
        }

        self.rebind_connection(&stored, connection);

        self.participants
            .get(student_id)
            .ok_or(Error::InvalidSession)
    }

    /// Points a participant's connection reference at a new connection,
    /// dropping the previous binding
    fn rebind_connection(&mut self, student_id: &StudentId, connection: ConnectionId) {
        if let Some(participant) = self.participants.get_mut(student_id) {
            if let Some(old) = participant.connection.take() {
                self.connections.remove(&old);
            }
            participant.connection = Some(connection);
            self.connections.insert(connection, student_id.clone());
        }
    }

    /// Drops the live binding for a connection
    ///
    /// The participant record and its session token entry are retained so
    /// reconnection remains possible; status and score are unaffected.
    ///
    /// # Returns
    ///
    /// The student identifier that was bound to the connection, if any
    pub fn disconnect(&mut self, connection: &ConnectionId) -> Option<StudentId> {
        let student_id = self.connections.remove(connection)?;
        if let Some(participant) = self.participants.get_mut(&student_id) {
            if participant.connection == Some(*connection) {
                participant.connection = None;
            }
        }
        Some(student_id)
    }

    /// Looks up the student identifier bound to a live connection
    pub fn student_by_connection(&self, connection: &ConnectionId) -> Option<&StudentId> {
        self.connections.get(connection)
    }

    /// Looks up a participant record
    pub fn get(&self, student_id: &StudentId) -> Option<&Participant> {
        self.participants.get(student_id)
    }

    /// Number of registered participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether no participant has registered yet
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Number of participants currently in the given status
    pub fn status_count(&self, status: Status) -> usize {
        self.by_status[status].len()
    }

    /// Identifiers of all participants currently playing
    pub fn playing(&self) -> Vec<StudentId> {
        self.by_status[Status::Playing].iter().cloned().collect()
    }

    /// Number of playing participants with a recorded answer this round
    pub fn answered_count(&self) -> usize {
        self.by_status[Status::Playing]
            .iter()
            .filter_map(|id| self.participants.get(id))
            .filter(|p| p.current_answer.is_some())
            .count()
    }

    /// Whether the identifier has been eliminated in the current game
    pub fn is_eliminated(&self, student_id: &StudentId) -> bool {
        self.eliminated.contains(student_id)
    }

    /// Moves a participant to a new status, maintaining the status index
    pub fn set_status(&mut self, student_id: &StudentId, status: Status) {
        let Some(participant) = self.participants.get_mut(student_id) else {
            return;
        };
        let old = participant.status;
        if old != status {
            participant.status = status;
            self.by_status[old].remove(student_id);
            self.by_status[status].insert(student_id.clone());
        }
    }

    /// Eliminates a participant and permanently records the identifier
    /// for the rest of the current game
    pub fn mark_eliminated(&mut self, student_id: &StudentId) {
        self.set_status(student_id, Status::Eliminated);
        self.eliminated.insert(student_id.clone());
    }

    /// Overwrites a participant's answer for the current round
    pub fn record_answer(&mut self, student_id: &StudentId, answer_index: usize) {
        if let Some(participant) = self.participants.get_mut(student_id) {
            participant.current_answer = Some(answer_index);
        }
    }

    /// Clears a participant's answer for the current round
    pub fn clear_answer(&mut self, student_id: &StudentId) {
        if let Some(participant) = self.participants.get_mut(student_id) {
            participant.current_answer = None;
        }
    }

    /// Increments a participant's correct-answer counter
    ///
    /// # Returns
    ///
    /// The new counter value, or 0 if the participant is unknown
    pub fn record_correct(&mut self, student_id: &StudentId) -> usize {
        match self.participants.get_mut(student_id) {
            Some(participant) => {
                participant.correct_answers += 1;
                participant.correct_answers
            }
            None => 0,
        }
    }

    /// Moves every waiting participant into the game
    ///
    /// Scores and answers are reset to their defaults so a deck replayed
    /// after a reset starts from a clean slate.
    ///
    /// # Returns
    ///
    /// The identifiers that are now playing
    pub fn start_all_waiting(&mut self) -> Vec<StudentId> {
        let waiting: Vec<StudentId> = self.by_status[Status::Waiting].iter().cloned().collect();
        for student_id in &waiting {
            if let Some(participant) = self.participants.get_mut(student_id) {
                participant.correct_answers = 0;
                participant.current_answer = None;
            }
            self.set_status(student_id, Status::Playing);
        }
        waiting
    }

    /// Returns every known participant to `Waiting` and clears all
    /// per-game state, including the eliminated-identifier set
    ///
    /// Roster identity is preserved: the same students can replay the
    /// deck without re-registering.
    pub fn reset_all(&mut self) {
        let everyone: Vec<StudentId> = self.participants.keys().cloned().collect();
        for student_id in &everyone {
            if let Some(participant) = self.participants.get_mut(student_id) {
                participant.correct_answers = 0;
                participant.current_answer = None;
            }
            self.set_status(student_id, Status::Waiting);
        }
        self.eliminated.clear();
    }

    /// Sends an update message to one participant's live connection
    ///
    /// Silently does nothing for disconnected participants; delivery
    /// reliability is the acknowledgment tracker's concern, not the
    /// sender's.
    pub fn send_message<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        student_id: &StudentId,
        tunnel_finder: F,
    ) {
        let Some(session) = self
            .participants
            .get(student_id)
            .and_then(|p| p.connection)
            .and_then(tunnel_finder)
        else {
            return;
        };

        session.send_message(message);
    }

    /// Sends an update message individually to every playing participant
    pub fn announce_playing<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        for student_id in &self.by_status[Status::Playing] {
            self.send_message(message, student_id, &tunnel_finder);
        }
    }

    /// Sends an update message to every connected participant regardless
    /// of status
    pub fn announce_all<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        for student_id in self.participants.keys() {
            self.send_message(message, student_id, &tunnel_finder);
        }
    }

    /// Builds the operator roster overview, sorted by score descending
    /// and truncated for transfer
    pub fn overview(&self) -> TruncatedVec<ParticipantOverview> {
        const LIMIT: usize = 30;

        let sorted = self
            .participants
            .values()
            .map(Participant::overview)
            .sorted_by_key(|p| std::cmp::Reverse(p.correct_answers));

        TruncatedVec::new(sorted, LIMIT, self.participants.len())
    }
}
