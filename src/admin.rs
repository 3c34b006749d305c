//! Operator console channel
//!
//! Operator consoles observe everything and drive the game. This module
//! tracks the set of connected consoles and defines the mirror messages
//! they receive: every state-changing event in the engine produces an
//! [`AdminMessage`] fanned out to all consoles, and a freshly connected
//! console gets a full [`Snapshot`] to render from scratch.
//!
//! Authorization happens outside the engine: the I/O shell registers a
//! connection here only after authenticating it as an operator.

use std::collections::HashSet;

use serde::Serialize;
use serde_with::skip_serializing_none;

use super::{
    SyncMessage, TruncatedVec, UpdateMessage,
    acks::{AckReport, BroadcastKind},
    game::{EliminationReason, Phase},
    registry::{ConnectionId, ParticipantOverview, StudentId},
    session::Tunnel,
};

/// The set of connected operator consoles
#[derive(Debug, Default)]
pub struct AdminChannel {
    consoles: HashSet<ConnectionId>,
}

impl AdminChannel {
    /// Registers a connection as an operator console
    pub fn connect(&mut self, connection: ConnectionId) {
        self.consoles.insert(connection);
    }

    /// Removes a console, normally on disconnect
    pub fn disconnect(&mut self, connection: &ConnectionId) {
        self.consoles.remove(connection);
    }

    /// Whether the connection is a registered operator console
    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.consoles.contains(connection)
    }

    /// Number of connected consoles
    pub fn count(&self) -> usize {
        self.consoles.len()
    }

    /// Sends an update message to every connected console
    pub fn broadcast<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        for connection in &self.consoles {
            if let Some(session) = tunnel_finder(*connection) {
                session.send_message(message);
            }
        }
    }

    /// Sends a state synchronization message to every connected console
    pub fn broadcast_state<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        state: &SyncMessage,
        tunnel_finder: F,
    ) {
        for connection in &self.consoles {
            if let Some(session) = tunnel_finder(*connection) {
                session.send_state(state);
            }
        }
    }

    /// Sends a state synchronization message to one console
    pub fn send_state<T: Tunnel, F: Fn(ConnectionId) -> Option<T>>(
        &self,
        state: &SyncMessage,
        connection: ConnectionId,
        tunnel_finder: F,
    ) {
        if self.consoles.contains(&connection) {
            if let Some(session) = tunnel_finder(connection) {
                session.send_state(state);
            }
        }
    }
}

/// Events mirrored to operator consoles
///
/// Consoles receive one of these for every state-changing event, so an
/// operator UI can stay live without polling.
#[derive(Debug, Clone, Serialize)]
pub enum AdminMessage {
    /// A new participant registered
    ParticipantJoined {
        /// The participant that joined
        participant: ParticipantOverview,
        /// Roster size after the join
        total_participants: usize,
    },
    /// A participant restored their session onto a new connection
    ParticipantReconnected {
        /// The participant that reconnected
        participant: ParticipantOverview,
    },
    /// A participant's connection dropped; their session is retained
    ParticipantDisconnected {
        /// Identifier of the disconnected participant
        student_id: StudentId,
    },
    /// A participant recorded (or overwrote) an answer this round
    ParticipantAnswered {
        /// The participant that answered
        participant: ParticipantOverview,
        /// Playing participants with a recorded answer this round
        answered_count: usize,
        /// Participants still in the game
        playing_count: usize,
    },
    /// A participant's score changed during a reveal pass
    ScoreUpdated {
        /// The participant with the updated score
        participant: ParticipantOverview,
    },
    /// A participant was eliminated during a reveal pass
    ParticipantEliminated {
        /// The eliminated participant
        participant: ParticipantOverview,
        /// Why they were eliminated
        reason: EliminationReason,
        /// Participants still in the game after the elimination
        remaining_players: usize,
    },
    /// The game left the waiting phase
    GameStarted {
        /// Participants moved into play
        participant_count: usize,
        /// Questions in the deck
        total_questions: usize,
    },
    /// A question was broadcast to all playing participants
    QuestionSent {
        /// One-based number of the question just sent
        question_number: usize,
        /// Questions in the deck
        total_questions: usize,
        /// Participants the question was sent to
        sent_count: usize,
    },
    /// An acknowledgment arrived for a tracked broadcast
    AckProgress {
        /// Which broadcast was acknowledged
        kind: BroadcastKind,
        /// Acknowledgments received so far
        acked: usize,
        /// Participants the broadcast targeted
        targeted: usize,
    },
    /// The grace window for a tracked broadcast elapsed
    AckReport {
        /// Which broadcast the report covers
        kind: BroadcastKind,
        /// The delivery tally
        report: AckReport,
    },
    /// The game finished and winners were computed
    GameEnded {
        /// The winners, in roster order
        winners: Vec<ParticipantOverview>,
        /// Number of winners
        winner_count: usize,
    },
    /// The game was reset to the waiting phase with the roster preserved
    GameReset,
}

/// Full engine state for rendering an operator console from scratch
///
/// Sent to a console when it connects (or reconnects), and broadcast
/// after a reset so every console drops its stale view at once.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Current game phase
    pub phase: Phase,
    /// Registered participants
    pub participant_count: usize,
    /// One-based number of the current question, when one is in play
    pub current_question: Option<usize>,
    /// Questions in the deck
    pub total_questions: usize,
    /// Roster overview, sorted by score descending and truncated
    pub participants: TruncatedVec<ParticipantOverview>,
    /// Winners, when the game has finished
    pub winners: Vec<ParticipantOverview>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, collections::HashMap, rc::Rc};

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        messages: Rc<RefCell<Vec<String>>>,
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &UpdateMessage) {
            self.messages.borrow_mut().push(message.to_message());
        }

        fn send_state(&self, state: &SyncMessage) {
            self.messages.borrow_mut().push(state.to_message());
        }

        fn close(self) {}
    }

    #[test]
    fn test_broadcast_reaches_all_consoles() {
        let mut channel = AdminChannel::default();
        let mut tunnels: HashMap<ConnectionId, MockTunnel> = HashMap::new();

        for _ in 0..3 {
            let connection = ConnectionId::new();
            channel.connect(connection);
            tunnels.insert(connection, MockTunnel::default());
        }

        let message = UpdateMessage::Admin(AdminMessage::GameReset);
        channel.broadcast(&message, |id| tunnels.get(&id).cloned());

        for tunnel in tunnels.values() {
            assert_eq!(tunnel.messages.borrow().len(), 1);
        }
    }

    #[test]
    fn test_disconnected_console_not_reached() {
        let mut channel = AdminChannel::default();
        let connection = ConnectionId::new();
        let tunnel = MockTunnel::default();
        channel.connect(connection);
        channel.disconnect(&connection);

        assert!(!channel.contains(&connection));
        assert_eq!(channel.count(), 0);

        let message = UpdateMessage::Admin(AdminMessage::GameReset);
        channel.broadcast(&message, |id| {
            (id == connection).then(|| tunnel.clone())
        });
        assert!(tunnel.messages.borrow().is_empty());
    }

    #[test]
    fn test_send_state_only_to_registered_console() {
        let channel = AdminChannel::default();
        let connection = ConnectionId::new();
        let tunnel = MockTunnel::default();

        let snapshot = Snapshot {
            phase: Phase::Waiting,
            participant_count: 0,
            current_question: None,
            total_questions: 3,
            participants: TruncatedVec::default(),
            winners: Vec::new(),
        };
        let state = SyncMessage::Admin(snapshot);

        // Not registered: nothing is sent
        channel.send_state(&state, connection, |id| {
            (id == connection).then(|| tunnel.clone())
        });
        assert!(tunnel.messages.borrow().is_empty());
    }
}
