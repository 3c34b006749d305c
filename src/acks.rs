//! Delivery acknowledgment tracking
//!
//! Critical broadcasts (the game-start notice and each question) expect
//! an acknowledgment back from every targeted participant. This module
//! keeps the bookkeeping for those acknowledgments; the round coordinator
//! reports the tally to operator consoles after a grace window. The
//! tracking is purely observational and never gates round progression.

use std::collections::HashSet;

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};

use super::registry::StudentId;

/// The kind of broadcast being acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    /// The "game started" notice sent when play begins
    GameStart,
    /// A question broadcast
    Question,
}

/// Delivery summary for one tracked broadcast
#[derive(Debug, Clone, Serialize)]
pub struct AckReport {
    /// Number of participants the broadcast targeted
    pub targeted: usize,
    /// Number of acknowledgments received
    pub acked: usize,
    /// Number of targeted participants that have not acknowledged
    pub missing: usize,
    /// Identifiers of the participants that have not acknowledged
    pub missing_ids: Vec<StudentId>,
}

/// Acknowledgment state for a single broadcast
#[derive(Debug, Default, Clone)]
struct AckSet {
    /// Participants the broadcast was sent to
    targets: HashSet<StudentId>,
    /// Participants that have acknowledged receipt
    acked: HashSet<StudentId>,
}

impl AckSet {
    /// Starts tracking a fresh broadcast, discarding the previous tally
    fn begin(&mut self, targets: impl IntoIterator<Item = StudentId>) {
        self.targets = targets.into_iter().collect();
        self.acked.clear();
    }

    /// Records one acknowledgment
    ///
    /// # Returns
    ///
    /// `true` if this was a new acknowledgment from a targeted
    /// participant, `false` for duplicates and untargeted senders
    fn record(&mut self, student_id: &StudentId) -> bool {
        if !self.targets.contains(student_id) {
            return false;
        }
        self.acked.insert(student_id.clone())
    }

    /// Summarizes the current tally
    fn report(&self) -> AckReport {
        let missing_ids: Vec<StudentId> = self
            .targets
            .difference(&self.acked)
            .cloned()
            .collect();
        AckReport {
            targeted: self.targets.len(),
            acked: self.acked.len(),
            missing: missing_ids.len(),
            missing_ids,
        }
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.acked.clear();
    }
}

/// Acknowledgment bookkeeping for every tracked broadcast kind
#[derive(Debug, Default, Clone)]
pub struct AckTracker {
    sets: EnumMap<BroadcastKind, AckSet>,
}

impl AckTracker {
    /// Starts tracking a fresh broadcast of the given kind
    pub fn begin(&mut self, kind: BroadcastKind, targets: impl IntoIterator<Item = StudentId>) {
        self.sets[kind].begin(targets);
    }

    /// Records an acknowledgment for the given broadcast kind
    ///
    /// # Returns
    ///
    /// `true` if this was a new acknowledgment from a targeted participant
    pub fn record(&mut self, kind: BroadcastKind, student_id: &StudentId) -> bool {
        self.sets[kind].record(student_id)
    }

    /// Summarizes the tally for the given broadcast kind
    pub fn report(&self, kind: BroadcastKind) -> AckReport {
        self.sets[kind].report()
    }

    /// Number of acknowledgments received for the given broadcast kind
    pub fn acked_count(&self, kind: BroadcastKind) -> usize {
        self.sets[kind].acked.len()
    }

    /// Number of participants targeted by the given broadcast kind
    pub fn targeted_count(&self, kind: BroadcastKind) -> usize {
        self.sets[kind].targets.len()
    }

    /// Discards all tallies, for game reset
    pub fn clear_all(&mut self) {
        for (_, set) in &mut self.sets {
            set.clear();
        }
    }
}
