//! # Quizout Game Library
//!
//! This library provides the core engine for a live, host-controlled,
//! single-elimination quiz competition. It manages participant
//! registration and reconnectable sessions, operator-paced question
//! rounds with reveal-and-eliminate scoring, delivery acknowledgment
//! tracking, and real-time mirroring of every event to operator
//! consoles. Transport is abstracted behind the [`session::Tunnel`]
//! trait so the engine runs over any real-time protocol.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod constants;

pub mod acks;
pub mod admin;
pub mod deck;
pub mod game;
pub mod registry;
pub mod session;

/// Messages sent to synchronize a client's view with the engine state
///
/// Sent when a connection needs the full picture rather than an
/// incremental update, typically on connect or reconnect.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum SyncMessage {
    /// Participant-grade game status
    Game(game::SyncMessage),
    /// Full operator console snapshot
    Admin(admin::Snapshot),
}

impl SyncMessage {
    /// Converts the sync message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Messages sent to update specific aspects of a client's view
///
/// Update messages notify clients about changes that affect their local
/// view of the game, such as a new question or an elimination.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum UpdateMessage {
    /// Participant-facing game updates
    Game(game::UpdateMessage),
    /// Operator console mirror events
    Admin(admin::AdminMessage),
}

/// Alarm messages for deferred round-pacing events
///
/// These are handed to the embedding runtime via a scheduling closure
/// and fed back into the engine after the requested delay.
#[derive(Debug, Clone, derive_more::From, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Round coordinator alarms
    Game(game::AlarmMessage),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// This structure is useful for displaying a limited number of items while
/// still showing the total count. For example, showing "40 participants"
/// but only listing the first 30 records.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    ///
    /// # Returns
    ///
    /// A new `TruncatedVec` containing up to `limit` items from the iterator
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Maps a function over the items in the truncated vector
    ///
    /// # Arguments
    ///
    /// * `f` - Function to apply to each item
    ///
    /// # Returns
    ///
    /// A new `TruncatedVec` with the function applied to each item
    pub fn map<F, U>(self, f: F) -> TruncatedVec<U>
    where
        F: Fn(T) -> U,
    {
        TruncatedVec {
            exact_count: self.exact_count,
            items: self.items.into_iter().map(f).collect_vec(),
        }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_vec_new() {
        let data = vec![1, 2, 3, 4, 5];
        let truncated = TruncatedVec::new(data.into_iter(), 3, 5);

        assert_eq!(truncated.exact_count(), 5);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_new_limit_larger_than_items() {
        let data = vec![1, 2, 3];
        let truncated = TruncatedVec::new(data.into_iter(), 5, 3);

        assert_eq!(truncated.exact_count(), 3);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_map() {
        let data = vec![1, 2, 3];
        let truncated = TruncatedVec::new(data.into_iter(), 3, 5);
        let mapped = truncated.map(|x| x * 2);

        assert_eq!(mapped.exact_count(), 5);
        assert_eq!(mapped.items(), &[2, 4, 6]);
    }

    #[test]
    fn test_update_message_to_message() {
        let update_msg = UpdateMessage::Game(game::UpdateMessage::GameStarted {
            total_questions: 10,
        });
        let json_str = update_msg.to_message();

        assert!(json_str.contains("Game"));
        assert!(json_str.contains("GameStarted"));
        assert!(json_str.contains("10"));
    }

    #[test]
    fn test_sync_message_to_message() {
        let sync_msg = SyncMessage::Game(game::SyncMessage::Status {
            phase: game::Phase::Waiting,
            question_number: None,
            total_questions: 3,
            current_question: None,
        });
        let json_str = sync_msg.to_message();

        assert!(json_str.contains("Status"));
        assert!(json_str.contains("waiting"));
        // Absent optionals are omitted entirely
        assert!(!json_str.contains("question_number"));
    }
}
