//! Trigger events handed to the scheduler by the ingest side.

use tokio::time::Instant;

/// A single decoded trigger.
///
/// Created by the ingest collaborator at the instant a trigger is decoded and
/// owned by the [`EventQueue`](crate::EventQueue) until the dispatcher takes it.
/// Events are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    label: String,
    receive_time: Instant,
    sequence_id: u64,
}

impl Event {
    /// Create a new event.
    pub fn new(label: impl Into<String>, receive_time: Instant, sequence_id: u64) -> Self {
        Self {
            label: label.into(),
            receive_time,
            sequence_id,
        }
    }

    /// Label used to look up the actuation parameters (e.g. `bd`, `hh`).
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Instant at which the trigger was decoded.
    #[inline]
    pub fn receive_time(&self) -> Instant {
        self.receive_time
    }

    /// Monotonic id assigned at submission.
    #[inline]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}
