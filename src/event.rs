//! Event identities.
//!
//! An event is pure identity: it carries no payload beyond a posting
//! counter and the FIFO list of tasks currently waiting on it. Both live
//! inside the engine; user code only ever holds the copyable [`EventId`].
//! Posting an event moves all waiters of that instant to the ready queue
//! and leaves the wait list empty — a post never latches, so a task that
//! waits after a posting only sees future postings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Copyable handle for an engine-owned event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub(crate) u32);

impl EventId {
    /// Index into the engine's event table.
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Engine-side state of one event.
#[derive(Debug, Default)]
pub(crate) struct EventEntry {
    /// Human-readable name for logs; may be empty.
    pub name: String,
    /// Tasks waiting for the next posting, in wait order.
    pub waiters: Vec<EventWaiter>,
    /// How many times this event has been posted. Cycle numbering for a
    /// sampling event is derived from this counter.
    pub posts: u64,
}

/// One wait registration on an event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventWaiter {
    pub task: TaskId,
    /// Suspension epoch of the task at registration time; a stale epoch
    /// means the task already woke through another reason.
    pub epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_form() {
        assert_eq!(format!("{}", EventId(3)), "evt-3");
    }
}
