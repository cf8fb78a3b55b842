//! Error types for the oroboro engine.
//!
//! All errors are strongly typed using thiserror. Temporal-expression
//! failures are *not* errors: they are first-class outcomes delivered to
//! `on_fail` callbacks. The enums here cover construction-time validation
//! and runtime host misuse only.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::assertion::AssertionId;
use crate::event::EventId;
use crate::time::VirtualTime;

/// Validation errors raised while constructing expressions or while the
/// host feeds the scheduler.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Repeat count below the minimum of one.
    #[error("repeat count must be at least 1, got {count}")]
    InvalidRepeatCount {
        /// The rejected count.
        count: u32,
    },

    /// Repeat range with `min > max`.
    #[error("invalid repeat range: min ({min}) must not exceed max ({max})")]
    InvalidRepeatRange {
        /// Lower bound of the rejected range.
        min: u32,
        /// Upper bound of the rejected range.
        max: u32,
    },

    /// The host asked the scheduler to move backwards in virtual time.
    #[error("virtual time must not decrease: now is {now}, requested {requested}")]
    NonMonotonicTime {
        /// Current scheduler time.
        now: VirtualTime,
        /// The rejected target.
        requested: VirtualTime,
    },

    /// A wall-clock call was made before anchoring the engine.
    #[error("wall-clock interface used before set_wall_anchor was called")]
    WallClockUnanchored,

    /// A wall-clock instant does not map onto the virtual timeline.
    #[error("wall-clock instant {requested} is outside the anchored range starting at {anchor}")]
    WallClockOutOfRange {
        /// The anchor instant (maps to virtual time zero).
        anchor: DateTime<Utc>,
        /// The rejected instant.
        requested: DateTime<Utc>,
    },

    /// The wall-clock anchor was set twice.
    #[error("wall-clock anchor is already set to {anchor}")]
    WallClockAlreadyAnchored {
        /// The existing anchor.
        anchor: DateTime<Utc>,
    },
}

/// Execution errors raised while the engine is running.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An event id that this engine never issued.
    #[error("unknown event: {id}")]
    UnknownEvent {
        /// The unrecognized id.
        id: EventId,
    },

    /// An assertion id that is not (or no longer) registered.
    #[error("unknown assertion: {id}")]
    UnknownAssertion {
        /// The unrecognized id.
        id: AssertionId,
    },

    /// The other side of an assertion stream went away.
    #[error("assertion stream disconnected: {path}")]
    Disconnected {
        /// Which channel endpoint failed.
        path: String,
    },

    /// A blocking stream receive timed out.
    #[error("stream receive timed out after {duration_ms}ms")]
    Timeout {
        /// The elapsed timeout in milliseconds.
        duration_ms: u64,
    },
}

/// Top-level error type for the oroboro engine.
#[derive(Debug, Error)]
pub enum OroError {
    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Runtime execution failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Convenience result alias used throughout the crate.
pub type OroResult<T> = Result<T, OroError>;
