//! Evaluation outcomes.
//!
//! An evaluation emits zero or more matches followed by at most one
//! failure; emitting the failure terminates the evaluation. A failure
//! means the expression conclusively could not succeed from its start
//! cycle, reported at the cycle where that became known.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::time::Cycle;
use crate::trace::Trace;

/// A successful evaluation covering cycles `[start, end]` inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Cycle the evaluation started at.
    pub start: Cycle,
    /// Cycle the match ends at.
    pub end: Cycle,
    /// How the match was produced.
    pub trace: Rc<Trace>,
}

/// A conclusive failure of an evaluation started at `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Cycle the evaluation started at.
    pub start: Cycle,
    /// Cycle at which failure became known.
    pub at: Cycle,
    /// An example of how the expression could not be satisfied.
    pub trace: Rc<Trace>,
}

/// One emission from an evaluation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The expression succeeded over a cycle range.
    Match(MatchRecord),
    /// The expression conclusively failed.
    Failure(FailureRecord),
}

impl Outcome {
    /// Builds a match outcome.
    pub(crate) fn matched(start: Cycle, end: Cycle, trace: Rc<Trace>) -> Self {
        Self::Match(MatchRecord { start, end, trace })
    }

    /// Builds a failure outcome.
    pub(crate) fn failed(start: Cycle, at: Cycle, trace: Rc<Trace>) -> Self {
        Self::Failure(FailureRecord { start, at, trace })
    }

    /// Whether this outcome is a match.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    /// Cycle the originating evaluation started at.
    #[must_use]
    pub const fn start_cycle(&self) -> Cycle {
        match self {
            Self::Match(m) => m.start,
            Self::Failure(f) => f.start,
        }
    }

    /// Cycle at which the outcome was reported: the match end, or the
    /// cycle where failure became known.
    #[must_use]
    pub const fn report_cycle(&self) -> Cycle {
        match self {
            Self::Match(m) => m.end,
            Self::Failure(f) => f.at,
        }
    }

    /// The accompanying trace.
    #[must_use]
    pub const fn trace(&self) -> &Rc<Trace> {
        match self {
            Self::Match(m) => &m.trace,
            Self::Failure(f) => &f.trace,
        }
    }
}
