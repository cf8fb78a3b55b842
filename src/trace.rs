//! Trace trees.
//!
//! Every match and failure is accompanied by a trace: an immutable tree
//! whose shape mirrors the operator that produced the outcome. Leaves
//! record a predicate observation at one cycle; internal nodes record the
//! operator kind and the child traces that combined into the result.
//! Traces are append-only snapshots shared by reference counting — a node
//! emitted by one operator may appear under several parents (intersection
//! and repeat do this routinely) and is never mutated afterwards.
//!
//! The text rendering is deterministic: one node per line, two-space
//! indentation, `symbol (start_cycle/end_cycle) (start_time/end_time)
//! match|fail`.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::time::{Cycle, VirtualTime};

/// The cycle and virtual-time extent of a trace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First cycle covered (inclusive).
    pub start_cycle: Cycle,
    /// Last cycle covered (inclusive); for failures, the cycle at which
    /// the outcome became known.
    pub end_cycle: Cycle,
    /// Virtual time of the start cycle's sampling instant.
    pub start_time: VirtualTime,
    /// Virtual time at which the node was produced.
    pub end_time: VirtualTime,
}

impl Span {
    /// A span covering a single cycle at a single instant.
    #[must_use]
    pub const fn instant(cycle: Cycle, at: VirtualTime) -> Self {
        Self {
            start_cycle: cycle,
            end_cycle: cycle,
            start_time: at,
            end_time: at,
        }
    }
}

/// One node of a trace tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Extent of this node.
    pub span: Span,
    /// Whether this node describes a match (`true`) or a failure path.
    pub matched: bool,
    /// Operator-shaped payload.
    pub kind: TraceKind,
}

/// Operator-shaped trace payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceKind {
    /// A predicate observation at a single cycle.
    Leaf {
        /// Identity of the predicate, as given to `Expr::pred`.
        label: Rc<str>,
    },

    /// Concatenation or fusion. `right` is absent when the left side
    /// failed before a right evaluation started.
    Concat {
        /// Trace of the left operand.
        left: Rc<Trace>,
        /// Trace of the right operand, when one ran.
        right: Option<Rc<Trace>>,
    },

    /// Alternation; `which` is the side (0 = left, 1 = right) that
    /// produced `inner`.
    Alt {
        /// Originating side.
        which: usize,
        /// The side's own trace.
        inner: Rc<Trace>,
    },

    /// Intersection of two child matches; `right` is absent on failure.
    Inter {
        /// Trace of the left child's match.
        left: Rc<Trace>,
        /// Trace of the right child's match, when paired.
        right: Option<Rc<Trace>>,
    },

    /// Conjunction of two equal-end child matches; `right` is absent on
    /// failure.
    Conj {
        /// Trace of the left child's match.
        left: Rc<Trace>,
        /// Trace of the right child's match, when paired.
        right: Option<Rc<Trace>>,
    },

    /// A repetition chain, one entry per completed step.
    Repeat {
        /// Traces of each step, in chain order.
        steps: Vec<Rc<Trace>>,
    },

    /// Conditional; `consequent` is absent for vacuous matches.
    Cond {
        /// Trace of the antecedent.
        antecedent: Rc<Trace>,
        /// Trace of the consequent, when one ran.
        consequent: Option<Rc<Trace>>,
    },

    /// Inversion of the inner outcome.
    Inv {
        /// The inverted child trace.
        inner: Rc<Trace>,
    },
}

impl Trace {
    /// Builds a predicate leaf at a single cycle.
    pub(crate) fn leaf(cycle: Cycle, at: VirtualTime, label: Rc<str>, holds: bool) -> Rc<Self> {
        Rc::new(Self {
            span: Span::instant(cycle, at),
            matched: holds,
            kind: TraceKind::Leaf { label },
        })
    }

    /// Builds an internal node.
    pub(crate) fn branch(span: Span, matched: bool, kind: TraceKind) -> Rc<Self> {
        Rc::new(Self {
            span,
            matched,
            kind,
        })
    }

    /// First cycle covered by this trace.
    #[must_use]
    pub const fn start_cycle(&self) -> Cycle {
        self.span.start_cycle
    }

    /// Last cycle covered by this trace.
    #[must_use]
    pub const fn end_cycle(&self) -> Cycle {
        self.span.end_cycle
    }

    /// Child traces in rendering order.
    #[must_use]
    pub fn children(&self) -> Vec<&Rc<Trace>> {
        match &self.kind {
            TraceKind::Leaf { .. } => Vec::new(),
            TraceKind::Concat { left, right }
            | TraceKind::Inter { left, right }
            | TraceKind::Conj { left, right } => {
                let mut out = vec![left];
                out.extend(right.iter());
                out
            }
            TraceKind::Alt { inner, .. } | TraceKind::Inv { inner } => vec![inner],
            TraceKind::Repeat { steps } => steps.iter().collect(),
            TraceKind::Cond {
                antecedent,
                consequent,
            } => {
                let mut out = vec![antecedent];
                out.extend(consequent.iter());
                out
            }
        }
    }

    /// Rendering symbol for this node.
    fn symbol(&self) -> &str {
        match &self.kind {
            TraceKind::Leaf { label } => label.as_ref(),
            TraceKind::Concat { .. } => "+",
            TraceKind::Alt { .. } => "|",
            TraceKind::Inter { .. } => "^",
            TraceKind::Conj { .. } => "&",
            TraceKind::Repeat { .. } => "*",
            TraceKind::Cond { .. } => ">>",
            TraceKind::Inv { .. } => "~",
        }
    }

    /// Deterministic multi-line rendering of the whole tree.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;

        let verdict = if self.matched { "match" } else { "fail" };
        let _ = writeln!(
            out,
            "{:indent$}{} ({}/{}) ({}/{}) {}",
            "",
            self.symbol(),
            self.span.start_cycle,
            self.span.end_cycle,
            self.span.start_time,
            self.span.end_time,
            verdict,
            indent = depth * 2
        );
        for child in self.children() {
            child.render_into(out, depth + 1);
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
