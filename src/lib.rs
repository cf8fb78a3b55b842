//! # Oroboro - Temporal expressions over cycle-indexed event sequences
//!
//! Oroboro is an executable engine for temporal expressions:
//! compositional assertions over sequences of cycles demarcated by a
//! periodic sampling event. The engine launches a fresh evaluation of an
//! expression at every cycle and delivers each match or failure to user
//! callbacks together with a trace of how the outcome was produced.
//!
//! ## Core Concepts
//!
//! - **Event**: an identity tasks wait on; posted by the host or by operators
//! - **Cycle**: the interval between two consecutive postings of a sampling event
//! - **Expression**: an immutable operator tree over boolean predicates
//! - **Outcome**: a match covering a cycle range, or a conclusive failure
//! - **Trace**: an immutable tree mirroring the operator that produced an outcome
//!
//! ## Usage
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use oroboro::{Engine, Expr, VirtualTime};
//!
//! let mut engine = Engine::new();
//! let sampler = engine.event_named("sampler");
//!
//! let level = Rc::new(Cell::new(false));
//! let probe = Rc::clone(&level);
//! let expr = Expr::pred("level", move || probe.get());
//!
//! // Report every cycle where `level` was high two cycles in a row.
//! engine
//!     .always(
//!         sampler,
//!         expr.clone() + expr,
//!         |m| println!("high twice from cycle {} to {}", m.start, m.end),
//!         |_fail| {},
//!     )
//!     .unwrap();
//!
//! for (i, value) in [false, true, true].into_iter().enumerate() {
//!     level.set(value);
//!     let t = VirtualTime::from_ticks((i as u64 + 1) * 10);
//!     engine.post_at(t, sampler).unwrap();
//!     engine.run_until(t).unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Scheduler substrate
pub mod engine;
pub mod error;
pub mod event;
pub mod task;
pub mod time;

// Temporal expressions
pub mod assertion;
mod eval;
pub mod expr;
pub mod outcome;
pub mod stream;
pub mod trace;

// Re-export primary types at crate root for convenience
pub use assertion::AssertionId;
pub use engine::Engine;
pub use error::{ExecutionError, OroError, OroResult, ValidationError};
pub use event::EventId;
pub use expr::Expr;
pub use outcome::{FailureRecord, MatchRecord, Outcome};
pub use stream::AssertionStream;
pub use task::{ChildMsg, Context, Reason, Step, Task, TaskId};
pub use time::{Cycle, VirtualTime};
pub use trace::{Span, Trace, TraceKind};
