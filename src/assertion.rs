//! The assertion driver.
//!
//! `always` restarts an evaluation of its expression at every posting of
//! the sampling event and funnels every resulting match or failure to
//! user callbacks, in emission order, within the same virtual instant
//! the outcome was produced.

use std::fmt;

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{ExecutionError, OroResult};
use crate::eval::{spawn_eval, EvalCtx};
use crate::event::EventId;
use crate::expr::Expr;
use crate::outcome::{FailureRecord, MatchRecord, Outcome};
use crate::task::{ChildMsg, Context, Reason, Step, Task};

/// Unique identifier for a registered assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionId(Uuid);

impl AssertionId {
    /// Create a new random assertion id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AssertionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a driver sends the outcomes it collects.
pub(crate) enum AssertionSink {
    /// Invoke user callbacks directly.
    Callbacks {
        on_match: Box<dyn FnMut(&MatchRecord)>,
        on_fail: Box<dyn FnMut(&FailureRecord)>,
    },
    /// Push into a bounded channel; drop on backpressure, stop on
    /// disconnect.
    Channel {
        tx: Sender<Outcome>,
        dropped: Arc<AtomicU64>,
    },
}

impl AssertionSink {
    /// Routes one outcome. Returns `false` when the sink is gone and the
    /// driver should retire.
    fn route(&mut self, outcome: Outcome) -> bool {
        match self {
            Self::Callbacks { on_match, on_fail } => {
                match &outcome {
                    Outcome::Match(m) => on_match(m),
                    Outcome::Failure(f) => on_fail(f),
                }
                true
            }
            Self::Channel { tx, dropped } => match tx.try_send(outcome) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }
}

/// The `always` driver task: one fresh evaluation per sampler posting.
pub(crate) struct AlwaysTask {
    id: AssertionId,
    sampler: EventId,
    expr: Expr,
    sink: AssertionSink,
    /// Evaluations launched so far; also the next start cycle.
    spawned: u64,
}

impl AlwaysTask {
    /// `first_cycle` is the sampler's posting count at registration, so
    /// that a late-registered assertion does not evaluate past cycles.
    pub fn new(
        id: AssertionId,
        sampler: EventId,
        expr: Expr,
        sink: AssertionSink,
        first_cycle: u64,
    ) -> Self {
        Self {
            id,
            sampler,
            expr,
            sink,
            spawned: first_cycle,
        }
    }
}

impl Task for AlwaysTask {
    fn name(&self) -> &str {
        "always"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { outcome, .. } => {
                    if !self.sink.route(outcome) {
                        debug!(assertion = %self.id, "sink disconnected, retiring driver");
                        return Step::Done;
                    }
                }
                ChildMsg::Finished { .. } => {}
            }
        }

        // One evaluation per posting; `spawned` doubles as the cycle
        // number of the next launch.
        let posts = cx.post_count(self.sampler);
        while self.spawned < posts {
            let ctx = EvalCtx {
                sampler: self.sampler,
                start: self.spawned,
                start_time: cx.now(),
            };
            spawn_eval(&self.expr, cx, ctx);
            self.spawned += 1;
        }

        Step::Wait(vec![Reason::Event(self.sampler), Reason::Child])
    }
}

impl Engine {
    /// Registers an `always` assertion: on each posting of `sampler`, a
    /// fresh evaluation of `expr` starts at the current cycle, and every
    /// match or failure it produces is passed to `on_match`/`on_fail`.
    ///
    /// Callbacks must not call back into this engine.
    ///
    /// # Errors
    ///
    /// `UnknownEvent` if `sampler` was not issued by this engine.
    pub fn always<M, F>(
        &mut self,
        sampler: EventId,
        expr: Expr,
        on_match: M,
        on_fail: F,
    ) -> OroResult<AssertionId>
    where
        M: FnMut(&MatchRecord) + 'static,
        F: FnMut(&FailureRecord) + 'static,
    {
        self.register_assertion(
            sampler,
            expr,
            AssertionSink::Callbacks {
                on_match: Box::new(on_match),
                on_fail: Box::new(on_fail),
            },
        )
    }

    pub(crate) fn register_assertion(
        &mut self,
        sampler: EventId,
        expr: Expr,
        sink: AssertionSink,
    ) -> OroResult<AssertionId> {
        self.check_event(sampler)?;
        let id = AssertionId::new();
        let task = AlwaysTask::new(id, sampler, expr, sink, self.post_count(sampler));
        let tid = self.start(Box::new(task));
        self.assertions.insert(id, tid);
        Ok(id)
    }

    /// Cancels a registered assertion: its driver and any in-flight
    /// evaluations are torn down without further callbacks.
    ///
    /// # Errors
    ///
    /// `UnknownAssertion` if `id` is not (or no longer) registered.
    pub fn dismiss(&mut self, id: AssertionId) -> OroResult<()> {
        let Some(tid) = self.assertions.remove(&id) else {
            return Err(ExecutionError::UnknownAssertion { id }.into());
        };
        self.remove_tree(tid);
        Ok(())
    }
}
