//! Outcome filters.

use std::collections::HashSet;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::Cycle;

use super::{spawn_eval, EvalCtx};

/// Forwards the inner evaluation's first match, cancels the inner
/// evaluation, and stops. Failures pass through unchanged.
pub(crate) struct FirstOfTask {
    ctx: EvalCtx,
    inner: Expr,
    inner_id: Option<TaskId>,
}

impl FirstOfTask {
    pub fn new(ctx: EvalCtx, inner: Expr) -> Self {
        Self {
            ctx,
            inner,
            inner_id: None,
        }
    }
}

impl Task for FirstOfTask {
    fn name(&self) -> &str {
        "firstof"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        let Some(inner_id) = self.inner_id else {
            self.inner_id = Some(spawn_eval(&self.inner, cx, self.ctx));
            return Step::Wait(vec![Reason::Child]);
        };

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { outcome, .. } => {
                    cx.emit(outcome);
                    cx.cancel(inner_id);
                    return Step::Done;
                }
                ChildMsg::Finished { .. } => return Step::Done,
            }
        }
        Step::Wait(vec![Reason::Child])
    }
}

/// Forwards at most one match per distinct end cycle; later matches at
/// an already-seen end cycle are dropped silently. The inner evaluation
/// keeps running. Failures pass through unchanged.
pub(crate) struct OnceTask {
    ctx: EvalCtx,
    inner: Expr,
    started: bool,
    seen: HashSet<Cycle>,
}

impl OnceTask {
    pub fn new(ctx: EvalCtx, inner: Expr) -> Self {
        Self {
            ctx,
            inner,
            started: false,
            seen: HashSet::new(),
        }
    }
}

impl Task for OnceTask {
    fn name(&self) -> &str {
        "once"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if !self.started {
            self.started = true;
            spawn_eval(&self.inner, cx, self.ctx);
            return Step::Wait(vec![Reason::Child]);
        }

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { outcome, .. } => match outcome {
                    Outcome::Match(m) => {
                        if self.seen.insert(m.end) {
                            cx.emit(Outcome::Match(m));
                        }
                    }
                    failure @ Outcome::Failure(_) => cx.emit(failure),
                },
                ChildMsg::Finished { .. } => return Step::Done,
            }
        }
        Step::Wait(vec![Reason::Child])
    }
}
