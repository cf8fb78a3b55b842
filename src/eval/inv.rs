//! Inversion.

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// Swaps the inner evaluation's outcomes: its first match becomes this
/// operator's failure (the inner evaluation is cancelled at that point),
/// and its failure becomes a match ending at the cycle the failure was
/// reported.
pub(crate) struct InvTask {
    ctx: EvalCtx,
    inner: Expr,
    inner_id: Option<TaskId>,
}

impl InvTask {
    pub fn new(ctx: EvalCtx, inner: Expr) -> Self {
        Self {
            ctx,
            inner,
            inner_id: None,
        }
    }
}

impl Task for InvTask {
    fn name(&self) -> &str {
        "inv"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        let Some(inner_id) = self.inner_id else {
            self.inner_id = Some(spawn_eval(&self.inner, cx, self.ctx));
            return Step::Wait(vec![Reason::Child]);
        };

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { outcome, .. } => match outcome {
                    Outcome::Match(m) => {
                        let span = self.ctx.span_to(m.end, cx.now());
                        let trace =
                            Trace::branch(span, false, TraceKind::Inv { inner: m.trace });
                        cx.emit(Outcome::failed(self.ctx.start, m.end, trace));
                        cx.cancel(inner_id);
                        return Step::Done;
                    }
                    Outcome::Failure(f) => {
                        let span = self.ctx.span_to(f.at, cx.now());
                        let trace = Trace::branch(span, true, TraceKind::Inv { inner: f.trace });
                        cx.emit(Outcome::matched(self.ctx.start, f.at, trace));
                        return Step::Done;
                    }
                },
                ChildMsg::Finished { .. } => return Step::Done,
            }
        }
        Step::Wait(vec![Reason::Child])
    }
}
