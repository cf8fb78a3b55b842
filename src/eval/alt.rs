//! Alternation.

use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// Evaluates both sides from the same start cycle and forwards every
/// match, tagged with the side that produced it. The operator lives
/// until both sides complete; if any side conclusively failed, one
/// failure is reported at completion — even alongside matches from the
/// other side, since a failed branch is a failed evaluation path.
pub(crate) struct AltTask {
    ctx: EvalCtx,
    left: Expr,
    right: Expr,
    started: bool,
    ids: [Option<TaskId>; 2],
    done: [bool; 2],
    failures: Vec<(usize, Rc<Trace>)>,
}

impl AltTask {
    pub fn new(ctx: EvalCtx, left: Expr, right: Expr) -> Self {
        Self {
            ctx,
            left,
            right,
            started: false,
            ids: [None, None],
            done: [false, false],
            failures: Vec::new(),
        }
    }

    fn side_of(&self, id: TaskId) -> usize {
        usize::from(self.ids[0] != Some(id))
    }
}

impl Task for AltTask {
    fn name(&self) -> &str {
        "alt"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if !self.started {
            self.started = true;
            self.ids[0] = Some(spawn_eval(&self.left, cx, self.ctx));
            self.ids[1] = Some(spawn_eval(&self.right, cx, self.ctx));
            return Step::Wait(vec![Reason::Child]);
        }

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { from, outcome } => {
                    let which = self.side_of(from);
                    match outcome {
                        Outcome::Match(m) => {
                            let span = self.ctx.span_to(m.end, cx.now());
                            let trace = Trace::branch(
                                span,
                                true,
                                TraceKind::Alt {
                                    which,
                                    inner: m.trace,
                                },
                            );
                            cx.emit(Outcome::matched(self.ctx.start, m.end, trace));
                        }
                        Outcome::Failure(f) => self.failures.push((which, f.trace)),
                    }
                }
                ChildMsg::Finished { from } => {
                    let which = self.side_of(from);
                    self.done[which] = true;
                }
            }
        }

        if self.done[0] && self.done[1] {
            if let Some((which, inner)) = self.failures.last() {
                let at = cx.current_cycle(self.ctx.sampler);
                let span = self.ctx.span_to(at, cx.now());
                let trace = Trace::branch(
                    span,
                    false,
                    TraceKind::Alt {
                        which: *which,
                        inner: Rc::clone(inner),
                    },
                );
                cx.emit(Outcome::failed(self.ctx.start, at, trace));
            }
            return Step::Done;
        }
        Step::Wait(vec![Reason::Child])
    }
}
