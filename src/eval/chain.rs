//! Concatenation and fusion.

use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::Cycle;
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// A right-hand evaluation waiting for its start cycle.
struct PendingRight {
    due: Cycle,
    left_trace: Rc<Trace>,
}

/// Evaluates `left`, then for each of its matches evaluates `right`
/// starting either one cycle later (concatenation) or at the same cycle
/// the match ended (fusion). Completes when the left side and every
/// launched right side are done. With no match emitted and at least one
/// failed path, one failure is reported at completion.
pub(crate) struct ChainTask {
    ctx: EvalCtx,
    left: Expr,
    right: Expr,
    advance: bool,
    started: bool,
    left_id: Option<TaskId>,
    left_done: bool,
    pending: Vec<PendingRight>,
    right_of: HashMap<TaskId, Rc<Trace>>,
    matched: bool,
    failure: Option<Rc<Trace>>,
}

impl ChainTask {
    pub fn new(ctx: EvalCtx, left: Expr, right: Expr, advance: bool) -> Self {
        Self {
            ctx,
            left,
            right,
            advance,
            started: false,
            left_id: None,
            left_done: false,
            pending: Vec::new(),
            right_of: HashMap::new(),
            matched: false,
            failure: None,
        }
    }

    fn launch_right(&mut self, cx: &mut Context<'_>, start: Cycle, left_trace: Rc<Trace>) {
        let rctx = EvalCtx {
            sampler: self.ctx.sampler,
            start,
            start_time: cx.now(),
        };
        let id = spawn_eval(&self.right, cx, rctx);
        self.right_of.insert(id, left_trace);
    }

    fn on_left(&mut self, cx: &mut Context<'_>, outcome: Outcome) {
        match outcome {
            Outcome::Match(m) => {
                if self.advance {
                    self.pending.push(PendingRight {
                        due: m.end + 1,
                        left_trace: m.trace,
                    });
                } else {
                    self.launch_right(cx, m.end, m.trace);
                }
            }
            Outcome::Failure(f) => {
                let span = self.ctx.span_to(f.at, cx.now());
                self.failure = Some(Trace::branch(
                    span,
                    false,
                    TraceKind::Concat {
                        left: f.trace,
                        right: None,
                    },
                ));
            }
        }
    }

    fn on_right(&mut self, cx: &mut Context<'_>, from: TaskId, outcome: Outcome) {
        let Some(left_trace) = self.right_of.get(&from).map(Rc::clone) else {
            return;
        };
        match outcome {
            Outcome::Match(m) => {
                let span = self.ctx.span_to(m.end, cx.now());
                let trace = Trace::branch(
                    span,
                    true,
                    TraceKind::Concat {
                        left: left_trace,
                        right: Some(m.trace),
                    },
                );
                self.matched = true;
                cx.emit(Outcome::matched(self.ctx.start, m.end, trace));
            }
            Outcome::Failure(f) => {
                let span = self.ctx.span_to(f.at, cx.now());
                self.failure = Some(Trace::branch(
                    span,
                    false,
                    TraceKind::Concat {
                        left: left_trace,
                        right: Some(f.trace),
                    },
                ));
            }
        }
    }

    fn wait(&self) -> Step {
        let mut reasons = vec![Reason::Child];
        if !self.pending.is_empty() {
            reasons.push(Reason::Event(self.ctx.sampler));
        }
        Step::Wait(reasons)
    }
}

impl Task for ChainTask {
    fn name(&self) -> &str {
        if self.advance {
            "concat"
        } else {
            "fuse"
        }
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if !self.started {
            self.started = true;
            self.left_id = Some(spawn_eval(&self.left, cx, self.ctx));
            return self.wait();
        }

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { from, outcome } => {
                    if Some(from) == self.left_id {
                        self.on_left(cx, outcome);
                    } else {
                        self.on_right(cx, from, outcome);
                    }
                }
                ChildMsg::Finished { from } => {
                    if Some(from) == self.left_id {
                        self.left_done = true;
                    } else {
                        self.right_of.remove(&from);
                    }
                }
            }
        }

        // Launch right-hand evaluations whose start cycle has arrived.
        let cycle = cx.current_cycle(self.ctx.sampler);
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= cycle {
                let p = self.pending.swap_remove(i);
                self.launch_right(cx, p.due, p.left_trace);
            } else {
                i += 1;
            }
        }

        if self.left_done && self.pending.is_empty() && self.right_of.is_empty() {
            if !self.matched {
                if let Some(trace) = self.failure.take() {
                    cx.emit(Outcome::failed(self.ctx.start, cycle, trace));
                }
            }
            return Step::Done;
        }
        self.wait()
    }
}
