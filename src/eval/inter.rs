//! Intersection (convolution).

use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::{MatchRecord, Outcome};
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// Evaluates both sides from the same start cycle and convolves their
/// match streams: each new match pairs with every already-seen match of
/// the other side that ends no later, producing a match ending at the
/// newer end. With no pair formed and at least one failed child, one
/// failure is reported at completion.
pub(crate) struct InterTask {
    ctx: EvalCtx,
    left: Expr,
    right: Expr,
    started: bool,
    ids: [Option<TaskId>; 2],
    done: [bool; 2],
    left_matches: Vec<MatchRecord>,
    right_matches: Vec<MatchRecord>,
    matched: bool,
    failures: Vec<Rc<Trace>>,
}

impl InterTask {
    pub fn new(ctx: EvalCtx, left: Expr, right: Expr) -> Self {
        Self {
            ctx,
            left,
            right,
            started: false,
            ids: [None, None],
            done: [false, false],
            left_matches: Vec::new(),
            right_matches: Vec::new(),
            matched: false,
            failures: Vec::new(),
        }
    }

    fn side_of(&self, id: TaskId) -> usize {
        usize::from(self.ids[0] != Some(id))
    }

    fn emit_pair(
        ctx: EvalCtx,
        cx: &mut Context<'_>,
        left: Rc<Trace>,
        right: Rc<Trace>,
        end: u64,
    ) {
        let span = ctx.span_to(end, cx.now());
        let trace = Trace::branch(
            span,
            true,
            TraceKind::Inter {
                left,
                right: Some(right),
            },
        );
        cx.emit(Outcome::matched(ctx.start, end, trace));
    }
}

impl Task for InterTask {
    fn name(&self) -> &str {
        "inter"
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
                            if which == 0 {
                                for other in &self.right_matches {
                                    if other.end <= m.end {
                                        Self::emit_pair(
                                            self.ctx,
                                            cx,
                                            Rc::clone(&m.trace),
                                            Rc::clone(&other.trace),
                                            m.end,
                                        );
                                        self.matched = true;
                                    }
                                }
                                self.left_matches.push(m);
                            } else {
                                for other in &self.left_matches {
                                    if other.end <= m.end {
                                        Self::emit_pair(
                                            self.ctx,
                                            cx,
                                            Rc::clone(&other.trace),
                                            Rc::clone(&m.trace),
                                            m.end,
                                        );
                                        self.matched = true;
                                    }
                                }
                                self.right_matches.push(m);
                            }
                        }
                        Outcome::Failure(f) => self.failures.push(f.trace),
                    }
                }
                ChildMsg::Finished { from } => {
                    let which = self.side_of(from);
                    self.done[which] = true;
                }
            }
        }

        if self.done[0] && self.done[1] {
            if !self.matched {
                if let Some(inner) = self.failures.last() {
                    let at = cx.current_cycle(self.ctx.sampler);
                    let span = self.ctx.span_to(at, cx.now());
                    let trace = Trace::branch(
                        span,
                        false,
                        TraceKind::Inter {
                            left: Rc::clone(inner),
                            right: None,
                        },
                    );
                    cx.emit(Outcome::failed(self.ctx.start, at, trace));
                }
            }
            return Step::Done;
        }
        Step::Wait(vec![Reason::Child])
    }
}
