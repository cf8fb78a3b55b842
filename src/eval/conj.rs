//! Conjunction.

use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::Cycle;
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// Evaluates both sides from the same start cycle and emits a match only
/// when the sides match ending at the same cycle. Matches from either
/// side are buffered per end cycle until a counterpart arrives. With no
/// conjoined match and at least one failed child, one failure is
/// reported at completion.
pub(crate) struct ConjTask {
    ctx: EvalCtx,
    left: Expr,
    right: Expr,
    started: bool,
    ids: [Option<TaskId>; 2],
    done: [bool; 2],
    /// Matches seen so far, keyed by end cycle: (left traces, right traces).
    by_end: HashMap<Cycle, (Vec<Rc<Trace>>, Vec<Rc<Trace>>)>,
    matched: bool,
    failures: Vec<Rc<Trace>>,
}

impl ConjTask {
    pub fn new(ctx: EvalCtx, left: Expr, right: Expr) -> Self {
        Self {
            ctx,
            left,
            right,
            started: false,
            ids: [None, None],
            done: [false, false],
            by_end: HashMap::new(),
            matched: false,
            failures: Vec::new(),
        }
    }

    fn side_of(&self, id: TaskId) -> usize {
        usize::from(self.ids[0] != Some(id))
    }
}

impl Task for ConjTask {
    fn name(&self) -> &str {
        "conj"
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
                            let partners: Vec<Rc<Trace>> = {
                                let slot = self.by_end.entry(m.end).or_default();
                                if which == 0 {
                                    slot.1.clone()
                                } else {
                                    slot.0.clone()
                                }
                            };
                            for partner in partners {
                                let (left, right) = if which == 0 {
                                    (Rc::clone(&m.trace), partner)
                                } else {
                                    (partner, Rc::clone(&m.trace))
                                };
                                let span = self.ctx.span_to(m.end, cx.now());
                                let trace = Trace::branch(
                                    span,
                                    true,
                                    TraceKind::Conj {
                                        left,
                                        right: Some(right),
                                    },
                                );
                                self.matched = true;
                                cx.emit(Outcome::matched(self.ctx.start, m.end, trace));
                            }
                            let slot = self.by_end.entry(m.end).or_default();
                            if which == 0 {
                                slot.0.push(m.trace);
                            } else {
                                slot.1.push(m.trace);
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
                        TraceKind::Conj {
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
