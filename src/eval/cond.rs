//! Conditional.

use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::Cycle;
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// A consequent evaluation waiting for its start cycle.
struct PendingConsequent {
    due: Cycle,
    ante_trace: Rc<Trace>,
}

/// Evaluates the antecedent; an antecedent failure makes the whole
/// conditional vacuously true (one match, then done). Each antecedent
/// match obliges the consequent to hold from the following cycle. Any
/// failed consequent path is a violated obligation and is reported as
/// one failure at completion, even alongside matches from other paths.
pub(crate) struct CondTask {
    ctx: EvalCtx,
    antecedent: Expr,
    consequent: Expr,
    started: bool,
    ante_id: Option<TaskId>,
    ante_done: bool,
    pending: Vec<PendingConsequent>,
    cons_of: HashMap<TaskId, Rc<Trace>>,
    failures: Vec<Rc<Trace>>,
}

impl CondTask {
    pub fn new(ctx: EvalCtx, antecedent: Expr, consequent: Expr) -> Self {
        Self {
            ctx,
            antecedent,
            consequent,
            started: false,
            ante_id: None,
            ante_done: false,
            pending: Vec::new(),
            cons_of: HashMap::new(),
            failures: Vec::new(),
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

impl Task for CondTask {
    fn name(&self) -> &str {
        "cond"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if !self.started {
            self.started = true;
            self.ante_id = Some(spawn_eval(&self.antecedent, cx, self.ctx));
            return self.wait();
        }

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { from, outcome } => {
                    if Some(from) == self.ante_id {
                        match outcome {
                            Outcome::Match(m) => self.pending.push(PendingConsequent {
                                due: m.end + 1,
                                ante_trace: m.trace,
                            }),
                            Outcome::Failure(f) => {
                                // Antecedent unmet: vacuously true.
                                let span = self.ctx.span_to(f.at, cx.now());
                                let trace = Trace::branch(
                                    span,
                                    true,
                                    TraceKind::Cond {
                                        antecedent: f.trace,
                                        consequent: None,
                                    },
                                );
                                cx.emit(Outcome::matched(self.ctx.start, f.at, trace));
                                return Step::Done;
                            }
                        }
                    } else {
                        let Some(ante_trace) = self.cons_of.get(&from).map(Rc::clone) else {
                            continue;
                        };
                        match outcome {
                            Outcome::Match(m) => {
                                let span = self.ctx.span_to(m.end, cx.now());
                                let trace = Trace::branch(
                                    span,
                                    true,
                                    TraceKind::Cond {
                                        antecedent: ante_trace,
                                        consequent: Some(m.trace),
                                    },
                                );
                                cx.emit(Outcome::matched(self.ctx.start, m.end, trace));
                            }
                            Outcome::Failure(f) => {
                                let span = self.ctx.span_to(f.at, cx.now());
                                self.failures.push(Trace::branch(
                                    span,
                                    false,
                                    TraceKind::Cond {
                                        antecedent: ante_trace,
                                        consequent: Some(f.trace),
                                    },
                                ));
                            }
                        }
                    }
                }
                ChildMsg::Finished { from } => {
                    if Some(from) == self.ante_id {
                        self.ante_done = true;
                    } else {
                        self.cons_of.remove(&from);
                    }
                }
            }
        }

        // Launch consequents whose start cycle has arrived.
        let cycle = cx.current_cycle(self.ctx.sampler);
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= cycle {
                let p = self.pending.swap_remove(i);
                let rctx = EvalCtx {
                    sampler: self.ctx.sampler,
                    start: p.due,
                    start_time: cx.now(),
                };
                let id = spawn_eval(&self.consequent, cx, rctx);
                self.cons_of.insert(id, p.ante_trace);
            } else {
                i += 1;
            }
        }

        if self.ante_done && self.pending.is_empty() && self.cons_of.is_empty() {
            if let Some(trace) = self.failures.last() {
                cx.emit(Outcome::failed(self.ctx.start, cycle, Rc::clone(trace)));
            }
            return Step::Done;
        }
        self.wait()
    }
}
