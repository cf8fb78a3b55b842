//! Repetition.

use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::Expr;
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::Cycle;
use crate::trace::{Trace, TraceKind};

use super::{spawn_eval, EvalCtx};

/// A chain extension waiting for its start cycle.
struct PendingRun {
    due: Cycle,
    count: u32,
    steps: Vec<Rc<Trace>>,
}

/// A live chain evaluation.
struct RunInfo {
    count: u32,
    steps: Vec<Rc<Trace>>,
}

/// Chain evaluation of `inner * (min, max)`: evaluate the inner
/// expression, and for each match either report the chain (when its
/// length is in range), extend it from the following cycle (when below
/// the maximum), or both. Each chain length that succeeds produces its
/// own match, so several matches per start cycle are normal.
///
/// The range form behaves like an alternation over chain lengths: any
/// failed extension is reported at completion even alongside matches.
/// The exact form `inner * n` behaves like nested concatenation and
/// reports failure only when nothing matched.
pub(crate) struct RepeatTask {
    ctx: EvalCtx,
    inner: Expr,
    min: u32,
    max: u32,
    started: bool,
    runs: HashMap<TaskId, RunInfo>,
    pending: Vec<PendingRun>,
    matched: bool,
    failures: Vec<Rc<Trace>>,
}

impl RepeatTask {
    pub fn new(ctx: EvalCtx, inner: Expr, min: u32, max: u32) -> Self {
        Self {
            ctx,
            inner,
            min,
            max,
            started: false,
            runs: HashMap::new(),
            pending: Vec::new(),
            matched: false,
            failures: Vec::new(),
        }
    }

    fn launch(&mut self, cx: &mut Context<'_>, start: Cycle, count: u32, steps: Vec<Rc<Trace>>) {
        let rctx = EvalCtx {
            sampler: self.ctx.sampler,
            start,
            start_time: cx.now(),
        };
        let id = spawn_eval(&self.inner, cx, rctx);
        self.runs.insert(id, RunInfo { count, steps });
    }

    fn wait(&self) -> Step {
        let mut reasons = vec![Reason::Child];
        if !self.pending.is_empty() {
            reasons.push(Reason::Event(self.ctx.sampler));
        }
        Step::Wait(reasons)
    }
}

impl Task for RepeatTask {
    fn name(&self) -> &str {
        "repeat"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        if !self.started {
            self.started = true;
            self.launch(cx, self.ctx.start, 1, Vec::new());
            return self.wait();
        }

        while let Some(msg) = cx.next_msg() {
            match msg {
                ChildMsg::Outcome { from, outcome } => {
                    let Some((count, base)) = self
                        .runs
                        .get(&from)
                        .map(|info| (info.count, info.steps.clone()))
                    else {
                        continue;
                    };
                    match outcome {
                        Outcome::Match(m) => {
                            let mut steps = base;
                            steps.push(Rc::clone(&m.trace));
                            if count >= self.min {
                                let span = self.ctx.span_to(m.end, cx.now());
                                let trace = Trace::branch(
                                    span,
                                    true,
                                    TraceKind::Repeat {
                                        steps: steps.clone(),
                                    },
                                );
                                self.matched = true;
                                cx.emit(Outcome::matched(self.ctx.start, m.end, trace));
                            }
                            if count < self.max {
                                self.pending.push(PendingRun {
                                    due: m.end + 1,
                                    count: count + 1,
                                    steps,
                                });
                            }
                        }
                        Outcome::Failure(f) => {
                            let mut steps = base;
                            steps.push(Rc::clone(&f.trace));
                            let span = self.ctx.span_to(f.at, cx.now());
                            self.failures
                                .push(Trace::branch(span, false, TraceKind::Repeat { steps }));
                        }
                    }
                }
                ChildMsg::Finished { from } => {
                    self.runs.remove(&from);
                }
            }
        }

        // Extend chains whose start cycle has arrived.
        let cycle = cx.current_cycle(self.ctx.sampler);
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= cycle {
                let p = self.pending.swap_remove(i);
                self.launch(cx, p.due, p.count, p.steps);
            } else {
                i += 1;
            }
        }

        if self.runs.is_empty() && self.pending.is_empty() {
            let report = self.min != self.max || !self.matched;
            if report {
                if let Some(trace) = self.failures.last() {
                    cx.emit(Outcome::failed(self.ctx.start, cycle, Rc::clone(trace)));
                }
            }
            return Step::Done;
        }
        self.wait()
    }
}
