//! Predicate evaluation.

use std::rc::Rc;

use crate::expr::PredFn;
use crate::outcome::Outcome;
use crate::task::{Context, Step, Task};
use crate::trace::Trace;

use super::EvalCtx;

/// Evaluates a predicate against ambient host state on its first
/// dispatch. A predicate reports about the cycle it was spawned in; it
/// never waits.
pub(crate) struct PredTask {
    ctx: EvalCtx,
    label: Rc<str>,
    test: PredFn,
}

impl PredTask {
    pub fn new(ctx: EvalCtx, label: Rc<str>, test: PredFn) -> Self {
        Self { ctx, label, test }
    }
}

impl Task for PredTask {
    fn name(&self) -> &str {
        "pred"
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        let holds = (self.test)();
        let trace = Trace::leaf(self.ctx.start, cx.now(), Rc::clone(&self.label), holds);
        if holds {
            cx.emit(Outcome::matched(self.ctx.start, self.ctx.start, trace));
        } else {
            cx.emit(Outcome::failed(self.ctx.start, self.ctx.start, trace));
        }
        Step::Done
    }
}
