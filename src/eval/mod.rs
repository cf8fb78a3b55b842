//! Operator evaluation tasks.
//!
//! Every expression node is a factory: given an evaluation context (the
//! sampling event, a start cycle and that cycle's instant), it produces
//! one task. Operator tasks spawn sub-evaluations for their children,
//! collect child outcomes through their inbox, and emit composed
//! outcomes upward. One evaluation emits zero or more matches followed
//! by at most one failure; the failure is produced when the operator
//! completes, at the cycle where the verdict became known.

use crate::event::EventId;
use crate::expr::{Expr, ExprNode};
use crate::task::{Context, TaskId};
use crate::time::{Cycle, VirtualTime};
use crate::trace::Span;

mod alt;
mod chain;
mod cond;
mod conj;
mod filter;
mod inter;
mod inv;
mod pred;
mod repeat;

use alt::AltTask;
use chain::ChainTask;
use cond::CondTask;
use conj::ConjTask;
use filter::{FirstOfTask, OnceTask};
use inter::InterTask;
use inv::InvTask;
use pred::PredTask;
use repeat::RepeatTask;

/// Parent-supplied context for one evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvalCtx {
    /// The sampling event that defines cycle boundaries.
    pub sampler: EventId,
    /// Cycle the evaluation starts at.
    pub start: Cycle,
    /// Virtual time of the start cycle's sampling instant.
    pub start_time: VirtualTime,
}

impl EvalCtx {
    /// Span from the evaluation start to the given end point.
    pub fn span_to(self, end_cycle: Cycle, end_time: VirtualTime) -> Span {
        Span {
            start_cycle: self.start,
            end_cycle,
            start_time: self.start_time,
            end_time,
        }
    }
}

/// Spawns the evaluation task for `expr` as a child of the running task.
pub(crate) fn spawn_eval(expr: &Expr, cx: &mut Context<'_>, ctx: EvalCtx) -> TaskId {
    match &*expr.node {
        ExprNode::Pred { label, test } => {
            cx.spawn(Box::new(PredTask::new(ctx, label.clone(), test.clone())))
        }
        ExprNode::Concat { left, right } => cx.spawn(Box::new(ChainTask::new(
            ctx,
            left.clone(),
            right.clone(),
            true,
        ))),
        ExprNode::Fuse { left, right } => cx.spawn(Box::new(ChainTask::new(
            ctx,
            left.clone(),
            right.clone(),
            false,
        ))),
        ExprNode::Alt { left, right } => {
            cx.spawn(Box::new(AltTask::new(ctx, left.clone(), right.clone())))
        }
        ExprNode::Inter { left, right } => {
            cx.spawn(Box::new(InterTask::new(ctx, left.clone(), right.clone())))
        }
        ExprNode::Conj { left, right } => {
            cx.spawn(Box::new(ConjTask::new(ctx, left.clone(), right.clone())))
        }
        ExprNode::Repeat { inner, min, max } => {
            cx.spawn(Box::new(RepeatTask::new(ctx, inner.clone(), *min, *max)))
        }
        ExprNode::Cond {
            antecedent,
            consequent,
        } => cx.spawn(Box::new(CondTask::new(
            ctx,
            antecedent.clone(),
            consequent.clone(),
        ))),
        ExprNode::Inv { inner } => cx.spawn(Box::new(InvTask::new(ctx, inner.clone()))),
        ExprNode::FirstOf { inner } => cx.spawn(Box::new(FirstOfTask::new(ctx, inner.clone()))),
        ExprNode::Once { inner } => cx.spawn(Box::new(OnceTask::new(ctx, inner.clone()))),
    }
}
