//! Cooperative tasks.
//!
//! A task is a suspendable computation expressed as an explicit state
//! machine: the scheduler calls [`Task::step`] and the task returns a
//! [`Step`] directive. `Wait` suspends the task on a list of reasons, any
//! one of which resumes it; `Done` retires it. Spawning children and
//! emitting outcomes do not suspend, so they are operations on the
//! [`Context`] handed to `step` rather than yielded directives.
//!
//! Tasks are not threads. They are logical coroutines owned by one
//! engine, interleaved at explicit suspension points only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::event::EventId;
use crate::outcome::Outcome;
use crate::time::{Cycle, VirtualTime};

/// Copyable handle for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A condition that can resume a suspended task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Resume on the next posting of the event.
    Event(EventId),
    /// Resume after this many ticks of virtual time. A delta of zero
    /// requeues the task at the current instant, behind already-ready
    /// tasks.
    Timeout(u64),
    /// Resume when a child task emits an outcome or finishes.
    Child,
}

/// Directive returned by one dispatch of a task.
#[derive(Debug)]
pub enum Step {
    /// Suspend until one of the reasons fires. The first reason to fire
    /// wins; the others are discarded.
    Wait(Vec<Reason>),
    /// The task is complete. Any children still alive are torn down and
    /// the parent is notified.
    Done,
}

/// A message delivered to a parent task's inbox.
#[derive(Debug)]
pub enum ChildMsg {
    /// A child emitted a match or failure.
    Outcome {
        /// The emitting child.
        from: TaskId,
        /// The emission.
        outcome: Outcome,
    },
    /// A child ran to completion (or was torn down). Always the last
    /// message from that child.
    Finished {
        /// The finished child.
        from: TaskId,
    },
}

/// A unit of cooperative execution.
///
/// Implementations keep their per-dispatch position in ordinary fields;
/// the scheduler guarantees `step` is never re-entered.
pub trait Task {
    /// Short name for logs.
    fn name(&self) -> &str {
        "task"
    }

    /// Run until the next suspension point and report it.
    fn step(&mut self, cx: &mut Context<'_>) -> Step;
}

/// Scheduler capabilities exposed to a running task.
///
/// All operations are non-suspending; suspension happens only by
/// returning a [`Step`] from [`Task::step`].
pub struct Context<'a> {
    pub(crate) engine: &'a mut Engine,
    pub(crate) task: TaskId,
}

impl Context<'_> {
    /// The id of the running task.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> VirtualTime {
        self.engine.now()
    }

    /// How many times the event has been posted so far.
    #[must_use]
    pub fn post_count(&self, event: EventId) -> u64 {
        self.engine.post_count(event)
    }

    /// The current cycle relative to a sampling event: the number of
    /// postings minus one. Zero before the first posting.
    #[must_use]
    pub fn current_cycle(&self, sampler: EventId) -> Cycle {
        self.engine.post_count(sampler).saturating_sub(1)
    }

    /// Post an event immediately, waking its waiters at this instant.
    pub fn post_now(&mut self, event: EventId) {
        self.engine.post(event);
    }

    /// Spawn a child task. The child becomes ready at this instant and
    /// its emissions are routed to this task's inbox.
    pub fn spawn(&mut self, child: Box<dyn Task>) -> TaskId {
        self.engine.spawn_task(Some(self.task), child)
    }

    /// Tear down a child task and all of its descendants. The child
    /// emits nothing further and no `Finished` message is delivered.
    pub fn cancel(&mut self, child: TaskId) {
        self.engine.cancel_child(self.task, child);
    }

    /// Emit an outcome to this task's sink (its parent's inbox).
    pub fn emit(&mut self, outcome: Outcome) {
        self.engine.emit_from(self.task, outcome);
    }

    /// Pop the next message from this task's inbox.
    pub fn next_msg(&mut self) -> Option<ChildMsg> {
        self.engine.pop_inbox(self.task)
    }
}
