//! The cooperative scheduler.
//!
//! One [`Engine`] owns everything: the ready queue, the timed queue, the
//! event table, and every task. Execution is strictly single-threaded and
//! non-preemptive; a task runs until it returns a directive, and all
//! queues are mutated only from `run_until`/`run` on the host's thread.
//!
//! Virtual time is supplied by the host and only ever moves forward.
//! `run_until` advances to each due timed entry in `(time, insertion)`
//! order, fires it, and drains the ready queue to quiescence before
//! touching the next entry, so everything scheduled at one instant
//! settles before time moves again.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::assertion::AssertionId;
use crate::error::{ExecutionError, OroResult, ValidationError};
use crate::event::{EventEntry, EventId, EventWaiter};
use crate::outcome::Outcome;
use crate::task::{ChildMsg, Context, Reason, Step, Task, TaskId};
use crate::time::VirtualTime;

/// What a due timed entry does when it fires.
#[derive(Debug, Clone, Copy)]
enum TimedAction {
    /// Post an event, draining its wait list into the ready queue.
    PostEvent(EventId),
    /// Wake one task that suspended on a timeout.
    WakeTask { task: TaskId, epoch: u64 },
}

/// An entry in the timed queue, ordered by `(when, seq)` for stability.
#[derive(Debug)]
struct TimedEntry {
    when: VirtualTime,
    seq: u64,
    action: TimedAction,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap becomes a stable min-heap.
        (other.when, other.seq).cmp(&(self.when, self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Ready,
    Running,
    Waiting,
}

struct TaskEntry {
    task: Option<Box<dyn Task>>,
    parent: Option<TaskId>,
    children: Vec<TaskId>,
    inbox: VecDeque<ChildMsg>,
    state: RunState,
    /// Suspension epoch; bumped on every `Wait` so that registrations
    /// from an earlier suspension can be recognized as stale.
    epoch: u64,
    waiting_on_child: bool,
}

/// The cooperative scheduler and evaluation engine.
///
/// An `Engine` is an ordinary value; create as many as you like. Tasks,
/// events and assertions registered on one engine are meaningless on
/// another.
pub struct Engine {
    now: VirtualTime,
    seq: u64,
    next_task: u64,
    timed: BinaryHeap<TimedEntry>,
    ready: VecDeque<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    events: Vec<EventEntry>,
    pub(crate) assertions: HashMap<AssertionId, TaskId>,
    wall_anchor: Option<DateTime<Utc>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine at virtual time zero with no events or tasks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: VirtualTime::ZERO,
            seq: 0,
            next_task: 1,
            timed: BinaryHeap::new(),
            ready: VecDeque::new(),
            tasks: HashMap::new(),
            events: Vec::new(),
            assertions: HashMap::new(),
            wall_anchor: None,
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Creates a new unnamed event.
    pub fn event(&mut self) -> EventId {
        self.event_named("")
    }

    /// Creates a new event with a name for logs.
    pub fn event_named(&mut self, name: impl Into<String>) -> EventId {
        let id = EventId(u32::try_from(self.events.len()).unwrap_or(u32::MAX));
        self.events.push(EventEntry {
            name: name.into(),
            ..EventEntry::default()
        });
        trace!(event = %id, "event created");
        id
    }

    /// How many times an event has been posted. Zero for unknown ids.
    #[must_use]
    pub fn post_count(&self, event: EventId) -> u64 {
        self.events.get(event.index()).map_or(0, |e| e.posts)
    }

    /// Starts a root task. Its emissions, if any, are dropped.
    pub fn start(&mut self, task: Box<dyn Task>) -> TaskId {
        self.spawn_task(None, task)
    }

    /// Schedules `event` to be posted when virtual time reaches `when`.
    ///
    /// # Errors
    ///
    /// `NonMonotonicTime` if `when` is in the past, `UnknownEvent` for an
    /// id this engine did not issue.
    pub fn post_at(&mut self, when: VirtualTime, event: EventId) -> OroResult<()> {
        if when < self.now {
            return Err(ValidationError::NonMonotonicTime {
                now: self.now,
                requested: when,
            }
            .into());
        }
        self.check_event(event)?;
        self.push_timed(when, TimedAction::PostEvent(event));
        Ok(())
    }

    /// Posts an event immediately. Waiters become ready and run during
    /// the next `run_until`/`run` call (or the current one, when posted
    /// from inside a task).
    ///
    /// # Errors
    ///
    /// `UnknownEvent` for an id this engine did not issue.
    pub fn post_now(&mut self, event: EventId) -> OroResult<()> {
        self.check_event(event)?;
        self.post(event);
        Ok(())
    }

    /// Advances virtual time to `target`, firing every timed entry due at
    /// or before it and running all tasks made ready along the way.
    /// Returns once no more work is due at or before `target`; `now` is
    /// then exactly `target`.
    ///
    /// # Errors
    ///
    /// `NonMonotonicTime` if `target` is earlier than `now`.
    ///
    /// # Panics
    ///
    /// A panicking predicate or task propagates out of this call; the
    /// engine state is undefined afterwards.
    pub fn run_until(&mut self, target: VirtualTime) -> OroResult<()> {
        if target < self.now {
            return Err(ValidationError::NonMonotonicTime {
                now: self.now,
                requested: target,
            }
            .into());
        }

        self.drain_ready();
        while self.timed.peek().is_some_and(|e| e.when <= target) {
            self.fire_next_timed();
            self.drain_ready();
        }
        self.now = target;
        Ok(())
    }

    /// Runs until no timed work remains at any future instant. Tasks left
    /// waiting on events that will never be posted do not keep this alive.
    pub fn run(&mut self) {
        self.drain_ready();
        while self.timed.peek().is_some() {
            self.fire_next_timed();
            self.drain_ready();
        }
    }

    // ---- wall-clock interop ------------------------------------------------

    /// Anchors the wall-clock interface: `anchor` maps to virtual time
    /// zero and one tick is one microsecond.
    ///
    /// # Errors
    ///
    /// `WallClockAlreadyAnchored` on a second call.
    pub fn set_wall_anchor(&mut self, anchor: DateTime<Utc>) -> OroResult<()> {
        if let Some(existing) = self.wall_anchor {
            return Err(ValidationError::WallClockAlreadyAnchored { anchor: existing }.into());
        }
        self.wall_anchor = Some(anchor);
        Ok(())
    }

    /// Wall-clock form of [`Engine::post_at`].
    ///
    /// # Errors
    ///
    /// As `post_at`, plus `WallClockUnanchored`/`WallClockOutOfRange` for
    /// unmapped instants.
    pub fn post_at_wall(&mut self, at: DateTime<Utc>, event: EventId) -> OroResult<()> {
        let when = self.to_virtual(at)?;
        self.post_at(when, event)
    }

    /// Wall-clock form of [`Engine::run_until`].
    ///
    /// # Errors
    ///
    /// As `run_until`, plus `WallClockUnanchored`/`WallClockOutOfRange`
    /// for unmapped instants.
    pub fn run_until_wall(&mut self, at: DateTime<Utc>) -> OroResult<()> {
        let target = self.to_virtual(at)?;
        self.run_until(target)
    }

    fn to_virtual(&self, at: DateTime<Utc>) -> OroResult<VirtualTime> {
        let anchor = self
            .wall_anchor
            .ok_or(ValidationError::WallClockUnanchored)?;
        let micros = (at - anchor).num_microseconds();
        match micros {
            Some(m) if m >= 0 => Ok(VirtualTime::from_ticks(m.unsigned_abs())),
            _ => Err(ValidationError::WallClockOutOfRange {
                anchor,
                requested: at,
            }
            .into()),
        }
    }

    // ---- scheduler internals -----------------------------------------------

    pub(crate) fn check_event(&self, event: EventId) -> OroResult<()> {
        if event.index() < self.events.len() {
            Ok(())
        } else {
            Err(ExecutionError::UnknownEvent { id: event }.into())
        }
    }

    fn push_timed(&mut self, when: VirtualTime, action: TimedAction) {
        let seq = self.seq;
        self.seq += 1;
        self.timed.push(TimedEntry { when, seq, action });
    }

    fn fire_next_timed(&mut self) {
        let Some(entry) = self.timed.pop() else {
            return;
        };
        debug_assert!(entry.when >= self.now, "timed queue went backwards");
        self.now = entry.when;
        trace!(now = %self.now, "advancing to timed entry");
        match entry.action {
            TimedAction::PostEvent(event) => self.post(event),
            TimedAction::WakeTask { task, epoch } => self.wake_if_current(task, epoch),
        }
    }

    fn drain_ready(&mut self) {
        while let Some(tid) = self.ready.pop_front() {
            self.dispatch(tid);
        }
    }

    /// Posts an event: bump its counter and move every current waiter to
    /// the ready queue in FIFO order. Posting with no waiters is a no-op
    /// beyond the counter.
    pub(crate) fn post(&mut self, event: EventId) {
        let Some(entry) = self.events.get_mut(event.index()) else {
            return;
        };
        entry.posts += 1;
        let waiters = std::mem::take(&mut entry.waiters);
        trace!(event = %event, name = %entry.name, waiters = waiters.len(), posts = entry.posts, "post");
        for w in waiters {
            self.wake_if_current(w.task, w.epoch);
        }
    }

    fn wake_if_current(&mut self, tid: TaskId, epoch: u64) {
        let Some(entry) = self.tasks.get_mut(&tid) else {
            return;
        };
        if entry.state != RunState::Waiting || entry.epoch != epoch {
            return;
        }
        entry.state = RunState::Ready;
        entry.waiting_on_child = false;
        self.ready.push_back(tid);
    }

    fn dispatch(&mut self, tid: TaskId) {
        let Some(entry) = self.tasks.get_mut(&tid) else {
            // Torn down while queued; nothing to run.
            return;
        };
        let Some(mut task) = entry.task.take() else {
            return;
        };
        entry.state = RunState::Running;

        let step = task.step(&mut Context {
            engine: self,
            task: tid,
        });

        match step {
            Step::Done => {
                trace!(task = %tid, name = task.name(), "done");
                self.finish(tid);
            }
            Step::Wait(reasons) => {
                let Some(entry) = self.tasks.get_mut(&tid) else {
                    return;
                };
                entry.task = Some(task);
                entry.epoch += 1;
                entry.state = RunState::Waiting;
                entry.waiting_on_child = false;
                let epoch = entry.epoch;
                for reason in reasons {
                    match reason {
                        Reason::Event(event) => {
                            if let Some(ev) = self.events.get_mut(event.index()) {
                                ev.waiters.push(EventWaiter { task: tid, epoch });
                            } else {
                                warn!(task = %tid, event = %event, "wait on unknown event ignored");
                            }
                        }
                        Reason::Timeout(delta) => {
                            let when = self.now.saturating_add(delta);
                            self.push_timed(when, TimedAction::WakeTask { task: tid, epoch });
                        }
                        Reason::Child => {
                            if let Some(entry) = self.tasks.get_mut(&tid) {
                                entry.waiting_on_child = true;
                                // A message may have arrived between the
                                // task's last drain and this suspension.
                                if !entry.inbox.is_empty() {
                                    entry.state = RunState::Ready;
                                    entry.waiting_on_child = false;
                                    self.ready.push_back(tid);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Retires a task: sweeps surviving children and tells the parent.
    fn finish(&mut self, tid: TaskId) {
        let Some(entry) = self.tasks.remove(&tid) else {
            return;
        };
        for child in entry.children {
            self.remove_tree(child);
        }
        if let Some(parent) = entry.parent {
            self.deliver(parent, ChildMsg::Finished { from: tid });
        }
    }

    /// Silent teardown of a task and all descendants: no further
    /// emissions, no `Finished` notification.
    pub(crate) fn remove_tree(&mut self, tid: TaskId) {
        if let Some(entry) = self.tasks.remove(&tid) {
            trace!(task = %tid, "torn down");
            for child in entry.children {
                self.remove_tree(child);
            }
        }
    }

    fn deliver(&mut self, tid: TaskId, msg: ChildMsg) {
        let Some(entry) = self.tasks.get_mut(&tid) else {
            debug!(task = %tid, "message for retired task dropped");
            return;
        };
        entry.inbox.push_back(msg);
        if entry.state == RunState::Waiting && entry.waiting_on_child {
            entry.state = RunState::Ready;
            entry.waiting_on_child = false;
            self.ready.push_back(tid);
        }
    }

    pub(crate) fn spawn_task(&mut self, parent: Option<TaskId>, task: Box<dyn Task>) -> TaskId {
        let tid = TaskId(self.next_task);
        self.next_task += 1;
        trace!(task = %tid, name = task.name(), parent = ?parent.map(|p| p.0), "spawn");
        self.tasks.insert(
            tid,
            TaskEntry {
                task: Some(task),
                parent,
                children: Vec::new(),
                inbox: VecDeque::new(),
                state: RunState::Ready,
                epoch: 0,
                waiting_on_child: false,
            },
        );
        if let Some(p) = parent {
            if let Some(pe) = self.tasks.get_mut(&p) {
                pe.children.push(tid);
            }
        }
        self.ready.push_back(tid);
        tid
    }

    pub(crate) fn cancel_child(&mut self, parent: TaskId, child: TaskId) {
        match self.tasks.get(&child) {
            Some(entry) if entry.parent == Some(parent) => self.remove_tree(child),
            Some(_) => warn!(task = %child, "cancel of a non-child ignored"),
            None => {}
        }
    }

    pub(crate) fn emit_from(&mut self, tid: TaskId, outcome: Outcome) {
        let parent = self.tasks.get(&tid).and_then(|e| e.parent);
        match parent {
            Some(p) => self.deliver(p, ChildMsg::Outcome { from: tid, outcome }),
            None => debug!(task = %tid, "emission from root task dropped"),
        }
    }

    pub(crate) fn pop_inbox(&mut self, tid: TaskId) -> Option<ChildMsg> {
        self.tasks.get_mut(&tid).and_then(|e| e.inbox.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A task that logs its wakeups and re-waits on an event `n` times.
    struct Waiter {
        event: EventId,
        remaining: u32,
        log: Rc<RefCell<Vec<(u64, &'static str)>>>,
        tag: &'static str,
    }

    impl Task for Waiter {
        fn name(&self) -> &str {
            "waiter"
        }

        fn step(&mut self, cx: &mut Context<'_>) -> Step {
            self.log.borrow_mut().push((cx.now().ticks(), self.tag));
            if self.remaining == 0 {
                return Step::Done;
            }
            self.remaining -= 1;
            Step::Wait(vec![Reason::Event(self.event)])
        }
    }

    #[test]
    fn post_wakes_waiters_in_fifo_order() {
        let mut engine = Engine::new();
        let ev = engine.event_named("tick");
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.start(Box::new(Waiter {
            event: ev,
            remaining: 1,
            log: Rc::clone(&log),
            tag: "first",
        }));
        engine.start(Box::new(Waiter {
            event: ev,
            remaining: 1,
            log: Rc::clone(&log),
            tag: "second",
        }));

        engine.post_at(VirtualTime::from_ticks(5), ev).unwrap();
        engine.run_until(VirtualTime::from_ticks(5)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![(0, "first"), (0, "second"), (5, "first"), (5, "second")]
        );
    }

    #[test]
    fn post_before_wait_does_not_latch() {
        let mut engine = Engine::new();
        let ev = engine.event();
        // Post at t=1 with nobody waiting yet.
        engine.post_at(VirtualTime::from_ticks(1), ev).unwrap();
        engine.run_until(VirtualTime::from_ticks(1)).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        engine.start(Box::new(Waiter {
            event: ev,
            remaining: 1,
            log: Rc::clone(&log),
            tag: "late",
        }));
        engine.run_until(VirtualTime::from_ticks(2)).unwrap();

        // The task ran once (its initial dispatch) and then suspended; the
        // earlier post did not wake it retroactively.
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(engine.post_count(ev), 1);
    }

    #[test]
    fn run_until_rejects_time_reversal() {
        let mut engine = Engine::new();
        engine.run_until(VirtualTime::from_ticks(10)).unwrap();
        let err = engine.run_until(VirtualTime::from_ticks(9));
        assert!(err.is_err());
        assert_eq!(engine.now(), VirtualTime::from_ticks(10));
    }

    #[test]
    fn post_at_rejects_past() {
        let mut engine = Engine::new();
        let ev = engine.event();
        engine.run_until(VirtualTime::from_ticks(10)).unwrap();
        assert!(engine.post_at(VirtualTime::from_ticks(9), ev).is_err());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let mut engine = Engine::new();
        let foreign = EventId(42);
        assert!(engine.post_now(foreign).is_err());
        assert!(engine.post_at(VirtualTime::from_ticks(1), foreign).is_err());
    }

    /// A task that advances through timeouts, recording each instant.
    struct Ticker {
        delta: u64,
        remaining: u32,
        log: Rc<RefCell<Vec<u64>>>,
    }

    impl Task for Ticker {
        fn step(&mut self, cx: &mut Context<'_>) -> Step {
            self.log.borrow_mut().push(cx.now().ticks());
            if self.remaining == 0 {
                return Step::Done;
            }
            self.remaining -= 1;
            Step::Wait(vec![Reason::Timeout(self.delta)])
        }
    }

    #[test]
    fn timeouts_advance_virtual_time() {
        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.start(Box::new(Ticker {
            delta: 10,
            remaining: 3,
            log: Rc::clone(&log),
        }));
        engine.run();
        assert_eq!(*log.borrow(), vec![0, 10, 20, 30]);
        assert_eq!(engine.now(), VirtualTime::from_ticks(30));
    }

    #[test]
    fn zero_timeout_requeues_at_same_instant() {
        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.start(Box::new(Ticker {
            delta: 0,
            remaining: 2,
            log: Rc::clone(&log),
        }));
        engine.run();
        assert_eq!(*log.borrow(), vec![0, 0, 0]);
        assert_eq!(engine.now(), VirtualTime::ZERO);
    }

    #[test]
    fn wall_clock_mapping() {
        let mut engine = Engine::new();
        let ev = engine.event();
        let anchor = Utc::now();
        engine.set_wall_anchor(anchor).unwrap();
        assert!(engine.set_wall_anchor(anchor).is_err());

        let later = anchor + chrono::Duration::milliseconds(2);
        engine.post_at_wall(later, ev).unwrap();
        engine.run_until_wall(later).unwrap();
        assert_eq!(engine.now(), VirtualTime::from_ticks(2000));
        assert_eq!(engine.post_count(ev), 1);

        let earlier = anchor - chrono::Duration::seconds(1);
        assert!(engine.post_at_wall(earlier, ev).is_err());
    }

    #[test]
    fn wall_clock_requires_anchor() {
        let mut engine = Engine::new();
        assert!(engine.run_until_wall(Utc::now()).is_err());
    }
}
