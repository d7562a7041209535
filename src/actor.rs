//! Scheduling handles for the actors of a program under test.
//!
//! An actor is identified twice: once by its [`TaskId`], the scheduler's handle that is correlated
//! with the OS thread running the actor's logic, and once by its [`ActorRef`], the stable
//! `(type, id)` pair that the actor declares at creation and that a [`ScheduleTrace`] records so a
//! later replay can find the same actor again.
//!
//! [`ScheduleTrace`]: crate::ScheduleTrace

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Uniquely identifies an actor instance within one iteration.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(u64);

impl Debug for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ActorId({})", self.0))
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for ActorId {
    fn from(id: u64) -> Self {
        ActorId(id)
    }
}

impl From<ActorId> for u64 {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

/// The scheduler's handle for the thread that runs an actor (or an actor-scheduled sub-task).
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl Debug for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("TaskId({})", self.0))
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        TaskId(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// The `(type, id)` pair an actor declares at creation. Traces store this pair as plain data.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ActorRef {
    pub type_name: String,
    pub id: ActorId,
}

impl ActorRef {
    pub fn new(type_name: impl Into<String>, id: impl Into<ActorId>) -> Self {
        ActorRef {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl Display for ActorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_name, self.id)
    }
}

/// A sub-operation running outside the scheduler's control, e.g. work handed to a thread pool.
/// The owner of the work marks it done with [`ExternalTask::complete`]; the scheduler only ever
/// observes the flag.
#[derive(Clone, Default)]
pub struct ExternalTask {
    done: Arc<AtomicBool>,
}

impl ExternalTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_completed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn same_as(&self, other: &ExternalTask) -> bool {
        Arc::ptr_eq(&self.done, &other.done)
    }
}

impl Debug for ExternalTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTask")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl PartialEq for ExternalTask {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

/// Something an actor can block on when it awaits intra-actor concurrency.
#[derive(Clone, Debug, PartialEq)]
pub enum SubTask {
    /// A sub-task that is itself scheduled (it has its own [`TaskId`]).
    Scheduled(TaskId),
    /// Work the scheduler does not control.
    External(ExternalTask),
}

/// Whether a blocked actor resumes after any or after all of its sub-tasks complete.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WaitMode {
    #[default]
    Any,
    All,
}

/// Per-actor scheduling state. Only the scheduler mutates these flags, in response to runtime
/// notifications. An entry is never removed during an iteration: completion is recorded with
/// `completed` so traces can still refer to the actor.
#[derive(Clone, Debug)]
pub struct ActorInfo {
    pub task: TaskId,
    pub actor: ActorRef,
    pub operation_id: u64,

    /// Schedulable. Cleared on completion or when the actor is killed.
    pub enabled: bool,
    /// Blocked on an external event it expects to receive.
    pub waiting: bool,
    /// Blocked on intra-actor sub-tasks.
    pub blocked: bool,
    /// The one actor currently permitted to run.
    pub active: bool,
    pub started: bool,
    pub completed: bool,

    pub blocking_tasks: Vec<TaskId>,
    pub blocking_external: Vec<ExternalTask>,
    pub wait_mode: WaitMode,
}

impl ActorInfo {
    pub fn new(task: TaskId, actor: ActorRef, operation_id: u64) -> Self {
        ActorInfo {
            task,
            actor,
            operation_id,
            enabled: true,
            waiting: false,
            blocked: false,
            active: false,
            started: false,
            completed: false,
            blocking_tasks: Vec::new(),
            blocking_external: Vec::new(),
            wait_mode: WaitMode::Any,
        }
    }

    /// Enabled and neither blocked nor waiting.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && !self.blocked && !self.waiting
    }

    pub(crate) fn block_on(
        &mut self,
        tasks: Vec<TaskId>,
        external: Vec<ExternalTask>,
        mode: WaitMode,
    ) {
        self.blocked = true;
        self.blocking_tasks = tasks;
        self.blocking_external = external;
        self.wait_mode = mode;
    }

    pub(crate) fn unblock(&mut self) {
        self.blocked = false;
        self.blocking_tasks.clear();
        self.blocking_external.clear();
        self.wait_mode = WaitMode::Any;
    }

    /// Records that `task` completed. Returns `true` if that lifted the block.
    pub(crate) fn on_task_completed(&mut self, task: TaskId) -> bool {
        if !self.blocked {
            return false;
        }
        let before = self.blocking_tasks.len();
        self.blocking_tasks.retain(|t| *t != task);
        if self.blocking_tasks.len() == before {
            return false;
        }
        self.settle(true)
    }

    /// Drops external sub-tasks that have completed since the last check. Returns `true` if that
    /// lifted the block.
    pub(crate) fn poll_external(&mut self) -> bool {
        if !self.blocked {
            return false;
        }
        let before = self.blocking_external.len();
        self.blocking_external.retain(|t| !t.is_completed());
        let progressed = self.blocking_external.len() != before;
        self.settle(progressed)
    }

    fn settle(&mut self, progressed: bool) -> bool {
        let satisfied = match self.wait_mode {
            WaitMode::Any => progressed,
            WaitMode::All => self.blocking_tasks.is_empty() && self.blocking_external.is_empty(),
        };
        if satisfied {
            self.unblock();
        }
        satisfied
    }
}

/// Filters `candidates` down to the schedulable ones, preserving order.
pub fn schedulable(candidates: &[ActorInfo]) -> Vec<&ActorInfo> {
    candidates.iter().filter(|a| a.is_schedulable()).collect()
}
