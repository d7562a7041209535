//! Private module for selective re-export.

use crate::actor::{ActorRef, SubTask, TaskId, WaitMode};
use crate::error::ScheduleError;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Actor logic. Scheduler errors are propagated with `?`, which stops the actor without running any
/// more of its code.
pub type ActorResult = Result<(), ScheduleError>;

/// The handle through which actor logic reaches the scheduler.
///
/// Each actor receives its own clone, bound to its task. The handle the engine uses to start the
/// test body is not bound to any task and can only spawn and join.
///
/// # Example
///
/// ```
/// use turnstile::*;
/// let mut engine = TestingEngine::new(Configuration::default().iterations(Some(10))).unwrap();
/// let report = engine.run(|rt| {
///     let peer = rt.spawn("Peer", |rt| rt.schedule())?;
///     rt.schedule()?;
///     rt.assert(peer != rt.task().unwrap(), "distinct tasks")
/// }).unwrap();
/// assert!(report.bugs.is_empty());
/// ```
#[derive(Clone)]
pub struct Runtime {
    scheduler: Scheduler,
    task: Option<(TaskId, ActorRef)>,
    next_id: Arc<AtomicU64>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Runtime {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        Runtime {
            scheduler,
            task: None,
            next_id: Arc::new(AtomicU64::new(0)),
            threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The calling actor's task, or `None` outside of any actor.
    pub fn task(&self) -> Option<TaskId> {
        self.task.as_ref().map(|(task, _)| *task)
    }

    pub fn actor(&self) -> Option<&ActorRef> {
        self.task.as_ref().map(|(_, actor)| actor)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn current(&self) -> Result<TaskId, ScheduleError> {
        self.task().ok_or_else(|| {
            ScheduleError::UnresolvableScheduledTask(
                "runtime handle is not bound to an actor".into(),
            )
        })
    }

    /// Creates an actor of the given type in the caller's operation and returns once its thread
    /// has started. The new actor runs when the strategy first schedules it. Fails with
    /// [`ScheduleError::Canceled`] once the iteration has been torn down.
    pub fn spawn<F>(&self, actor_type: &str, f: F) -> Result<TaskId, ScheduleError>
    where
        F: FnOnce(Runtime) -> ActorResult + Send + 'static,
    {
        let operation_id = self
            .task()
            .and_then(|task| self.scheduler.operation_id(task))
            .unwrap_or(0);
        self.spawn_in_operation(actor_type, operation_id, f)
    }

    /// Like [`Runtime::spawn`] but in the given operation group.
    pub fn spawn_in_operation<F>(
        &self,
        actor_type: &str,
        operation_id: u64,
        f: F,
    ) -> Result<TaskId, ScheduleError>
    where
        F: FnOnce(Runtime) -> ActorResult + Send + 'static,
    {
        if !self.scheduler.is_running() {
            return Err(ScheduleError::Canceled);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = TaskId::from(id);
        let actor = ActorRef::new(actor_type, id);
        self.scheduler.notify_new_task_created(task, actor.clone(), operation_id);

        let runtime = Runtime {
            task: Some((task, actor.clone())),
            ..self.clone()
        };
        let handle = std::thread::Builder::new()
            .name(actor.to_string())
            .spawn(move || runtime.run_actor(f))
            .map_err(|err| {
                self.scheduler
                    .notify_assertion_failure(format!("unable to start {}: {}", actor, err), true)
            })?;
        self.threads.lock().push(handle);
        self.scheduler.wait_for_task_to_start(task);
        Ok(task)
    }

    /// Spawns an actor-scheduled sub-task that the caller can later await with
    /// [`Runtime::wait_all`] or [`Runtime::wait_any`].
    pub fn spawn_task<F>(&self, f: F) -> Result<TaskId, ScheduleError>
    where
        F: FnOnce(Runtime) -> ActorResult + Send + 'static,
    {
        self.spawn("Task", f)
    }

    fn run_actor<F>(self, f: F)
    where
        F: FnOnce(Runtime) -> ActorResult,
    {
        let (task, actor) = match &self.task {
            Some((task, actor)) => (*task, actor.clone()),
            None => return,
        };
        if let Err(err) = self.scheduler.notify_task_started(task) {
            log::trace!("{} stopped before it ran: {}", actor, err);
            return;
        }
        match catch_unwind(AssertUnwindSafe(|| f(self.clone()))) {
            Ok(Ok(())) => {}
            Ok(Err(ScheduleError::AssertionFailure(text))) => {
                self.scheduler.notify_assertion_failure(text, true);
            }
            Ok(Err(err)) => log::trace!("{} unwound: {}", actor, err),
            Err(panic) => {
                let text = format!("{} panicked: {}", actor, panic_message(&*panic));
                self.scheduler.notify_assertion_failure(text, true);
            }
        }
        if let Err(err) = self.scheduler.notify_task_completed() {
            log::trace!("{} completed: {}", actor, err);
        }
    }

    /// A scheduling point: lets the strategy decide who runs next.
    pub fn schedule(&self) -> ActorResult {
        self.scheduler.schedule()
    }

    /// A coin flip.
    pub fn random_bool(&self) -> Result<bool, ScheduleError> {
        self.scheduler.next_boolean_choice(2, None)
    }

    /// A coin flip recorded under a stable fairness id.
    pub fn fair_random_bool(&self, fairness_id: &str) -> Result<bool, ScheduleError> {
        self.scheduler.next_boolean_choice(2, Some(fairness_id))
    }

    /// An integer in `[0, max_value)`.
    pub fn random_int(&self, max_value: u64) -> Result<u64, ScheduleError> {
        self.scheduler.next_integer_choice(max_value)
    }

    /// Reports a bug and ends the iteration unless `condition` holds.
    pub fn assert(&self, condition: bool, message: impl Into<String>) -> ActorResult {
        if condition {
            return Ok(());
        }
        Err(self.scheduler.notify_assertion_failure(message, true))
    }

    /// Sleeps until another actor calls [`Runtime::deliver_event`] for this one.
    pub fn wait_for_event(&self) -> ActorResult {
        let task = self.current()?;
        self.scheduler.notify_task_blocked_on_event(task);
        self.scheduler.schedule()
    }

    /// Makes `task` schedulable again after [`Runtime::wait_for_event`]. Not a scheduling point.
    pub fn deliver_event(&self, task: TaskId) {
        self.scheduler.notify_task_received_event(task);
    }

    /// Sleeps until every one of `subtasks` has completed.
    pub fn wait_all(&self, subtasks: &[SubTask]) -> ActorResult {
        self.wait(subtasks, WaitMode::All)
    }

    /// Sleeps until any one of `subtasks` has completed.
    pub fn wait_any(&self, subtasks: &[SubTask]) -> ActorResult {
        self.wait(subtasks, WaitMode::Any)
    }

    fn wait(&self, subtasks: &[SubTask], mode: WaitMode) -> ActorResult {
        let task = self.current()?;
        self.scheduler
            .notify_task_blocked(task, subtasks.to_vec(), mode)?;
        self.scheduler.schedule()
    }

    /// Moves the calling actor to another operation group.
    pub fn set_operation(&self, operation_id: u64) -> ActorResult {
        let task = self.current()?;
        self.scheduler.set_operation_id(task, operation_id);
        Ok(())
    }

    /// Ends the iteration without a bug. Always returns [`ScheduleError::Canceled`] so the caller
    /// unwinds with `?`.
    pub fn stop(&self) -> ActorResult {
        match self.actor() {
            Some(actor) => log::debug!("{} stopped the iteration.", actor),
            None => log::debug!("Iteration stopped."),
        }
        self.scheduler.stop();
        Err(ScheduleError::Canceled)
    }

    /// Joins every actor thread, including ones spawned while joining.
    pub fn join_all(&self) {
        loop {
            let threads: Vec<_> = std::mem::take(&mut *self.threads.lock());
            if threads.is_empty() {
                return;
            }
            for thread in threads {
                if thread.join().is_err() {
                    log::warn!("Actor thread panicked outside of its logic.");
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
