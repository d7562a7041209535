//! The orchestration core: serializes actor threads under a [`Strategy`].
//!
//! Every actor runs on its own OS thread, but only the one marked `active` executes actor logic.
//! At each scheduling point the running actor asks the strategy for the next actor, records the
//! decision, then hands off: it marks the chosen actor active, signals that actor's condition
//! variable, and sleeps on its own until it is chosen again. All condition variables share the
//! single scheduler mutex, so flag updates and wake-ups cannot race.
//!
//! Killing an iteration marks every actor active and disabled and wakes all of them. A woken actor
//! that finds itself disabled returns [`ScheduleError::Canceled`], which actor code propagates with
//! `?` so that no further actor logic runs.

use crate::actor::{ActorInfo, ActorRef, TaskId};
use crate::config::Configuration;
use crate::error::ScheduleError;
use crate::operation::OperationScheduler;
use crate::strategy::Strategy;
use crate::trace::ScheduleTrace;
use crate::visitor::StepVisitor;
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::ThreadId;

mod task_aware;

/// Session options the scheduler consults on every decision.
#[derive(Clone, Copy, Debug, Default)]
struct Options {
    depth_bound_hit_is_bug: bool,
    cache_program_state: bool,
    safety_prefix_bound: usize,
    intra_actor_concurrency: bool,
}

struct SchedulerState {
    strategy: Box<dyn Strategy>,
    operations: Option<OperationScheduler>,
    actors: Vec<ActorInfo>,
    signals: Vec<Arc<Condvar>>,
    task_map: AHashMap<TaskId, usize>,
    thread_map: AHashMap<ThreadId, usize>,
    trace: ScheduleTrace,
    bug_report: Option<String>,
    fatal: Option<ScheduleError>,
    end: Option<ScheduleError>,
    running: bool,
}

impl SchedulerState {
    fn index_of(&self, task: TaskId) -> Option<usize> {
        self.task_map.get(&task).copied()
    }

    /// Marks every actor active and disabled and wakes the ones still running.
    fn kill_remaining_actors(&mut self) {
        for (i, actor) in self.actors.iter_mut().enumerate() {
            actor.active = true;
            actor.enabled = false;
            if !actor.completed {
                self.signals[i].notify_all();
            }
        }
        self.running = false;
    }

    /// Ends the iteration early without a bug.
    fn cancel(&mut self, reason: ScheduleError) -> ScheduleError {
        if self.end.is_none() {
            self.end = Some(reason.clone());
        }
        self.kill_remaining_actors();
        reason
    }

    /// Records a session-fatal condition and tears the iteration down.
    fn abort(&mut self, err: ScheduleError) -> ScheduleError {
        log::error!("{}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err.clone());
        }
        self.cancel(err)
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    options: Options,
    visitor: Option<Arc<dyn StepVisitor + Send + Sync>>,
}

/// Everything an iteration produced, recovered by [`Scheduler::finish`].
pub struct IterationOutcome {
    pub strategy: Box<dyn Strategy>,
    pub trace: ScheduleTrace,
    pub explored_steps: usize,
    pub bug_report: Option<String>,
    pub fatal: Option<ScheduleError>,
    /// Why the iteration was cut short, if it was.
    pub end: Option<ScheduleError>,
}

/// Serializes the actors of one iteration. Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        strategy: Box<dyn Strategy>,
        operations: Option<OperationScheduler>,
        config: &Configuration,
        visitor: Option<Arc<dyn StepVisitor + Send + Sync>>,
    ) -> Self {
        let options = Options {
            depth_bound_hit_is_bug: config.depth_bound_hit_is_bug,
            cache_program_state: config.cache_program_state,
            safety_prefix_bound: config.safety_prefix_bound,
            intra_actor_concurrency: config.intra_actor_concurrency,
        };
        Scheduler {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    strategy,
                    operations,
                    actors: Vec::new(),
                    signals: Vec::new(),
                    task_map: AHashMap::new(),
                    thread_map: AHashMap::new(),
                    trace: ScheduleTrace::new(),
                    bug_report: None,
                    fatal: None,
                    end: None,
                    running: true,
                }),
                options,
                visitor,
            }),
        }
    }

    /// Registers an actor. The first actor registered starts out active.
    pub fn notify_new_task_created(&self, task: TaskId, actor: ActorRef, operation_id: u64) {
        let mut state = self.shared.state.lock();
        let mut info = ActorInfo::new(task, actor, operation_id);
        if state.actors.is_empty() {
            info.active = true;
        }
        if !state.running {
            // Created after the iteration was torn down: it must never run.
            info.active = true;
            info.enabled = false;
        }
        log::debug!("Created task {} for {}.", task, info.actor);
        let index = state.actors.len();
        state.task_map.insert(task, index);
        state.actors.push(info);
        state.signals.push(Arc::new(Condvar::new()));
    }

    /// Called on the new actor's own thread. Binds the thread to `task`, signals the creator, then
    /// sleeps until the actor is first scheduled.
    pub fn notify_task_started(&self, task: TaskId) -> Result<(), ScheduleError> {
        let mut state = self.shared.state.lock();
        let index = match state.index_of(task) {
            Some(index) => index,
            None => {
                return Err(state.abort(ScheduleError::UnresolvableScheduledTask(format!(
                    "task {} was started but never created",
                    task
                ))))
            }
        };
        state.thread_map.insert(std::thread::current().id(), index);
        state.actors[index].started = true;
        log::debug!("Started task {} of {}.", task, state.actors[index].actor);
        let signal = Arc::clone(&state.signals[index]);
        signal.notify_all();
        self.sleep_until_active(&mut state, index, &signal)
    }

    /// Called by the creator of `task`. Returns once the new actor's thread has started.
    pub fn wait_for_task_to_start(&self, task: TaskId) {
        let mut state = self.shared.state.lock();
        let index = match state.index_of(task) {
            Some(index) => index,
            None => return,
        };
        let signal = Arc::clone(&state.signals[index]);
        while !state.actors[index].started {
            signal.wait(&mut state);
        }
    }

    /// The central decision point. Returns once the calling actor is scheduled again.
    pub fn schedule(&self) -> Result<(), ScheduleError> {
        let state = self.shared.state.lock();
        self.schedule_locked(state)
    }

    fn schedule_locked(
        &self,
        mut guard: MutexGuard<'_, SchedulerState>,
    ) -> Result<(), ScheduleError> {
        let state = &mut *guard;
        let current = self.resolve(state)?;
        if !state.running {
            return Err(ScheduleError::Canceled);
        }
        if self.shared.options.intra_actor_concurrency {
            task_aware::unblock_on_external_completion(state);
        }
        self.check_depth_bound(state)?;

        let current_task = state.actors[current].task;
        let prioritized;
        let candidates = match state.operations.as_mut() {
            Some(operations) => {
                prioritized = operations.prioritize(
                    &state.actors,
                    current_task,
                    state.strategy.explored_steps(),
                );
                &prioritized
            }
            None => &state.actors,
        };
        let next = match state.strategy.next_actor(candidates, current_task) {
            Ok(Some(next)) => next,
            Ok(None) => {
                log::debug!("Schedule explored.");
                return Err(state.cancel(ScheduleError::IterationExhausted));
            }
            Err(err) => return Err(state.abort(err)),
        };
        let next = match state.index_of(next) {
            Some(next) => next,
            None => {
                return Err(state.abort(ScheduleError::UnresolvableScheduledTask(format!(
                    "strategy chose unknown task {}",
                    next
                ))))
            }
        };

        let chosen = state.actors[next].actor.clone();
        state.trace.add_scheduling_choice(&chosen);
        self.capture_state(state);
        log::debug!("Schedule task {} of {}.", state.actors[next].task, chosen);
        self.hand_off(&mut guard, current, next)
    }

    /// Returns a nondeterministic boolean: `true` with probability `1 / max_value` under random
    /// strategies. Choices tagged with `fairness_id` are recorded with it.
    pub fn next_boolean_choice(
        &self,
        max_value: u64,
        fairness_id: Option<&str>,
    ) -> Result<bool, ScheduleError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        self.check_running(state)?;
        let value = match state.strategy.next_boolean(max_value) {
            Ok(Some(value)) => value,
            Ok(None) => return Err(state.cancel(ScheduleError::IterationExhausted)),
            Err(err) => return Err(state.abort(err)),
        };
        state.trace.add_boolean_choice(value, fairness_id);
        self.capture_state(state);
        log::trace!("Chose {}.", value);
        Ok(value)
    }

    /// Returns a nondeterministic integer in `[0, max_value)`.
    pub fn next_integer_choice(&self, max_value: u64) -> Result<u64, ScheduleError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        self.check_running(state)?;
        let value = match state.strategy.next_integer(max_value) {
            Ok(Some(value)) => value,
            Ok(None) => return Err(state.cancel(ScheduleError::IterationExhausted)),
            Err(err) => return Err(state.abort(err)),
        };
        state.trace.add_integer_choice(value);
        self.capture_state(state);
        log::trace!("Chose {}.", value);
        Ok(value)
    }

    /// Marks `task` as waiting for an event. Takes effect at the next scheduling point.
    pub fn notify_task_blocked_on_event(&self, task: TaskId) {
        let mut state = self.shared.state.lock();
        if let Some(index) = state.index_of(task) {
            log::debug!("Task {} of {} waits for an event.", task, state.actors[index].actor);
            state.actors[index].waiting = true;
        }
    }

    /// Marks `task` as having received the event it was waiting for.
    pub fn notify_task_received_event(&self, task: TaskId) {
        let mut state = self.shared.state.lock();
        if let Some(index) = state.index_of(task) {
            log::debug!("Task {} of {} received an event.", task, state.actors[index].actor);
            state.actors[index].waiting = false;
        }
    }

    /// Called on the actor's thread when its logic returns. Hands control to the next actor; the
    /// completing actor never runs again.
    pub fn notify_task_completed(&self) -> Result<(), ScheduleError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let current = self.resolve(state)?;
        let task = state.actors[current].task;
        state.actors[current].enabled = false;
        state.actors[current].completed = true;
        log::debug!("Completed task {} of {}.", task, state.actors[current].actor);
        if self.shared.options.intra_actor_concurrency {
            task_aware::unblock_on_task_completion(state, task);
        }
        self.schedule_locked(guard)
    }

    /// Records a bug. The first report of an iteration wins. With `kill_tasks` the iteration is
    /// torn down. Returns the error the reporting actor should propagate.
    ///
    /// Reports made after the iteration was torn down are dropped and the reporter is canceled.
    pub fn notify_assertion_failure(
        &self,
        text: impl Into<String>,
        kill_tasks: bool,
    ) -> ScheduleError {
        let text = text.into();
        let mut state = self.shared.state.lock();
        if !state.running {
            log::debug!("Ignoring report after teardown: {}", text);
            return ScheduleError::Canceled;
        }
        if state.bug_report.is_none() {
            log::info!("Found bug using {}: {}", state.strategy.description(), text);
            if let Some(operations) = &state.operations {
                log::info!("Operation priorities: {}", operations.description());
            }
            state.bug_report = Some(text.clone());
        }
        if kill_tasks {
            state.kill_remaining_actors();
        }
        ScheduleError::AssertionFailure(text)
    }

    /// Ends the iteration, waking every actor so that it unwinds.
    pub fn stop(&self) {
        self.kill_remaining_actors();
    }

    pub fn kill_remaining_actors(&self) {
        let mut state = self.shared.state.lock();
        log::debug!("Killing remaining actors.");
        state.kill_remaining_actors();
    }

    /// Moves `task` to another operation group.
    pub fn set_operation_id(&self, task: TaskId, operation_id: u64) {
        let mut state = self.shared.state.lock();
        if let Some(index) = state.index_of(task) {
            state.actors[index].operation_id = operation_id;
        }
    }

    pub fn operation_id(&self, task: TaskId) -> Option<u64> {
        let state = self.shared.state.lock();
        state.index_of(task).map(|i| state.actors[i].operation_id)
    }

    /// The actors that could be scheduled right now.
    pub fn enabled_actors(&self) -> Vec<ActorRef> {
        let state = self.shared.state.lock();
        state
            .actors
            .iter()
            .filter(|a| a.is_schedulable())
            .map(|a| a.actor.clone())
            .collect()
    }

    pub fn has_enabled_task_for(&self, actor: &ActorRef) -> bool {
        let state = self.shared.state.lock();
        state
            .actors
            .iter()
            .any(|a| a.actor == *actor && a.is_schedulable())
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn bug_found(&self) -> bool {
        self.shared.state.lock().bug_report.is_some()
    }

    /// A snapshot of the per-actor scheduling state.
    pub fn actors(&self) -> Vec<ActorInfo> {
        self.shared.state.lock().actors.clone()
    }

    /// Recovers the strategy and the iteration's results. Fails, returning the scheduler, while
    /// other handles are still alive.
    pub fn finish(self) -> Result<IterationOutcome, Scheduler> {
        let shared = Arc::try_unwrap(self.shared).map_err(|shared| Scheduler { shared })?;
        let mut state = shared.state.into_inner();
        state.trace.fair = state.strategy.is_fair();
        Ok(IterationOutcome {
            explored_steps: state.strategy.explored_steps(),
            strategy: state.strategy,
            trace: state.trace,
            bug_report: state.bug_report,
            fatal: state.fatal,
            end: state.end,
        })
    }

    /// Maps the calling thread to its actor.
    fn resolve(&self, state: &mut SchedulerState) -> Result<usize, ScheduleError> {
        let thread = std::thread::current();
        match state.thread_map.get(&thread.id()) {
            Some(index) => Ok(*index),
            None => Err(state.abort(ScheduleError::UnresolvableScheduledTask(format!(
                "thread '{}' is not an actor",
                thread.name().unwrap_or("<unnamed>")
            )))),
        }
    }

    fn check_running(&self, state: &mut SchedulerState) -> Result<(), ScheduleError> {
        if !state.running {
            return Err(ScheduleError::Canceled);
        }
        self.check_depth_bound(state)
    }

    /// Cuts the iteration short once the strategy's step bound is reached and an actor could
    /// still run.
    fn check_depth_bound(&self, state: &mut SchedulerState) -> Result<(), ScheduleError> {
        if !state.strategy.has_reached_depth_bound()
            || !state.actors.iter().any(|a| a.is_schedulable())
        {
            return Ok(());
        }
        let bound = state.strategy.depth_bound();
        if self.shared.options.depth_bound_hit_is_bug {
            let text = format!("Depth bound of {} reached.", bound);
            if state.bug_report.is_none() {
                log::info!("Found bug using {}: {}", state.strategy.description(), text);
                state.bug_report = Some(text.clone());
            }
            state.kill_remaining_actors();
            return Err(ScheduleError::AssertionFailure(text));
        }
        log::debug!("Depth bound of {} reached.", bound);
        Err(state.cancel(ScheduleError::DepthBoundReached { bound }))
    }

    fn capture_state(&self, state: &SchedulerState) {
        let options = &self.shared.options;
        if !options.cache_program_state
            || options.safety_prefix_bound > state.strategy.explored_steps()
        {
            return;
        }
        if let (Some(visitor), Some(step)) = (&self.shared.visitor, state.trace.last()) {
            visitor.visit(state.trace.len() - 1, step);
        }
    }

    /// Activates `next` and, unless the caller is `next` or has completed, puts the caller to sleep
    /// until it is activated again.
    fn hand_off(
        &self,
        state: &mut MutexGuard<'_, SchedulerState>,
        current: usize,
        next: usize,
    ) -> Result<(), ScheduleError> {
        if current == next {
            return Ok(());
        }
        state.actors[current].active = false;
        state.actors[next].active = true;
        state.signals[next].notify_all();
        if state.actors[current].completed {
            return Ok(());
        }
        let signal = Arc::clone(&state.signals[current]);
        self.sleep_until_active(state, current, &signal)
    }

    fn sleep_until_active(
        &self,
        state: &mut MutexGuard<'_, SchedulerState>,
        index: usize,
        signal: &Condvar,
    ) -> Result<(), ScheduleError> {
        while !state.actors[index].active {
            log::trace!("Sleep task {}.", state.actors[index].task);
            signal.wait(state);
            log::trace!("Wake up task {}.", state.actors[index].task);
        }
        if !state.actors[index].enabled {
            return Err(ScheduleError::Canceled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strategy::{RandomStrategy, ReplayStrategy};
    use crate::test_util::init_logging;
    use std::thread;

    fn scheduler(strategy: impl Strategy + 'static) -> Scheduler {
        Scheduler::new(Box::new(strategy), None, &Configuration::default(), None)
    }

    #[test]
    fn first_actor_starts_active() {
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        scheduler.notify_new_task_created(TaskId::from(1), ActorRef::new("B", 1u64), 0);
        let actors = scheduler.actors();
        assert!(actors[0].active);
        assert!(!actors[1].active);
        assert_eq!(scheduler.enabled_actors().len(), 2);
        assert!(scheduler.has_enabled_task_for(&ActorRef::new("B", 1u64)));
    }

    #[test]
    fn event_wait_toggles_schedulability() {
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        scheduler.notify_task_blocked_on_event(TaskId::from(0));
        assert!(!scheduler.has_enabled_task_for(&ActorRef::new("A", 0u64)));
        scheduler.notify_task_received_event(TaskId::from(0));
        assert!(scheduler.has_enabled_task_for(&ActorRef::new("A", 0u64)));
    }

    #[test]
    fn scheduling_from_a_foreign_thread_is_fatal() {
        init_logging();
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        let err = scheduler.schedule().unwrap_err();
        assert!(matches!(err, ScheduleError::UnresolvableScheduledTask(_)));
        assert!(!scheduler.is_running());
        let outcome = scheduler.finish().ok().unwrap();
        assert_eq!(outcome.fatal, Some(err));
    }

    #[test]
    fn kill_wakes_sleeping_actors_with_cancellation() {
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        scheduler.notify_new_task_created(TaskId::from(1), ActorRef::new("B", 1u64), 0);
        let sleeper = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.notify_task_started(TaskId::from(1)))
        };
        scheduler.wait_for_task_to_start(TaskId::from(1));
        scheduler.stop();
        assert_eq!(sleeper.join().unwrap(), Err(ScheduleError::Canceled));
        assert!(scheduler.enabled_actors().is_empty());
    }

    #[test]
    fn assertion_failure_keeps_the_first_report() {
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        let err = scheduler.notify_assertion_failure("first", false);
        assert_eq!(err, ScheduleError::AssertionFailure("first".into()));
        assert!(scheduler.is_running());
        scheduler.notify_assertion_failure("second", true);
        assert!(!scheduler.is_running());
        let outcome = scheduler.finish().ok().unwrap();
        assert_eq!(outcome.bug_report.as_deref(), Some("first"));
    }

    #[test]
    fn reports_after_stop_are_dropped() {
        let scheduler = scheduler(RandomStrategy::new(0, 0));
        scheduler.notify_new_task_created(TaskId::from(0), ActorRef::new("A", 0u64), 0);
        scheduler.stop();
        assert_eq!(
            scheduler.notify_assertion_failure("too late", true),
            ScheduleError::Canceled
        );
        assert!(!scheduler.bug_found());
        let outcome = scheduler.finish().ok().unwrap();
        assert_eq!(outcome.bug_report, None);
    }

    #[test]
    fn finish_fails_while_shared() {
        let scheduler = scheduler(ReplayStrategy::new(ScheduleTrace::new(), 0));
        let other = scheduler.clone();
        let scheduler = scheduler.finish().err().unwrap();
        drop(other);
        assert!(scheduler.finish().is_ok());
    }
}
