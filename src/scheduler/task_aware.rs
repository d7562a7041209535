//! Intra-actor concurrency: an actor may block on sub-tasks, either actor-scheduled tasks with
//! their own [`TaskId`] or [`ExternalTask`]s that run outside the scheduler's control. A blocked
//! actor is not schedulable until its wait condition (any or all) holds.

use super::{Scheduler, SchedulerState};
use crate::actor::{ExternalTask, SubTask, TaskId, WaitMode};
use crate::error::ScheduleError;

impl Scheduler {
    /// Blocks `task` on `subtasks`. Sub-tasks that already completed count towards the wait
    /// condition, so the actor is only blocked when the condition does not hold yet. Returns
    /// whether the actor was blocked; the block takes effect at its next scheduling point.
    pub fn notify_task_blocked(
        &self,
        task: TaskId,
        subtasks: Vec<SubTask>,
        mode: WaitMode,
    ) -> Result<bool, ScheduleError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !self.shared.options.intra_actor_concurrency {
            return Err(state.abort(ScheduleError::IntraActorConcurrencyDisabled(task)));
        }
        let index = match state.index_of(task) {
            Some(index) => index,
            None => {
                return Err(state.abort(ScheduleError::UnresolvableScheduledTask(format!(
                    "task {} is not registered",
                    task
                ))))
            }
        };

        let mut pending_tasks: Vec<TaskId> = Vec::new();
        let mut pending_external: Vec<ExternalTask> = Vec::new();
        let mut completed = 0;
        for subtask in subtasks {
            match subtask {
                SubTask::Scheduled(sub) => match state.index_of(sub) {
                    Some(i) if state.actors[i].completed => completed += 1,
                    Some(_) => pending_tasks.push(sub),
                    None => {
                        return Err(state.abort(ScheduleError::UnresolvableScheduledTask(
                            format!("task {} awaits unknown task {}", task, sub),
                        )))
                    }
                },
                SubTask::External(external) if external.is_completed() => completed += 1,
                SubTask::External(external) => pending_external.push(external),
            }
        }

        let nothing_pending = pending_tasks.is_empty() && pending_external.is_empty();
        let satisfied = match mode {
            WaitMode::Any => completed > 0 || nothing_pending,
            WaitMode::All => nothing_pending,
        };
        if satisfied {
            return Ok(false);
        }
        log::debug!(
            "Blocked task {} of {}. mode={:?}, tasks={:?}, external={}",
            task,
            state.actors[index].actor,
            mode,
            pending_tasks,
            pending_external.len()
        );
        state.actors[index].block_on(pending_tasks, pending_external, mode);
        Ok(true)
    }
}

/// Releases actors whose wait condition was met by external work finishing.
pub(super) fn unblock_on_external_completion(state: &mut SchedulerState) {
    for actor in state.actors.iter_mut().filter(|a| a.blocked) {
        if actor.poll_external() {
            log::debug!("Unblocked task {} of {}.", actor.task, actor.actor);
        }
    }
}

/// Releases actors whose wait condition was met by `task` completing.
pub(super) fn unblock_on_task_completion(state: &mut SchedulerState, task: TaskId) {
    for actor in state.actors.iter_mut().filter(|a| a.blocked) {
        if actor.on_task_completed(task) {
            log::debug!("Unblocked task {} of {}.", actor.task, actor.actor);
        }
    }
}
