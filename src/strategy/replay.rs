use super::{describe_bound, StepCounter, Strategy};
use crate::actor::{schedulable, ActorInfo, TaskId};
use crate::error::ScheduleError;
use crate::trace::{ScheduleStep, ScheduleTrace};

/// Reproduces a recorded [`ScheduleTrace`] step by step.
///
/// Any disagreement between the recording and the live program is reported as
/// [`ScheduleError::TraceNotReproducible`], including a program that wants to keep scheduling after
/// the trace ran out or one that runs out of enabled actors while the trace still has steps.
#[derive(Clone, Debug)]
pub struct ReplayStrategy {
    trace: ScheduleTrace,
    steps: StepCounter,
}

impl ReplayStrategy {
    pub fn new(trace: ScheduleTrace, depth_bound: usize) -> Self {
        ReplayStrategy {
            trace,
            steps: StepCounter::new(depth_bound),
        }
    }

    pub fn trace(&self) -> &ScheduleTrace {
        &self.trace
    }

    fn diverged(&self, reason: impl Into<String>) -> ScheduleError {
        let err = ScheduleError::TraceNotReproducible {
            step: self.steps.explored(),
            reason: reason.into(),
        };
        log::error!("{}", err);
        err
    }

    fn recorded_choice(&self) -> Result<(Option<bool>, Option<u64>), ScheduleError> {
        match self.trace.get(self.steps.explored()) {
            Some(ScheduleStep::NondeterministicChoice {
                boolean_value,
                integer_value,
                ..
            }) => Ok((*boolean_value, *integer_value)),
            Some(step) => Err(self.diverged(format!(
                "expected a nondeterministic choice, but the trace has '{}'",
                step
            ))),
            None => Err(self.diverged("execution is longer than the trace")),
        }
    }
}

impl Strategy for ReplayStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        _current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        let enabled = schedulable(candidates);
        let (actor_type, actor_id) = match self.trace.get(self.steps.explored()) {
            None if enabled.is_empty() => return Ok(None),
            None => return Err(self.diverged("execution is longer than the trace")),
            Some(ScheduleStep::SchedulingChoice {
                actor_type,
                actor_id,
            }) => (actor_type, *actor_id),
            Some(step) => {
                return Err(self.diverged(format!(
                    "expected a scheduling choice, but the trace has '{}'",
                    step
                )))
            }
        };
        if enabled.is_empty() {
            return Err(self.diverged(format!(
                "expected '{}({})', but no actor is enabled",
                actor_type, actor_id
            )));
        }
        let next = enabled
            .iter()
            .find(|a| a.actor.type_name == *actor_type && a.actor.id == actor_id)
            .map(|a| a.task);
        match next {
            Some(task) => {
                self.steps.advance();
                Ok(Some(task))
            }
            None => Err(self.diverged(format!("cannot detect id '{}({})'", actor_type, actor_id))),
        }
    }

    fn next_boolean(&mut self, _max_value: u64) -> Result<Option<bool>, ScheduleError> {
        match self.recorded_choice()? {
            (Some(value), _) => {
                self.steps.advance();
                Ok(Some(value))
            }
            _ => Err(self.diverged("expected a boolean choice")),
        }
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        match self.recorded_choice()? {
            (_, Some(value)) if max_value == 0 || value < max_value => {
                self.steps.advance();
                Ok(Some(value))
            }
            (_, Some(value)) => Err(self.diverged(format!(
                "recorded integer {} is out of range [0, {})",
                value, max_value
            ))),
            _ => Err(self.diverged("expected an integer choice")),
        }
    }

    fn explored_steps(&self) -> usize {
        self.steps.explored()
    }

    fn max_explored_steps(&self) -> usize {
        self.steps.max_explored()
    }

    fn depth_bound(&self) -> usize {
        self.steps.bound()
    }

    fn has_finished(&self) -> bool {
        true
    }

    fn is_fair(&self) -> bool {
        self.trace.fair
    }

    fn configure_next_iteration(&mut self) {
        self.steps.next_iteration();
    }

    fn reset(&mut self) {
        self.steps.reset();
    }

    fn description(&self) -> String {
        format!(
            "Replay[steps={}, fair={}, {}]",
            self.trace.len(),
            self.trace.fair,
            describe_bound(self.steps.bound())
        )
    }
}
