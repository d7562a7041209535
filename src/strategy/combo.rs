use super::Strategy;
use crate::actor::{ActorInfo, TaskId};
use crate::error::ScheduleError;

/// Runs a short safety prefix under one strategy and the remainder of the iteration under another.
///
/// The prefix strategy decides while its own explored-step count is below `safety_prefix_depth`.
/// From then on every decision is delegated to the suffix strategy for the rest of the iteration,
/// and the explored-step count reads as `safety_prefix_depth` plus the suffix's own count. The step
/// bound and fairness are always the suffix's.
pub struct ComboStrategy {
    prefix: Box<dyn Strategy>,
    suffix: Box<dyn Strategy>,
    safety_prefix_depth: usize,
}

impl ComboStrategy {
    pub fn new(
        prefix: Box<dyn Strategy>,
        suffix: Box<dyn Strategy>,
        safety_prefix_depth: usize,
    ) -> Self {
        ComboStrategy {
            prefix,
            suffix,
            safety_prefix_depth,
        }
    }

    fn in_prefix(&self) -> bool {
        self.prefix.explored_steps() < self.safety_prefix_depth
    }

    fn active(&mut self) -> &mut Box<dyn Strategy> {
        if self.in_prefix() {
            &mut self.prefix
        } else {
            &mut self.suffix
        }
    }
}

impl Strategy for ComboStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        self.active().next_actor(candidates, current)
    }

    fn next_boolean(&mut self, max_value: u64) -> Result<Option<bool>, ScheduleError> {
        self.active().next_boolean(max_value)
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        self.active().next_integer(max_value)
    }

    fn explored_steps(&self) -> usize {
        if self.in_prefix() {
            self.prefix.explored_steps()
        } else {
            self.safety_prefix_depth + self.suffix.explored_steps()
        }
    }

    fn max_explored_steps(&self) -> usize {
        std::cmp::max(
            self.prefix.max_explored_steps(),
            self.safety_prefix_depth + self.suffix.max_explored_steps(),
        )
    }

    fn depth_bound(&self) -> usize {
        self.suffix.depth_bound()
    }

    fn has_reached_depth_bound(&self) -> bool {
        self.suffix.has_reached_depth_bound()
    }

    fn has_finished(&self) -> bool {
        self.prefix.has_finished() && self.suffix.has_finished()
    }

    fn is_fair(&self) -> bool {
        self.suffix.is_fair()
    }

    fn configure_next_iteration(&mut self) {
        self.prefix.configure_next_iteration();
        self.suffix.configure_next_iteration();
    }

    fn reset(&mut self) {
        self.prefix.reset();
        self.suffix.reset();
    }

    fn description(&self) -> String {
        format!(
            "Combo[{} for {} steps, then {}]",
            self.prefix.description(),
            self.safety_prefix_depth,
            self.suffix.description()
        )
    }
}
