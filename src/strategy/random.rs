use super::{describe_bound, StepCounter, Strategy};
use crate::actor::{schedulable, ActorInfo, TaskId};
use crate::error::ScheduleError;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Picks uniformly among the schedulable candidates. Never finishes: every iteration samples a new
/// schedule from the same seeded stream.
#[derive(Clone, Debug)]
pub struct RandomStrategy {
    seed: u64,
    rng: SmallRng,
    steps: StepCounter,
}

impl RandomStrategy {
    pub fn new(seed: u64, depth_bound: usize) -> Self {
        RandomStrategy {
            seed,
            rng: SmallRng::seed_from_u64(seed),
            steps: StepCounter::new(depth_bound),
        }
    }
}

impl Strategy for RandomStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        _current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        let enabled = schedulable(candidates);
        if enabled.is_empty() {
            return Ok(None);
        }
        let index = self.rng.gen_range(0..enabled.len());
        self.steps.advance();
        Ok(Some(enabled[index].task))
    }

    fn next_boolean(&mut self, max_value: u64) -> Result<Option<bool>, ScheduleError> {
        let value = self.rng.gen_range(0..max_value.max(1)) == 0;
        self.steps.advance();
        Ok(Some(value))
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        let value = if max_value == 0 {
            0
        } else {
            self.rng.gen_range(0..max_value)
        };
        self.steps.advance();
        Ok(Some(value))
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
        false
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.steps.next_iteration();
    }

    fn reset(&mut self) {
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.steps.reset();
    }

    fn description(&self) -> String {
        format!("Random[seed={}, {}]", self.seed, describe_bound(self.steps.bound()))
    }
}
