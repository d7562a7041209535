use super::{IterativeDeepeningDfsStrategy, RandomStrategy, Strategy};
use crate::actor::{ActorInfo, TaskId};
use crate::error::ScheduleError;

/// Systematic search near the start of an iteration, random sampling beyond it.
///
/// Decisions go to an iterative-deepening DFS until that DFS reaches its current depth bound. The
/// rest of the iteration is then handed to a random strategy and never returns to the DFS until the
/// next iteration. The overall step bound is the random phase's, and exhaustiveness is judged by
/// the DFS alone.
#[derive(Clone, Debug)]
pub struct HybridStrategy {
    dfs: IterativeDeepeningDfsStrategy,
    random: RandomStrategy,
    use_random: bool,
}

impl HybridStrategy {
    pub fn new(dfs: IterativeDeepeningDfsStrategy, random: RandomStrategy) -> Self {
        HybridStrategy {
            dfs,
            random,
            use_random: false,
        }
    }

    /// Whether the current iteration has fallen back to random sampling.
    pub fn is_random_phase(&self) -> bool {
        self.use_random
    }

    fn active(&mut self) -> &mut dyn Strategy {
        if !self.use_random && self.dfs.has_reached_depth_bound() {
            log::trace!(
                "Switching to random. explored_steps={}",
                self.dfs.explored_steps()
            );
            self.use_random = true;
        }
        if self.use_random {
            &mut self.random
        } else {
            &mut self.dfs
        }
    }
}

impl Strategy for HybridStrategy {
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
        if self.use_random {
            self.random.explored_steps()
        } else {
            self.dfs.explored_steps()
        }
    }

    fn max_explored_steps(&self) -> usize {
        if self.use_random {
            self.random.max_explored_steps()
        } else {
            self.dfs.max_explored_steps()
        }
    }

    fn depth_bound(&self) -> usize {
        self.random.depth_bound()
    }

    fn has_reached_depth_bound(&self) -> bool {
        self.random.has_reached_depth_bound()
    }

    fn has_finished(&self) -> bool {
        self.dfs.has_finished()
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.dfs.configure_next_iteration();
        self.random.configure_next_iteration();
        self.use_random = false;
    }

    fn reset(&mut self) {
        self.dfs.reset();
        self.random.reset();
        self.use_random = false;
    }

    fn description(&self) -> String {
        format!(
            "Hybrid[{}, then {}]",
            self.dfs.description(),
            self.random.description()
        )
    }
}
