use super::{describe_bound, StepCounter, Strategy};
use crate::actor::{schedulable, ActorInfo, TaskId};
use crate::error::ScheduleError;

/// One choice point: the alternatives available when it was first reached and the one currently
/// being explored.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Level {
    choices: Vec<u64>,
    index: usize,
}

impl Level {
    fn current(&self) -> u64 {
        self.choices[self.index]
    }
}

/// Bounded depth-first search over every scheduling and nondeterministic choice point.
///
/// The stack holds one [`Level`] per explored step. An iteration replays the stack as a prefix,
/// then extends it with the first alternative at each new choice point. Backtracking happens in
/// [`Strategy::configure_next_iteration`]: exhausted levels are popped and the deepest remaining
/// one advances. Once the stack drains the space within the bound has been explored.
#[derive(Clone, Debug)]
pub struct DfsStrategy {
    stack: Vec<Level>,
    steps: StepCounter,
    finished: bool,
    bound_hit: bool,
}

impl DfsStrategy {
    pub fn new(depth_bound: usize) -> Self {
        DfsStrategy {
            stack: Vec::new(),
            steps: StepCounter::new(depth_bound),
            finished: false,
            bound_hit: false,
        }
    }

    /// Whether any iteration so far was cut short by the depth bound.
    pub fn bound_hit(&self) -> bool {
        self.bound_hit
    }

    /// Restarts the search from scratch under a new bound, keeping the high-water mark.
    pub(crate) fn restart_with_bound(&mut self, depth_bound: usize) {
        self.stack.clear();
        self.finished = false;
        self.bound_hit = false;
        self.steps.set_bound(depth_bound);
    }

    /// Returns the alternative to take at the current step, pushing a new level if the step has not
    /// been reached before.
    fn choose(&mut self, choices: Vec<u64>) -> u64 {
        let step = self.steps.explored();
        if step >= self.stack.len() {
            self.stack.push(Level { choices, index: 0 });
        }
        self.steps.advance();
        self.stack[step].current()
    }

    /// Whether the replayed prefix still has the same shape. Programs under test are expected to
    /// be deterministic given the choices, but a diverging one must not index out of bounds.
    fn prefix_matches(&self, choices: &[u64]) -> bool {
        match self.stack.get(self.steps.explored()) {
            None => true,
            Some(level) => choices.contains(&level.current()),
        }
    }
}

impl Strategy for DfsStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        _current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        let choices: Vec<u64> = schedulable(candidates)
            .into_iter()
            .map(|a| u64::from(a.task))
            .collect();
        if choices.is_empty() || !self.prefix_matches(&choices) {
            return Ok(None);
        }
        Ok(Some(TaskId::from(self.choose(choices))))
    }

    fn next_boolean(&mut self, _max_value: u64) -> Result<Option<bool>, ScheduleError> {
        let choices = vec![0, 1];
        if !self.prefix_matches(&choices) {
            return Ok(None);
        }
        Ok(Some(self.choose(choices) == 1))
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        let choices: Vec<u64> = (0..max_value.max(1)).collect();
        if !self.prefix_matches(&choices) {
            return Ok(None);
        }
        Ok(Some(self.choose(choices)))
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
        self.finished
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        if self.steps.reached_bound() {
            self.bound_hit = true;
        }
        self.stack.truncate(self.steps.explored());
        while let Some(level) = self.stack.last_mut() {
            if level.index + 1 < level.choices.len() {
                level.index += 1;
                break;
            }
            self.stack.pop();
        }
        if self.stack.is_empty() {
            log::debug!("DFS exhausted. max_explored_steps={}", self.steps.max_explored());
            self.finished = true;
        }
        self.steps.next_iteration();
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.finished = false;
        self.bound_hit = false;
        self.steps.reset();
    }

    fn description(&self) -> String {
        format!("DFS[{}]", describe_bound(self.steps.bound()))
    }
}

/// Runs [`DfsStrategy`] under an increasing bound: whenever a full search was cut short by its
/// bound, the bound grows by one and the search restarts, up to `max_depth_bound` (zero means no
/// limit).
#[derive(Clone, Debug)]
pub struct IterativeDeepeningDfsStrategy {
    dfs: DfsStrategy,
    initial_bound: usize,
    max_depth_bound: usize,
}

impl IterativeDeepeningDfsStrategy {
    pub fn new(initial_bound: usize, max_depth_bound: usize) -> Self {
        let initial_bound = initial_bound.max(1);
        IterativeDeepeningDfsStrategy {
            dfs: DfsStrategy::new(initial_bound),
            initial_bound,
            max_depth_bound,
        }
    }

    fn can_deepen(&self) -> bool {
        self.max_depth_bound == 0 || self.dfs.depth_bound() < self.max_depth_bound
    }
}

impl Strategy for IterativeDeepeningDfsStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        self.dfs.next_actor(candidates, current)
    }

    fn next_boolean(&mut self, max_value: u64) -> Result<Option<bool>, ScheduleError> {
        self.dfs.next_boolean(max_value)
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        self.dfs.next_integer(max_value)
    }

    fn explored_steps(&self) -> usize {
        self.dfs.explored_steps()
    }

    fn max_explored_steps(&self) -> usize {
        self.dfs.max_explored_steps()
    }

    fn depth_bound(&self) -> usize {
        self.dfs.depth_bound()
    }

    fn has_finished(&self) -> bool {
        self.dfs.has_finished() && (!self.dfs.bound_hit() || !self.can_deepen())
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.dfs.configure_next_iteration();
        if self.dfs.has_finished() && self.dfs.bound_hit() && self.can_deepen() {
            let bound = self.dfs.depth_bound() + 1;
            log::debug!("Deepening DFS. bound={}", bound);
            self.dfs.restart_with_bound(bound);
        }
    }

    fn reset(&mut self) {
        self.dfs.reset();
        self.dfs.restart_with_bound(self.initial_bound);
    }

    fn description(&self) -> String {
        format!(
            "IterativeDeepeningDFS[bound={}, max={}]",
            self.dfs.depth_bound(),
            describe_bound(self.max_depth_bound)
        )
    }
}
