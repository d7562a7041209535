//! Exploration policies that decide which actor runs next and which value a nondeterministic
//! choice returns.
//!
//! A [`Strategy`] is owned by the [`Scheduler`](crate::Scheduler) for the duration of an iteration
//! and only ever invoked from the thread that currently holds the hand-off, so implementations are
//! plain single-threaded state machines. The same instance is carried across iterations; its
//! [`Strategy::configure_next_iteration`] hook is where systematic strategies backtrack.
//!
//! Variants:
//! - [`RandomStrategy`]: seeded uniform choice, never finishes.
//! - [`DfsStrategy`]: bounded depth-first search over every choice point.
//! - [`IterativeDeepeningDfsStrategy`]: bounded DFS whose bound grows whenever it was hit.
//! - [`ReplayStrategy`]: follows a recorded [`ScheduleTrace`](crate::ScheduleTrace).
//! - [`InteractiveStrategy`]: asks a human on a line-oriented console.
//! - [`ComboStrategy`]: a safety prefix under one strategy, the rest under another.
//! - [`HybridStrategy`]: bounded DFS that falls back to random once its bound is hit.

use crate::actor::{ActorInfo, TaskId};
use crate::error::ScheduleError;

mod combo;
mod dfs;
mod hybrid;
mod interactive;
mod random;
mod replay;

pub use combo::ComboStrategy;
pub use dfs::{DfsStrategy, IterativeDeepeningDfsStrategy};
pub use hybrid::HybridStrategy;
pub use interactive::InteractiveStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

/// A pluggable exploration policy.
///
/// `Ok(None)` from any of the `next_*` methods means exploration along the current path is
/// exhausted and the iteration should end. It is not a failure. `Err` is reserved for conditions
/// that invalidate the whole session, like a replay diverging from its trace.
///
/// Every successful `next_*` call counts as exactly one explored step.
pub trait Strategy: Send {
    /// Picks the next actor among the schedulable `candidates`. `current` is the actor that
    /// reached the scheduling point.
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError>;

    /// Picks a boolean. Random strategies return `true` with probability `1 / max_value`.
    fn next_boolean(&mut self, max_value: u64) -> Result<Option<bool>, ScheduleError>;

    /// Picks an integer in `[0, max_value)`.
    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError>;

    /// Steps explored in the current iteration.
    fn explored_steps(&self) -> usize;

    /// High-water mark of explored steps across all iterations so far.
    fn max_explored_steps(&self) -> usize;

    /// The step bound for an iteration. Zero means unbounded.
    fn depth_bound(&self) -> usize;

    fn has_reached_depth_bound(&self) -> bool {
        let bound = self.depth_bound();
        bound > 0 && self.explored_steps() >= bound
    }

    /// Whether another iteration can discover anything new.
    fn has_finished(&self) -> bool;

    /// Whether the strategy schedules fairly, in which case the fair step bound applies.
    fn is_fair(&self) -> bool;

    /// Prepares for the next iteration. Resets the explored step count.
    fn configure_next_iteration(&mut self);

    /// Forgets all exploration state, as if newly constructed.
    fn reset(&mut self);

    fn description(&self) -> String;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        (**self).next_actor(candidates, current)
    }
    fn next_boolean(&mut self, max_value: u64) -> Result<Option<bool>, ScheduleError> {
        (**self).next_boolean(max_value)
    }
    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        (**self).next_integer(max_value)
    }
    fn explored_steps(&self) -> usize {
        (**self).explored_steps()
    }
    fn max_explored_steps(&self) -> usize {
        (**self).max_explored_steps()
    }
    fn depth_bound(&self) -> usize {
        (**self).depth_bound()
    }
    fn has_reached_depth_bound(&self) -> bool {
        (**self).has_reached_depth_bound()
    }
    fn has_finished(&self) -> bool {
        (**self).has_finished()
    }
    fn is_fair(&self) -> bool {
        (**self).is_fair()
    }
    fn configure_next_iteration(&mut self) {
        (**self).configure_next_iteration()
    }
    fn reset(&mut self) {
        (**self).reset()
    }
    fn description(&self) -> String {
        (**self).description()
    }
}

/// Explored-step bookkeeping shared by the leaf strategies.
#[derive(Clone, Debug, Default)]
pub(crate) struct StepCounter {
    explored: usize,
    max_explored: usize,
    bound: usize,
}

impl StepCounter {
    pub(crate) fn new(bound: usize) -> Self {
        StepCounter {
            bound,
            ..Self::default()
        }
    }

    pub(crate) fn advance(&mut self) {
        self.explored += 1;
    }

    pub(crate) fn explored(&self) -> usize {
        self.explored
    }

    pub(crate) fn max_explored(&self) -> usize {
        std::cmp::max(self.max_explored, self.explored)
    }

    pub(crate) fn bound(&self) -> usize {
        self.bound
    }

    pub(crate) fn set_bound(&mut self, bound: usize) {
        self.bound = bound;
    }

    pub(crate) fn reached_bound(&self) -> bool {
        self.bound > 0 && self.explored >= self.bound
    }

    pub(crate) fn next_iteration(&mut self) {
        self.max_explored = self.max_explored();
        self.explored = 0;
    }

    pub(crate) fn reset(&mut self) {
        *self = StepCounter::new(self.bound);
    }
}

fn describe_bound(bound: usize) -> String {
    if bound == 0 {
        "unbounded".to_owned()
    } else {
        format!("bound={}", bound)
    }
}
