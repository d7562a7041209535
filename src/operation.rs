//! Private module for selective re-export.

use crate::actor::{ActorInfo, TaskId};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Orders `candidates` by operation id, rotates the result so `current` comes first, then keeps
/// only the schedulable actors.
pub(crate) fn order_by_operation(candidates: &[ActorInfo], current: TaskId) -> Vec<&ActorInfo> {
    let mut ordered: Vec<&ActorInfo> = candidates.iter().collect();
    ordered.sort_by_key(|a| a.operation_id);
    if let Some(position) = ordered.iter().position(|a| a.task == current) {
        ordered.rotate_left(position);
    }
    ordered.retain(|a| a.is_schedulable());
    ordered
}

/// Operation-bounded prioritization.
///
/// Actors are grouped by operation id and only the actors of one prioritized operation are offered
/// to the strategy. The prioritized operation advances to the next distinct id (wrapping) at a
/// fixed number of randomly chosen steps, the *delays*, drawn once per seed from
/// `[0, max_explored_steps)`.
///
/// # Example
///
/// ```
/// use turnstile::{ActorInfo, ActorRef, OperationScheduler, TaskId};
/// let actors: Vec<ActorInfo> = (0..3u64)
///     .map(|i| ActorInfo::new(TaskId::from(i), ActorRef::new("Client", i), i + 1))
///     .collect();
/// let mut operations = OperationScheduler::new(7, 0, 100);
/// let prioritized = operations.prioritize(&actors, actors[1].task, 0);
/// assert_eq!(prioritized.len(), 1);
/// assert_eq!(prioritized[0].operation_id, 2);
/// ```
#[derive(Clone, Debug)]
pub struct OperationScheduler {
    seed: u64,
    rng: SmallRng,
    delay_bound: usize,
    max_explored_steps: usize,
    delays: Vec<usize>,
    prioritized: Option<u64>,
}

impl OperationScheduler {
    /// `delay_bound` delays are drawn from `[0, max_explored_steps)`. No delays are drawn while
    /// `max_explored_steps` is zero.
    pub fn new(seed: u64, delay_bound: usize, max_explored_steps: usize) -> Self {
        let mut scheduler = OperationScheduler {
            seed,
            rng: SmallRng::seed_from_u64(seed),
            delay_bound,
            max_explored_steps,
            delays: Vec::new(),
            prioritized: None,
        };
        scheduler.generate_delays();
        scheduler
    }

    fn generate_delays(&mut self) {
        self.delays.clear();
        if self.max_explored_steps == 0 {
            return;
        }
        for _ in 0..self.delay_bound {
            self.delays.push(self.rng.gen_range(0..self.max_explored_steps));
        }
        self.delays.sort_unstable();
        log::trace!("Operation delays. delays={:?}", self.delays);
    }

    /// Remaining delay steps, ascending.
    pub fn delays(&self) -> &[usize] {
        &self.delays
    }

    /// The operation currently given priority, once one has been chosen.
    pub fn prioritized_operation(&self) -> Option<u64> {
        self.prioritized
    }

    /// Computes the actors that may run next: the schedulable actors of the prioritized operation,
    /// with `current` first if it belongs to it. Delays reached by `explored_steps` are consumed
    /// first, each advancing the prioritized operation.
    pub fn prioritize(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
        explored_steps: usize,
    ) -> Vec<ActorInfo> {
        let ordered = order_by_operation(candidates, current);
        let mut operations: Vec<u64> = Vec::new();
        for actor in &ordered {
            if !operations.contains(&actor.operation_id) {
                operations.push(actor.operation_id);
            }
        }
        if operations.is_empty() {
            return Vec::new();
        }

        let mut index = self
            .prioritized
            .and_then(|op| operations.iter().position(|o| *o == op))
            .unwrap_or(0);
        while self.delays.first().map_or(false, |d| *d <= explored_steps) {
            self.delays.remove(0);
            index = (index + 1) % operations.len();
            log::info!(
                "Rotated operation priority. step={}, operation={}",
                explored_steps,
                operations[index]
            );
        }

        let prioritized = operations[index];
        self.prioritized = Some(prioritized);
        ordered
            .into_iter()
            .filter(|a| a.operation_id == prioritized)
            .cloned()
            .collect()
    }

    /// Regenerates the delays from the construction seed and forgets the prioritized operation.
    pub fn reset(&mut self) {
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.prioritized = None;
        self.generate_delays();
    }

    pub fn description(&self) -> String {
        format!(
            "OperationScheduler[seed={}, delay_bound={}, delays={:?}]",
            self.seed, self.delay_bound, self.delays
        )
    }
}
