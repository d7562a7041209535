//! Private module for selective re-export.

use crate::error::EngineError;
use crate::strategy::{
    ComboStrategy, DfsStrategy, HybridStrategy, InteractiveStrategy,
    IterativeDeepeningDfsStrategy, RandomStrategy, ReplayStrategy, Strategy,
};
use crate::trace::ScheduleTrace;
use serde::{Deserialize, Serialize};

/// Which exploration policy a session uses.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StrategyKind {
    Random,
    Dfs,
    IterativeDeepeningDfs,
    /// Iterative-deepening DFS up to the safety prefix bound (or the unfair step bound when no
    /// prefix is configured), then random.
    Hybrid,
    /// `prefix` for the first `safety_prefix_bound` steps, then `suffix`.
    Combo {
        prefix: Box<StrategyKind>,
        suffix: Box<StrategyKind>,
    },
    Interactive,
    /// Requires a trace, see [`TestingEngine::replaying`](crate::TestingEngine::replaying).
    Replay,
}

/// When a session stops looking for more bugs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StopCondition {
    /// Stop at the first bug.
    FirstBug,
    /// Stop once this many iterations have found a bug.
    BugCount(usize),
    /// Keep going until the strategy finishes or the iteration budget runs out.
    Never,
}

impl StopCondition {
    pub fn matches(&self, bug_count: usize) -> bool {
        match self {
            StopCondition::FirstBug => bug_count > 0,
            StopCondition::BugCount(n) => bug_count >= *n,
            StopCondition::Never => false,
        }
    }
}

/// Session configuration. Every field has a default, so partial JSON documents load.
///
/// # Example
///
/// ```
/// use turnstile::{Configuration, StrategyKind};
/// let config = Configuration::default()
///     .strategy(StrategyKind::Dfs)
///     .iterations(None)
///     .max_unfair_steps(50);
/// assert_eq!(config.step_bound(false), 50);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub strategy: StrategyKind,
    /// `None` runs until the strategy finishes or the stop condition holds.
    pub iterations: Option<usize>,
    pub seed: u64,
    /// Step bound for strategies that are not fair. Zero means unbounded.
    pub max_unfair_steps: usize,
    /// Step bound for fair strategies. Zero means unbounded.
    pub max_fair_steps: usize,
    pub safety_prefix_bound: usize,
    /// Number of priority rotations per iteration under operation bounding.
    pub operation_delay_bound: usize,
    pub depth_bound_hit_is_bug: bool,
    pub bound_operations: bool,
    pub cache_program_state: bool,
    pub intra_actor_concurrency: bool,
    pub stop_when: StopCondition,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            strategy: StrategyKind::Random,
            iterations: Some(1),
            seed: 0,
            max_unfair_steps: 10_000,
            max_fair_steps: 100_000,
            safety_prefix_bound: 0,
            operation_delay_bound: 2,
            depth_bound_hit_is_bug: false,
            bound_operations: false,
            cache_program_state: false,
            intra_actor_concurrency: false,
            stop_when: StopCondition::FirstBug,
        }
    }
}

impl Configuration {
    pub fn strategy(self, strategy: StrategyKind) -> Self {
        Self { strategy, ..self }
    }

    pub fn iterations(self, iterations: Option<usize>) -> Self {
        Self { iterations, ..self }
    }

    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    pub fn max_unfair_steps(self, max_unfair_steps: usize) -> Self {
        Self {
            max_unfair_steps,
            ..self
        }
    }

    pub fn max_fair_steps(self, max_fair_steps: usize) -> Self {
        Self {
            max_fair_steps,
            ..self
        }
    }

    pub fn safety_prefix_bound(self, safety_prefix_bound: usize) -> Self {
        Self {
            safety_prefix_bound,
            ..self
        }
    }

    pub fn operation_delay_bound(self, operation_delay_bound: usize) -> Self {
        Self {
            operation_delay_bound,
            ..self
        }
    }

    pub fn depth_bound_hit_is_bug(self, depth_bound_hit_is_bug: bool) -> Self {
        Self {
            depth_bound_hit_is_bug,
            ..self
        }
    }

    pub fn bound_operations(self, bound_operations: bool) -> Self {
        Self {
            bound_operations,
            ..self
        }
    }

    pub fn cache_program_state(self, cache_program_state: bool) -> Self {
        Self {
            cache_program_state,
            ..self
        }
    }

    pub fn intra_actor_concurrency(self, intra_actor_concurrency: bool) -> Self {
        Self {
            intra_actor_concurrency,
            ..self
        }
    }

    pub fn stop_when(self, stop_when: StopCondition) -> Self {
        Self { stop_when, ..self }
    }

    /// The step bound for a strategy with the given fairness.
    pub fn step_bound(&self, fair: bool) -> usize {
        if fair {
            self.max_fair_steps
        } else {
            self.max_unfair_steps
        }
    }

    /// Builds the configured strategy. Replay needs a trace and is built with
    /// [`Configuration::build_replay`] instead.
    pub fn build_strategy(&self) -> Result<Box<dyn Strategy>, EngineError> {
        self.build(&self.strategy)
    }

    pub fn build_replay(&self, trace: ScheduleTrace) -> Box<dyn Strategy> {
        let bound = self.step_bound(trace.fair);
        Box::new(ReplayStrategy::new(trace, bound))
    }

    fn build(&self, kind: &StrategyKind) -> Result<Box<dyn Strategy>, EngineError> {
        let unfair = self.step_bound(false);
        Ok(match kind {
            StrategyKind::Random => Box::new(RandomStrategy::new(self.seed, unfair)),
            StrategyKind::Dfs => Box::new(DfsStrategy::new(unfair)),
            StrategyKind::IterativeDeepeningDfs => {
                Box::new(IterativeDeepeningDfsStrategy::new(1, unfair))
            }
            StrategyKind::Hybrid => {
                let dfs_bound = if self.safety_prefix_bound > 0 {
                    self.safety_prefix_bound
                } else {
                    unfair
                };
                Box::new(HybridStrategy::new(
                    IterativeDeepeningDfsStrategy::new(1, dfs_bound),
                    RandomStrategy::new(self.seed, unfair),
                ))
            }
            StrategyKind::Combo { prefix, suffix } => Box::new(ComboStrategy::new(
                self.build(prefix)?,
                self.build(suffix)?,
                self.safety_prefix_bound,
            )),
            StrategyKind::Interactive => {
                Box::new(InteractiveStrategy::new(self.bound_operations, unfair))
            }
            StrategyKind::Replay => return Err(EngineError::MissingTrace),
        })
    }
}
