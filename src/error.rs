//! Private module for selective re-export.

use crate::actor::TaskId;

/// Why a scheduling entry point did not let the calling actor continue.
///
/// Actor logic propagates these with `?` so that a torn-down actor unwinds without running any
/// more of its own code. Only [fatal](ScheduleError::is_fatal) variants end the whole session; the
/// rest end at most the current iteration.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    /// No schedulable actor remains, or the strategy declined to continue along this path.
    #[error("schedule explored")]
    IterationExhausted,

    /// The strategy hit its step bound for this iteration.
    #[error("depth bound of {bound} reached")]
    DepthBoundReached { bound: usize },

    /// The calling actor was killed while it waited for its turn.
    #[error("execution canceled")]
    Canceled,

    /// A bug. The text is the report handed to the user.
    #[error("assertion failure: {0}")]
    AssertionFailure(String),

    /// A replayed program diverged from its recording.
    #[error("Trace is not reproducible at step {step}: {reason}")]
    TraceNotReproducible { step: usize, reason: String },

    /// The calling thread has no corresponding actor.
    #[error("unable to schedule {0}")]
    UnresolvableScheduledTask(String),

    /// An actor awaited sub-tasks but the session was configured without intra-actor concurrency.
    #[error("task {0} awaited sub-tasks, but intra-actor concurrency is disabled")]
    IntraActorConcurrencyDisabled(TaskId),
}

impl ScheduleError {
    /// Fatal errors abort the session instead of just the iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScheduleError::TraceNotReproducible { .. }
                | ScheduleError::UnresolvableScheduledTask(_)
                | ScheduleError::IntraActorConcurrencyDisabled(_)
        )
    }
}

/// Failures of a whole testing session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session aborted: {0}")]
    Fatal(ScheduleError),

    #[error("unable to access trace file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed trace: {0}")]
    Json(#[from] serde_json::Error),

    #[error("the replay strategy needs a trace")]
    MissingTrace,

    /// A [`Runtime`](crate::Runtime) handle outlived its iteration, so the strategy could not be
    /// recovered for the next one.
    #[error("scheduler still shared after iteration {iteration} ended")]
    SchedulerLeaked { iteration: usize },
}
