//! A library for systematically testing concurrent programs.
//!
//! The program under test is written as a set of *actors*, each running on its own thread. The
//! [`Scheduler`] lets exactly one actor run at a time and, at every scheduling point, asks a
//! [`Strategy`] which actor runs next and which value a nondeterministic choice takes. Every
//! decision is recorded in a [`ScheduleTrace`], so a schedule that exposes a bug can be saved and
//! replayed deterministically.
//!
//! A [`TestingEngine`] runs the test body over many iterations, each under a different schedule,
//! and collects a [`TestReport`]. Strategies range from seeded random walks to exhaustive
//! (iterative-deepening) depth-first search, trace replay, a console-driven interactive mode, and
//! combinations of these.
//!
//! ```rust
//! use turnstile::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! fn read_after_write(rt: Runtime) -> ActorResult {
//!     let flag = Arc::new(AtomicBool::new(false));
//!     let setter = Arc::clone(&flag);
//!     rt.spawn("Setter", move |rt| {
//!         rt.schedule()?;
//!         setter.store(true, Ordering::SeqCst);
//!         Ok(())
//!     })?;
//!     rt.schedule()?;
//!     rt.assert(flag.load(Ordering::SeqCst), "read before write")
//! }
//!
//! let mut engine = TestingEngine::new(
//!     Configuration::default()
//!         .strategy(StrategyKind::Dfs)
//!         .iterations(None)
//!         .stop_when(StopCondition::Never),
//! ).unwrap();
//! let report = engine.run(read_after_write).unwrap();
//! assert!(report.fully_explored);
//! assert!(!report.bugs.is_empty());
//!
//! // A recorded schedule reproduces its bug.
//! let trace = report.bugs[0].trace.clone();
//! let replayed = TestingEngine::replaying(Configuration::default(), trace)
//!     .run(read_after_write)
//!     .unwrap();
//! assert_eq!(replayed.bugs[0].description, "read before write");
//! ```

pub mod actor;
mod config;
mod engine;
mod error;
mod operation;
mod report;
mod runtime;
pub mod scheduler;
pub mod strategy;
#[cfg(test)]
mod test_util;
mod trace;
mod visitor;

pub use actor::{ActorId, ActorInfo, ActorRef, ExternalTask, SubTask, TaskId, WaitMode};
pub use config::{Configuration, StopCondition, StrategyKind};
pub use engine::TestingEngine;
pub use error::{EngineError, ScheduleError};
pub use operation::OperationScheduler;
pub use report::{BugReport, IterationData, Reporter, TestReport, WriteReporter};
pub use runtime::{ActorResult, Runtime};
pub use scheduler::{IterationOutcome, Scheduler};
pub use strategy::{
    ComboStrategy, DfsStrategy, HybridStrategy, InteractiveStrategy, IterativeDeepeningDfsStrategy,
    RandomStrategy, ReplayStrategy, Strategy,
};
pub use trace::{ScheduleStep, ScheduleTrace};
pub use visitor::{StepRecorder, StepVisitor};
