//! Private module for selective re-export.

use crate::config::{Configuration, StrategyKind};
use crate::error::{EngineError, ScheduleError};
use crate::operation::OperationScheduler;
use crate::report::{BugReport, IterationData, Reporter, TestReport, WriteReporter};
use crate::runtime::{ActorResult, Runtime};
use crate::scheduler::Scheduler;
use crate::strategy::Strategy;
use crate::trace::ScheduleTrace;
use crate::visitor::StepVisitor;
use std::sync::Arc;
use std::time::Instant;

/// Runs a test body over many iterations, each under a schedule chosen by the strategy.
///
/// # Example
///
/// ```
/// use turnstile::*;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// let mut engine = TestingEngine::new(
///     Configuration::default().strategy(StrategyKind::Dfs).iterations(None),
/// ).unwrap();
/// let report = engine.run(|rt| {
///     let counter = Arc::new(AtomicU64::new(0));
///     let finished = Arc::new(AtomicU64::new(0));
///     for _ in 0..2 {
///         let (counter, finished) = (Arc::clone(&counter), Arc::clone(&finished));
///         rt.spawn("Incrementer", move |rt| {
///             let read = counter.load(Ordering::SeqCst);
///             rt.schedule()?;
///             counter.store(read + 1, Ordering::SeqCst);
///             if finished.fetch_add(1, Ordering::SeqCst) == 1 {
///                 rt.assert(counter.load(Ordering::SeqCst) == 2, "lost update")?;
///             }
///             Ok(())
///         })?;
///     }
///     Ok(())
/// }).unwrap();
/// assert_eq!(report.bugs.len(), 1);
/// ```
pub struct TestingEngine {
    config: Configuration,
    strategy: Option<Box<dyn Strategy>>,
    visitor: Option<Arc<dyn StepVisitor + Send + Sync>>,
    bound_operations: bool,
}

impl TestingEngine {
    /// An engine running the configured strategy. Fails for [`StrategyKind::Replay`], which needs
    /// [`TestingEngine::replaying`].
    pub fn new(config: Configuration) -> Result<Self, EngineError> {
        let strategy = config.build_strategy()?;
        Ok(Self::with_strategy(config, strategy))
    }

    /// An engine that reproduces `trace`. Operation bounding is disabled so every recorded choice
    /// is matched against the full set of enabled actors.
    pub fn replaying(config: Configuration, trace: ScheduleTrace) -> Self {
        let strategy = config.build_replay(trace);
        let config = config.strategy(StrategyKind::Replay).bound_operations(false);
        Self::with_strategy(config, strategy)
    }

    /// An engine driven by a caller-supplied strategy.
    pub fn with_strategy(config: Configuration, strategy: Box<dyn Strategy>) -> Self {
        let bound_operations = config.bound_operations && config.strategy != StrategyKind::Replay;
        TestingEngine {
            config,
            strategy: Some(strategy),
            visitor: None,
            bound_operations,
        }
    }

    /// Adds a [`StepVisitor`] that observes decisions once the safety prefix has been explored.
    pub fn visitor(self, visitor: impl StepVisitor + Send + Sync + 'static) -> Self {
        TestingEngine {
            visitor: Some(Arc::new(visitor)),
            ..self
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn run<F>(&mut self, test: F) -> Result<TestReport, EngineError>
    where
        F: Fn(Runtime) -> ActorResult + Send + Sync + 'static,
    {
        self.run_and_report(test, &mut WriteReporter::new(&mut std::io::sink()))
    }

    /// Runs the session. The test body is spawned as the root actor of every iteration.
    pub fn run_and_report<F>(
        &mut self,
        test: F,
        reporter: &mut impl Reporter,
    ) -> Result<TestReport, EngineError>
    where
        F: Fn(Runtime) -> ActorResult + Send + Sync + 'static,
    {
        let test = Arc::new(test);
        let started = Instant::now();
        let mut report = TestReport::default();
        let mut iteration = 0;
        loop {
            if self.config.iterations.map_or(false, |max| iteration >= max) {
                break;
            }
            let mut strategy = match self.strategy.take() {
                Some(strategy) => strategy,
                None => return Err(EngineError::SchedulerLeaked { iteration }),
            };
            report.strategy = strategy.description();
            log::debug!("Starting iteration {} with {}.", iteration, report.strategy);

            let operations = if self.bound_operations {
                Some(OperationScheduler::new(
                    self.config.seed.wrapping_add(iteration as u64),
                    self.config.operation_delay_bound,
                    strategy.max_explored_steps(),
                ))
            } else {
                None
            };
            let scheduler =
                Scheduler::new(strategy, operations, &self.config, self.visitor.clone());
            let runtime = Runtime::new(scheduler.clone());
            let body = Arc::clone(&test);
            if let Err(err) = runtime.spawn("Root", move |rt| body(rt)) {
                log::debug!("Root actor did not start: {}", err);
            }
            runtime.join_all();
            drop(runtime);
            let outcome = scheduler
                .finish()
                .map_err(|_| EngineError::SchedulerLeaked { iteration })?;
            strategy = outcome.strategy;

            if let Some(err) = outcome.fatal {
                self.strategy = Some(strategy);
                return Err(EngineError::Fatal(err));
            }
            let depth_bound_hit = matches!(
                outcome.end,
                Some(ScheduleError::DepthBoundReached { .. })
            );
            report.iterations += 1;
            report.max_explored_steps = report.max_explored_steps.max(outcome.explored_steps);
            if depth_bound_hit {
                report.depth_bound_hits += 1;
            }
            let bug_found = outcome.bug_report.is_some();
            if let Some(description) = outcome.bug_report {
                log::info!("Iteration {} found a bug: {}", iteration, description);
                report.bugs.push(BugReport {
                    iteration,
                    description,
                    trace: outcome.trace.clone(),
                });
            }
            report.last_trace = outcome.trace;

            let mut done = self.config.stop_when.matches(report.bugs.len());
            if !done {
                strategy.configure_next_iteration();
                if strategy.has_finished() {
                    report.fully_explored = true;
                    done = true;
                }
            }
            iteration += 1;
            if self.config.iterations.map_or(false, |max| iteration >= max) {
                done = true;
            }
            reporter.report_iteration(IterationData {
                iteration: iteration - 1,
                explored_steps: outcome.explored_steps,
                bug_found,
                depth_bound_hit,
                duration: started.elapsed(),
                done,
            });
            self.strategy = Some(strategy);
            if done {
                break;
            }
        }
        reporter.report_bugs(&report.bugs);
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::StopCondition;
    use crate::strategy::{InteractiveStrategy, RandomStrategy};
    use crate::error::ScheduleError::Canceled;
    use crate::test_util::{coin_flips, init_logging, racy_counter, two_writers, SharedBuffer};
    use crate::trace::ScheduleStep;
    use crate::visitor::StepRecorder;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn config() -> Configuration {
        Configuration::default().stop_when(StopCondition::Never)
    }

    #[test]
    fn dfs_finds_the_lost_update_and_exhausts() {
        init_logging();
        let mut engine =
            TestingEngine::new(config().strategy(StrategyKind::Dfs).iterations(None)).unwrap();
        let report = engine.run(racy_counter).unwrap();
        assert!(report.fully_explored);
        assert!(!report.bugs.is_empty());
        assert!(report.bugs.len() < report.iterations);
        assert!(report.bugs[0].description.contains("lost update"));
    }

    #[test]
    fn first_bug_stops_the_session() {
        let mut engine = TestingEngine::new(
            Configuration::default()
                .strategy(StrategyKind::Random)
                .iterations(Some(500))
                .seed(3),
        )
        .unwrap();
        let report = engine.run(racy_counter).unwrap();
        assert_eq!(report.bugs.len(), 1);
        assert_eq!(report.iterations, report.bugs[0].iteration + 1);
    }

    #[test]
    fn same_seed_same_schedules() {
        let run = || {
            let mut engine = TestingEngine::new(config().seed(17).iterations(Some(20))).unwrap();
            engine.run(two_writers).unwrap().last_trace
        };
        let first = run();
        assert!(first.len() > 2);
        assert_eq!(first, run());
    }

    #[test]
    fn same_seed_same_schedules_across_operations() {
        let program = |rt: Runtime| -> ActorResult {
            rt.spawn_in_operation("A", 1, |rt| {
                rt.schedule()?;
                rt.schedule()
            })?;
            rt.spawn_in_operation("B", 2, |rt| {
                rt.schedule()?;
                rt.schedule()
            })?;
            Ok(())
        };
        let run = || {
            let mut engine = TestingEngine::new(
                config()
                    .seed(5)
                    .bound_operations(true)
                    .operation_delay_bound(2)
                    .iterations(Some(10)),
            )
            .unwrap();
            engine.run(program).unwrap().last_trace
        };
        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
    }

    #[test]
    fn replay_reproduces_the_bug() {
        let mut engine = TestingEngine::new(
            Configuration::default().iterations(Some(500)).seed(11),
        )
        .unwrap();
        let found = engine.run(racy_counter).unwrap();
        let bug = found.bugs[0].clone();

        let mut replay = TestingEngine::replaying(Configuration::default(), bug.trace.clone());
        let replayed = replay.run(racy_counter).unwrap();
        assert_eq!(replayed.iterations, 1);
        assert_eq!(replayed.bugs.len(), 1);
        assert_eq!(replayed.bugs[0].description, bug.description);
        assert_eq!(replayed.bugs[0].trace, bug.trace);
    }

    #[test]
    fn diverging_replay_is_fatal() {
        let trace = ScheduleTrace::from_steps(
            vec![ScheduleStep::SchedulingChoice {
                actor_type: "Nobody".into(),
                actor_id: 42u64.into(),
            }],
            false,
        );
        let mut replay = TestingEngine::replaying(Configuration::default(), trace);
        let err = replay.run(two_writers).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Fatal(ScheduleError::TraceNotReproducible { step: 0, .. })
        ));
    }

    #[test]
    fn depth_bound_cancels_or_reports() {
        let endless = |rt: Runtime| -> ActorResult {
            loop {
                rt.schedule()?;
            }
        };
        let mut engine =
            TestingEngine::new(config().max_unfair_steps(10).iterations(Some(3))).unwrap();
        let report = engine.run(endless).unwrap();
        assert_eq!(report.depth_bound_hits, 3);
        assert!(report.bugs.is_empty());
        assert_eq!(report.max_explored_steps, 10);

        let mut engine = TestingEngine::new(
            Configuration::default()
                .max_unfair_steps(10)
                .depth_bound_hit_is_bug(true),
        )
        .unwrap();
        let report = engine.run(endless).unwrap();
        assert_eq!(report.bugs.len(), 1);
        assert_eq!(report.bugs[0].description, "Depth bound of 10 reached.");
    }

    #[test]
    fn panics_are_bugs() {
        let mut engine = TestingEngine::new(Configuration::default()).unwrap();
        let report = engine
            .run(|rt| {
                rt.schedule()?;
                panic!("invariant broken");
            })
            .unwrap();
        assert_eq!(report.bugs.len(), 1);
        assert_eq!(report.bugs[0].description, "Root(0) panicked: invariant broken");
    }

    #[test]
    fn events_block_until_delivered() {
        let woke = Arc::new(AtomicUsize::new(0));
        let mut engine =
            TestingEngine::new(config().strategy(StrategyKind::Dfs).iterations(None)).unwrap();
        let report = {
            let woke = Arc::clone(&woke);
            engine
                .run(move |rt| {
                    let delivered = Arc::new(AtomicBool::new(false));
                    let waiter = {
                        let (delivered, woke) = (Arc::clone(&delivered), Arc::clone(&woke));
                        rt.spawn("Waiter", move |rt| {
                            rt.wait_for_event()?;
                            woke.fetch_add(1, Ordering::SeqCst);
                            rt.assert(delivered.load(Ordering::SeqCst), "woke before delivery")
                        })?
                    };
                    rt.schedule()?;
                    rt.schedule()?;
                    delivered.store(true, Ordering::SeqCst);
                    rt.deliver_event(waiter);
                    Ok(())
                })
                .unwrap()
        };
        assert!(report.fully_explored);
        assert!(report.bugs.is_empty());
        let woke = woke.load(Ordering::SeqCst);
        assert!(woke > 0);
        assert!(woke < report.iterations);
    }

    #[test]
    fn deadlock_ends_the_iteration_quietly() {
        let mut engine = TestingEngine::new(Configuration::default()).unwrap();
        let report = engine.run(|rt| rt.wait_for_event()).unwrap();
        assert!(report.bugs.is_empty());
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn subtasks_complete_before_waiter_resumes() {
        let mut engine = TestingEngine::new(
            config().intra_actor_concurrency(true).iterations(Some(20)),
        )
        .unwrap();
        let report = engine
            .run(|rt| {
                let done = Arc::new(AtomicUsize::new(0));
                let mut subtasks = Vec::new();
                for _ in 0..2 {
                    let done = Arc::clone(&done);
                    let task = rt.spawn_task(move |rt| {
                        rt.schedule()?;
                        done.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })?;
                    subtasks.push(crate::actor::SubTask::Scheduled(task));
                }
                rt.wait_all(&subtasks)?;
                rt.assert(done.load(Ordering::SeqCst) == 2, "resumed early")
            })
            .unwrap();
        assert!(report.bugs.is_empty());
        assert_eq!(report.iterations, 20);
    }

    #[test]
    fn waiting_without_intra_actor_concurrency_is_fatal() {
        let mut engine = TestingEngine::new(Configuration::default()).unwrap();
        let err = engine
            .run(|rt| {
                let task = rt.spawn_task(|_| Ok(()))?;
                rt.wait_any(&[crate::actor::SubTask::Scheduled(task)])
            })
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Fatal(ScheduleError::IntraActorConcurrencyDisabled(_))
        ));
    }

    #[test]
    fn operation_bounding_runs_one_operation_at_a_time() {
        let mut engine = TestingEngine::new(
            config()
                .bound_operations(true)
                .operation_delay_bound(0)
                .iterations(Some(10)),
        )
        .unwrap();
        let report = engine
            .run(|rt| {
                rt.set_operation(1)?;
                rt.spawn_in_operation("Other", 2, |rt| {
                    rt.schedule()?;
                    rt.schedule()
                })?;
                rt.schedule()?;
                rt.schedule()
            })
            .unwrap();
        // without delays the root's operation keeps priority until it completes
        let steps: Vec<String> = report.last_trace.steps().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            steps,
            vec![
                "schedule Root(0)",
                "schedule Root(0)",
                "schedule Other(1)",
                "schedule Other(1)",
                "schedule Other(1)",
            ]
        );
    }

    #[test]
    fn visitor_sees_steps_after_the_safety_prefix() {
        let (recorder, accessor) = StepRecorder::new_with_accessor();
        let mut engine = TestingEngine::new(
            Configuration::default()
                .cache_program_state(true)
                .safety_prefix_bound(2),
        )
        .unwrap()
        .visitor(recorder);
        let report = engine.run(two_writers).unwrap();
        let visited = accessor();
        assert_eq!(visited.len() + 1, report.last_trace.len());
        assert_eq!(visited[0].0, 1);
        assert!(matches!(visited[0].1, ScheduleStep::SchedulingChoice { .. }));
    }

    #[test]
    fn interactive_replay_restarts_the_iteration() {
        let output = SharedBuffer::default();
        let strategy = InteractiveStrategy::with_io(
            Cursor::new(b"1\nreplay 1\n\n\n\n\n\n".to_vec()),
            output.clone(),
            false,
            0,
        );
        let mut engine =
            TestingEngine::with_strategy(config().iterations(None), Box::new(strategy));
        let report = engine.run(two_writers).unwrap();
        assert_eq!(report.iterations, 2);
        assert!(report.fully_explored);
    }

    #[test]
    fn random_engine_with_custom_strategy() {
        let mut engine = TestingEngine::with_strategy(
            config().iterations(Some(5)),
            Box::new(RandomStrategy::new(1, 0)),
        );
        let report = engine.run(two_writers).unwrap();
        assert_eq!(report.iterations, 5);
        assert!(!report.fully_explored);
        assert!(report.strategy.starts_with("Random"));
    }

    #[test]
    fn nothing_runs_after_stop() {
        let late = Arc::new(Mutex::new(Vec::new()));
        let mut engine = TestingEngine::new(Configuration::default()).unwrap();
        let report = {
            let late = Arc::clone(&late);
            engine
                .run(move |rt| {
                    assert_eq!(rt.stop(), Err(Canceled));
                    late.lock().push(rt.spawn("Late", |_| Ok(())).map(|_| ()));
                    late.lock().push(rt.assert(false, "logic ran after stop"));
                    late.lock().push(rt.schedule());
                    Ok(())
                })
                .unwrap()
        };
        assert_eq!(*late.lock(), vec![Err(Canceled), Err(Canceled), Err(Canceled)]);
        assert!(report.bugs.is_empty());
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn stopping_strands_the_other_actors() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut engine = TestingEngine::new(config().iterations(Some(5))).unwrap();
        let report = {
            let ran = Arc::clone(&ran);
            engine
                .run(move |rt| {
                    let ran = Arc::clone(&ran);
                    rt.spawn("Worker", move |_| {
                        ran.store(true, Ordering::SeqCst);
                        Ok(())
                    })?;
                    rt.stop()?;
                    rt.assert(false, "root kept going")
                })
                .unwrap()
        };
        assert!(!ran.load(Ordering::SeqCst));
        assert!(report.bugs.is_empty());
        assert_eq!(report.iterations, 5);
        assert!(report.last_trace.is_empty());
    }

    #[test]
    fn replay_reproduces_nondeterministic_choices() {
        let mut engine = TestingEngine::new(
            Configuration::default()
                .strategy(StrategyKind::Random)
                .iterations(Some(500))
                .seed(23),
        )
        .unwrap();
        let found = engine.run(coin_flips).unwrap();
        let bug = found.bugs[0].clone();
        assert!(bug.description.ends_with("hit the jackpot"));
        let steps = bug.trace.steps();
        assert!(steps.iter().any(|step| matches!(
            step,
            ScheduleStep::NondeterministicChoice { fairness_id: Some(_), .. }
        )));
        assert!(steps.iter().any(|step| matches!(
            step,
            ScheduleStep::NondeterministicChoice { integer_value: Some(4), .. }
        )));

        let mut replay = TestingEngine::replaying(Configuration::default(), bug.trace.clone());
        let replayed = replay.run(coin_flips).unwrap();
        assert_eq!(replayed.bugs.len(), 1);
        assert_eq!(replayed.bugs[0].description, bug.description);
        assert_eq!(replayed.bugs[0].trace, bug.trace);
    }

    #[test]
    fn dfs_enumerates_every_choice() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine =
            TestingEngine::new(config().strategy(StrategyKind::Dfs).iterations(None)).unwrap();
        let report = {
            let seen = Arc::clone(&seen);
            engine
                .run(move |rt| {
                    let flag = rt.random_bool()?;
                    let number = rt.random_int(3)?;
                    seen.lock().push((flag, number));
                    Ok(())
                })
                .unwrap()
        };
        assert!(report.fully_explored);
        assert_eq!(report.iterations, 6);
        assert_eq!(
            *seen.lock(),
            vec![
                (false, 0),
                (false, 1),
                (false, 2),
                (true, 0),
                (true, 1),
                (true, 2)
            ]
        );
        assert_eq!(report.last_trace.len(), 2);
    }

    #[test]
    fn choices_count_against_the_depth_bound() {
        let mut engine =
            TestingEngine::new(config().max_unfair_steps(5).iterations(Some(1))).unwrap();
        let report = engine
            .run(|rt| loop {
                rt.random_bool()?;
            })
            .unwrap();
        assert_eq!(report.depth_bound_hits, 1);
        assert_eq!(report.max_explored_steps, 5);
        assert!(report.bugs.is_empty());
    }

    #[test]
    fn combo_session_runs_its_iterations() {
        let kind = StrategyKind::Combo {
            prefix: Box::new(StrategyKind::Dfs),
            suffix: Box::new(StrategyKind::Random),
        };
        let mut engine = TestingEngine::new(
            config()
                .strategy(kind)
                .safety_prefix_bound(2)
                .iterations(Some(20)),
        )
        .unwrap();
        let report = engine.run(two_writers).unwrap();
        assert_eq!(report.iterations, 20);
        assert!(!report.fully_explored);
        assert!(report.strategy.starts_with("Combo["));
        assert_eq!(report.max_explored_steps, 6);
        assert_eq!(report.last_trace.len(), 6);
    }

    #[test]
    fn hybrid_session_exhausts_its_prefix() {
        let mut engine = TestingEngine::new(
            config()
                .strategy(StrategyKind::Hybrid)
                .safety_prefix_bound(2)
                .iterations(None),
        )
        .unwrap();
        let report = engine.run(two_writers).unwrap();
        assert!(report.fully_explored);
        assert!(report.iterations > 1);
        assert!(report.strategy.starts_with("Hybrid["));
        assert!(report.bugs.is_empty());
        assert_eq!(report.last_trace.len(), 6);
    }

    #[test]
    fn iterative_deepening_session_exhausts() {
        let mut engine = TestingEngine::new(
            config()
                .strategy(StrategyKind::IterativeDeepeningDfs)
                .iterations(None),
        )
        .unwrap();
        let report = engine.run(two_writers).unwrap();
        assert!(report.fully_explored);
        assert!(report.strategy.starts_with("IterativeDeepeningDFS["));
        assert!(report.bugs.is_empty());
        assert_eq!(report.max_explored_steps, 6);
        assert_eq!(report.last_trace.len(), 6);
    }
}
