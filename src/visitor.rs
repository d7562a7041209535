use crate::trace::ScheduleStep;
use parking_lot::Mutex;
use std::sync::Arc;

/// A visitor applied to recorded [`ScheduleStep`]s once the safety prefix has been explored, when
/// [`Configuration::cache_program_state`](crate::Configuration::cache_program_state) is enabled.
/// It is the hook for capturing abstract program state for liveness and cycle analysis.
///
/// Visitors run on the actor thread that made the decision, while the scheduler is locked, so they
/// must not call back into the [`Runtime`](crate::Runtime).
///
/// Implementations include [`StepRecorder`] and `impl `[`Fn`]`(usize, &ScheduleStep)`.
///
/// # Example
///
/// ```
/// # use turnstile::*;
/// let engine = TestingEngine::new(Configuration::default().cache_program_state(true))
///     .unwrap()
///     .visitor(|index: usize, step: &ScheduleStep| println!("{}: {}", index, step));
/// ```
pub trait StepVisitor {
    /// The method to apply to every step. `index` is the step's position in the trace.
    fn visit(&self, index: usize, step: &ScheduleStep);
}
impl<F> StepVisitor for F
where
    F: Fn(usize, &ScheduleStep),
{
    fn visit(&self, index: usize, step: &ScheduleStep) {
        self(index, step)
    }
}

/// A [`StepVisitor`] that records the visited steps of every iteration.
///
/// # Example
///
/// ```
/// # use turnstile::*;
/// let (recorder, accessor) = StepRecorder::new_with_accessor();
/// let mut engine = TestingEngine::new(Configuration::default().cache_program_state(true))
///     .unwrap()
///     .visitor(recorder);
/// engine.run(|rt| rt.schedule()).unwrap();
/// assert!(!accessor().is_empty());
/// ```
pub struct StepRecorder(Arc<Mutex<Vec<(usize, ScheduleStep)>>>);
impl StepVisitor for StepRecorder {
    fn visit(&self, index: usize, step: &ScheduleStep) {
        self.0.lock().push((index, step.clone()))
    }
}
impl StepRecorder {
    /// Instantiates a ([`StepRecorder`], accessor) pair.
    pub fn new_with_accessor() -> (Self, impl Fn() -> Vec<(usize, ScheduleStep)>) {
        let recorder = Self(Arc::new(Mutex::new(Vec::new())));
        let accessor = {
            let r = Arc::clone(&recorder.0);
            move || r.lock().clone()
        };
        (recorder, accessor)
    }
}
