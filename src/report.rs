use std::fmt::{Display, Formatter};
use std::io::Write;
use std::time::Duration;

use crate::trace::ScheduleTrace;

/// The data sent after each iteration.
pub struct IterationData {
    /// Zero-based index of the iteration.
    pub iteration: usize,
    /// Steps explored during the iteration.
    pub explored_steps: usize,
    /// Whether the iteration found a bug.
    pub bug_found: bool,
    /// Whether the iteration was cut short by the step bound.
    pub depth_bound_hit: bool,
    /// Time since the session started.
    pub duration: Duration,
    /// Whether this was the last iteration.
    pub done: bool,
}

/// A bug found during testing, with the schedule that exposed it.
#[derive(Clone, Debug, PartialEq)]
pub struct BugReport {
    pub iteration: usize,
    pub description: String,
    pub trace: ScheduleTrace,
}

impl Display for BugReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Bug in iteration {}: {}", self.iteration, self.description)?;
        write!(f, "{}", self.trace)
    }
}

/// The outcome of a testing session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestReport {
    /// Description of the strategy used.
    pub strategy: String,
    pub iterations: usize,
    pub max_explored_steps: usize,
    /// Iterations cut short by the step bound.
    pub depth_bound_hits: usize,
    pub bugs: Vec<BugReport>,
    /// Whether the strategy exhausted its search space.
    pub fully_explored: bool,
    /// The schedule of the final iteration, buggy or not.
    pub last_trace: ScheduleTrace,
}

/// A reporter for progress during testing.
pub trait Reporter {
    /// Report the end of an iteration.
    fn report_iteration(&mut self, data: IterationData);

    /// Report the bugs at the end of the session.
    fn report_bugs(&mut self, bugs: &[BugReport]);
}

pub struct WriteReporter<'a, W> {
    writer: &'a mut W,
}

impl<'a, W> WriteReporter<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W> Reporter for WriteReporter<'a, W>
where
    W: Write,
{
    fn report_iteration(&mut self, data: IterationData) {
        if data.done {
            let _ = writeln!(
                self.writer,
                "Done. iterations={}, steps={}, sec={}",
                data.iteration + 1,
                data.explored_steps,
                data.duration.as_secs(),
            );
        } else if data.bug_found || data.depth_bound_hit {
            let _ = writeln!(
                self.writer,
                "Iteration {}. steps={}, bug={}, depth_bound_hit={}",
                data.iteration, data.explored_steps, data.bug_found, data.depth_bound_hit
            );
        }
    }

    fn report_bugs(&mut self, bugs: &[BugReport]) {
        for bug in bugs {
            let _ = write!(self.writer, "{}", bug);
        }
    }
}
