use super::{describe_bound, StepCounter, Strategy};
use crate::actor::{schedulable, ActorInfo, TaskId};
use crate::error::ScheduleError;
use crate::operation::order_by_operation;
use std::io::{BufRead, BufReader, Write};

/// A console command, or an answer to the current prompt.
#[derive(Debug, Eq, PartialEq)]
enum Command<'a> {
    Replay(usize),
    Jump(usize),
    Reset,
    Answer(&'a str),
    Malformed(&'static str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let mut words = line.split_whitespace();
        let (command, argument) = (words.next(), words.next());
        let count = |argument: Option<&str>| match argument.map(str::parse::<i64>) {
            Some(Ok(n)) if n >= 0 => Ok(n as usize),
            Some(Ok(_)) => Err("Expected positive integer"),
            _ => Err("Wrong format"),
        };
        match command {
            Some("reset") => Command::Reset,
            Some("replay") => count(argument).map_or_else(Command::Malformed, Command::Replay),
            Some("jump") => count(argument).map_or_else(Command::Malformed, Command::Jump),
            _ => Command::Answer(line),
        }
    }
}

/// Lets a human pick every decision on a line-oriented console.
///
/// Answers are kept in an input cache with one entry per step, so an iteration restarted with
/// `replay <n>` reproduces the first `n` answers without asking again. `jump <n>` fills the cache
/// with defaults up to step `n`, and `reset` forgets every answer. A blank answer takes the
/// default: the first candidate, `false`, or `0`.
pub struct InteractiveStrategy {
    input: Box<dyn BufRead + Send>,
    output: Box<dyn Write + Send>,
    cache: Vec<String>,
    steps: StepCounter,
    bound_operations: bool,
    restart_requested: bool,
    finished: bool,
    closed: bool,
}

impl InteractiveStrategy {
    /// Prompts on stdout and reads answers from stdin.
    pub fn new(bound_operations: bool, depth_bound: usize) -> Self {
        Self::with_io(
            BufReader::new(std::io::stdin()),
            std::io::stdout(),
            bound_operations,
            depth_bound,
        )
    }

    pub fn with_io(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
        bound_operations: bool,
        depth_bound: usize,
    ) -> Self {
        InteractiveStrategy {
            input: Box::new(input),
            output: Box::new(output),
            cache: Vec::new(),
            steps: StepCounter::new(depth_bound),
            bound_operations,
            restart_requested: false,
            finished: false,
            closed: false,
        }
    }

    /// The answers given so far, one per step. Blank entries take the default.
    pub fn input_cache(&self) -> &[String] {
        &self.cache
    }

    fn say(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.output, ">> {}", line.as_ref());
    }

    fn read_line(&mut self) -> Option<String> {
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_owned()),
            Err(err) => {
                log::warn!("Unable to read console input. err={}", err);
                None
            }
        }
    }

    /// Ends the iteration so that the next one starts over at step zero.
    fn restart(&mut self) {
        self.restart_requested = true;
        self.steps.next_iteration();
    }

    /// Resolves the current step from the cache or the console. `None` ends the iteration.
    fn ask<T: Clone>(
        &mut self,
        header: &[String],
        question: &str,
        default: T,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Option<T> {
        let step = self.steps.explored();
        loop {
            if let Some(cached) = self.cache.get(step).cloned() {
                let answer = if cached.is_empty() {
                    Ok(default.clone())
                } else {
                    parse(&cached)
                };
                match answer {
                    Ok(value) => {
                        self.steps.advance();
                        return Some(value);
                    }
                    Err(_) => {
                        log::debug!("Discarding stale input. step={}, input={:?}", step, cached);
                        self.say(format!(
                            "Cached input '{}' no longer applies, please choose again ...",
                            cached
                        ));
                        self.cache.truncate(step);
                    }
                }
            }

            for line in header {
                self.say(line);
            }
            self.say(format!("{} [step '{}']", question, step + 1));
            let line = match self.read_line() {
                Some(line) => line,
                None => {
                    log::info!("Console input closed. Ending the session.");
                    self.closed = true;
                    return None;
                }
            };

            match Command::parse(&line) {
                Command::Reset => {
                    self.cache.clear();
                    self.restart();
                    return None;
                }
                Command::Replay(n) => {
                    self.cache.truncate(n);
                    self.restart();
                    return None;
                }
                Command::Jump(n) if n < step + 1 => {
                    self.say(format!(
                        "Expected integer greater than {}, please retry ...",
                        step
                    ));
                }
                Command::Jump(n) => {
                    if n > self.cache.len() {
                        self.cache.resize(n, String::new());
                    }
                }
                Command::Malformed(reason) => self.say(format!("{}, please retry ...", reason)),
                Command::Answer(answer) => {
                    let parsed = if answer.is_empty() {
                        Ok(default.clone())
                    } else {
                        parse(answer)
                    };
                    match parsed {
                        Ok(value) => {
                            self.cache.push(answer.to_owned());
                            self.steps.advance();
                            return Some(value);
                        }
                        Err(reason) => self.say(format!("{}, please retry ...", reason)),
                    }
                }
            }
        }
    }
}

impl Strategy for InteractiveStrategy {
    fn next_actor(
        &mut self,
        candidates: &[ActorInfo],
        current: TaskId,
    ) -> Result<Option<TaskId>, ScheduleError> {
        let enabled = if self.bound_operations {
            order_by_operation(candidates, current)
        } else {
            let mut enabled = schedulable(candidates);
            enabled.sort_by_key(|a| (a.actor.id, a.task));
            enabled
        };
        if enabled.is_empty() {
            self.say("No available actors to schedule ...");
            return Ok(None);
        }

        let mut header = vec!["Available actors to schedule ...".to_owned()];
        header.extend(
            enabled
                .iter()
                .enumerate()
                .map(|(i, a)| format!("[{}] '{}' (operation {})", i, a.actor, a.operation_id)),
        );
        let tasks: Vec<TaskId> = enabled.iter().map(|a| a.task).collect();
        let index = self.ask(&header, "Choose actor to schedule", 0, |answer| {
            match answer.parse::<i64>() {
                Ok(i) if i < 0 => Err("Expected positive integer".to_owned()),
                Ok(i) if (i as usize) < tasks.len() => Ok(i as usize),
                Ok(_) => Err("Unexpected id".to_owned()),
                Err(_) => Err("Wrong format".to_owned()),
            }
        });
        Ok(index.map(|i| tasks[i]))
    }

    fn next_boolean(&mut self, _max_value: u64) -> Result<Option<bool>, ScheduleError> {
        Ok(self.ask(&[], "Choose true or false", false, |answer| {
            answer.parse::<bool>().map_err(|_| "Wrong format".to_owned())
        }))
    }

    fn next_integer(&mut self, max_value: u64) -> Result<Option<u64>, ScheduleError> {
        let question = format!("Choose an integer below {}", max_value.max(1));
        Ok(self.ask(&[], &question, 0, |answer| match answer.parse::<u64>() {
            Ok(i) if max_value == 0 || i < max_value => Ok(i),
            Ok(i) => Err(format!("{} is >= {}", i, max_value)),
            Err(_) => Err("Wrong format".to_owned()),
        }))
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

    /// Finished unless the iteration that just ended asked for a restart.
    fn has_finished(&self) -> bool {
        self.closed || self.finished
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn configure_next_iteration(&mut self) {
        self.finished = !self.restart_requested;
        self.restart_requested = false;
        self.steps.next_iteration();
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.restart_requested = false;
        self.finished = false;
        self.closed = false;
        self.steps.reset();
    }

    fn description(&self) -> String {
        format!(
            "Interactive[bound_operations={}, {}]",
            self.bound_operations,
            describe_bound(self.steps.bound())
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{candidates, SharedBuffer};
    use std::io::Cursor;

    fn console(input: &str) -> (InteractiveStrategy, SharedBuffer) {
        let output = SharedBuffer::default();
        let strategy = InteractiveStrategy::with_io(
            Cursor::new(input.to_owned().into_bytes()),
            output.clone(),
            false,
            0,
        );
        (strategy, output)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("reset"), Command::Reset);
        assert_eq!(Command::parse("replay 3"), Command::Replay(3));
        assert_eq!(Command::parse("jump 0"), Command::Jump(0));
        assert_eq!(Command::parse("jump -1"), Command::Malformed("Expected positive integer"));
        assert_eq!(Command::parse("replay"), Command::Malformed("Wrong format"));
        assert_eq!(Command::parse("2"), Command::Answer("2"));
        assert_eq!(Command::parse(""), Command::Answer(""));
    }

    #[test]
    fn selects_by_index_with_blank_default() {
        let actors = candidates(&[0, 0, 0]);
        let (mut strategy, output) = console("2\n\ntrue\n7\n");
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[2].task)));
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[0].task)));
        assert_eq!(strategy.next_boolean(2), Ok(Some(true)));
        assert_eq!(strategy.next_integer(10), Ok(Some(7)));
        assert_eq!(strategy.explored_steps(), 4);
        assert_eq!(strategy.input_cache(), &["2", "", "true", "7"]);
        assert!(output.contents().contains(">> [1] 'Actor(1)' (operation 0)"));
        assert!(output.contents().contains(">> Choose actor to schedule [step '2']"));
    }

    #[test]
    fn malformed_input_reprompts_without_advancing() {
        let actors = candidates(&[0, 0]);
        let (mut strategy, output) = console("x\n-1\n5\n1\n");
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[1].task)));
        assert_eq!(strategy.explored_steps(), 1);
        let text = output.contents();
        assert!(text.contains("Wrong format, please retry"));
        assert!(text.contains("Expected positive integer, please retry"));
        assert!(text.contains("Unexpected id, please retry"));
        assert_eq!(text.matches("[step '1']").count(), 4);
    }

    #[test]
    fn replay_reuses_cached_answers_without_prompting() {
        let actors = candidates(&[0, 0]);
        let (mut strategy, output) = console("1\n0\nreplay 2\n");
        strategy.next_actor(&actors, actors[0].task).unwrap();
        strategy.next_actor(&actors, actors[0].task).unwrap();
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(None));
        strategy.configure_next_iteration();
        assert!(!strategy.has_finished());

        let prompts = output.contents().matches("Choose actor").count();
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[1].task)));
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[0].task)));
        assert_eq!(output.contents().matches("Choose actor").count(), prompts);
    }

    #[test]
    fn jump_then_reset_clears_everything() {
        let actors = candidates(&[0, 0]);
        let (mut strategy, output) = console("jump 5\nreset\n");
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[0].task)));
        assert_eq!(strategy.input_cache().len(), 5);
        for _ in 1..5 {
            assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[0].task)));
        }
        assert_eq!(output.contents().matches("Choose actor").count(), 1);
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(None));
        assert!(strategy.input_cache().is_empty());
        assert_eq!(strategy.explored_steps(), 0);
        strategy.configure_next_iteration();
        assert!(!strategy.has_finished());
    }

    #[test]
    fn finishes_after_an_iteration_without_restart() {
        let actors = candidates(&[0, 0]);
        let (mut strategy, _) = console("1
");
        strategy.next_actor(&actors, actors[0].task).unwrap();
        strategy.configure_next_iteration();
        assert!(strategy.has_finished());
    }

    #[test]
    fn stale_cached_answer_is_discarded() {
        let actors = candidates(&[0, 0, 0]);
        let (mut strategy, output) = console("2\nreplay 1\n1\n");
        strategy.next_actor(&actors, actors[0].task).unwrap();
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(None));
        strategy.configure_next_iteration();
        // only two candidates this time, so the cached "2" is out of range
        let fewer = candidates(&[0, 0]);
        assert_eq!(strategy.next_actor(&fewer, fewer[0].task), Ok(Some(fewer[1].task)));
        assert!(output.contents().contains("Cached input '2' no longer applies"));
        assert_eq!(strategy.input_cache(), &["1"]);
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let actors = candidates(&[0]);
        let (mut strategy, _) = console("");
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(None));
        assert!(strategy.has_finished());
    }

    #[test]
    fn operation_bounding_orders_by_operation() {
        let actors = candidates(&[2, 1, 2]);
        let output = SharedBuffer::default();
        let mut strategy = InteractiveStrategy::with_io(
            Cursor::new(b"1\n".to_vec()),
            output.clone(),
            true,
            0,
        );
        // ordered by operation [1, 0, 2], rotated to start at the current actor 0: [0, 2, 1]
        assert_eq!(strategy.next_actor(&actors, actors[0].task), Ok(Some(actors[2].task)));
        assert!(output.contents().contains("[2] 'Actor(1)' (operation 1)"));
    }
}
