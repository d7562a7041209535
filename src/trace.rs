//! Private module for selective re-export.

use crate::actor::{ActorId, ActorRef};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One realized decision.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ScheduleStep {
    /// The actor that was handed control.
    SchedulingChoice {
        #[serde(rename = "actorType")]
        actor_type: String,
        #[serde(rename = "actorId")]
        actor_id: ActorId,
    },
    /// A boolean or integer value returned to the program.
    NondeterministicChoice {
        #[serde(rename = "booleanValue", default, skip_serializing_if = "Option::is_none")]
        boolean_value: Option<bool>,
        #[serde(rename = "integerValue", default, skip_serializing_if = "Option::is_none")]
        integer_value: Option<u64>,
        #[serde(rename = "fairnessId", default, skip_serializing_if = "Option::is_none")]
        fairness_id: Option<String>,
    },
}

impl ScheduleStep {
    /// Whether this step selected `actor`.
    pub fn is_choice_of(&self, actor: &ActorRef) -> bool {
        match self {
            ScheduleStep::SchedulingChoice {
                actor_type,
                actor_id,
            } => *actor_type == actor.type_name && *actor_id == actor.id,
            _ => false,
        }
    }
}

impl Display for ScheduleStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleStep::SchedulingChoice {
                actor_type,
                actor_id,
            } => write!(f, "schedule {}({})", actor_type, actor_id),
            ScheduleStep::NondeterministicChoice {
                boolean_value: Some(b),
                fairness_id,
                ..
            } => match fairness_id {
                Some(id) => write!(f, "choose {} [{}]", b, id),
                None => write!(f, "choose {}", b),
            },
            ScheduleStep::NondeterministicChoice {
                integer_value: Some(i),
                ..
            } => write!(f, "choose {}", i),
            ScheduleStep::NondeterministicChoice { .. } => write!(f, "choose ?"),
        }
    }
}

/// The ordered, append-only log of decisions made during one iteration. Produced by every run and
/// consumed by [`ReplayStrategy`](crate::ReplayStrategy).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    /// Whether the strategy that produced the trace was fair. Replay inherits this so it applies
    /// the same step bound.
    #[serde(default)]
    pub fair: bool,
    steps: Vec<ScheduleStep>,
}

impl ScheduleTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<ScheduleStep>, fair: bool) -> Self {
        ScheduleTrace { fair, steps }
    }

    pub fn add_scheduling_choice(&mut self, actor: &ActorRef) {
        self.steps.push(ScheduleStep::SchedulingChoice {
            actor_type: actor.type_name.clone(),
            actor_id: actor.id,
        });
    }

    pub fn add_boolean_choice(&mut self, value: bool, fairness_id: Option<&str>) {
        self.steps.push(ScheduleStep::NondeterministicChoice {
            boolean_value: Some(value),
            integer_value: None,
            fairness_id: fairness_id.map(str::to_owned),
        });
    }

    pub fn add_integer_choice(&mut self, value: u64) {
        self.steps.push(ScheduleStep::NondeterministicChoice {
            boolean_value: None,
            integer_value: Some(value),
            fairness_id: None,
        });
    }

    /// The most recently recorded step.
    pub fn last(&self) -> Option<&ScheduleStep> {
        self.steps.last()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    /// Writes the trace as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        log::debug!("Saved trace. path={}, steps={}", path.as_ref().display(), self.len());
        Ok(())
    }

    /// Reads a trace written by [`ScheduleTrace::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let trace: ScheduleTrace = serde_json::from_reader(reader)?;
        log::debug!("Loaded trace. path={}, steps={}", path.as_ref().display(), trace.len());
        Ok(trace)
    }
}

impl Display for ScheduleTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Trace[{}]:", self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>4}: {}", i, step)?;
        }
        Ok(())
    }
}
