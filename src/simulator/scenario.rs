// ABOUTME: Scenario modes for the provider simulator and the timeline each one follows
// ABOUTME: A job's state is a pure function of its mode and elapsed time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 1x1 transparent PNG returned wherever a real image would be.
pub const PLACEHOLDER_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub const SIMULATED_WORKFLOW_ERROR: &str = "Simulated ComfyUI error";
pub const SIMULATED_HANDLER_ERROR: &str =
    "400 Client Error: Bad Request for url: http://localhost:8188/prompt";

const SLOW_FACTOR: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Normal,
    Slow,
    Error,
    HandlerError,
    QueueStuck,
    Timeout,
}

impl SimulationMode {
    pub const ALL: [SimulationMode; 6] = [
        SimulationMode::Normal,
        SimulationMode::Slow,
        SimulationMode::Error,
        SimulationMode::HandlerError,
        SimulationMode::QueueStuck,
        SimulationMode::Timeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SimulationMode::Normal => "normal",
            SimulationMode::Slow => "slow",
            SimulationMode::Error => "error",
            SimulationMode::HandlerError => "handler_error",
            SimulationMode::QueueStuck => "queue_stuck",
            SimulationMode::Timeout => "timeout",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SimulationMode::Normal => "Queued, then generated, then completed",
            SimulationMode::Slow => "Like normal but three times slower",
            SimulationMode::Error => "Fails with a workflow error after leaving the queue",
            SimulationMode::HandlerError => "Handler fails immediately",
            SimulationMode::QueueStuck => "Job stays in the queue forever",
            SimulationMode::Timeout => "Job starts running and never finishes",
        }
    }

    /// Where a job submitted under this mode stands after `elapsed`.
    pub fn state_at(self, elapsed: Duration, timing: &Timing) -> SimState {
        let (queue, generation) = match self {
            SimulationMode::Slow => (
                timing.queue_delay * SLOW_FACTOR,
                timing.generation_time * SLOW_FACTOR,
            ),
            _ => (timing.queue_delay, timing.generation_time),
        };

        match self {
            SimulationMode::HandlerError => SimState::Failed(SIMULATED_HANDLER_ERROR.to_string()),
            SimulationMode::QueueStuck => SimState::Queued,
            _ if elapsed < queue => SimState::Queued,
            SimulationMode::Error => SimState::Failed(SIMULATED_WORKFLOW_ERROR.to_string()),
            SimulationMode::Timeout => SimState::Running,
            SimulationMode::Normal | SimulationMode::Slow => {
                if elapsed < queue + generation {
                    SimState::Running
                } else {
                    SimState::Completed
                }
            }
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SimulationMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| format!("unknown simulation mode '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub queue_delay: Duration,
    pub generation_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimState {
    Queued,
    Running,
    Completed,
    Failed(String),
}
