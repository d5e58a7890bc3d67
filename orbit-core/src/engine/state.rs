//! Engine lifecycle state machine
//! STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Stopped => "STOPPED",
            EngineState::Starting => "STARTING",
            EngineState::Running => "RUNNING",
            EngineState::Stopping => "STOPPING",
        };
        f.write_str(s)
    }
}

/// Guards the engine lifecycle
#[derive(Debug, Default)]
pub struct StateMachine {
    state: EngineState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn can_transition(&self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self.state, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn transition(&mut self, to: EngineState) -> Result<()> {
        if !self.can_transition(to) {
            return Err(Error::InvalidState(format!("{} -> {}", self.state, to)));
        }
        debug!("Engine state: {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}
