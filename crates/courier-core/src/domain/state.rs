//! Worker state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker state.
///
/// State transitions:
/// - Running -> Draining -> Stopped (shutdown requested while a job is in flight)
/// - Running -> Stopped (shutdown while idle)
/// - Running/Draining -> Failed (queue unavailable beyond the storage retry bound)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Dequeuing and dispatching jobs.
    Running,

    /// Shutdown requested; finishing the in-flight job, no new dequeues.
    Draining,

    /// Loop exited cleanly.
    Stopped,

    /// Loop exited because its queue stayed unavailable.
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
            WorkerState::Failed => "failed",
        };
        f.write_str(s)
    }
}
