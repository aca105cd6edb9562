//! Container lifecycle states and the transition table.
//!
//! Every container is in exactly one state at a time. All mutations go through
//! the container's single transition function, which consults
//! [`ContainerState::can_transition_to`]; anything outside the table is a
//! warn-logged no-op.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a listener container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    /// Constructed but never started.
    Created,
    /// Start in progress: resolving the queue, acquiring executors.
    Starting,
    /// Poller active, workers dispatching.
    Running,
    /// Stop in progress: poller signalled, executors draining.
    Stopping,
    /// Cleanly stopped; may be started again.
    Stopped,
    /// Startup or runtime failure; may be started again.
    Failed,
}

impl ContainerState {
    /// Whether the transition `self -> to` is allowed.
    ///
    /// Failed is reachable from every non-terminal state; Created, Stopped and
    /// Failed may all be (re)started.
    pub fn can_transition_to(self, to: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, to),
            (Created, Starting)
                | (Created, Failed)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                | (Stopped, Starting)
                | (Stopped, Failed)
                | (Failed, Starting)
                | (Failed, Stopping)
                | (Failed, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
