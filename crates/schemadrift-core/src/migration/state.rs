//! Execution state machine.

use serde::{Deserialize, Serialize};

/// Phase of a single `execute` call.
///
/// ```text
/// Idle -> Validating -> [BackingUp ->] Applying -> Completed | Failed
///                    \-> Completed (nothing to do or dry run)
///                    \-> Rejected
/// BackingUp -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Not started.
    Idle,
    /// Re-running the preview and checking gates.
    Validating,
    /// Copying the collection.
    BackingUp,
    /// Transforming documents batch by batch.
    Applying,
    /// Finished; may still carry per-document failures or a cancellation.
    Completed,
    /// A gate refused the migration; nothing was written.
    Rejected,
    /// Stopped by a store failure.
    Failed,
}

impl ExecutionState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, BackingUp)
                | (Validating, Applying)
                | (Validating, Completed)
                | (Validating, Rejected)
                | (BackingUp, Applying)
                | (BackingUp, Failed)
                | (Applying, Completed)
                | (Applying, Failed)
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Rejected | ExecutionState::Failed
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Idle => write!(f, "idle"),
            ExecutionState::Validating => write!(f, "validating"),
            ExecutionState::BackingUp => write!(f, "backing_up"),
            ExecutionState::Applying => write!(f, "applying"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Rejected => write!(f, "rejected"),
            ExecutionState::Failed => write!(f, "failed"),
        }
    }
}
