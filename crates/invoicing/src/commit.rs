//! State machine of a single document commit attempt.
//!
//! ```text
//! Validating ──► Reserving ──► Committed
//!     │              │
//!     ▼              ▼
//!  Rejected      RolledBack
//! ```
//!
//! `Rejected` means the request never touched the store; `RolledBack` means a
//! reservation failed and the surrounding transaction was discarded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Validating,
    Reserving,
    Committed,
    Rejected,
    RolledBack,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Validating => "validating",
            CommitState::Reserving => "reserving",
            CommitState::Committed => "committed",
            CommitState::Rejected => "rejected",
            CommitState::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommitState::Committed | CommitState::Rejected | CommitState::RolledBack
        )
    }

    pub fn can_transition_to(&self, next: CommitState) -> bool {
        matches!(
            (self, next),
            (CommitState::Validating, CommitState::Reserving)
                | (CommitState::Validating, CommitState::Rejected)
                | (CommitState::Reserving, CommitState::Committed)
                | (CommitState::Reserving, CommitState::RolledBack)
        )
    }
}

impl core::fmt::Display for CommitState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state of one commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAttempt {
    state: CommitState,
}

impl CommitAttempt {
    pub fn start() -> Self {
        Self {
            state: CommitState::Validating,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Illegal transitions leave the attempt unchanged and return `None`.
    pub fn advance(&mut self, next: CommitState) -> Option<CommitState> {
        if !self.state.can_transition_to(next) {
            return None;
        }
        let previous = self.state;
        self.state = next;
        Some(previous)
    }
}

impl Default for CommitAttempt {
    fn default() -> Self {
        Self::start()
    }
}
