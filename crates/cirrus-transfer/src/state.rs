//! Transfer states and their legal transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a transfer.
///
/// ```text
///            start             complete
/// Pending ──────────► InProgress ─────────► Complete
///    │                 │  ▲    │
///    │           pause │  │    │ non-transient error
///    │                 ▼  │    └──────────► Failed
///    └──── pause ───► Paused
///                       resume
///
/// Pending | InProgress | Paused ──cancel──► Canceled
/// Pending | InProgress | Paused ──remove──► Deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Enqueued, not yet started.
    Pending,
    /// Chunks are being transferred.
    InProgress,
    /// Stopped without failing; can be resumed.
    Paused,
    /// Every chunk finished.
    Complete,
    /// A non-retriable error ended the transfer.
    Failed,
    /// Cancelled by the caller.
    Canceled,
    /// Removed by the caller.
    Deleted,
}

impl TransferState {
    /// Returns true for states with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Canceled | Self::Deleted
        )
    }

    /// Returns true if the transfer may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use TransferState::{Canceled, Complete, Deleted, Failed, InProgress, Paused, Pending};

        match (self, next) {
            (Pending | Paused, InProgress)
            | (Pending | InProgress, Paused)
            | (InProgress, Complete | Failed) => true,
            (Pending | InProgress | Paused, Canceled | Deleted) => true,
            _ => false,
        }
    }

    /// Moves from `self` to `next`, or explains why that is illegal.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Paused => "Paused",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An illegal state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transfer transition from {from} to {to}")]
pub struct TransitionError {
    /// State before the attempted change.
    pub from: TransferState,
    /// Requested state.
    pub to: TransferState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransferState::*;

    const ALL: [TransferState; 7] = [
        Pending, InProgress, Paused, Complete, Failed, Canceled, Deleted,
    ];

    #[test]
    fn test_happy_path() {
        let state = Pending.transition(InProgress).unwrap();
        assert_eq!(state.transition(Complete).unwrap(), Complete);
    }

    #[test]
    fn test_complete_cannot_restart() {
        let err = Complete.transition(InProgress).unwrap_err();
        assert_eq!(err.from, Complete);
        assert_eq!(err.to, InProgress);
        assert_eq!(
            err.to_string(),
            "illegal transfer transition from Complete to In Progress"
        );
    }

    #[test]
    fn test_pause_and_resume() {
        let paused = InProgress.transition(Paused).unwrap();
        assert_eq!(paused.transition(InProgress).unwrap(), InProgress);
    }

    #[test]
    fn test_cancel_from_every_live_state() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Canceled), !state.is_terminal());
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_failed_only_from_in_progress() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Failed), from == InProgress);
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
