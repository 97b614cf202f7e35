use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::QueryError;

/// Lifecycle state of a server-side operation.
///
/// An operation starts in `Initialized`, is queued as `Pending`, executes as
/// `Running` and ends in exactly one terminal state. Only the transitions
/// listed in `validate_transition` are legal; everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    Initialized,
    Pending,
    Running,
    Finished,
    Canceled,
    TimedOut,
    Closed,
    Error,
    Unknown,
}

impl OperationState {
    /// Terminal states never execute again; only a close transition remains.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished
                | Self::Canceled
                | Self::TimedOut
                | Self::Closed
                | Self::Error
                | Self::Unknown
        )
    }

    /// Validates a requested transition against the fixed adjacency table.
    ///
    /// On rejection the caller must leave the operation unchanged.
    pub fn validate_transition(self, target: Self) -> Result<(), QueryError> {
        let allowed = match self {
            Self::Initialized => matches!(
                target,
                Self::Pending
                    | Self::Running
                    | Self::Canceled
                    | Self::TimedOut
                    | Self::Closed
                    | Self::Error
            ),
            Self::Pending => matches!(
                target,
                Self::Running | Self::Canceled | Self::TimedOut | Self::Closed | Self::Error
            ),
            Self::Running => matches!(
                target,
                Self::Finished | Self::Canceled | Self::TimedOut | Self::Error | Self::Closed
            ),
            Self::Finished | Self::Canceled | Self::TimedOut | Self::Error | Self::Unknown => {
                matches!(target, Self::Closed)
            }
            Self::Closed => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(QueryError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "INITIALIZED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Canceled => "CANCELED",
            Self::TimedOut => "TIMEDOUT",
            Self::Closed => "CLOSED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationState::*;

    const ALL: [OperationState; 9] = [
        Initialized,
        Pending,
        Running,
        Finished,
        Canceled,
        TimedOut,
        Closed,
        Error,
        Unknown,
    ];

    fn allowed(from: OperationState) -> Vec<OperationState> {
        ALL.iter()
            .copied()
            .filter(|target| from.validate_transition(*target).is_ok())
            .collect()
    }

    #[test]
    fn test_initialized_transitions() {
        assert_eq!(
            allowed(Initialized),
            vec![Pending, Running, Canceled, TimedOut, Closed, Error]
        );
    }

    #[test]
    fn test_pending_transitions() {
        assert_eq!(
            allowed(Pending),
            vec![Running, Canceled, TimedOut, Closed, Error]
        );
    }

    #[test]
    fn test_running_transitions() {
        assert_eq!(
            allowed(Running),
            vec![Finished, Canceled, TimedOut, Closed, Error]
        );
    }

    #[test]
    fn test_terminal_states_only_close() {
        for from in [Finished, Canceled, TimedOut, Error, Unknown] {
            assert_eq!(allowed(from), vec![Closed], "from {from}");
        }
    }

    #[test]
    fn test_closed_is_final() {
        assert!(allowed(Closed).is_empty());
    }

    #[test]
    fn test_invalid_transition_error_names_both_states() {
        let err = Finished.validate_transition(Running).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidTransition {
                from: Finished,
                to: Running
            }
        ));
    }

    #[test]
    fn test_is_terminal() {
        for state in [Finished, Canceled, TimedOut, Closed, Error, Unknown] {
            assert!(state.is_terminal());
        }
        for state in [Initialized, Pending, Running] {
            assert!(!state.is_terminal());
        }
    }
}
