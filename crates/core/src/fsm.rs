//! Explicit state machines for runs, steps, and queue jobs.
//!
//! Status values map to SMALLINT lookup tables in the database; the
//! discriminant of each variant matches the 1-based seed order of the
//! corresponding `*_statuses` table. Each enum carries its own transition
//! table, and the persistence layer only applies a transition when the
//! stored status equals the expected predecessor, so a rejected edge here
//! is also a rejected compare-and-swap there.

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Human-readable name (for logs and error messages).
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant), )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Lifecycle of a workflow run.
    RunStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
        Cancelled = 5,
    }
}

impl RunStatus {
    /// Valid target statuses reachable from `self`.
    ///
    /// `Failed -> Running` exists only for operator-triggered manual retry.
    /// `Completed` and `Cancelled` are terminal.
    pub fn valid_transitions(self) -> &'static [RunStatus] {
        match self {
            RunStatus::Pending => &[RunStatus::Running, RunStatus::Cancelled],
            RunStatus::Running => &[
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ],
            RunStatus::Failed => &[RunStatus::Running],
            RunStatus::Completed | RunStatus::Cancelled => &[],
        }
    }

    /// Whether no further transitions are possible (Failed is terminal for
    /// the engine itself; only manual retry leaves it).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Statuses that count against the one-active-run-per-contact invariant.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: RunStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, producing the domain error for invalid edges.
    pub fn validate_transition(self, to: RunStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                entity: "run",
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Step status
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Lifecycle of a single step within a run.
    StepStatus {
        Pending = 1,
        Scheduled = 2,
        Executing = 3,
        Succeeded = 4,
        Failed = 5,
    }
}

impl StepStatus {
    /// Valid target statuses reachable from `self`.
    ///
    /// `Executing -> Scheduled` is the retry path (attempt failed, budget
    /// left). `Failed -> Scheduled` exists only for manual retry.
    pub fn valid_transitions(self) -> &'static [StepStatus] {
        match self {
            StepStatus::Pending => &[StepStatus::Scheduled],
            StepStatus::Scheduled => &[StepStatus::Executing],
            StepStatus::Executing => &[
                StepStatus::Succeeded,
                StepStatus::Failed,
                StepStatus::Scheduled,
            ],
            StepStatus::Failed => &[StepStatus::Scheduled],
            StepStatus::Succeeded => &[],
        }
    }

    /// Whether the step has reached a terminal outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: StepStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, producing the domain error for invalid edges.
    pub fn validate_transition(self, to: StepStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                entity: "step",
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Queue job state
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Lifecycle of a durable queue job.
    QueueJobState {
        Waiting = 1,
        Delayed = 2,
        Active = 3,
        Completed = 4,
        Failed = 5,
    }
}

impl QueueJobState {
    /// Valid target states reachable from `self`.
    ///
    /// `Active -> Waiting` is lease expiry (worker crashed without ack);
    /// `Active -> Delayed` is a backoff re-enqueue.
    pub fn valid_transitions(self) -> &'static [QueueJobState] {
        match self {
            QueueJobState::Waiting | QueueJobState::Delayed => &[QueueJobState::Active],
            QueueJobState::Active => &[
                QueueJobState::Completed,
                QueueJobState::Failed,
                QueueJobState::Waiting,
                QueueJobState::Delayed,
            ],
            QueueJobState::Completed | QueueJobState::Failed => &[],
        }
    }

    /// Whether the job will never be delivered again.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueJobState::Completed | QueueJobState::Failed)
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: QueueJobState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Run transitions ------------------------------------------------------

    #[test]
    fn run_happy_path() {
        assert!(RunStatus::Pending.can_transition(RunStatus::Running));
        assert!(RunStatus::Running.can_transition(RunStatus::Completed));
    }

    #[test]
    fn run_failure_and_manual_retry() {
        assert!(RunStatus::Running.can_transition(RunStatus::Failed));
        assert!(RunStatus::Failed.can_transition(RunStatus::Running));
    }

    #[test]
    fn run_terminal_states_have_no_exits() {
        assert!(RunStatus::Completed.valid_transitions().is_empty());
        assert!(RunStatus::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn run_cannot_skip_to_completed() {
        let err = RunStatus::Pending
            .validate_transition(RunStatus::Completed)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition { entity: "run", .. }
        ));
    }

    #[test]
    fn run_active_covers_exactly_pending_and_running() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(
                status.is_active(),
                matches!(status, RunStatus::Pending | RunStatus::Running)
            );
        }
    }

    // -- Step transitions -----------------------------------------------------

    #[test]
    fn step_happy_path() {
        assert!(StepStatus::Pending.can_transition(StepStatus::Scheduled));
        assert!(StepStatus::Scheduled.can_transition(StepStatus::Executing));
        assert!(StepStatus::Executing.can_transition(StepStatus::Succeeded));
    }

    #[test]
    fn step_retry_path_goes_back_to_scheduled() {
        assert!(StepStatus::Executing.can_transition(StepStatus::Scheduled));
        assert!(StepStatus::Failed.can_transition(StepStatus::Scheduled));
    }

    #[test]
    fn step_cannot_execute_from_pending() {
        // A job only exists once the step is Scheduled; claiming must not
        // bypass that.
        assert!(!StepStatus::Pending.can_transition(StepStatus::Executing));
    }

    #[test]
    fn succeeded_is_terminal() {
        assert!(StepStatus::Succeeded.valid_transitions().is_empty());
    }

    // -- Queue job transitions ------------------------------------------------

    #[test]
    fn job_claim_and_ack() {
        assert!(QueueJobState::Waiting.can_transition(QueueJobState::Active));
        assert!(QueueJobState::Delayed.can_transition(QueueJobState::Active));
        assert!(QueueJobState::Active.can_transition(QueueJobState::Completed));
    }

    #[test]
    fn job_lease_expiry_returns_to_waiting() {
        assert!(QueueJobState::Active.can_transition(QueueJobState::Waiting));
    }

    #[test]
    fn job_terminal_states() {
        assert!(QueueJobState::Completed.is_terminal());
        assert!(QueueJobState::Failed.is_terminal());
        assert!(!QueueJobState::Active.is_terminal());
    }

    // -- ID mapping -----------------------------------------------------------

    #[test]
    fn status_ids_round_trip() {
        for id in 1..=5 {
            assert_eq!(RunStatus::from_id(id).unwrap().id(), id);
            assert_eq!(StepStatus::from_id(id).unwrap().id(), id);
            assert_eq!(QueueJobState::from_id(id).unwrap().id(), id);
        }
        assert!(RunStatus::from_id(99).is_none());
    }
}
