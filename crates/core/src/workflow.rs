//! Static workflow registry: keys, step definitions, and retry policies.
//!
//! The registry is a compile-time table. There is no dynamic registration:
//! the CRM ships a closed set of outreach workflows, and a key that does
//! not parse into [`WorkflowKey`] can never reach the engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// WorkflowKey
// ---------------------------------------------------------------------------

/// The closed set of workflow kinds a contact can be enrolled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKey {
    /// Send a single outreach video immediately.
    #[serde(rename = "SEND_VIDEO")]
    SendVideo,
    /// Greeting message plus video, scheduled for the contact's birthday.
    #[serde(rename = "BIRTHDAY_VIDEO")]
    BirthdayVideo,
    /// Five-day drip sequence: one video per day.
    #[serde(rename = "FIVE_DAYS_OF_JOY")]
    FiveDaysOfJoy,
    /// Operator-recorded video, sent as-is.
    #[serde(rename = "MANUAL_VIDEO")]
    ManualVideo,
}

impl WorkflowKey {
    /// All known keys, in registry order.
    pub const ALL: [WorkflowKey; 4] = [
        WorkflowKey::SendVideo,
        WorkflowKey::BirthdayVideo,
        WorkflowKey::FiveDaysOfJoy,
        WorkflowKey::ManualVideo,
    ];

    /// The canonical wire/database representation of the key.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKey::SendVideo => "SEND_VIDEO",
            WorkflowKey::BirthdayVideo => "BIRTHDAY_VIDEO",
            WorkflowKey::FiveDaysOfJoy => "FIVE_DAYS_OF_JOY",
            WorkflowKey::ManualVideo => "MANUAL_VIDEO",
        }
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CoreError::UnknownWorkflowKey(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// What a step does when its job comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Send a plain text message to the contact.
    #[serde(rename = "SEND_MESSAGE")]
    SendMessage,
    /// Send a media (video) message to the contact.
    #[serde(rename = "SEND_MEDIA")]
    SendMedia,
    /// No-op delay marker; succeeds without touching the gateway.
    #[serde(rename = "WAIT")]
    Wait,
}

impl ActionKind {
    /// The canonical wire/database representation of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::SendMessage => "SEND_MESSAGE",
            ActionKind::SendMedia => "SEND_MEDIA",
            ActionKind::Wait => "WAIT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEND_MESSAGE" => Ok(ActionKind::SendMessage),
            "SEND_MEDIA" => Ok(ActionKind::SendMedia),
            "WAIT" => Ok(ActionKind::Wait),
            other => Err(CoreError::Validation(format!(
                "Unknown action kind: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Base delay for the exponential backoff schedule.
const BACKOFF_BASE: Duration = Duration::from_secs(60);

/// Upper bound for a single backoff delay.
const BACKOFF_CAP: Duration = Duration::from_secs(3_600);

/// Default attempt budget for steps that touch the message gateway.
const SEND_MAX_ATTEMPTS: i32 = 3;

/// How a failed step attempt is rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one.
    pub max_attempts: i32,
}

impl RetryPolicy {
    /// Policy for gateway sends: three attempts with exponential backoff.
    pub const fn sends() -> Self {
        Self {
            max_attempts: SEND_MAX_ATTEMPTS,
        }
    }

    /// Policy for no-op steps: a wait marker cannot fail transiently.
    pub const fn none() -> Self {
        Self { max_attempts: 1 }
    }

    /// Delay before re-running a step after the given attempt failed.
    ///
    /// `attempt` is 1-based (the attempt that just failed). The schedule
    /// doubles from [`BACKOFF_BASE`] and is capped at [`BACKOFF_CAP`]:
    /// 60 s, 120 s, 240 s, ... 3600 s.
    pub fn backoff(self, attempt: i32) -> Duration {
        let exponent = attempt.max(1) as u32 - 1;
        let delay = BACKOFF_BASE
            .checked_mul(2_u32.saturating_pow(exponent))
            .unwrap_or(BACKOFF_CAP);
        delay.min(BACKOFF_CAP)
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

/// One entry in a workflow's ordered step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    /// What the step does.
    pub action: ActionKind,
    /// How long to wait after the previous step succeeds (or after the
    /// run's `scheduled_at` for step 0) before this step comes due.
    pub delay: Duration,
    /// Retry budget and backoff schedule for the step.
    pub retry: RetryPolicy,
}

impl StepDefinition {
    const fn send_media(delay: Duration) -> Self {
        Self {
            action: ActionKind::SendMedia,
            delay,
            retry: RetryPolicy::sends(),
        }
    }

    const fn send_message(delay: Duration) -> Self {
        Self {
            action: ActionKind::SendMessage,
            delay,
            retry: RetryPolicy::sends(),
        }
    }
}

const NOW: Duration = Duration::ZERO;
const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

const SEND_VIDEO_STEPS: [StepDefinition; 1] = [StepDefinition::send_media(NOW)];

const MANUAL_VIDEO_STEPS: [StepDefinition; 1] = [StepDefinition::send_media(NOW)];

const BIRTHDAY_VIDEO_STEPS: [StepDefinition; 2] = [
    StepDefinition::send_message(NOW),
    StepDefinition::send_media(NOW),
];

const FIVE_DAYS_OF_JOY_STEPS: [StepDefinition; 5] = [
    StepDefinition::send_media(NOW),
    StepDefinition::send_media(ONE_DAY),
    StepDefinition::send_media(ONE_DAY),
    StepDefinition::send_media(ONE_DAY),
    StepDefinition::send_media(ONE_DAY),
];

/// Look up the ordered step sequence for a workflow key.
///
/// Total: the key type is closed, so every key resolves.
pub fn definition_for(key: WorkflowKey) -> &'static [StepDefinition] {
    match key {
        WorkflowKey::SendVideo => &SEND_VIDEO_STEPS,
        WorkflowKey::BirthdayVideo => &BIRTHDAY_VIDEO_STEPS,
        WorkflowKey::FiveDaysOfJoy => &FIVE_DAYS_OF_JOY_STEPS,
        WorkflowKey::ManualVideo => &MANUAL_VIDEO_STEPS,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- WorkflowKey ----------------------------------------------------------

    #[test]
    fn key_round_trips_through_str() {
        for key in WorkflowKey::ALL {
            assert_eq!(key.as_str().parse::<WorkflowKey>().unwrap(), key);
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = "WIN_BACK".parse::<WorkflowKey>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownWorkflowKey(k) if k == "WIN_BACK"));
    }

    #[test]
    fn key_parse_is_case_sensitive() {
        assert!("send_video".parse::<WorkflowKey>().is_err());
    }

    // -- Registry shape -------------------------------------------------------

    #[test]
    fn every_key_has_a_nonempty_definition() {
        for key in WorkflowKey::ALL {
            assert!(!definition_for(key).is_empty(), "{key} has no steps");
        }
    }

    #[test]
    fn step_zero_is_always_immediate() {
        // Step 0's delay is relative to the run's scheduled_at; every
        // current workflow fires its first action right at that time.
        for key in WorkflowKey::ALL {
            assert_eq!(definition_for(key)[0].delay, Duration::ZERO);
        }
    }

    #[test]
    fn five_days_of_joy_spans_five_days() {
        let steps = definition_for(WorkflowKey::FiveDaysOfJoy);
        assert_eq!(steps.len(), 5);
        let total: Duration = steps.iter().map(|s| s.delay).sum();
        assert_eq!(total, ONE_DAY * 4);
    }

    #[test]
    fn birthday_video_greets_then_sends() {
        let steps = definition_for(WorkflowKey::BirthdayVideo);
        assert_eq!(steps[0].action, ActionKind::SendMessage);
        assert_eq!(steps[1].action, ActionKind::SendMedia);
    }

    // -- Backoff --------------------------------------------------------------

    #[test]
    fn backoff_doubles_from_one_minute() {
        let policy = RetryPolicy::sends();
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(240));
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        let policy = RetryPolicy::sends();
        assert_eq!(policy.backoff(30), Duration::from_secs(3_600));
    }

    #[test]
    fn backoff_treats_attempt_zero_as_first() {
        let policy = RetryPolicy::sends();
        assert_eq!(policy.backoff(0), policy.backoff(1));
    }
}
