//! Executor configuration.

use crate::model::poll::DEFAULT_STRATEGY;
use chrono::Duration;

/// Voter email recorded when a vote names none.
pub const UNKNOWN_VOTER_EMAIL: &str = "unknown@example.com";

/// Tunables for one batch run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Distance between consecutive candidate starts in `propose_times`.
    pub candidate_step: Duration,
    /// Meeting length for `propose_times` when the action names none.
    pub default_propose_duration: Duration,
    /// Meeting length for `reschedule_event` when the action names none.
    pub default_reschedule_duration: Duration,
    /// Strategy recorded on polls that do not name one.
    pub default_strategy: String,
    pub unknown_voter_email: String,
    /// Zone for actions without `use_tz`; empty means the process-local zone.
    pub default_zone: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            candidate_step: Duration::minutes(30),
            default_propose_duration: Duration::minutes(30),
            default_reschedule_duration: Duration::hours(1),
            default_strategy: DEFAULT_STRATEGY.to_string(),
            unknown_voter_email: UNKNOWN_VOTER_EMAIL.to_string(),
            default_zone: String::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate step. Non-positive values are ignored.
    pub fn with_candidate_step(mut self, step: Duration) -> Self {
        if step > Duration::zero() {
            self.candidate_step = step;
        }
        self
    }

    pub fn with_default_propose_duration(mut self, duration: Duration) -> Self {
        self.default_propose_duration = duration;
        self
    }

    pub fn with_default_reschedule_duration(mut self, duration: Duration) -> Self {
        self.default_reschedule_duration = duration;
        self
    }

    pub fn with_default_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.default_strategy = strategy.into();
        self
    }

    pub fn with_unknown_voter_email(mut self, email: impl Into<String>) -> Self {
        self.unknown_voter_email = email.into();
        self
    }

    /// Set the fallback zone name used when an action has no `use_tz`.
    pub fn with_default_zone(mut self, zone: impl Into<String>) -> Self {
        self.default_zone = zone.into();
        self
    }
}
