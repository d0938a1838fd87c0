use std::time::Duration;

use crate::model::parser::ParseMode;
use crate::prompt::builder::PromptMode;
use crate::round::error::AutofillError;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a round is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    BuildingPrompt,
    AwaitingModel,
    Validating,
    Retrying,
    Applying,
    Merging,
    Applied,
    Merged,
    Failed,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Applied | RoundState::Merged | RoundState::Failed)
    }
}

/// How many times a round may re-ask after a rejected answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Total model calls allowed, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

#[derive(Debug)]
pub enum RetryDecision {
    Retry,
    GiveUp(&'static str),
}

/// Decide whether a failed attempt (1-based) gets another try.
pub fn check_retry(policy: RetryPolicy, attempt: u32, error: &AutofillError) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::GiveUp("not_retryable");
    }

    if attempt >= policy.attempts() {
        return RetryDecision::GiveUp("retry_budget_exhausted");
    }

    RetryDecision::Retry
}

/// Knobs shared by every round a runner drives.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub fill: RetryPolicy,
    pub learn: RetryPolicy,
    pub ingest: RetryPolicy,
    pub ingest_timeout: Duration,
    pub parse_mode: ParseMode,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            fill: RetryPolicy::default(),
            learn: RetryPolicy::default(),
            ingest: RetryPolicy::default(),
            ingest_timeout: DEFAULT_INGEST_TIMEOUT,
            parse_mode: ParseMode::Lenient,
        }
    }
}

impl RoundConfig {
    pub fn policy(&self, mode: PromptMode) -> RetryPolicy {
        match mode {
            PromptMode::Fill => self.fill,
            PromptMode::Learn => self.learn,
            PromptMode::Ingest => self.ingest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_include_the_first_call() {
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 3);
        assert_eq!(RetryPolicy::new(u32::MAX).attempts(), u32::MAX);
    }

    #[test]
    fn check_retry_stops_at_the_ceiling() {
        let policy = RetryPolicy::new(1);
        let err = AutofillError::MalformedJson("x".into());
        assert!(matches!(check_retry(policy, 1, &err), RetryDecision::Retry));
        assert!(matches!(
            check_retry(policy, 2, &err),
            RetryDecision::GiveUp("retry_budget_exhausted")
        ));
    }

    #[test]
    fn check_retry_never_retries_transport_errors() {
        let err = AutofillError::TransportFailure("down".into());
        assert!(matches!(
            check_retry(RetryPolicy::new(5), 1, &err),
            RetryDecision::GiveUp("not_retryable")
        ));
    }
}
