//! Bounded retry around the single-attempt solver.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::page::ChallengePage;
use super::solver::{AttemptOutcome, ChallengeError, ChallengeSolver};

/// One recorded pass through the solver.
///
/// `outcome` is what that pass produced. `Exhausted` only appears on the
/// [`SessionReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAttempt {
    /// 1-based.
    pub number: u32,
    pub candidate: Option<String>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub solved: bool,
    /// Last candidate text that was attempted, if any.
    pub final_text: Option<String>,
    pub outcome: AttemptOutcome,
    pub attempts: Vec<ChallengeAttempt>,
}

/// Retry policy for solving one challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeSolveSession {
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for ChallengeSolveSession {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl ChallengeSolveSession {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt the challenge until it is solved or attempts run out.
    ///
    /// Ends with `Exhausted` when every attempt failed. An unusable
    /// recognition engine aborts the session immediately.
    pub async fn run(
        &self,
        solver: &ChallengeSolver,
        page: &dyn ChallengePage,
    ) -> Result<SessionReport, ChallengeError> {
        let mut attempts: Vec<ChallengeAttempt> = Vec::new();

        for number in 1..=self.max_attempts {
            if number > 1 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            info!("Challenge attempt {}/{}", number, self.max_attempts);
            let result = solver.solve_once(page).await?;
            let solved = result.outcome.is_solved();

            attempts.push(ChallengeAttempt {
                number,
                candidate: result.candidate,
                outcome: result.outcome,
                error: result.error,
            });

            if solved {
                return Ok(Self::report(attempts, AttemptOutcome::Solved));
            }
        }

        warn!(
            "Challenge not solved after {} attempts",
            self.max_attempts
        );
        Ok(Self::report(attempts, AttemptOutcome::Exhausted))
    }

    fn report(attempts: Vec<ChallengeAttempt>, outcome: AttemptOutcome) -> SessionReport {
        let final_text = attempts
            .iter()
            .rev()
            .find_map(|a| a.candidate.clone());
        SessionReport {
            solved: outcome.is_solved(),
            final_text,
            outcome,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::page::{FieldLocator, PageError};
    use crate::challenge::solver::tests::{solver, FakePage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn session(max_attempts: u32) -> ChallengeSolveSession {
        ChallengeSolveSession::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_empty_text_exhausts_attempts() {
        let page = FakePage::with_image();
        let report = session(3).run(&solver(Some("")), &page).await.unwrap();

        assert!(!report.solved);
        assert_eq!(report.outcome, AttemptOutcome::Exhausted);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(
            report.attempts.iter().map(|a| a.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(report
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::ExtractionFailed && a.error.is_some()));
        assert_eq!(report.final_text, None);
    }

    #[tokio::test]
    async fn test_first_success_stops_session() {
        let page = FakePage::with_image();
        let report = session(5).run(&solver(Some("XK9P")), &page).await.unwrap();

        assert!(report.solved);
        assert_eq!(report.outcome, AttemptOutcome::Solved);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.final_text.as_deref(), Some("XK9P"));
    }

    /// Page that rejects the first `failures` fills.
    struct FlakyPage {
        inner: FakePage,
        failures: u32,
        seen: AtomicU32,
    }

    #[async_trait]
    impl ChallengePage for FlakyPage {
        async fn fetch_challenge_image(&self) -> Result<Option<Vec<u8>>, PageError> {
            self.inner.fetch_challenge_image().await
        }

        async fn fill_field(&self, locator: &FieldLocator, text: &str) -> Result<(), PageError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PageError::FieldNotFound(locator.clone()));
            }
            self.inner.fill_field(locator, text).await
        }
    }

    #[tokio::test]
    async fn test_retry_after_submission_failure() {
        // Primary and fallback both fail on the first attempt.
        let page = FlakyPage {
            inner: FakePage::with_image(),
            failures: 2,
            seen: AtomicU32::new(0),
        };
        let report = session(3).run(&solver(Some("AB12")), &page).await.unwrap();

        assert!(report.solved);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::SubmissionFailed);
        assert_eq!(report.attempts[0].candidate.as_deref(), Some("AB12"));
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Solved);
    }

    #[tokio::test]
    async fn test_last_attempt_keeps_submission_outcome() {
        let page = FlakyPage {
            inner: FakePage::with_image(),
            failures: u32::MAX,
            seen: AtomicU32::new(0),
        };
        let report = session(2).run(&solver(Some("AB12")), &page).await.unwrap();

        assert_eq!(report.outcome, AttemptOutcome::Exhausted);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::SubmissionFailed);
        assert_eq!(report.final_text.as_deref(), Some("AB12"));
    }

    #[tokio::test]
    async fn test_unavailable_engine_aborts_session() {
        let page = FakePage::with_image();
        let err = session(3).run(&solver(None), &page).await.unwrap_err();
        assert!(matches!(err, ChallengeError::Recognition(_)));
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let page = FakePage::with_image();
        let report = session(0).run(&solver(Some("AB12")), &page).await.unwrap();
        assert!(report.attempts.is_empty());
        assert_eq!(report.outcome, AttemptOutcome::Exhausted);
    }
}
