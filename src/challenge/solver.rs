//! Single-attempt challenge solving.
//!
//! One call to [`ChallengeSolver::solve_once`] walks
//! `Idle -> Acquiring -> Extracting -> Submitting -> {Solved, Failed}` and
//! never retries. Retries belong to [`ChallengeSolveSession`](super::ChallengeSolveSession).

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::page::{ChallengePage, FieldLocator, PageError};
use crate::ocr::{ImageInput, OcrError, OcrProcessor};

/// Errors that end a solve session instead of failing a single attempt.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("recognition engine unavailable: {0}")]
    Recognition(#[source] OcrError),
}

/// Solver state. Terminal states are `Solved` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveState {
    Idle,
    Acquiring,
    Extracting,
    Submitting,
    Solved,
    Failed,
}

impl SolveState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Solved | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: SolveState) -> bool {
        use SolveState::*;
        match (self, next) {
            (Idle, Acquiring) => true,
            (Acquiring, Extracting) => true,
            (Extracting, Submitting) => true,
            (Submitting, Solved) => true,
            (Acquiring | Extracting | Submitting, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Extracting => "extracting",
            Self::Submitting => "submitting",
            Self::Solved => "solved",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result class of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Solved,
    ExtractionFailed,
    SubmissionFailed,
    Exhausted,
}

impl AttemptOutcome {
    pub fn is_solved(self) -> bool {
        self == Self::Solved
    }
}

/// What one pass through the state machine produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub outcome: AttemptOutcome,
    /// Trimmed recognized text, when recognition produced any.
    pub candidate: Option<String>,
    pub error: Option<String>,
    pub final_state: SolveState,
}

/// Where to inject text and how long page operations may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveSettings {
    pub input_field: FieldLocator,
    /// Tried when `input_field` cannot be filled.
    pub fallback_field: Option<FieldLocator>,
    pub fetch_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Default for SolveSettings {
    fn default() -> Self {
        let id = "DWNL$ctl10";
        Self {
            input_field: FieldLocator::id(id),
            fallback_field: Some(FieldLocator::css_for_id(id)),
            fetch_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(10),
        }
    }
}

/// Tracks the current state and rejects illegal transitions in debug builds.
struct Machine {
    state: SolveState,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: SolveState::Idle,
        }
    }

    fn advance(&mut self, next: SolveState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!("challenge state {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(
        &mut self,
        outcome: AttemptOutcome,
        candidate: Option<String>,
        error: impl fmt::Display,
    ) -> AttemptResult {
        warn!("Challenge attempt failed ({}): {}", self.state, error);
        self.advance(SolveState::Failed);
        AttemptResult {
            outcome,
            candidate,
            error: Some(error.to_string()),
            final_state: self.state,
        }
    }
}

/// Composes OCR with a page collaborator to solve one challenge.
pub struct ChallengeSolver {
    processor: OcrProcessor,
    settings: SolveSettings,
}

impl ChallengeSolver {
    pub fn new(processor: OcrProcessor, settings: SolveSettings) -> Self {
        Self {
            processor,
            settings,
        }
    }

    pub fn settings(&self) -> &SolveSettings {
        &self.settings
    }

    /// Fetch the current challenge image without solving it.
    pub async fn acquire_image(
        &self,
        page: &dyn ChallengePage,
    ) -> Result<Option<Vec<u8>>, PageError> {
        let timeout = self.settings.fetch_timeout;
        tokio::time::timeout(timeout, page.fetch_challenge_image())
            .await
            .map_err(|_| PageError::Timeout(timeout))?
    }

    /// Run one attempt.
    ///
    /// Recognition runs on the blocking pool, so dropping the returned future
    /// (e.g. from an outer `tokio::time::timeout`) ends the attempt promptly.
    /// Returns `Err` only when the recognition engine itself is unusable;
    /// every other failure is reported in the [`AttemptResult`].
    pub async fn solve_once(
        &self,
        page: &dyn ChallengePage,
    ) -> Result<AttemptResult, ChallengeError> {
        let mut machine = Machine::new();

        machine.advance(SolveState::Acquiring);
        let bytes = match self.acquire_image(page).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Ok(machine.fail(
                    AttemptOutcome::ExtractionFailed,
                    None,
                    "challenge image not found",
                ))
            }
            Err(e) => return Ok(machine.fail(AttemptOutcome::ExtractionFailed, None, e)),
        };

        machine.advance(SolveState::Extracting);
        let processor = self.processor.clone();
        let recognized =
            tokio::task::spawn_blocking(move || processor.recognize_input(ImageInput::Bytes(bytes)))
                .await;
        let candidate = match recognized {
            Ok(Ok(result)) => result.text().trim().to_string(),
            Ok(Err(e)) if e.is_fatal() => {
                machine.advance(SolveState::Failed);
                return Err(ChallengeError::Recognition(e));
            }
            Ok(Err(e)) => return Ok(machine.fail(AttemptOutcome::ExtractionFailed, None, e)),
            Err(e) => {
                return Ok(machine.fail(
                    AttemptOutcome::ExtractionFailed,
                    None,
                    format!("recognition task failed: {}", e),
                ))
            }
        };
        if candidate.is_empty() {
            return Ok(machine.fail(
                AttemptOutcome::ExtractionFailed,
                None,
                "recognized text is empty",
            ));
        }

        machine.advance(SolveState::Submitting);
        if let Err(e) = self.submit(page, &candidate).await {
            return Ok(machine.fail(AttemptOutcome::SubmissionFailed, Some(candidate), e));
        }

        machine.advance(SolveState::Solved);
        info!("Challenge solved: {}", candidate);
        Ok(AttemptResult {
            outcome: AttemptOutcome::Solved,
            candidate: Some(candidate),
            error: None,
            final_state: machine.state,
        })
    }

    async fn submit(&self, page: &dyn ChallengePage, text: &str) -> Result<(), PageError> {
        let primary = self.fill(page, &self.settings.input_field, text).await;
        match (primary, &self.settings.fallback_field) {
            (Ok(()), _) => Ok(()),
            (Err(e), Some(fallback)) => {
                debug!(
                    "Filling {} failed ({}), trying {}",
                    self.settings.input_field, e, fallback
                );
                self.fill(page, fallback, text).await
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn fill(
        &self,
        page: &dyn ChallengePage,
        locator: &FieldLocator,
        text: &str,
    ) -> Result<(), PageError> {
        let timeout = self.settings.submit_timeout;
        tokio::time::timeout(timeout, page.fill_field(locator, text))
            .await
            .map_err(|_| PageError::Timeout(timeout))??;
        debug!("Entered challenge text into field {}", locator);
        Ok(())
    }
}
