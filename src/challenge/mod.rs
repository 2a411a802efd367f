//! Visual challenge solving.
//!
//! [`ChallengeSolver`] runs one acquire/recognize/submit attempt against a
//! [`ChallengePage`]; [`ChallengeSolveSession`] retries it up to a limit.
//! With the `browser` feature, [`ChallengeBrowser`] provides live pages.

#[cfg(feature = "browser")]
mod browser;
mod page;
mod session;
mod solver;

#[cfg(feature = "browser")]
pub use browser::{BrowserChallengePage, ChallengeBrowser};
pub use page::{ChallengePage, FieldLocator, PageError};
pub use session::{ChallengeAttempt, ChallengeSolveSession, SessionReport};
pub use solver::{
    AttemptOutcome, AttemptResult, ChallengeError, ChallengeSolver, SolveSettings, SolveState,
};
