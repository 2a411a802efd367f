//! Live challenge solving command.

use std::time::Duration;

use console::style;

use super::{build_processor, ensure_engine};
use crate::challenge::{ChallengeBrowser, ChallengeSolver};
use crate::config::Config;

/// Open `url`, solve its challenge and report each attempt.
///
/// Whether the remote site accepts the entered text is not checked here.
pub async fn cmd_solve(
    config: &Config,
    url: &str,
    max_attempts: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let processor = build_processor(&config.ocr);
    ensure_engine(&processor)?;

    let mut settings = config.challenge.clone();
    if let Some(n) = max_attempts {
        settings.max_attempts = n;
    }
    let solver = ChallengeSolver::new(processor, settings.solve_settings());

    let mut browser = ChallengeBrowser::new(config.browser.clone());
    let page = match browser
        .open(
            url,
            &settings.image_xpath,
            Duration::from_secs(settings.image_wait_secs),
        )
        .await
    {
        Ok(page) => page,
        Err(e) => {
            browser.close().await;
            return Err(e);
        }
    };

    let outcome = settings.session().run(&solver, &page).await;
    page.close().await;
    browser.close().await;
    let report = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for attempt in &report.attempts {
            let mark = if attempt.outcome.is_solved() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{} attempt {}: {:?} {}{}",
                mark,
                attempt.number,
                attempt.outcome,
                attempt.candidate.as_deref().unwrap_or("-"),
                attempt
                    .error
                    .as_deref()
                    .map(|e| format!(" ({})", e))
                    .unwrap_or_default()
            );
        }
    }

    if report.solved {
        Ok(())
    } else {
        anyhow::bail!("challenge not solved after {} attempts", report.attempts.len())
    }
}
