//! Confidence aggregation.
//!
//! Zero-confidence tokens are noise artifacts rather than weak matches, so
//! they are left out of every mean computed here.

use super::backend::{RecognitionResult, Token};

/// Mean confidence over tokens with confidence > 0; 0 when none qualify.
pub fn mean_confidence(tokens: &[Token]) -> f64 {
    let (sum, count) = tokens
        .iter()
        .map(|t| t.confidence())
        .filter(|&c| c > 0)
        .fold((0u64, 0u64), |(sum, count), c| (sum + c as u64, count + 1));

    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Image-level score in [0, 100].
pub fn score(result: &RecognitionResult) -> f64 {
    mean_confidence(result.tokens())
}

/// Summary over a batch of recognition outcomes.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub images: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean of the image scores that are > 0.
    pub mean_confidence: f64,
}

impl BatchSummary {
    /// Build a summary from per-image scores (`None` for failed images).
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut summary = BatchSummary::default();
        let mut scored = 0usize;
        let mut total = 0.0f64;

        for entry in scores {
            summary.images += 1;
            match entry {
                Some(score) => {
                    summary.succeeded += 1;
                    if score > 0.0 {
                        scored += 1;
                        total += score;
                    }
                }
                None => summary.failed += 1,
            }
        }

        if scored > 0 {
            summary.mean_confidence = total / scored as f64;
        }
        summary
    }
}
