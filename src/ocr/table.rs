//! Table reconstruction from token positions.
//!
//! Tokens are bucketed by their top edge rounded to the nearest multiple of
//! [`ROW_QUANTUM`] pixels, which absorbs baseline jitter between words on
//! one visual line. Buckets are emitted top to bottom; words within a bucket
//! left to right.
//!
//! This is a spatial heuristic, not a layout analyzer. It assumes a single
//! column of non-rotated, non-overlapping text.

use std::collections::BTreeMap;

use super::backend::{RecognitionResult, Token};

/// Vertical quantization width in pixels.
pub const ROW_QUANTUM: u32 = 10;

/// One reconstructed row of cell texts, left to right.
pub type TableRow = Vec<String>;

/// Quantize a y-coordinate to the nearest multiple of [`ROW_QUANTUM`].
///
/// Halves round away from zero, so 105 maps to 110.
pub fn row_key(y: u32) -> u32 {
    ((y as f64 / ROW_QUANTUM as f64).round() as u32) * ROW_QUANTUM
}

/// Group the qualifying tokens of `result` into rows.
///
/// Tokens with confidence 0 or blank text are ignored. No qualifying tokens
/// yields an empty table.
pub fn reconstruct_table(result: &RecognitionResult) -> Vec<TableRow> {
    reconstruct_rows(result.tokens())
}

/// Same as [`reconstruct_table`], on a bare token slice.
pub fn reconstruct_rows(tokens: &[Token]) -> Vec<TableRow> {
    let mut rows: BTreeMap<u32, Vec<&Token>> = BTreeMap::new();

    for token in tokens {
        if token.confidence() == 0 || token.text().trim().is_empty() {
            continue;
        }
        rows.entry(row_key(token.bbox().y)).or_default().push(token);
    }

    rows.into_values()
        .map(|mut cells| {
            // Stable sort keeps emission order for equal x.
            cells.sort_by_key(|t| t.bbox().x);
            cells.into_iter().map(|t| t.text().to_string()).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::BoundingBox;

    fn token(text: &str, x: u32, y: u32, conf: i32) -> Token {
        Token::new(text, BoundingBox::new(x, y, 20, 12), conf)
    }

    #[test]
    fn test_row_key_quantization() {
        assert_eq!(row_key(100), 100);
        assert_eq!(row_key(104), 100);
        assert_eq!(row_key(105), 110);
        assert_eq!(row_key(112), 110);
        assert_eq!(row_key(0), 0);
    }

    #[test]
    fn test_nearby_tokens_share_a_row() {
        let tokens = vec![token("Monto", 120, 104, 90), token("Fecha", 10, 100, 88)];
        assert_eq!(reconstruct_rows(&tokens), vec![vec!["Fecha", "Monto"]]);
    }

    #[test]
    fn test_distant_tokens_split_rows() {
        let tokens = vec![token("b", 10, 112, 90), token("a", 10, 100, 90)];
        assert_eq!(reconstruct_rows(&tokens), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_noise_tokens_dropped() {
        let tokens = vec![
            token("keep", 10, 20, 50),
            token("zero", 30, 20, 0),
            token("   ", 50, 20, 90),
            token("", 70, 20, 90),
        ];
        assert_eq!(reconstruct_rows(&tokens), vec![vec!["keep"]]);
    }

    #[test]
    fn test_no_qualifying_tokens_gives_empty_table() {
        let result = RecognitionResult::from_tokens(vec![token("x", 0, 0, 0)]);
        assert!(reconstruct_table(&result).is_empty());
        assert!(reconstruct_table(&RecognitionResult::empty()).is_empty());
    }

    #[test]
    fn test_rows_and_columns_ordered() {
        let tokens = vec![
            token("c3", 300, 61, 80),
            token("a1", 5, 9, 80),
            token("c1", 300, 11, 80),
            token("b2", 150, 38, 80),
            token("a2", 5, 42, 80),
            token("b1", 150, 10, 80),
        ];
        let rows = reconstruct_rows(&tokens);
        assert_eq!(
            rows,
            vec![vec!["a1", "b1", "c1"], vec!["a2", "b2"], vec!["c3"]]
        );
    }

    #[test]
    fn test_reconstruction_leaves_token_order_alone() {
        let result = RecognitionResult::from_tokens(vec![
            token("second", 50, 10, 80),
            token("first", 5, 10, 80),
        ]);
        let _ = reconstruct_table(&result);
        assert_eq!(result.tokens()[0].text(), "second");
    }
}
