//! Shared helpers for command-line OCR backends.

use std::path::Path;

/// Check if a binary is available, either in PATH or at the given path.
pub fn check_binary(name: impl AsRef<Path>) -> bool {
    which::which(name.as_ref()).is_ok()
}

/// Hint for a missing binary, if it is missing.
pub fn missing_binary_hint(name: impl AsRef<Path>, package: &str) -> Option<String> {
    let name = name.as_ref();
    if check_binary(name) {
        None
    } else {
        Some(format!(
            "{} not installed. Install with: apt install {}",
            name.display(),
            package
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        assert!(!check_binary("glyphgrab-no-such-binary"));
        let hint = missing_binary_hint("glyphgrab-no-such-binary", "nothing").unwrap();
        assert!(hint.contains("apt install nothing"));
    }
}
