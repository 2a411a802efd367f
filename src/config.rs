//! Configuration management for glyphgrab using the prefer crate.
//!
//! Files are discovered by prefer and parsed with serde according to their
//! extension. Every section falls back to defaults, and a handful of
//! `GLYPHGRAB_*` environment variables override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::challenge::{ChallengeSolveSession, FieldLocator, SolveSettings};
use crate::ocr::OcrConfig;

/// Environment variable overriding `ocr.language`.
pub const ENV_LANGUAGE: &str = "GLYPHGRAB_LANGUAGE";
/// Environment variable overriding `ocr.tesseract`.
pub const ENV_TESSERACT: &str = "GLYPHGRAB_TESSERACT";
/// Environment variable overriding `challenge.max_attempts`.
pub const ENV_MAX_ATTEMPTS: &str = "GLYPHGRAB_MAX_ATTEMPTS";

/// Default id of the challenge text input.
pub const DEFAULT_INPUT_FIELD: &str = "DWNL$ctl10";
/// Default XPath of the challenge image.
pub const DEFAULT_IMAGE_XPATH: &str = "//img[contains(@src, 'Captcha')]";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// OCR engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language code(s), e.g. "spa" or "spa+eng".
    pub language: String,
    /// Binarize, denoise and upscale before recognition.
    pub preprocess: bool,
    /// Tesseract executable name or path.
    pub tesseract: PathBuf,
    /// Upper bound on one engine run, in seconds.
    pub timeout_secs: u64,
    /// Tesseract `--psm` override.
    pub page_segmentation: Option<u8>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "spa".to_string(),
            preprocess: true,
            tesseract: PathBuf::from("tesseract"),
            timeout_secs: 30,
            page_segmentation: None,
        }
    }
}

impl OcrSettings {
    pub fn to_ocr_config(&self) -> OcrConfig {
        OcrConfig::new(&self.language)
            .with_binary(&self.tesseract)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_page_segmentation(self.page_segmentation)
    }
}

/// Challenge solving settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    pub input_field: FieldLocator,
    /// Second lookup tried when `input_field` cannot be filled. `null` disables it.
    pub fallback_field: Option<FieldLocator>,
    pub image_xpath: String,
    /// How long to wait for the challenge image to appear.
    pub image_wait_secs: u64,
    /// Upper bound on locating and downloading the image.
    pub fetch_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            input_field: FieldLocator::id(DEFAULT_INPUT_FIELD),
            fallback_field: Some(FieldLocator::css_for_id(DEFAULT_INPUT_FIELD)),
            image_xpath: DEFAULT_IMAGE_XPATH.to_string(),
            image_wait_secs: 5,
            fetch_timeout_secs: 10,
            submit_timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl ChallengeSettings {
    pub fn solve_settings(&self) -> SolveSettings {
        SolveSettings {
            input_field: self.input_field.clone(),
            fallback_field: self.fallback_field.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
        }
    }

    pub fn session(&self) -> ChallengeSolveSession {
        ChallengeSolveSession::new(
            self.max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

/// Browser launch settings for live challenge solving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a visible window.
    pub headless: bool,
    /// Chrome executable; searched for when unset.
    pub chrome_path: Option<PathBuf>,
    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    /// Remote DevTools URL (e.g., "ws://localhost:9222"). When set, connects
    /// to an existing browser instead of launching one.
    pub remote_url: Option<String>,
    /// Page load and request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            proxy: None,
            chrome_args: Vec::new(),
            remote_url: None,
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

/// Batch extraction settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Pause between images, in milliseconds.
    pub delay_ms: u64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ocr: OcrSettings,
    #[serde(default)]
    pub challenge: ChallengeSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    /// File this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Falls back to defaults when no file is found or it cannot be parsed.
    pub async fn load() -> Self {
        let config = match prefer::load("glyphgrab").await {
            Ok(found) => match found.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports TOML, YAML and JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }

    /// Apply `GLYPHGRAB_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(language) = get(ENV_LANGUAGE) {
            debug!("Using {} from environment: {}", ENV_LANGUAGE, language);
            self.ocr.language = language;
        }
        if let Some(binary) = get(ENV_TESSERACT) {
            debug!("Using {} from environment: {}", ENV_TESSERACT, binary);
            self.ocr.tesseract = PathBuf::from(binary);
        }
        if let Some(raw) = get(ENV_MAX_ATTEMPTS) {
            match raw.trim().parse() {
                Ok(n) => self.challenge.max_attempts = n,
                Err(_) => warn!("Ignoring invalid {}: {}", ENV_MAX_ATTEMPTS, raw),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ocr.language, "spa");
        assert!(config.ocr.preprocess);
        assert_eq!(config.challenge.max_attempts, 3);
        assert_eq!(config.challenge.input_field, FieldLocator::id("DWNL$ctl10"));
        assert_eq!(config.challenge.image_xpath, DEFAULT_IMAGE_XPATH);
        assert_eq!(config.batch.delay_ms, 0);

        let solve = config.challenge.solve_settings();
        assert_eq!(solve, SolveSettings::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::parse(
            Path::new("glyphgrab.toml"),
            r#"
[ocr]
language = "eng"

[challenge]
max_attempts = 5
fallback_field = { by = "xpath", value = "//input[@name='captcha']" }
"#,
        )
        .unwrap();

        assert_eq!(config.ocr.language, "eng");
        assert!(config.ocr.preprocess);
        assert_eq!(config.ocr.timeout_secs, 30);
        assert_eq!(config.challenge.max_attempts, 5);
        assert_eq!(
            config.challenge.fallback_field,
            Some(FieldLocator::XPath("//input[@name='captcha']".to_string()))
        );
        assert_eq!(config.challenge.retry_delay_ms, 1000);
    }

    #[test]
    fn test_yaml_can_disable_fallback() {
        let config = Config::parse(
            Path::new("glyphgrab.yaml"),
            "challenge:\n  fallback_field: null\nbatch:\n  delay_ms: 250\n",
        )
        .unwrap();
        assert_eq!(config.challenge.fallback_field, None);
        assert_eq!(config.batch.delay_ms, 250);
    }

    #[test]
    fn test_bad_json_reports_format() {
        let err = Config::parse(Path::new("glyphgrab.json"), "{ nope").unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[tokio::test]
    async fn test_load_from_path_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyphgrab.json");
        std::fs::write(&path, r#"{"ocr": {"preprocess": false}}"#).unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert!(!config.ocr.preprocess);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));

        let missing = Config::load_from_path(&dir.path().join("absent.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_LANGUAGE, "eng"),
            (ENV_TESSERACT, "/opt/tesseract/bin/tesseract"),
            (ENV_MAX_ATTEMPTS, "7"),
        ]
        .into_iter()
        .collect();
        let config =
            Config::default().with_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.ocr.language, "eng");
        assert_eq!(
            config.ocr.tesseract,
            PathBuf::from("/opt/tesseract/bin/tesseract")
        );
        assert_eq!(config.challenge.max_attempts, 7);
    }

    #[test]
    fn test_invalid_or_empty_overrides_ignored() {
        let config = Config::default().with_overrides_from(|k| match k {
            ENV_MAX_ATTEMPTS => Some("many".to_string()),
            ENV_LANGUAGE => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.challenge.max_attempts, 3);
        assert_eq!(config.ocr.language, "spa");
    }

    #[test]
    fn test_ocr_config_conversion() {
        let settings = OcrSettings {
            page_segmentation: Some(7),
            ..OcrSettings::default()
        };
        let ocr = settings.to_ocr_config();
        assert_eq!(ocr.language, "spa");
        assert_eq!(ocr.page_segmentation, Some(7));
        assert_eq!(ocr.timeout, Duration::from_secs(30));
    }
}
