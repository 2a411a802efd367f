//! Tesseract OCR backend implementation.
//!
//! Runs the `tesseract` command-line tool twice per image: once for the
//! assembled text and once in TSV mode for word boxes and confidences. Each
//! run writes to a file in a private temp directory, so large outputs never
//! block on a pipe, and each run is killed if it outlives the configured
//! timeout.

use std::fs::File;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::debug;

use super::backend::{
    BoundingBox, OcrBackend, OcrBackendType, OcrConfig, OcrError, RecognitionResult, Token,
};
use super::image_source::Image;
use super::util::{check_binary, missing_binary_hint};

/// How often a running tesseract process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TSV level for word boxes.
const WORD_LEVEL: u32 = 5;

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
}

impl TesseractBackend {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// First line of `tesseract --version`.
    pub fn version(&self) -> Result<String, OcrError> {
        let output = self.query("--version")?;

        // Older releases print the version banner on stderr.
        output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| OcrError::OcrFailed("tesseract printed no version".to_string()))
    }

    /// Languages installed for this tesseract, from `--list-langs`.
    pub fn languages(&self) -> Result<Vec<String>, OcrError> {
        let output = self.query("--list-langs")?;
        if !output.status.success() {
            return Err(OcrError::OcrFailed(format!(
                "tesseract --list-langs exited with {}",
                output.status
            )));
        }
        Ok(parse_language_list(&output.stdout))
    }

    /// Parts of the configured language (e.g. `spa+eng`) that are not installed.
    pub fn missing_languages(&self) -> Result<Vec<String>, OcrError> {
        let installed = self.languages()?;
        Ok(self
            .config
            .language
            .split('+')
            .map(str::trim)
            .filter(|lang| !lang.is_empty() && !installed.iter().any(|i| i == lang))
            .map(str::to_string)
            .collect())
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OcrError::BackendNotAvailable(format!(
                "{} not found (install tesseract-ocr)",
                self.config.binary.display()
            ))
        } else {
            OcrError::Io(e)
        }
    }

    /// Run a single-flag informational command such as `--version`.
    fn query(&self, flag: &str) -> Result<QueryOutput, OcrError> {
        let work_dir = TempDir::new()?;
        let stdout_path = work_dir.path().join("query.stdout");
        let stderr_path = work_dir.path().join("query.stderr");

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::from(File::create(&stdout_path)?))
            .stderr(Stdio::from(File::create(&stderr_path)?));
        let status = self.wait_with_deadline(cmd)?;

        Ok(QueryOutput {
            status,
            stdout: std::fs::read_to_string(&stdout_path).unwrap_or_default(),
            stderr: std::fs::read_to_string(&stderr_path).unwrap_or_default(),
        })
    }

    /// Spawn `cmd` and wait for it, killing it once the configured timeout passes.
    fn wait_with_deadline(&self, mut cmd: Command) -> Result<ExitStatus, OcrError> {
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let deadline = Instant::now() + self.config.timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OcrError::Timeout(self.config.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run Tesseract on an image file, returning the contents of the output file.
    ///
    /// `format` is a tesseract config name such as `tsv`; `None` produces plain text.
    fn run_tesseract(
        &self,
        image_path: &Path,
        work_dir: &Path,
        format: Option<&str>,
    ) -> Result<String, OcrError> {
        let stem = format.unwrap_or("text");
        let out_base = work_dir.join(stem);
        let stderr_path = work_dir.join(format!("{}.stderr", stem));

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(image_path)
            .arg(&out_base)
            .args(["-l", &self.config.language]);
        if let Some(psm) = self.config.page_segmentation {
            cmd.args(["--psm", &psm.to_string()]);
        }
        if let Some(format) = format {
            cmd.arg(format);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&stderr_path)?));

        let status = self.wait_with_deadline(cmd)?;
        if !status.success() {
            let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(classify_failure(&stderr));
        }

        let extension = if format.is_some() { stem } else { "txt" };
        let output_path = out_base.with_extension(extension);
        std::fs::read_to_string(&output_path).map_err(|e| {
            OcrError::OcrFailed(format!(
                "tesseract produced no output at {}: {}",
                output_path.display(),
                e
            ))
        })
    }
}

struct QueryOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Missing language data is a configuration problem, not a per-image one.
fn classify_failure(stderr: &str) -> OcrError {
    let stderr = stderr.trim();
    if stderr.contains("Failed loading language") || stderr.contains("Error opening data file") {
        OcrError::BackendNotAvailable(format!("tesseract language data missing: {}", stderr))
    } else {
        OcrError::OcrFailed(format!("tesseract failed: {}", stderr))
    }
}

/// Parse `tesseract --list-langs` output, skipping the header line.
pub fn parse_language_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

/// Parse tesseract TSV output into word tokens, in emission order.
///
/// Rows that are not word boxes, that carry no confidence (`-1`), or that
/// are malformed are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<Token> {
    tsv.lines()
        .filter(|line| !line.starts_with("level"))
        .filter_map(parse_tsv_row)
        .collect()
}

fn parse_tsv_row(line: &str) -> Option<Token> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 11 {
        return None;
    }

    let level: u32 = fields[0].trim().parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }

    let number = |i: usize| -> Option<u32> {
        let value: i64 = fields[i].trim().parse().ok()?;
        Some(value.max(0) as u32)
    };
    let bbox = BoundingBox::new(number(6)?, number(7)?, number(8)?, number(9)?);
    let confidence: f32 = fields[10].trim().parse().ok()?;
    let text = fields.get(11).copied().unwrap_or("");

    Token::from_raw(text, bbox, confidence)
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary(&self.config.binary)
    }

    fn availability_hint(&self) -> String {
        missing_binary_hint(&self.config.binary, "tesseract-ocr")
            .unwrap_or_else(|| "Tesseract is available".to_string())
    }

    fn recognize(&self, image: &Image) -> Result<RecognitionResult, OcrError> {
        let start = Instant::now();

        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("input.png");
        image
            .save_png(&image_path)
            .map_err(|e| OcrError::ImageError(format!("Failed to write image: {}", e)))?;

        let text = self.run_tesseract(&image_path, temp_dir.path(), None)?;
        let tsv = self.run_tesseract(&image_path, temp_dir.path(), Some("tsv"))?;
        let result = RecognitionResult::new(&text, parse_tsv(&tsv));

        debug!(
            "tesseract ({}) recognized {} tokens in {}ms",
            self.config.language,
            result.token_count(),
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}
