//! Tesseract command-line engine.
//!
//! OSD comes from `--psm 0`; recognition confidence from the word rows of
//! the TSV output. Every invocation runs under a timeout and the child is
//! killed when the limit expires.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use image::{DynamicImage, ImageFormat};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{OrientationEngine, OsdReading, is_meaningful_token};
use crate::error::EngineError;
use crate::page::Rotation;

lazy_static! {
    static ref OSD_ROTATE: Regex = Regex::new(r"(?m)^Rotate:\s*(\d+)").unwrap();
    static ref OSD_CONFIDENCE: Regex =
        Regex::new(r"(?m)^Orientation confidence:\s*([0-9]+(?:\.[0-9]+)?)").unwrap();
    static ref VERSION_LINE: Regex = Regex::new(r"tesseract\s+v?([0-9][^\s]*)").unwrap();
}

/// Raw OSD confidence at which the normalised confidence reaches 0.5.
///
/// Tesseract reports an unbounded score; values below ~2 are unreliable.
const OSD_CONFIDENCE_MIDPOINT: f32 = 2.0;

/// Engine backed by the `tesseract` executable.
pub struct TesseractEngine {
    program: PathBuf,
    timeout: Duration,
    runtime: Runtime,
}

impl TesseractEngine {
    /// Check that the executable runs and prepare the process runtime.
    pub fn new(program: impl AsRef<Path>, timeout_secs: u64) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| EngineError::Unavailable(format!("failed to start runtime: {}", e)))?;

        let engine = Self {
            program: program.as_ref().to_path_buf(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            runtime,
        };

        let output = engine
            .run(&[OsString::from("--version")])
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "cannot run {}: {} (is tesseract installed?)",
                    engine.program.display(),
                    e
                ))
            })?;

        let version = VERSION_LINE
            .captures(&output)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "unknown".to_string());

        info!("Found tesseract {} at {}", version, engine.program.display());
        Ok(engine)
    }

    /// Run tesseract with `args`, returning stdout.
    ///
    /// Older tesseract builds print `--version` to stderr, so stderr is
    /// appended when stdout is empty.
    fn run(&self, args: &[OsString]) -> Result<String, EngineError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.timeout;
        let output = self.runtime.block_on(async move {
            tokio::time::timeout(timeout, command.output()).await
        });

        let output = match output {
            Err(_) => return Err(EngineError::Timeout(timeout.as_secs())),
            Ok(Err(e)) => return Err(EngineError::Failed(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if stdout.trim().is_empty() {
            Ok(stderr)
        } else {
            Ok(stdout)
        }
    }

    /// Write `image` to a temporary PNG that tesseract can read.
    fn stage_image(&self, image: &DynamicImage) -> Result<tempfile::NamedTempFile, EngineError> {
        let staged = tempfile::Builder::new()
            .prefix("upright-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| EngineError::Failed(format!("failed to create temp file: {}", e)))?;

        image
            .save_with_format(staged.path(), ImageFormat::Png)
            .map_err(|e| EngineError::Failed(format!("failed to stage image: {}", e)))?;

        Ok(staged)
    }
}

impl OrientationEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    /// OSD uses tesseract's own `osd` model, so the language set does not apply.
    fn detect_orientation(
        &self,
        image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<OsdReading>, EngineError> {
        let staged = self.stage_image(image)?;
        let output = self.run(&[
            staged.path().as_os_str().to_owned(),
            "stdout".into(),
            "--psm".into(),
            "0".into(),
            "--dpi".into(),
            "300".into(),
        ])?;

        let reading = parse_osd(&output);
        debug!("tesseract OSD: {:?}", reading);
        Ok(reading)
    }

    fn recognition_confidence(
        &self,
        image: &DynamicImage,
        languages: &str,
    ) -> Result<Option<f32>, EngineError> {
        let staged = self.stage_image(image)?;
        let mut args: Vec<OsString> = vec![staged.path().as_os_str().to_owned(), "stdout".into()];
        if !languages.is_empty() {
            args.push("-l".into());
            args.push(languages.into());
        }
        args.extend(["--psm", "3", "--dpi", "300", "tsv"].map(OsString::from));

        let output = self.run(&args)?;
        let confidence = parse_tsv_confidence(&output)?;
        debug!("tesseract mean confidence: {:.3}", confidence);
        Ok(Some(confidence))
    }
}

/// Parse `--psm 0` output. `None` when tesseract found too little text.
pub(crate) fn parse_osd(output: &str) -> Option<OsdReading> {
    let degrees: i32 = OSD_ROTATE.captures(output)?[1].parse().ok()?;
    let rotation = Rotation::from_degrees(degrees)?;

    let raw: f32 = OSD_CONFIDENCE
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0);

    Some(OsdReading {
        rotation,
        confidence: normalize_osd_confidence(raw),
    })
}

/// Map tesseract's unbounded orientation confidence onto `[0, 1)`.
pub(crate) fn normalize_osd_confidence(raw: f32) -> f32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0.0;
    }
    raw / (raw + OSD_CONFIDENCE_MIDPOINT)
}

/// Mean word confidence (scaled to `[0, 1]`) from TSV output.
///
/// Only level-5 (word) rows with a positive confidence and at least one
/// alphanumeric character count.
pub(crate) fn parse_tsv_confidence(tsv: &str) -> Result<f32, EngineError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        _ => return Err(EngineError::Parse("missing TSV header".to_string())),
    }

    let mut sum = 0.0f32;
    let mut count = 0usize;

    for row in lines {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        if conf <= 0.0 || !is_meaningful_token(cols[11].trim()) {
            continue;
        }
        sum += conf.min(100.0);
        count += 1;
    }

    if count == 0 {
        return Ok(0.0);
    }
    Ok(sum / count as f32 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OSD_OUTPUT: &str = "Page number: 0\n\
        Orientation in degrees: 270\n\
        Rotate: 90\n\
        Orientation confidence: 6.00\n\
        Script: Latin\n\
        Script confidence: 2.96\n";

    #[test]
    fn test_parse_osd() {
        let reading = parse_osd(OSD_OUTPUT).unwrap();
        assert_eq!(reading.rotation, Rotation::Deg90);
        assert!((reading.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_parse_osd_without_rotation() {
        assert_eq!(parse_osd("Too few characters. Skipping this page\n"), None);
        assert_eq!(parse_osd("Rotate: 45\nOrientation confidence: 9.0\n"), None);
    }

    #[test]
    fn test_normalize_osd_confidence() {
        assert_eq!(normalize_osd_confidence(0.0), 0.0);
        assert_eq!(normalize_osd_confidence(-3.0), 0.0);
        assert_eq!(normalize_osd_confidence(2.0), 0.5);
        assert!(normalize_osd_confidence(100.0) < 1.0);
    }

    #[test]
    fn test_parse_tsv_confidence() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
            1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
            5\t1\t1\t1\t1\t1\t10\t10\t50\t12\t90.5\tHello\n\
            5\t1\t1\t1\t1\t2\t70\t10\t50\t12\t70.5\tworld\n\
            5\t1\t1\t1\t1\t3\t130\t10\t10\t12\t95\t|\n\
            5\t1\t1\t1\t1\t4\t150\t10\t10\t12\t-1\t \n";
        let confidence = parse_tsv_confidence(tsv).unwrap();
        assert!((confidence - 0.805).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_without_words_is_zero() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n";
        assert_eq!(parse_tsv_confidence(tsv).unwrap(), 0.0);
        assert!(parse_tsv_confidence("garbage").is_err());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let result = TesseractEngine::new("/nonexistent/tesseract", 5);
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_tesseract_times_out() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tesseract");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo \"tesseract 5.3.0\"; exit 0; fi\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = TesseractEngine::new(&script, 1).unwrap();
        let page = DynamicImage::new_luma8(32, 32);

        let start = Instant::now();
        let result = engine.detect_orientation(&page, "eng");
        assert!(matches!(result, Err(EngineError::Timeout(1))), "{:?}", result);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
