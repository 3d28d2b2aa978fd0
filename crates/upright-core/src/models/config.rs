//! Configuration structures for the orientation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::UprightError;

/// Main configuration for the upright pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UprightConfig {
    /// External engine configuration.
    pub engine: EngineConfig,

    /// Decision thresholds.
    pub thresholds: ThresholdConfig,

    /// Image analysis parameters.
    pub analysis: AnalysisConfig,

    /// File rewriting configuration.
    pub rewrite: RewriteConfig,
}

/// Which engine answers OSD and recognition-confidence queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// The `tesseract` binary (OSD and confidence).
    Tesseract,
    /// Pure Rust ONNX OCR (confidence only).
    Onnx,
    /// No engine; layout and margin evidence only.
    None,
}

/// External engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine backend.
    pub backend: EngineBackend,

    /// Language set in tesseract `+` syntax (e.g. "srp+srp_latn+eng").
    pub languages: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Path or name of the tesseract executable.
    pub tesseract_path: PathBuf,

    /// Directory with det.onnx, latin_rec.onnx and latin_dict.txt for the ONNX backend.
    pub model_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Tesseract,
            languages: "eng".to_string(),
            timeout_secs: 30,
            tesseract_path: PathBuf::from("tesseract"),
            model_dir: None,
        }
    }
}

/// Decision thresholds.
///
/// The defaults are empirical starting points; calibrate them against a
/// labelled set of pages for a given scanner or document source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Horizontal/vertical projection variance ratio separating the families.
    pub layout_ratio: f64,

    /// Minimum separation between 0° and 180° recognition confidence (0.0 - 1.0).
    pub confidence_delta: f32,

    /// Top/bottom band density ratio required by the margin heuristic.
    pub margin_ratio: f64,

    /// Minimum OSD confidence (0.0 - 1.0).
    pub osd_confidence: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            layout_ratio: 1.5,
            confidence_delta: 0.05,
            margin_ratio: 1.3,
            osd_confidence: 0.6,
        }
    }
}

impl ThresholdConfig {
    /// Reject thresholds that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), UprightError> {
        if !self.layout_ratio.is_finite() || self.layout_ratio <= 1.0 {
            return Err(UprightError::Config(format!(
                "layout_ratio must be greater than 1, got {}",
                self.layout_ratio
            )));
        }
        if !self.margin_ratio.is_finite() || self.margin_ratio <= 1.0 {
            return Err(UprightError::Config(format!(
                "margin_ratio must be greater than 1, got {}",
                self.margin_ratio
            )));
        }
        if !(self.confidence_delta.is_finite() && self.confidence_delta > 0.0) {
            return Err(UprightError::Config(format!(
                "confidence_delta must be positive, got {}",
                self.confidence_delta
            )));
        }
        if !(0.0..=1.0).contains(&self.osd_confidence) {
            return Err(UprightError::Config(format!(
                "osd_confidence must be within 0..=1, got {}",
                self.osd_confidence
            )));
        }
        Ok(())
    }
}

/// Image analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Longest side (pixels) images are scaled down to before analysis.
    pub work_size: u32,

    /// Height of the top and bottom margin bands as a fraction of page height.
    pub margin_band: f64,

    /// Pages with a smaller ink fraction are treated as blank.
    pub min_ink_fraction: f64,

    /// Grayscale range below which an image is treated as having no ink.
    pub min_contrast: u8,

    /// Images with a shorter long side are upscaled before recognition scoring.
    pub ocr_min_size: u32,

    /// Images with a longer long side are downscaled before OSD.
    pub osd_max_size: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            work_size: 1600,
            margin_band: 0.12,
            min_ink_fraction: 0.002,
            min_contrast: 32,
            ocr_min_size: 900,
            osd_max_size: 2000,
        }
    }
}

/// File rewriting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Recurse into subdirectories.
    pub recursive: bool,

    /// Report decisions without writing.
    pub dry_run: bool,

    /// JPEG quality used when re-encoding.
    pub jpeg_quality: u8,

    /// Number of worker threads (1 = sequential).
    pub jobs: usize,

    /// Supported file extensions (lowercase, without dot).
    pub extensions: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            dry_run: false,
            jpeg_quality: 95,
            jobs: 1,
            extensions: ["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RewriteConfig {
    /// Check whether a path has a supported image extension.
    pub fn is_supported(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }
}

impl UprightConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Validate every section that has constraints.
    pub fn validate(&self) -> Result<(), UprightError> {
        self.thresholds.validate()?;
        if !(0.0..0.5).contains(&self.analysis.margin_band) || self.analysis.margin_band == 0.0 {
            return Err(UprightError::Config(format!(
                "margin_band must be within (0, 0.5), got {}",
                self.analysis.margin_band
            )));
        }
        if self.analysis.work_size == 0 {
            return Err(UprightError::Config("work_size must be positive".to_string()));
        }
        if self.rewrite.jpeg_quality == 0 || self.rewrite.jpeg_quality > 100 {
            return Err(UprightError::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.rewrite.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_defaults_are_valid() {
        assert!(UprightConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: UprightConfig =
            serde_json::from_str(r#"{"thresholds": {"margin_ratio": 2.0}, "engine": {"backend": "none"}}"#)
                .unwrap();
        assert_eq!(config.thresholds.margin_ratio, 2.0);
        assert_eq!(config.thresholds.layout_ratio, 1.5);
        assert_eq!(config.engine.backend, EngineBackend::None);
        assert_eq!(config.engine.languages, "eng");
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.layout_ratio = 0.8;
        assert!(thresholds.validate().is_err());

        let mut thresholds = ThresholdConfig::default();
        thresholds.confidence_delta = 0.0;
        assert!(thresholds.validate().is_err());

        let mut thresholds = ThresholdConfig::default();
        thresholds.osd_confidence = 1.5;
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = UprightConfig::default();
        config.engine.languages = "srp+srp_latn+eng".to_string();
        config.rewrite.recursive = true;
        config.save(&path).unwrap();

        let loaded = UprightConfig::from_file(&path).unwrap();
        assert_eq!(loaded.engine.languages, "srp+srp_latn+eng");
        assert!(loaded.rewrite.recursive);
        assert_eq!(loaded.thresholds, config.thresholds);
    }

    #[test]
    fn test_supported_extensions() {
        let rewrite = RewriteConfig::default();
        assert!(rewrite.is_supported(Path::new("scan.PNG")));
        assert!(rewrite.is_supported(Path::new("a/b/page.jpeg")));
        assert!(!rewrite.is_supported(Path::new("notes.txt")));
        assert!(!rewrite.is_supported(Path::new("README")));
    }
}
