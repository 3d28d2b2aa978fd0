//! External orientation and recognition engines.
//!
//! The decision pipeline never talks to tesseract or an OCR model directly;
//! it goes through [`OrientationEngine`], so any engine (or a scripted stub)
//! can be injected.

#[cfg(feature = "native")]
mod pure_engine;
mod stub;
mod tesseract;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;
pub use stub::{NullEngine, StubEngine};
pub use tesseract::TesseractEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::models::config::{EngineBackend, EngineConfig};
use crate::page::Rotation;

/// Orientation reported by an OSD engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OsdReading {
    /// Clockwise rotation that makes the page upright.
    pub rotation: Rotation,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Capability interface of an orientation/recognition engine.
///
/// `Ok(None)` means the engine ran but has no evidence to offer. Errors are
/// per call; callers treat them the same as `Ok(None)`.
pub trait OrientationEngine: Send + Sync {
    /// Short engine name for logs and reports.
    fn name(&self) -> &str;

    /// Estimate the rotation that makes `image` upright.
    fn detect_orientation(
        &self,
        image: &DynamicImage,
        languages: &str,
    ) -> Result<Option<OsdReading>, EngineError>;

    /// Mean recognition confidence of the tokens found in `image`, in `[0, 1]`.
    ///
    /// Returns `Some(0.0)` when nothing was recognised.
    fn recognition_confidence(
        &self,
        image: &DynamicImage,
        languages: &str,
    ) -> Result<Option<f32>, EngineError>;
}

impl<E: OrientationEngine + ?Sized> OrientationEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect_orientation(
        &self,
        image: &DynamicImage,
        languages: &str,
    ) -> Result<Option<OsdReading>, EngineError> {
        (**self).detect_orientation(image, languages)
    }

    fn recognition_confidence(
        &self,
        image: &DynamicImage,
        languages: &str,
    ) -> Result<Option<f32>, EngineError> {
        (**self).recognition_confidence(image, languages)
    }
}

/// Create the engine selected in the configuration.
///
/// Fails with [`EngineError::Unavailable`] when the engine cannot be reached
/// at all; this is the only engine failure that aborts a run.
pub fn create_engine(config: &EngineConfig) -> Result<Box<dyn OrientationEngine>, EngineError> {
    let engine: Box<dyn OrientationEngine> = match config.backend {
        EngineBackend::Tesseract => Box::new(TesseractEngine::new(
            &config.tesseract_path,
            config.timeout_secs,
        )?),
        #[cfg(feature = "native")]
        EngineBackend::Onnx => {
            let model_dir = config.model_dir.as_deref().ok_or_else(|| {
                EngineError::Unavailable("the onnx engine needs a model directory".to_string())
            })?;
            Box::new(PureOcrEngine::from_dir(model_dir)?)
        }
        #[cfg(not(feature = "native"))]
        EngineBackend::Onnx => {
            return Err(EngineError::Unavailable(
                "built without the `native` feature".to_string(),
            ));
        }
        EngineBackend::None => Box::new(NullEngine),
    };

    info!("Using {} engine", engine.name());
    Ok(engine)
}

/// Whether a recognised token carries real text rather than noise.
pub(crate) fn is_meaningful_token(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_always_available() {
        let config = EngineConfig {
            backend: EngineBackend::None,
            ..EngineConfig::default()
        };
        let engine = create_engine(&config).unwrap();
        assert_eq!(engine.name(), "none");
    }

    #[test]
    fn test_missing_tesseract_is_unavailable() {
        let config = EngineConfig {
            tesseract_path: "/nonexistent/bin/tesseract".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            create_engine(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn test_onnx_without_model_dir_is_unavailable() {
        let config = EngineConfig {
            backend: EngineBackend::Onnx,
            model_dir: None,
            ..EngineConfig::default()
        };
        assert!(matches!(
            create_engine(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn test_meaningful_tokens() {
        assert!(is_meaningful_token("Invoice"));
        assert!(is_meaningful_token("42"));
        assert!(!is_meaningful_token("~|"));
        assert!(!is_meaningful_token(""));
    }
}
