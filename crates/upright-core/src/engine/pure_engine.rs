//! Pure Rust OCR confidence engine using `pure-onnx-ocr`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info};

use super::{OrientationEngine, OsdReading, is_meaningful_token};
use crate::error::EngineError;

/// Recognition-confidence engine backed by `pure-onnx-ocr` (no external runtime).
///
/// It has no OSD model, so `detect_orientation` never offers evidence and
/// sideways pages stay unresolved with this engine. Calls are serialised
/// through a mutex, which also bounds model memory under worker threads.
pub struct PureOcrEngine {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
}

impl PureOcrEngine {
    /// Create an engine from model files in a directory.
    ///
    /// Expects `det.onnx`, `latin_rec.onnx` and `latin_dict.txt`.
    pub fn from_dir(model_dir: &Path) -> Result<Self, EngineError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(EngineError::Unavailable(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| EngineError::Unavailable(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
        })
    }
}

impl OrientationEngine for PureOcrEngine {
    fn name(&self) -> &str {
        "onnx"
    }

    fn detect_orientation(
        &self,
        _image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<OsdReading>, EngineError> {
        Ok(None)
    }

    /// The recognition model is fixed at load time, so `languages` is ignored.
    fn recognition_confidence(
        &self,
        image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<f32>, EngineError> {
        let start = Instant::now();
        let engine = self
            .engine
            .lock()
            .map_err(|_| EngineError::Failed("OCR engine lock poisoned".to_string()))?;

        let results = engine
            .run_from_image(image)
            .map_err(|e| EngineError::Failed(format!("pure-onnx-ocr: {}", e)))?;

        let scores: Vec<f32> = results
            .iter()
            .filter(|r| is_meaningful_token(&r.text.replace("[UNK]", "")))
            .map(|r| r.confidence.clamp(0.0, 1.0))
            .collect();

        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        };

        debug!(
            "pure-onnx-ocr: {} regions, {} scored, mean {:.3} in {}ms",
            results.len(),
            scores.len(),
            confidence,
            start.elapsed().as_millis()
        );

        Ok(Some(confidence))
    }
}
