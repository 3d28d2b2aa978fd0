//! Engines that need nothing installed.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;

use super::{OrientationEngine, OsdReading};
use crate::error::EngineError;

type OsdFn = dyn Fn(&DynamicImage) -> Result<Option<OsdReading>, EngineError> + Send + Sync;
type ConfidenceFn = dyn Fn(&DynamicImage) -> Result<Option<f32>, EngineError> + Send + Sync;

/// Engine with no evidence to offer.
///
/// Used when no engine is installed; decisions then rest on layout and
/// margin analysis alone.
pub struct NullEngine;

impl OrientationEngine for NullEngine {
    fn name(&self) -> &str {
        "none"
    }

    fn detect_orientation(
        &self,
        _image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<OsdReading>, EngineError> {
        Ok(None)
    }

    fn recognition_confidence(
        &self,
        _image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<f32>, EngineError> {
        Ok(None)
    }
}

/// Deterministic scripted engine.
///
/// Answers come from closures over the image, which lets tests and
/// calibration runs replay known engine behaviour without an engine
/// installed. Calls are counted.
pub struct StubEngine {
    osd: Box<OsdFn>,
    confidence: Box<ConfidenceFn>,
    osd_calls: AtomicUsize,
    confidence_calls: AtomicUsize,
}

impl StubEngine {
    /// A stub that answers "no evidence" to everything.
    pub fn new() -> Self {
        Self {
            osd: Box::new(|_| Ok(None)),
            confidence: Box::new(|_| Ok(None)),
            osd_calls: AtomicUsize::new(0),
            confidence_calls: AtomicUsize::new(0),
        }
    }

    /// Always report the same OSD reading.
    pub fn with_fixed_osd(self, reading: OsdReading) -> Self {
        self.with_osd(move |_| Ok(Some(reading)))
    }

    /// Compute OSD answers from the image.
    pub fn with_osd<F>(mut self, f: F) -> Self
    where
        F: Fn(&DynamicImage) -> Result<Option<OsdReading>, EngineError> + Send + Sync + 'static,
    {
        self.osd = Box::new(f);
        self
    }

    /// Compute recognition confidence from the image.
    pub fn with_confidence<F>(mut self, f: F) -> Self
    where
        F: Fn(&DynamicImage) -> Result<Option<f32>, EngineError> + Send + Sync + 'static,
    {
        self.confidence = Box::new(f);
        self
    }

    /// Number of `detect_orientation` calls so far.
    pub fn osd_calls(&self) -> usize {
        self.osd_calls.load(Ordering::SeqCst)
    }

    /// Number of `recognition_confidence` calls so far.
    pub fn confidence_calls(&self) -> usize {
        self.confidence_calls.load(Ordering::SeqCst)
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationEngine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn detect_orientation(
        &self,
        image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<OsdReading>, EngineError> {
        self.osd_calls.fetch_add(1, Ordering::SeqCst);
        (self.osd)(image)
    }

    fn recognition_confidence(
        &self,
        image: &DynamicImage,
        _languages: &str,
    ) -> Result<Option<f32>, EngineError> {
        self.confidence_calls.fetch_add(1, Ordering::SeqCst);
        (self.confidence)(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Rotation;
    use image::GrayImage;

    #[test]
    fn test_stub_counts_calls() {
        let stub = StubEngine::new().with_fixed_osd(OsdReading {
            rotation: Rotation::Deg90,
            confidence: 0.9,
        });
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));

        let reading = stub.detect_orientation(&img, "eng").unwrap().unwrap();
        assert_eq!(reading.rotation, Rotation::Deg90);
        assert_eq!(stub.recognition_confidence(&img, "eng").unwrap(), None);
        assert_eq!(stub.osd_calls(), 1);
        assert_eq!(stub.confidence_calls(), 1);
    }

    #[test]
    fn test_null_engine_has_no_evidence() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert_eq!(NullEngine.detect_orientation(&img, "eng").unwrap(), None);
        assert_eq!(NullEngine.recognition_confidence(&img, "eng").unwrap(), None);
    }
}
