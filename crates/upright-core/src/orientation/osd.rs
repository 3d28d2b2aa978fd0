//! OSD consultation.

use image::DynamicImage;
use tracing::{debug, warn};

use crate::analysis::LayoutFamily;
use crate::engine::{OrientationEngine, OsdReading};
use crate::page::{ImagePreprocessor, Rotation};

/// Asks the engine's orientation detector once per page.
pub struct OsdConsultant<'a, E: OrientationEngine + ?Sized> {
    engine: &'a E,
    languages: &'a str,
    max_size: u32,
}

impl<'a, E: OrientationEngine + ?Sized> OsdConsultant<'a, E> {
    pub fn new(engine: &'a E, languages: &'a str, max_size: u32) -> Self {
        Self {
            engine,
            languages,
            max_size,
        }
    }

    /// Query the engine. Failures and timeouts become "no evidence".
    pub fn consult(&self, image: &DynamicImage, preprocessor: &ImagePreprocessor) -> Option<OsdReading> {
        let scaled = preprocessor.fit_within(image, self.max_size);
        match self.engine.detect_orientation(&scaled, self.languages) {
            Ok(Some(reading)) => {
                let reading = OsdReading {
                    confidence: if reading.confidence.is_finite() {
                        reading.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    },
                    ..reading
                };
                debug!(
                    "{} OSD: rotate {} (confidence {:.3})",
                    self.engine.name(),
                    reading.rotation,
                    reading.confidence
                );
                Some(reading)
            }
            Ok(None) => {
                debug!("{} OSD has no evidence", self.engine.name());
                None
            }
            Err(e) => {
                warn!("{} OSD failed, continuing without it: {}", self.engine.name(), e);
                None
            }
        }
    }
}

/// Rotation an OSD reading may settle, given the page's family.
///
/// The reading must clear `min_confidence` and agree with the family:
/// a sideways page only accepts 90° or 270°.
pub(crate) fn gate(reading: Option<OsdReading>, family: LayoutFamily, min_confidence: f32) -> Option<Rotation> {
    let reading = reading?;
    if reading.confidence < min_confidence {
        return None;
    }
    if !family.admits(reading.rotation) {
        debug!(
            "OSD rotation {} contradicts layout family {}",
            reading.rotation,
            family.label()
        );
        return None;
    }
    Some(reading.rotation)
}
