//! 0° vs 180° by recognition confidence.
//!
//! Text read upside down recognises badly, so the render that scores higher
//! is taken as upright, but only when the scores are clearly apart. Near
//! ties are noise and would risk flipping correct pages.

use image::DynamicImage;
use tracing::{debug, warn};

use crate::engine::OrientationEngine;
use crate::page::{ImagePreprocessor, Rotation};

/// Outcome of the confidence comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparatorVerdict {
    /// One orientation scored clearly higher.
    Resolved(Rotation),
    /// Scores missing or too close.
    Inconclusive,
}

/// Scores a page as-is and turned 180° with the engine's recognizer.
pub struct ConfidenceComparator<'a, E: OrientationEngine + ?Sized> {
    engine: &'a E,
    languages: &'a str,
    min_delta: f32,
    min_size: u32,
}

impl<'a, E: OrientationEngine + ?Sized> ConfidenceComparator<'a, E> {
    pub fn new(engine: &'a E, languages: &'a str, min_delta: f32, min_size: u32) -> Self {
        Self {
            engine,
            languages,
            min_delta,
            min_size,
        }
    }

    /// Recognition confidence at 0° and at 180°.
    pub fn score(&self, image: &DynamicImage, preprocessor: &ImagePreprocessor) -> (Option<f32>, Option<f32>) {
        let upright = preprocessor.fit_at_least(image, self.min_size);
        let flipped = upright.rotate180();

        let score_0 = self.score_one(&upright, "0°");
        let score_180 = self.score_one(&flipped, "180°");
        (score_0, score_180)
    }

    fn score_one(&self, image: &DynamicImage, label: &str) -> Option<f32> {
        match self.engine.recognition_confidence(image, self.languages) {
            Ok(Some(score)) if score.is_finite() => Some(score.clamp(0.0, 1.0)),
            Ok(_) => None,
            Err(e) => {
                warn!("{} recognition at {} failed: {}", self.engine.name(), label, e);
                None
            }
        }
    }

    pub fn judge(&self, score_0: Option<f32>, score_180: Option<f32>) -> ComparatorVerdict {
        judge_scores(score_0, score_180, self.min_delta)
    }
}

/// Pick the clearly better orientation, or pass.
pub(crate) fn judge_scores(score_0: Option<f32>, score_180: Option<f32>, min_delta: f32) -> ComparatorVerdict {
    let (Some(s0), Some(s180)) = (score_0, score_180) else {
        return ComparatorVerdict::Inconclusive;
    };

    let delta = (s0 - s180).abs();
    debug!("Confidence 0°={:.3} 180°={:.3} delta={:.3} (min {:.3})", s0, s180, delta, min_delta);

    if delta < min_delta {
        return ComparatorVerdict::Inconclusive;
    }
    if s0 > s180 {
        ComparatorVerdict::Resolved(Rotation::Deg0)
    } else {
        ComparatorVerdict::Resolved(Rotation::Deg180)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use crate::testing::text_page;

    #[test]
    fn test_clear_winner() {
        assert_eq!(
            judge_scores(Some(0.91), Some(0.42), 0.05),
            ComparatorVerdict::Resolved(Rotation::Deg0)
        );
        assert_eq!(
            judge_scores(Some(0.30), Some(0.88), 0.05),
            ComparatorVerdict::Resolved(Rotation::Deg180)
        );
    }

    #[test]
    fn test_near_tie_is_inconclusive() {
        assert_eq!(judge_scores(Some(0.80), Some(0.78), 0.05), ComparatorVerdict::Inconclusive);
        assert_eq!(judge_scores(Some(0.0), Some(0.0), 0.05), ComparatorVerdict::Inconclusive);
    }

    #[test]
    fn test_missing_score_is_inconclusive() {
        assert_eq!(judge_scores(None, Some(0.9), 0.05), ComparatorVerdict::Inconclusive);
        assert_eq!(judge_scores(Some(0.9), None, 0.05), ComparatorVerdict::Inconclusive);
    }

    #[test]
    fn test_scores_both_renders() {
        let upright = text_page(300, 420, 30, 100);
        let reference = upright.to_luma8();
        let stub = StubEngine::new().with_confidence(move |img| {
            Ok(Some(if img.to_luma8() == reference { 0.9 } else { 0.35 }))
        });

        let comparator = ConfidenceComparator::new(&stub, "eng", 0.05, 0);
        let preprocessor = ImagePreprocessor::new();

        let (s0, s180) = comparator.score(&upright, &preprocessor);
        assert_eq!((s0, s180), (Some(0.9), Some(0.35)));
        assert_eq!(comparator.judge(s0, s180), ComparatorVerdict::Resolved(Rotation::Deg0));

        let flipped = upright.rotate180();
        let (s0, s180) = comparator.score(&flipped, &preprocessor);
        assert_eq!(comparator.judge(s0, s180), ComparatorVerdict::Resolved(Rotation::Deg180));
        assert_eq!(stub.confidence_calls(), 4);
    }
}
