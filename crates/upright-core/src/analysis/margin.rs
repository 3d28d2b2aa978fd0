//! Top/bottom margin asymmetry as a weak 0° vs 180° signal.
//!
//! Real pages usually leave more whitespace below the text than above it, so
//! when upright the top band carries more ink than the bottom band.

use tracing::debug;

use crate::page::{InkMask, Rotation};

const EPSILON: f64 = 1e-3;

/// Outcome of the margin heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginVerdict {
    /// The page reads as upright (0°) or upside down (180°).
    Resolved(Rotation),
    /// The bands are too similar, or both empty.
    Inconclusive,
}

/// Compares ink density in the top and bottom bands of a page.
pub struct MarginHeuristic {
    band: f64,
    ratio_threshold: f64,
}

impl MarginHeuristic {
    /// `band` is the band height as a fraction of page height.
    pub fn new(band: f64, ratio_threshold: f64) -> Self {
        Self {
            band,
            ratio_threshold,
        }
    }

    /// Top-band ink density divided by bottom-band ink density.
    ///
    /// `None` when neither band has any ink.
    pub fn margin_ratio(&self, mask: &InkMask) -> Option<f64> {
        let height = mask.height();
        if height == 0 {
            return None;
        }
        let band_rows = ((height as f64 * self.band).round() as usize).clamp(1, height);

        let top = mask.band_density(0, band_rows);
        let bottom = mask.band_density(height - band_rows, height);
        debug!("Margin bands ({} rows): top={:.4} bottom={:.4}", band_rows, top, bottom);

        if top == 0.0 && bottom == 0.0 {
            return None;
        }
        Some((top + EPSILON) / (bottom + EPSILON))
    }

    pub fn judge(&self, margin_ratio: Option<f64>) -> MarginVerdict {
        match margin_ratio {
            Some(ratio) if ratio >= self.ratio_threshold => MarginVerdict::Resolved(Rotation::Deg0),
            Some(ratio) if ratio <= 1.0 / self.ratio_threshold => {
                MarginVerdict::Resolved(Rotation::Deg180)
            }
            _ => MarginVerdict::Inconclusive,
        }
    }
}
