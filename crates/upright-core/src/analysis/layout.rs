//! Text-line direction from ink projection variance.
//!
//! Printed lines produce strong periodic banding in the row projection when a
//! page is upright or upside down, and in the column projection when it lies
//! on its side. The analyzer can only tell the two families apart; which
//! member of a family applies is left to later stages.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::{InkMask, Rotation};

const EPSILON: f64 = 1e-9;

/// Coarse orientation family of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutFamily {
    /// Lines run horizontally: 0° or 180°.
    Upright,
    /// Lines run vertically: 90° or 270°.
    Sideways,
    /// No dominant direction.
    Unknown,
}

impl LayoutFamily {
    /// Whether `rotation` belongs to this family. Unknown admits every rotation.
    pub fn admits(self, rotation: Rotation) -> bool {
        match self {
            LayoutFamily::Upright => !rotation.is_sideways(),
            LayoutFamily::Sideways => rotation.is_sideways(),
            LayoutFamily::Unknown => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayoutFamily::Upright => "0/180",
            LayoutFamily::Sideways => "90/270",
            LayoutFamily::Unknown => "unknown",
        }
    }
}

/// Projection statistics of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutMeasurement {
    /// Variance of the row ink-density projection.
    pub horizontal_variance: f64,
    /// Variance of the column ink-density projection.
    pub vertical_variance: f64,
    /// `horizontal_variance / vertical_variance`; 1.0 for a page without ink.
    pub ratio: f64,
    /// Fraction of pixels that carry ink.
    pub ink_fraction: f64,
    pub family: LayoutFamily,
}

/// Classifies pages into orientation families.
pub struct LayoutAnalyzer {
    ratio_threshold: f64,
}

impl LayoutAnalyzer {
    /// `ratio_threshold` must be greater than 1; ratios within
    /// `[1/threshold, threshold]` are ambiguous.
    pub fn new(ratio_threshold: f64) -> Self {
        Self { ratio_threshold }
    }

    pub fn analyze(&self, mask: &InkMask) -> LayoutMeasurement {
        let ink_fraction = mask.ink_fraction();

        let rows = mask.row_density();
        let cols = mask.column_density();
        let horizontal_variance = if rows.is_empty() { 0.0 } else { rows.var(0.0) };
        let vertical_variance = if cols.is_empty() { 0.0 } else { cols.var(0.0) };

        let ratio = if horizontal_variance < EPSILON && vertical_variance < EPSILON {
            1.0
        } else {
            (horizontal_variance + EPSILON) / (vertical_variance + EPSILON)
        };

        let family = self.classify(ratio);
        debug!(
            "Layout: h_var={:.6} v_var={:.6} ratio={:.3} -> {}",
            horizontal_variance,
            vertical_variance,
            ratio,
            family.label()
        );

        LayoutMeasurement {
            horizontal_variance,
            vertical_variance,
            ratio,
            ink_fraction,
            family,
        }
    }

    pub fn classify(&self, ratio: f64) -> LayoutFamily {
        if ratio > self.ratio_threshold {
            LayoutFamily::Upright
        } else if ratio < 1.0 / self.ratio_threshold {
            LayoutFamily::Sideways
        } else {
            LayoutFamily::Unknown
        }
    }
}
