//! Orientation decisions: evidence, the stages that weigh it, and the result.

mod comparator;
mod decision;
mod osd;

pub use comparator::{ComparatorVerdict, ConfidenceComparator};
pub use decision::{Assessment, DecisionEngine};
pub use osd::OsdConsultant;

use serde::Serialize;

use crate::analysis::{LayoutFamily, LayoutMeasurement};
use crate::engine::OsdReading;
use crate::page::Rotation;

/// Which stage settled a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rationale {
    /// The OSD reading passed its confidence gate.
    Osd,
    /// OCR confidence at 0° and 180° differed clearly.
    Comparator,
    /// Top/bottom margin asymmetry.
    Margin,
    /// The page carries no ink.
    Blank,
    /// The page carries ink but the recognizer read no text either way up.
    Textless,
    /// No stage could settle the orientation.
    Inconclusive,
}

impl Rationale {
    pub fn as_str(self) -> &'static str {
        match self {
            Rationale::Osd => "osd",
            Rationale::Comparator => "comparator",
            Rationale::Margin => "margin",
            Rationale::Blank => "blank",
            Rationale::Textless => "textless",
            Rationale::Inconclusive => "inconclusive",
        }
    }
}

/// How much trust a decision deserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// Settled by one stage and corroborated by an independent signal.
    High,
    /// Settled by one stage alone.
    Low,
    /// Not settled; the page is left as it is.
    Inconclusive,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Low => "low",
            ConfidenceTier::Inconclusive => "inconclusive",
        }
    }
}

/// Final orientation decision for one page.
///
/// An inconclusive decision never rotates: the constructors guarantee
/// `final_angle == 0°` and `applied == false` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    final_angle: Rotation,
    applied: bool,
    rationale: Rationale,
    confidence_tier: ConfidenceTier,
}

impl Decision {
    /// A decision settled by `rationale`.
    pub fn resolved(final_angle: Rotation, rationale: Rationale, corroborated: bool) -> Self {
        Self {
            final_angle,
            applied: !final_angle.is_identity(),
            rationale,
            confidence_tier: if corroborated {
                ConfidenceTier::High
            } else {
                ConfidenceTier::Low
            },
        }
    }

    /// Leave the page unchanged.
    pub fn inconclusive(rationale: Rationale) -> Self {
        Self {
            final_angle: Rotation::Deg0,
            applied: false,
            rationale,
            confidence_tier: ConfidenceTier::Inconclusive,
        }
    }

    /// Clockwise rotation to apply.
    pub fn final_angle(&self) -> Rotation {
        self.final_angle
    }

    /// Whether the decision calls for rewriting the page.
    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn rationale(&self) -> Rationale {
        self.rationale
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        self.confidence_tier
    }

    pub fn is_inconclusive(&self) -> bool {
        self.confidence_tier == ConfidenceTier::Inconclusive
    }
}

/// Everything known about one page's orientation.
///
/// Built once per image and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrientationEvidence {
    /// Projection statistics and family.
    pub layout: LayoutMeasurement,
    /// OSD reading, absent if the engine had nothing or failed.
    pub osd: Option<OsdReading>,
    /// Recognition confidence of the page as it is.
    pub ocr_confidence_0: Option<f32>,
    /// Recognition confidence of the page turned 180°.
    pub ocr_confidence_180: Option<f32>,
    /// Top-band ink density ÷ bottom-band ink density.
    pub margin_ratio: Option<f64>,
}

impl OrientationEvidence {
    pub fn layout_family(&self) -> LayoutFamily {
        self.layout.family
    }

    pub fn ink_fraction(&self) -> f64 {
        self.layout.ink_fraction
    }
}
