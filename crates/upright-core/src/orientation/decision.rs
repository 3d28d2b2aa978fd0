//! Decision engine: gathers evidence for a page and settles its orientation.
//!
//! Precedence is an ordered list of stages. Each stage either settles the
//! decision, halts with an inconclusive outcome, or passes to the next one.
//! A page that no stage settles is left unchanged.
//!
//! ```text
//! Start -> FamilyClassified -> { Osd | Comparator | Margin | Inconclusive } -> Final
//! ```

use std::time::Instant;

use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info};

use super::comparator::{ComparatorVerdict, ConfidenceComparator, judge_scores};
use super::osd::{OsdConsultant, gate};
use super::{Decision, OrientationEvidence, Rationale};
use crate::analysis::{LayoutAnalyzer, LayoutFamily, MarginHeuristic, MarginVerdict};
use crate::engine::OrientationEngine;
use crate::error::UprightError;
use crate::models::config::{AnalysisConfig, ThresholdConfig, UprightConfig};
use crate::page::{ImagePreprocessor, Rotation};

/// What a stage concluded.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StageOutcome {
    /// Settled, with or without an independent corroborating signal.
    Resolved {
        rotation: Rotation,
        rationale: Rationale,
        corroborated: bool,
    },
    /// Stop here and leave the page unchanged.
    Halt(Rationale),
    /// Let the next stage try.
    Pass,
}

/// One step of the precedence cascade.
trait EvidenceStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, evidence: &OrientationEvidence, thresholds: &ThresholdConfig) -> StageOutcome;
}

/// Pages without ink are never rotated.
struct BlankGuard {
    min_ink_fraction: f64,
}

impl EvidenceStage for BlankGuard {
    fn name(&self) -> &'static str {
        "blank"
    }

    fn evaluate(&self, evidence: &OrientationEvidence, _: &ThresholdConfig) -> StageOutcome {
        if evidence.ink_fraction() < self.min_ink_fraction {
            StageOutcome::Halt(Rationale::Blank)
        } else {
            StageOutcome::Pass
        }
    }
}

/// OSD is the authority for sideways pages and for pages of unknown family.
struct OsdStage;

impl EvidenceStage for OsdStage {
    fn name(&self) -> &'static str {
        "osd"
    }

    fn evaluate(&self, evidence: &OrientationEvidence, thresholds: &ThresholdConfig) -> StageOutcome {
        let family = evidence.layout_family();
        if family == LayoutFamily::Upright {
            return StageOutcome::Pass;
        }

        match gate(evidence.osd, family, thresholds.osd_confidence) {
            Some(rotation) => StageOutcome::Resolved {
                rotation,
                rationale: Rationale::Osd,
                corroborated: family == LayoutFamily::Sideways,
            },
            // A wrong quarter turn is highly visible; never guess one.
            None => StageOutcome::Halt(Rationale::Inconclusive),
        }
    }
}

/// Recognition confidence settles 0° vs 180° when the scores are clearly apart.
///
/// When both scores are zero the page is halted as textless instead of
/// being handed to the margin stage.
struct ComparatorStage;

impl EvidenceStage for ComparatorStage {
    fn name(&self) -> &'static str {
        "comparator"
    }

    fn evaluate(&self, evidence: &OrientationEvidence, thresholds: &ThresholdConfig) -> StageOutcome {
        if evidence.layout_family() != LayoutFamily::Upright {
            return StageOutcome::Pass;
        }

        // Rules, stamps and figures read as zero both ways; margin density
        // on such a page says nothing about which way is up.
        if matches!(
            (evidence.ocr_confidence_0, evidence.ocr_confidence_180),
            (Some(s0), Some(s180)) if s0 <= 0.0 && s180 <= 0.0
        ) {
            return StageOutcome::Halt(Rationale::Textless);
        }

        match judge_scores(
            evidence.ocr_confidence_0,
            evidence.ocr_confidence_180,
            thresholds.confidence_delta,
        ) {
            ComparatorVerdict::Resolved(rotation) => StageOutcome::Resolved {
                rotation,
                rationale: Rationale::Comparator,
                corroborated: osd_agrees(evidence, thresholds, rotation)
                    || margin_verdict(evidence, thresholds) == MarginVerdict::Resolved(rotation),
            },
            ComparatorVerdict::Inconclusive => StageOutcome::Pass,
        }
    }
}

/// Margin asymmetry is the last resort for 0° vs 180°.
struct MarginStage;

impl EvidenceStage for MarginStage {
    fn name(&self) -> &'static str {
        "margin"
    }

    fn evaluate(&self, evidence: &OrientationEvidence, thresholds: &ThresholdConfig) -> StageOutcome {
        if evidence.layout_family() != LayoutFamily::Upright {
            return StageOutcome::Pass;
        }

        match margin_verdict(evidence, thresholds) {
            MarginVerdict::Resolved(rotation) => StageOutcome::Resolved {
                rotation,
                rationale: Rationale::Margin,
                corroborated: osd_agrees(evidence, thresholds, rotation),
            },
            MarginVerdict::Inconclusive => StageOutcome::Pass,
        }
    }
}

fn osd_agrees(evidence: &OrientationEvidence, thresholds: &ThresholdConfig, rotation: Rotation) -> bool {
    evidence
        .osd
        .is_some_and(|r| r.rotation == rotation && r.confidence >= thresholds.osd_confidence)
}

fn margin_verdict(evidence: &OrientationEvidence, thresholds: &ThresholdConfig) -> MarginVerdict {
    // The band height only matters when measuring; judging needs the threshold alone.
    MarginHeuristic::new(0.0, thresholds.margin_ratio).judge(evidence.margin_ratio)
}

/// Evidence and decision for one page.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub evidence: OrientationEvidence,
    pub decision: Decision,
}

/// Gathers orientation evidence and applies the precedence policy.
pub struct DecisionEngine<E: OrientationEngine> {
    engine: E,
    languages: String,
    thresholds: ThresholdConfig,
    analysis: AnalysisConfig,
    preprocessor: ImagePreprocessor,
    stages: Vec<Box<dyn EvidenceStage>>,
}

impl<E: OrientationEngine> DecisionEngine<E> {
    /// Create a decision engine. The configuration is copied and fixed from here on.
    pub fn new(engine: E, config: &UprightConfig) -> Result<Self, UprightError> {
        config.validate()?;

        let stages: Vec<Box<dyn EvidenceStage>> = vec![
            Box::new(BlankGuard {
                min_ink_fraction: config.analysis.min_ink_fraction,
            }),
            Box::new(OsdStage),
            Box::new(ComparatorStage),
            Box::new(MarginStage),
        ];

        Ok(Self {
            engine,
            languages: config.engine.languages.clone(),
            thresholds: config.thresholds.clone(),
            analysis: config.analysis.clone(),
            preprocessor: ImagePreprocessor::from_config(&config.analysis),
            stages,
        })
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Gather all evidence for a page.
    ///
    /// Blank pages skip the engine entirely. The OSD engine is asked once;
    /// the recognizer only for pages in the 0/180 family.
    pub fn gather(&self, image: &DynamicImage) -> OrientationEvidence {
        let mask = self.preprocessor.binarize(image);
        let layout = LayoutAnalyzer::new(self.thresholds.layout_ratio).analyze(&mask);
        let margin_ratio =
            MarginHeuristic::new(self.analysis.margin_band, self.thresholds.margin_ratio).margin_ratio(&mask);

        let mut evidence = OrientationEvidence {
            layout,
            osd: None,
            ocr_confidence_0: None,
            ocr_confidence_180: None,
            margin_ratio,
        };

        if layout.ink_fraction < self.analysis.min_ink_fraction {
            debug!("Ink fraction {:.5} below minimum, skipping engine", layout.ink_fraction);
            return evidence;
        }

        evidence.osd = OsdConsultant::new(&self.engine, &self.languages, self.analysis.osd_max_size)
            .consult(image, &self.preprocessor);

        if layout.family == LayoutFamily::Upright {
            let comparator = ConfidenceComparator::new(
                &self.engine,
                &self.languages,
                self.thresholds.confidence_delta,
                self.analysis.ocr_min_size,
            );
            let (score_0, score_180) = comparator.score(image, &self.preprocessor);
            evidence.ocr_confidence_0 = score_0;
            evidence.ocr_confidence_180 = score_180;
        }

        evidence
    }

    /// Apply the precedence policy to gathered evidence.
    pub fn decide(&self, evidence: &OrientationEvidence) -> Decision {
        for stage in &self.stages {
            match stage.evaluate(evidence, &self.thresholds) {
                StageOutcome::Resolved {
                    rotation,
                    rationale,
                    corroborated,
                } => {
                    debug!("Stage {} resolved {}", stage.name(), rotation);
                    return Decision::resolved(rotation, rationale, corroborated);
                }
                StageOutcome::Halt(rationale) => {
                    debug!("Stage {} halted: {}", stage.name(), rationale.as_str());
                    return Decision::inconclusive(rationale);
                }
                StageOutcome::Pass => {}
            }
        }
        Decision::inconclusive(Rationale::Inconclusive)
    }

    /// Gather evidence and decide.
    pub fn evaluate(&self, image: &DynamicImage) -> Assessment {
        let start = Instant::now();
        let evidence = self.gather(image);
        let decision = self.decide(&evidence);

        info!(
            "Decision: rotate {} ({}, {}) family {} in {}ms",
            decision.final_angle(),
            decision.rationale().as_str(),
            decision.confidence_tier().as_str(),
            evidence.layout_family().label(),
            start.elapsed().as_millis()
        );

        Assessment { evidence, decision }
    }
}
