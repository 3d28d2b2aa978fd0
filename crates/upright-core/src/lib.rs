//! Core library for page orientation detection and correction.
//!
//! This crate provides:
//! - Structural layout analysis (0/180 vs 90/270 families)
//! - OSD and OCR-confidence evidence from an external engine
//! - A margin heuristic for 0° vs 180°
//! - A precedence policy that leaves pages alone when evidence is weak
//! - Lossless quarter-turn correction written back atomically

pub mod analysis;
pub mod engine;
pub mod error;
pub mod models;
pub mod orientation;
pub mod page;
pub mod rewrite;

#[cfg(test)]
mod testing;

pub use engine::{NullEngine, OrientationEngine, OsdReading, StubEngine, TesseractEngine, create_engine};
#[cfg(feature = "native")]
pub use engine::PureOcrEngine;
pub use error::{EngineError, Result, UprightError};
pub use models::config::UprightConfig;
pub use orientation::{
    Assessment, ConfidenceTier, Decision, DecisionEngine, OrientationEvidence, Rationale,
};
pub use page::{PageImage, PageMetadata, Rotation};
pub use rewrite::{FileOutcome, FileReport, FileRewriter, RunSummary, collect_images};
