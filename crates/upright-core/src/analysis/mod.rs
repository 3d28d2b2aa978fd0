//! Structural page analysis that needs no external engine.

mod layout;
mod margin;

pub use layout::{LayoutAnalyzer, LayoutFamily, LayoutMeasurement};
pub use margin::{MarginHeuristic, MarginVerdict};
