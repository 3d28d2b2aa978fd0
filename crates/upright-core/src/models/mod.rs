//! Configuration models.

pub mod config;

pub use config::{
    AnalysisConfig, EngineBackend, EngineConfig, RewriteConfig, ThresholdConfig, UprightConfig,
};
