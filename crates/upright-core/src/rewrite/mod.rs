//! Applying decisions to files on disk.

mod rewriter;
mod summary;

pub use rewriter::{FileRewriter, collect_images, write_atomic};
pub use summary::{FileOutcome, FileReport, RunSummary};
