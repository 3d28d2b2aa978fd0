//! In-place correction of image files.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::summary::{FileReport, RunSummary};
use crate::engine::OrientationEngine;
use crate::error::UprightError;
use crate::models::config::RewriteConfig;
use crate::orientation::DecisionEngine;
use crate::page::{PageImage, Rotation};

/// Collect the image files under `path`, sorted by path.
///
/// A file is returned as-is when its extension is supported. Directories
/// are scanned one level deep unless `config.recursive` is set.
pub fn collect_images(path: &Path, config: &RewriteConfig) -> Result<Vec<PathBuf>, UprightError> {
    if !path.exists() {
        return Err(UprightError::NotFound(path.to_path_buf()));
    }

    let mut files = Vec::new();
    if path.is_file() {
        if config.is_supported(path) {
            files.push(path.to_path_buf());
        }
    } else {
        scan_dir(path, config, &mut files)?;
    }

    files.sort();
    debug!("Found {} images under {}", files.len(), path.display());
    Ok(files)
}

fn scan_dir(dir: &Path, config: &RewriteConfig, files: &mut Vec<PathBuf>) -> Result<(), UprightError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if config.recursive {
                scan_dir(&path, config, files)?;
            }
        } else if config.is_supported(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Replace `path` with `bytes` via a temp file in the same directory.
///
/// Readers see either the old or the new content, never a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), UprightError> {
    let write_err = |source: std::io::Error| UprightError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Decides and corrects files one by one, or on a rayon pool of `jobs` threads.
pub struct FileRewriter<'a, E: OrientationEngine> {
    engine: &'a DecisionEngine<E>,
    config: &'a RewriteConfig,
}

impl<'a, E: OrientationEngine> FileRewriter<'a, E> {
    pub fn new(engine: &'a DecisionEngine<E>, config: &'a RewriteConfig) -> Self {
        Self { engine, config }
    }

    /// Decide one file and rewrite it if the decision calls for it.
    ///
    /// Errors never escape; they are recorded in the report.
    pub fn process_file(&self, path: &Path) -> FileReport {
        let start = Instant::now();

        let page = match PageImage::open(path) {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return FileReport::failed(path.to_path_buf(), None, e.to_string(), start.elapsed());
            }
        };

        let decision = self.engine.evaluate(&page.image).decision;
        info!(
            "{}: rotate {} ({})",
            path.display(),
            decision.final_angle(),
            decision.rationale().as_str()
        );

        if !decision.applied() || self.config.dry_run {
            return FileReport::decided(path.to_path_buf(), decision, false, start.elapsed());
        }

        match self.write_rotated(&page, decision.final_angle()) {
            Ok(()) => FileReport::decided(path.to_path_buf(), decision, true, start.elapsed()),
            Err(e) => {
                warn!("Failed to rewrite {}: {}", path.display(), e);
                FileReport::failed(path.to_path_buf(), Some(decision), e.to_string(), start.elapsed())
            }
        }
    }

    fn write_rotated(&self, page: &PageImage, rotation: Rotation) -> Result<(), UprightError> {
        let rotated = rotation.apply(&page.image);
        let bytes = page.encode(&rotated, self.config.jpeg_quality)?;
        write_atomic(&page.path, &bytes)
    }

    /// Process `files` in order.
    ///
    /// `cancel` is checked before each file; once set, the remaining files
    /// are counted as not processed. `on_report` sees reports in file order
    /// whatever the number of workers.
    pub fn run<F>(&self, files: &[PathBuf], cancel: &AtomicBool, mut on_report: F) -> RunSummary
    where
        F: FnMut(&FileReport),
    {
        let start = Instant::now();
        let mut summary = RunSummary::new(self.config.dry_run);
        let jobs = self.config.jobs.max(1).min(files.len().max(1));

        if jobs == 1 {
            self.run_sequential(files, cancel, &mut summary, &mut on_report);
        } else {
            self.run_parallel(files, cancel, jobs, &mut summary, &mut on_report);
        }

        summary.not_processed = files.len() - summary.processed();
        summary.cancelled = summary.not_processed > 0;
        if summary.cancelled {
            warn!("Run cancelled, {} files not processed", summary.not_processed);
        }
        summary.finish(start.elapsed());
        summary
    }

    fn run_sequential<F>(&self, files: &[PathBuf], cancel: &AtomicBool, summary: &mut RunSummary, on_report: &mut F)
    where
        F: FnMut(&FileReport),
    {
        for path in files {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let report = self.process_file(path);
            on_report(&report);
            summary.record(report);
        }
    }

    fn run_parallel<F>(
        &self,
        files: &[PathBuf],
        cancel: &AtomicBool,
        jobs: usize,
        summary: &mut RunSummary,
        on_report: &mut F,
    ) where
        F: FnMut(&FileReport),
    {
        let pool = match ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Failed to start {} workers, processing sequentially: {}", jobs, e);
                self.run_sequential(files, cancel, summary, on_report);
                return;
            }
        };

        debug!("Processing {} files with {} workers", files.len(), jobs);
        let (tx, rx) = mpsc::channel::<(usize, FileReport)>();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    files.par_iter().enumerate().for_each_with(tx, |tx, (index, path)| {
                        if cancel.load(Ordering::SeqCst) {
                            return;
                        }
                        let _ = tx.send((index, self.process_file(path)));
                    });
                });
            });

            // Reports arrive out of order; release each once its predecessors are in.
            let mut pending = BTreeMap::new();
            let mut next = 0;
            for (index, report) in rx {
                pending.insert(index, report);
                while let Some(report) = pending.remove(&next) {
                    on_report(&report);
                    summary.record(report);
                    next += 1;
                }
            }

            // Files skipped after cancellation leave gaps; keep the rest in order.
            for report in pending.into_values() {
                on_report(&report);
                summary.record(report);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NullEngine, OsdReading, StubEngine};
    use crate::models::config::UprightConfig;
    use crate::orientation::Rationale;
    use crate::rewrite::FileOutcome;
    use crate::page::{PageMetadata, encode_image};
    use crate::testing::{exif_chunk, text_page};
    use image::metadata::Orientation;
    use image::{GenericImageView, ImageFormat};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn null_engine() -> DecisionEngine<NullEngine> {
        DecisionEngine::new(NullEngine, &UprightConfig::default()).unwrap()
    }

    fn upside_down(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        text_page(400, 560, 30, 180).rotate180().save(&path).unwrap();
        path
    }

    fn upright(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        text_page(400, 560, 30, 180).save(&path).unwrap();
        path
    }

    #[test]
    fn test_collect_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["c.png", "a.JPG", "b.tiff", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/d.png"), b"x").unwrap();

        let flat = collect_images(dir.path(), &RewriteConfig::default()).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.tiff", "c.png"]);

        let config = RewriteConfig {
            recursive: true,
            ..Default::default()
        };
        let deep = collect_images(dir.path(), &config).unwrap();
        assert_eq!(deep.len(), 4);
        assert_eq!(deep[3], dir.path().join("sub").join("d.png"));
    }

    #[test]
    fn test_collect_missing_path() {
        let err = collect_images(Path::new("/definitely/not/here"), &RewriteConfig::default()).unwrap_err();
        assert!(matches!(err, UprightError::NotFound(_)));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.bin");
        fs::write(&path, b"old").unwrap();

        write_atomic(&path, b"new content").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new content");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dry_run_never_writes() {
        let dir = TempDir::new().unwrap();
        let path = upside_down(dir.path(), "page.png");
        let before = fs::read(&path).unwrap();

        let engine = null_engine();
        let config = RewriteConfig {
            dry_run: true,
            ..Default::default()
        };
        let report = FileRewriter::new(&engine, &config).process_file(&path);

        assert_eq!(report.outcome, FileOutcome::Rotated);
        assert!(!report.written);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_rewrite_matches_dry_run_decision() {
        let dir = TempDir::new().unwrap();
        let path = upside_down(dir.path(), "page.png");
        let engine = null_engine();

        let dry = RewriteConfig {
            dry_run: true,
            ..Default::default()
        };
        let predicted = FileRewriter::new(&engine, &dry).process_file(&path).decision.unwrap();

        let config = RewriteConfig::default();
        let report = FileRewriter::new(&engine, &config).process_file(&path);
        assert_eq!(report.decision, Some(predicted));
        assert!(report.written);

        let expected = text_page(400, 560, 30, 180).to_luma8();
        let rewritten = image::open(&path).unwrap().to_luma8();
        assert_eq!(rewritten, expected);

        // A second pass finds nothing to do
        let again = FileRewriter::new(&engine, &config).process_file(&path);
        assert_eq!(again.outcome, FileOutcome::Unchanged);
        assert!(!again.written);
    }

    #[test]
    fn test_upright_file_is_untouched() {
        let dir = TempDir::new().unwrap();
        let path = upright(dir.path(), "page.png");
        let before = fs::read(&path).unwrap();

        let engine = null_engine();
        let config = RewriteConfig::default();
        let report = FileRewriter::new(&engine, &config).process_file(&path);
        assert_eq!(report.outcome, FileOutcome::Unchanged);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_sideways_file_is_turned_upright() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.jpg");
        text_page(400, 560, 30, 120).rotate90().save(&path).unwrap();

        let stub = StubEngine::new().with_osd(|img| {
            Ok((img.width() > img.height()).then_some(OsdReading {
                rotation: Rotation::Deg270,
                confidence: 0.9,
            }))
        });
        let engine = DecisionEngine::new(stub, &UprightConfig::default()).unwrap();
        let config = RewriteConfig::default();
        let report = FileRewriter::new(&engine, &config).process_file(&path);

        let decision = report.decision.unwrap();
        assert_eq!(decision.final_angle(), Rotation::Deg270);
        assert_eq!(decision.rationale(), Rationale::Osd);
        assert!(report.written);

        let rewritten = image::open(&path).unwrap();
        assert_eq!(rewritten.dimensions(), (400, 560));
        assert_eq!(
            image::ImageFormat::from_path(&path).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_rewrite_keeps_exif() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.jpg");
        let tagged = PageMetadata {
            exif: Some(exif_chunk(1)),
            icc_profile: None,
        };
        let page = text_page(400, 560, 30, 180).rotate180();
        fs::write(&path, encode_image(&page, ImageFormat::Jpeg, 95, &tagged).unwrap()).unwrap();

        let engine = null_engine();
        let config = RewriteConfig::default();
        let report = FileRewriter::new(&engine, &config).process_file(&path);
        assert_eq!(report.outcome, FileOutcome::Rotated);
        assert!(report.written);

        let rewritten = PageImage::open(&path).unwrap();
        let exif = rewritten.metadata.exif.expect("exif dropped on rewrite");
        assert_eq!(Orientation::from_exif_chunk(&exif), Some(Orientation::NoTransforms));
    }

    #[test]
    fn test_corrupt_file_does_not_stop_run() {
        let dir = TempDir::new().unwrap();
        let first = upside_down(dir.path(), "a.png");
        let corrupt = dir.path().join("b.png");
        fs::write(&corrupt, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        let last = upright(dir.path(), "c.png");

        let engine = null_engine();
        let config = RewriteConfig::default();
        let files = collect_images(dir.path(), &config).unwrap();
        let cancel = AtomicBool::new(false);
        let summary = FileRewriter::new(&engine, &config).run(&files, &cancel, |_| {});

        assert_eq!(
            (summary.rotated, summary.unchanged, summary.failed),
            (1, 1, 1)
        );
        assert!(!summary.cancelled);
        assert_eq!(summary.reports[0].path, first);
        assert_eq!(summary.reports[1].outcome, FileOutcome::Failed);
        assert!(summary.reports[1].error.as_deref().unwrap().contains("b.png"));
        assert_eq!(summary.reports[2].path, last);
    }

    #[test]
    fn test_cancelled_run_counts_remaining() {
        let dir = TempDir::new().unwrap();
        let files = vec![upside_down(dir.path(), "a.png"), upside_down(dir.path(), "b.png")];
        let before = fs::read(&files[0]).unwrap();

        let engine = null_engine();
        let config = RewriteConfig::default();
        let cancel = AtomicBool::new(true);
        let summary = FileRewriter::new(&engine, &config).run(&files, &cancel, |_| {});

        assert!(summary.cancelled);
        assert_eq!(summary.not_processed, 2);
        assert_eq!(summary.processed(), 0);
        assert_eq!(fs::read(&files[0]).unwrap(), before);
    }

    #[test]
    fn test_cancelled_parallel_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..4).map(|i| upside_down(dir.path(), &format!("p{i}.png"))).collect();
        let before = fs::read(&files[3]).unwrap();

        let engine = null_engine();
        let config = RewriteConfig {
            jobs: 3,
            ..Default::default()
        };
        let cancel = AtomicBool::new(true);
        let mut seen = 0;
        let summary = FileRewriter::new(&engine, &config).run(&files, &cancel, |_| seen += 1);

        assert_eq!(seen, 0);
        assert!(summary.cancelled);
        assert_eq!(summary.not_processed, 4);
        assert_eq!(fs::read(&files[3]).unwrap(), before);
    }

    #[test]
    fn test_workers_keep_file_order() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..6)
            .map(|i| {
                if i % 2 == 0 {
                    upside_down(dir.path(), &format!("p{i}.png"))
                } else {
                    upright(dir.path(), &format!("p{i}.png"))
                }
            })
            .collect();

        let engine = null_engine();
        let config = RewriteConfig {
            jobs: 3,
            dry_run: true,
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();
        let summary = FileRewriter::new(&engine, &config).run(&files, &cancel, |r| seen.push(r.path.clone()));

        assert_eq!(seen, files);
        assert_eq!((summary.rotated, summary.unchanged), (3, 3));
        assert!(summary.dry_run);
    }
}
