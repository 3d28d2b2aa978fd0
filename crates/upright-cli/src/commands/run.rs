//! Run command - detect and correct page orientation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use upright_core::models::config::{EngineBackend, RewriteConfig};
use upright_core::{
    DecisionEngine, FileOutcome, FileReport, FileRewriter, RunSummary, UprightConfig, UprightError,
    collect_images, create_engine,
};

use super::config::{default_config_path, load_or_default};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Image file, directory or glob pattern
    #[arg(required = true)]
    input: String,

    /// Language set in tesseract syntax (e.g. "srp+srp_latn+eng")
    #[arg(short, long)]
    lang: Option<String>,

    /// Report decisions without modifying files
    #[arg(long)]
    dry_run: bool,

    /// Recurse into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Projection variance ratio separating 0/180 from 90/270 layouts
    #[arg(long)]
    layout_ratio: Option<f64>,

    /// Minimum OCR confidence gap between 0° and 180°
    #[arg(long)]
    confidence_delta: Option<f32>,

    /// Top/bottom margin density ratio
    #[arg(long)]
    margin_ratio: Option<f64>,

    /// Minimum OSD confidence
    #[arg(long)]
    osd_confidence: Option<f32>,

    /// Orientation engine
    #[arg(short, long, value_enum)]
    engine: Option<EngineArg>,

    /// Model directory for the onnx engine
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Per-call engine timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Write a run report (.json for JSON, anything else for CSV)
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum EngineArg {
    /// External tesseract binary (OSD and OCR confidence)
    Tesseract,
    /// Pure Rust ONNX OCR (OCR confidence only)
    Onnx,
    /// No engine; layout and margin evidence only
    None,
}

impl From<EngineArg> for EngineBackend {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Tesseract => EngineBackend::Tesseract,
            EngineArg::Onnx => EngineBackend::Onnx,
            EngineArg::None => EngineBackend::None,
        }
    }
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = resolve_config(&args, config_path)?;
    config.validate()?;

    let files = resolve_inputs(&args.input, &config.rewrite)?;
    if files.is_empty() {
        println!(
            "{} No supported images found in {}",
            style("ℹ").blue(),
            args.input
        );
        return Ok(());
    }

    println!(
        "{} Found {} images to process",
        style("ℹ").blue(),
        files.len()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the current file");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")?
            .progress_chars("=>-"),
    );

    let dry_run = config.rewrite.dry_run;
    let bar = pb.clone();

    // The engine owns a runtime of its own, so it is created and dropped off the async workers.
    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary, UprightError> {
        let engine = create_engine(&config.engine)?;
        let decider = DecisionEngine::new(engine, &config)?;
        let rewriter = FileRewriter::new(&decider, &config.rewrite);

        Ok(rewriter.run(&files, &cancel, |report| {
            let line = format_report(report);
            bar.suspend(|| println!("{}", line));
            bar.inc(1);
        }))
    })
    .await??;

    pb.finish_and_clear();

    if let Some(path) = &args.report {
        write_report(path, &summary)?;
        println!(
            "{} Report written to {}",
            style("✓").green(),
            path.display()
        );
    }

    print_summary(&summary, dry_run);

    Ok(())
}

/// Config file values, then command-line overrides.
fn resolve_config(args: &RunArgs, config_path: Option<&str>) -> anyhow::Result<UprightConfig> {
    let mut config = match config_path {
        Some(path) => UprightConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?,
        None => load_or_default(&default_config_path())?,
    };

    if let Some(lang) = &args.lang {
        config.engine.languages = lang.clone();
    }
    if let Some(engine) = args.engine {
        config.engine.backend = engine.into();
    }
    if let Some(dir) = &args.model_dir {
        config.engine.model_dir = Some(dir.clone());
    }
    if let Some(timeout) = args.timeout {
        config.engine.timeout_secs = timeout;
    }
    if let Some(v) = args.layout_ratio {
        config.thresholds.layout_ratio = v;
    }
    if let Some(v) = args.confidence_delta {
        config.thresholds.confidence_delta = v;
    }
    if let Some(v) = args.margin_ratio {
        config.thresholds.margin_ratio = v;
    }
    if let Some(v) = args.osd_confidence {
        config.thresholds.osd_confidence = v;
    }
    if let Some(jobs) = args.jobs {
        config.rewrite.jobs = jobs;
    }
    config.rewrite.dry_run |= args.dry_run;
    config.rewrite.recursive |= args.recursive;

    Ok(config)
}

/// Existing paths are collected directly; anything else is tried as a glob pattern.
fn resolve_inputs(input: &str, rewrite: &RewriteConfig) -> anyhow::Result<Vec<PathBuf>> {
    let path = Path::new(input);
    if path.exists() {
        return Ok(collect_images(path, rewrite)?);
    }

    if !input.contains(['*', '?', '[']) {
        return Err(UprightError::NotFound(path.to_path_buf()).into());
    }

    let mut files: Vec<PathBuf> = glob(input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && rewrite.is_supported(p))
        .collect();
    files.sort();
    files.dedup();
    debug!("Pattern {} matched {} images", input, files.len());

    Ok(files)
}

fn format_report(report: &FileReport) -> String {
    let path = report.path.display();
    let detail = report
        .decision
        .map(|d| format!("({}, {})", d.rationale().as_str(), d.confidence_tier().as_str()))
        .unwrap_or_default();

    match report.outcome {
        FileOutcome::Rotated => {
            let angle = report.decision.map(|d| d.final_angle()).unwrap_or_default();
            format!(
                "{} {} {}",
                style(format!("[ROTATED {}]", angle)).green(),
                path,
                detail
            )
        }
        FileOutcome::Unchanged => format!("{} {} {}", style("[UNCHANGED]").dim(), path, detail),
        FileOutcome::Skipped => format!("{} {} {}", style("[SKIPPED]").yellow(), path, detail),
        FileOutcome::Failed => format!(
            "{} {}: {}",
            style("[FAILED]").red(),
            path,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    println!(
        "{} Processed {} images in {:.1}s",
        style("✓").green(),
        summary.processed(),
        summary.elapsed_ms as f64 / 1000.0
    );
    println!(
        "   {} rotated, {} unchanged, {} skipped, {} failed",
        style(summary.rotated).green(),
        summary.unchanged,
        style(summary.skipped).yellow(),
        style(summary.failed).red()
    );

    if summary.cancelled {
        println!(
            "{} Cancelled: {} images not processed",
            style("⚠").yellow(),
            summary.not_processed
        );
    }

    if dry_run {
        println!(
            "{} Dry run: {} images would be rotated",
            style("ℹ").blue(),
            summary.rotated
        );
    }

    let failed: Vec<_> = summary
        .reports
        .iter()
        .filter(|r| r.outcome == FileOutcome::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for report in failed {
            println!(
                "  - {}: {}",
                report.path.display(),
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

fn write_report(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    } else {
        write_csv(path, summary)?;
    }
    Ok(())
}

fn write_csv(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file",
        "outcome",
        "angle",
        "rationale",
        "confidence_tier",
        "written",
        "processing_time_ms",
        "error",
    ])?;

    for report in &summary.reports {
        let (angle, rationale, tier) = match report.decision {
            Some(d) => (
                d.final_angle().degrees().to_string(),
                d.rationale().as_str(),
                d.confidence_tier().as_str(),
            ),
            None => (String::new(), "", ""),
        };

        wtr.write_record([
            report.path.display().to_string().as_str(),
            report.outcome.as_str(),
            &angle,
            rationale,
            tier,
            if report.written { "true" } else { "false" },
            &report.elapsed_ms.to_string(),
            report.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let cli = TestCli::parse_from([
            "upright",
            "scans",
            "--lang",
            "srp+srp_latn+eng",
            "--dry-run",
            "--margin-ratio",
            "2.0",
            "--engine",
            "none",
            "-j",
            "4",
        ]);

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        UprightConfig::default().save(&config_path).unwrap();

        let config = resolve_config(&cli.args, config_path.to_str()).unwrap();
        assert_eq!(config.engine.languages, "srp+srp_latn+eng");
        assert_eq!(config.engine.backend, EngineBackend::None);
        assert_eq!(config.thresholds.margin_ratio, 2.0);
        assert_eq!(config.thresholds.layout_ratio, 1.5);
        assert_eq!(config.rewrite.jobs, 4);
        assert!(config.rewrite.dry_run);
        assert!(!config.rewrite.recursive);
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let err = resolve_inputs("/no/such/dir", &RewriteConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UprightError>(),
            Some(UprightError::NotFound(_))
        ));
    }

    #[test]
    fn test_glob_input() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pattern = format!("{}/*", dir.path().display());
        let files = resolve_inputs(&pattern, &RewriteConfig::default()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.png"), dir.path().join("b.png")]);
    }
}
