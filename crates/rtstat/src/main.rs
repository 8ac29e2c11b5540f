//! rtstat: per-region HU statistics for an RT Structure Set.
//!
//! Reads a directory holding one CT series and its RT Structure Set,
//! rasterizes every region's contours onto the slices they were drawn
//! on, and prints one row of statistics per region.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin rtstat -- [OPTIONS] <DIR>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rtstat_pipeline::diagnostics::{Clock, RunDiagnostics};
use rtstat_pipeline::{IdAllocator, PipelineConfig, RasterizerKind, Warning};
use tracing_subscriber::EnvFilter;

/// Per-region Hounsfield statistics from a CT series and its RT
/// Structure Set.
#[derive(Parser)]
#[command(name = "rtstat", version)]
struct Cli {
    /// Directory holding the CT images and the structure set.
    dir: PathBuf,

    /// Structure set file to use instead of the one found in `DIR`.
    #[arg(long)]
    structure: Option<PathBuf>,

    /// Polygon fill strategy.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RASTERIZER)]
    rasterizer: Rasterizer,

    /// Rasterize regions on one thread.
    #[arg(long)]
    sequential: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, `--rasterizer` and `--sequential` are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the results as JSON rows instead of a table.
    #[arg(long)]
    json: bool,

    /// Print per-stage timing and counts to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Number of runs for averaging the timings.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,
}

/// Fill strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Rasterizer {
    /// Crossing-number test for every pixel in the bounding box.
    PointInPolygon,
    /// Sorted edge crossings filled span by span.
    ScanLine,
}

const fn rasterizer_from_pipeline(kind: RasterizerKind) -> Rasterizer {
    match kind {
        RasterizerKind::PointInPolygon => Rasterizer::PointInPolygon,
        RasterizerKind::ScanLine => Rasterizer::ScanLine,
    }
}

/// The CLI default, derived from [`PipelineConfig::DEFAULT_RASTERIZER`].
const CLI_DEFAULT_RASTERIZER: Rasterizer =
    rasterizer_from_pipeline(PipelineConfig::DEFAULT_RASTERIZER);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config-json` wins over the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        rasterizer: match cli.rasterizer {
            Rasterizer::PointInPolygon => RasterizerKind::PointInPolygon,
            Rasterizer::ScanLine => RasterizerKind::ScanLine,
        },
        parallel: !cli.sequential,
    })
}

/// Pick the structure set: the explicit one, else the first in the
/// directory.
fn structure_path(cli: &Cli, found: &[PathBuf]) -> Result<PathBuf, rtstat_io::ReadError> {
    if let Some(path) = &cli.structure {
        return Ok(path.clone());
    }
    let first = found
        .first()
        .ok_or_else(|| rtstat_io::ReadError::NoStructureSet(cli.dir.clone()))?;
    if found.len() > 1 {
        tracing::warn!(
            using = %first.display(),
            others = found.len() - 1,
            "directory holds more than one structure set"
        );
    }
    Ok(first.clone())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let scan = match rtstat_io::scan_directory(&cli.dir) {
        Ok(scan) => scan,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let structure = match structure_path(&cli, &scan.structure_sets)
        .and_then(|path| rtstat_io::load_structure_set(&path))
    {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let volume = Arc::new(rtstat_io::load_volume(&scan.images, scan.warnings));
    if volume.is_empty() {
        eprintln!("Error: no usable CT images in {}", cli.dir.display());
        return ExitCode::FAILURE;
    }

    eprintln!("Series: {} ({} frames)", cli.dir.display(), volume.len());
    eprintln!("Regions: {}", structure.rois.len());
    eprintln!("Config: {config:?}");

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut analysis = None;

    for run in 0..cli.runs {
        let regions = rtstat_pipeline::label_regions(structure.rois.clone(), &mut IdAllocator::new());
        match rtstat_pipeline::diagnostics::process_with_diagnostics(
            Arc::clone(&volume),
            regions,
            &config,
            &StdClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.diagnostics {
                    if cli.runs > 1 {
                        eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
                    }
                    eprintln!("{}\n", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
                analysis = Some(result);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.diagnostics && cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(analysis) = analysis else {
        return ExitCode::FAILURE;
    };
    print_warnings(structure.warnings.iter().chain(&analysis.warnings));

    let rows = report::rows(&analysis);
    if cli.json {
        match serde_json::to_string_pretty(&rows) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing results: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report::table(&rows));
    }

    ExitCode::SUCCESS
}

fn print_warnings<'a>(warnings: impl Iterator<Item = &'a Warning>) {
    for w in warnings {
        eprintln!("warning: {w}");
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&RunDiagnostics) -> Duration;

/// Print aggregated timings across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
    if all_diagnostics.is_empty() {
        return;
    }

    eprintln!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let mean_ms = |extract: StageExtractor| {
        all_diagnostics
            .iter()
            .map(|d| extract(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64
    };

    let totals: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();
    let min = totals.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = totals.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = mean_ms(|d| d.total_duration);
    eprintln!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    eprintln!();
    eprintln!("{:<24} {:>12}", "Stage", "Mean (ms)");
    eprintln!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Match", |d| d.match_duration),
        ("Rasterize", |d| d.rasterize_duration),
        ("Measure", |d| d.measure_duration),
    ];
    for (name, extractor) in stage_extractors {
        eprintln!("{name:<24} {:>10.3}ms", mean_ms(*extractor));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rtstat").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_follow_the_pipeline() {
        let config = config_from_cli(&parse(&["ct"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_build_the_config() {
        let config =
            config_from_cli(&parse(&["ct", "--rasterizer", "point-in-polygon", "--sequential"]))
                .unwrap();
        assert_eq!(config.rasterizer, RasterizerKind::PointInPolygon);
        assert!(!config.parallel);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "ct",
            "--sequential",
            "--config-json",
            r#"{"rasterizer":"PointInPolygon"}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.rasterizer, RasterizerKind::PointInPolygon);
        assert!(config.parallel);
        assert!(config_from_cli(&parse(&["ct", "--config-json", "{"])).is_err());
    }

    #[test]
    fn explicit_structure_wins() {
        let cli = parse(&["ct", "--structure", "RS.dcm"]);
        assert_eq!(
            structure_path(&cli, &[PathBuf::from("ct/RS1.dcm")]).unwrap(),
            PathBuf::from("RS.dcm")
        );
        assert!(matches!(
            structure_path(&parse(&["ct"]), &[]),
            Err(rtstat_io::ReadError::NoStructureSet(_))
        ));
    }
}
