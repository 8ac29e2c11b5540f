//! Run diagnostics: stage timings and counts.
//!
//! The pure crate never reads the system time. Callers supply a
//! [`Clock`]; the CLI uses one backed by `std::time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::pipeline::{Analysis, Pipeline};
use crate::structure::Region;
use crate::types::{PipelineConfig, PipelineError};
use crate::volume::Volume;

/// Source of monotonic time.
pub trait Clock {
    /// A point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Slice matching (seconds).
    #[serde(with = "duration_serde")]
    pub match_duration: Duration,
    /// Projection and rasterization (seconds).
    #[serde(with = "duration_serde")]
    pub rasterize_duration: Duration,
    /// Statistics (seconds).
    #[serde(with = "duration_serde")]
    pub measure_duration: Duration,
    /// Whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Counts across the run.
    pub summary: RunSummary,
}

/// Counts describing what a run processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Frames in the volume.
    pub frames: usize,
    /// Regions analysed.
    pub regions: usize,
    /// Contours that referenced a frame in the volume.
    pub matched_contours: usize,
    /// Contours that referenced no frame.
    pub unmatched_contours: usize,
    /// Matched rings skipped for having fewer than three vertices.
    pub degenerate_rings: usize,
    /// (region, frame) pairs that received a mask.
    pub masked_slices: usize,
    /// Voxels selected across all regions.
    pub selected_voxels: usize,
    /// Warnings carried by the result.
    pub warnings: usize,
}

impl RunSummary {
    /// Tally the counts of a finished analysis.
    #[must_use]
    pub fn of(analysis: &Analysis, frames: usize) -> Self {
        let mut summary = Self {
            frames,
            regions: analysis.regions.len(),
            warnings: analysis.warnings.len(),
            ..Self::default()
        };
        for region in &analysis.regions {
            let counts = region.counts();
            summary.matched_contours += counts.matched;
            summary.unmatched_contours += counts.unmatched;
            summary.degenerate_rings += counts.degenerate;
            summary.masked_slices += region.slices().len();
            summary.selected_voxels += region.statistics().volume();
        }
        summary
    }
}

impl RunDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        let s = &self.summary;

        lines.push(format!("Run Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!("Frames: {}  |  Regions: {}", s.frames, s.regions));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());

        lines.push(format!("{:<16} {:>10} {:>10}", "Stage", "Duration", "% Total"));
        lines.push("-".repeat(40));
        let total_ms = duration_ms(self.total_duration);
        for (name, d) in [
            ("Match", self.match_duration),
            ("Rasterize", self.rasterize_duration),
            ("Measure", self.measure_duration),
        ] {
            let ms = duration_ms(d);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contours: {} matched, {} unmatched, {} degenerate",
            s.matched_contours, s.unmatched_contours, s.degenerate_rings,
        ));
        lines.push(format!(
            "Masked slices: {}  |  Selected voxels: {}  |  Warnings: {}",
            s.masked_slices, s.selected_voxels, s.warnings,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Run the full pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// Same as [`crate::process`].
pub fn process_with_diagnostics<C: Clock>(
    volume: Arc<Volume>,
    regions: Vec<Region>,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(Analysis, RunDiagnostics), PipelineError> {
    let cancel = CancelToken::new();
    let frames = volume.len();
    let total_start = clock.now();

    let start = clock.now();
    let matched = Pipeline::new(volume, regions, config.clone()).match_slices();
    let match_duration = clock.elapsed(&start);

    let start = clock.now();
    let rasterized = matched.rasterize(&cancel)?;
    let rasterize_duration = clock.elapsed(&start);

    let start = clock.now();
    let measured = rasterized.measure()?;
    let measure_duration = clock.elapsed(&start);

    let analysis = measured.into_result();
    let total_duration = clock.elapsed(&total_start);

    let diagnostics = RunDiagnostics {
        match_duration,
        rasterize_duration,
        measure_duration,
        total_duration,
        summary: RunSummary::of(&analysis, frames),
    };
    Ok((analysis, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn empty_run_reports_zero_counts() {
        let clock = TickClock(Cell::new(0));
        let (analysis, diag) = process_with_diagnostics(
            Arc::new(Volume::default()),
            Vec::new(),
            &PipelineConfig::default(),
            &clock,
        )
        .unwrap();
        assert!(analysis.regions.is_empty());
        assert_eq!(diag.summary, RunSummary::default());
        assert!(diag.total_duration >= diag.match_duration);
        assert!(diag.report().contains("Frames: 0  |  Regions: 0"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let diag = RunDiagnostics {
            match_duration: Duration::from_millis(1500),
            rasterize_duration: Duration::ZERO,
            measure_duration: Duration::ZERO,
            total_duration: Duration::from_secs(2),
            summary: RunSummary::default(),
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["match_duration"].as_f64().unwrap() - 1.5).abs() < 1e-12);
        let back: RunDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_duration, Duration::from_secs(2));
    }
}
