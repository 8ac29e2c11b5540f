//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use rtstat_pipeline::{CancelToken, Pipeline, PipelineConfig, PipelineError, Region, Volume};
//! # fn run(volume: Arc<Volume>, regions: Vec<Region>) -> Result<(), PipelineError> {
//! let cancel = CancelToken::new();
//! let analysis = Pipeline::new(volume, regions, PipelineConfig::default())
//!     .match_slices()
//!     .rasterize(&cancel)?
//!     .measure()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying the volume and regions forward. Rasterization polls the
//! [`CancelToken`] between frames; a cancelled run returns
//! [`PipelineError::Cancelled`] and its partial masks are dropped.
//!
//! Regions are independent of each other. With the `rayon` feature and
//! [`PipelineConfig::parallel`] set, they are rasterized and measured
//! in parallel; the output order always follows the input order.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::matcher::{SliceMatch, match_slices};
use crate::raster::Rasterizer;
use crate::stats::{Statistics, StatisticsAccumulator};
use crate::structure::Region;
use crate::transform::SlicePlane;
use crate::types::{Dimensions, Mask, PipelineConfig, PipelineError, Ring, Warning};
use crate::volume::Volume;

/// The mask and outline of one region on one frame.
///
/// Only frames with at least one matched contour get one.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizedRegion {
    frame_index: usize,
    instance_uid: String,
    mask: Mask,
    rings: Vec<Ring>,
}

impl RasterizedRegion {
    /// Position of the frame in volume order.
    #[must_use]
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Instance UID of the frame.
    #[must_use]
    pub fn instance_uid(&self) -> &str {
        &self.instance_uid
    }

    /// Even-odd mask, same shape as the frame grid.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Pixel-space rings, including degenerate ones.
    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    /// Ring vertices rounded to whole pixels, for outline drawing.
    #[must_use]
    pub fn outlines(&self) -> Vec<Vec<(i64, i64)>> {
        self.rings.iter().map(Ring::rounded).collect()
    }
}

/// How a region's contours fared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContourCounts {
    /// Contours that referenced a frame in the volume.
    pub matched: usize,
    /// Contours that referenced no frame.
    pub unmatched: usize,
    /// Matched rings with fewer than three vertices.
    pub degenerate: usize,
}

/// Everything computed for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAnalysis {
    region: Region,
    slices: Vec<RasterizedRegion>,
    statistics: Statistics,
    counts: ContourCounts,
}

impl RegionAnalysis {
    /// The region.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// Per-frame masks, in volume order.
    #[must_use]
    pub fn slices(&self) -> &[RasterizedRegion] {
        &self.slices
    }

    /// The slice on the frame at `frame_index`, if the region has one.
    ///
    /// `None` means the region selects nothing there: its mask on that
    /// frame is all false with the frame's shape. See [`Self::mask_on`].
    #[must_use]
    pub fn slice_at(&self, frame_index: usize) -> Option<&RasterizedRegion> {
        self.slices
            .binary_search_by_key(&frame_index, RasterizedRegion::frame_index)
            .ok()
            .map(|i| &self.slices[i])
    }

    /// The mask on the frame at `frame_index`, all false when the region
    /// has no slice there.
    ///
    /// `dimensions` is the frame's shape and is only used for the empty
    /// mask.
    #[must_use]
    pub fn mask_on(&self, frame_index: usize, dimensions: Dimensions) -> Cow<'_, Mask> {
        self.slice_at(frame_index).map_or_else(
            || Cow::Owned(Mask::empty(dimensions)),
            |slice| Cow::Borrowed(slice.mask()),
        )
    }

    /// HU statistics over every slice.
    #[must_use]
    pub const fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Contour bookkeeping.
    #[must_use]
    pub const fn counts(&self) -> ContourCounts {
        self.counts
    }
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// One entry per region, in input order.
    pub regions: Vec<RegionAnalysis>,
    /// Non-fatal problems carried over from volume assembly.
    pub warnings: Vec<Warning>,
}

/// Entry point for a staged run.
pub struct Pipeline;

impl Pipeline {
    /// Start a run over `regions` on `volume`.
    pub fn new(volume: Arc<Volume>, regions: Vec<Region>, config: PipelineConfig) -> Pending {
        Pending {
            volume,
            regions,
            config,
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`match_slices`](Self::match_slices) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .match_slices() to continue"]
pub struct Pending {
    volume: Arc<Volume>,
    regions: Vec<Region>,
    config: PipelineConfig,
}

impl Pending {
    /// Regions queued for analysis.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Group every region's contours by frame.
    pub fn match_slices(self) -> Matched {
        let matches: Vec<SliceMatch> = self
            .regions
            .iter()
            .map(|r| match_slices(r.contours(), &self.volume))
            .collect();
        tracing::debug!(
            regions = self.regions.len(),
            matched = matches.iter().map(SliceMatch::matched).sum::<usize>(),
            unmatched = matches.iter().map(SliceMatch::unmatched).sum::<usize>(),
            "matched contours to frames"
        );
        Matched {
            volume: self.volume,
            regions: self.regions,
            config: self.config,
            matches,
        }
    }
}

// ───────────────────────── Stage 1: Matched ──────────────────────────

/// Pipeline state after slice matching.
///
/// Call [`rasterize`](Self::rasterize) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .rasterize() to continue"]
pub struct Matched {
    volume: Arc<Volume>,
    regions: Vec<Region>,
    config: PipelineConfig,
    matches: Vec<SliceMatch>,
}

impl Matched {
    /// Per-region matches, parallel to the region list.
    #[must_use]
    pub fn matches(&self) -> &[SliceMatch] {
        &self.matches
    }

    /// Project and fill every matched contour.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] if `cancel` fires before all
    /// frames are done.
    pub fn rasterize(self, cancel: &CancelToken) -> Result<Rasterized, PipelineError> {
        let volume = &self.volume;
        let config = &self.config;
        let work: Vec<(&Region, &SliceMatch)> = self.regions.iter().zip(&self.matches).collect();

        let rasters = try_map(&work, config.parallel, |&(region, matches)| {
            rasterize_region(volume, region, matches, config, cancel)
        })?;

        tracing::debug!(
            slices = rasters.iter().map(|r| r.slices.len()).sum::<usize>(),
            rasterizer = ?config.rasterizer,
            "rasterized regions"
        );
        Ok(Rasterized {
            volume: self.volume,
            regions: self.regions,
            config: self.config,
            rasters,
        })
    }
}

/// Masks for one region, before measurement.
struct RegionRaster {
    slices: Vec<RasterizedRegion>,
    counts: ContourCounts,
}

fn rasterize_region(
    volume: &Volume,
    region: &Region,
    matches: &SliceMatch,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<RegionRaster, PipelineError> {
    let mut slices = Vec::new();
    let mut counts = ContourCounts {
        matched: matches.matched(),
        unmatched: matches.unmatched(),
        degenerate: 0,
    };

    for (frame_index, frame) in volume.frames().iter().enumerate() {
        if matches.for_frame(frame_index).is_empty() {
            continue;
        }
        cancel.check()?;

        let plane = SlicePlane::of(frame);
        let rings: Vec<Ring> = matches
            .contours_for(region.contours(), frame_index)
            .map(|c| plane.project_ring(&c.points))
            .collect();
        counts.degenerate += rings.iter().filter(|r| r.is_degenerate()).count();

        let mask = config.rasterizer.rasterize(&rings, frame.dimensions());
        slices.push(RasterizedRegion {
            frame_index,
            instance_uid: frame.instance_uid().to_string(),
            mask,
            rings,
        });
    }

    Ok(RegionRaster { slices, counts })
}

// ───────────────────────── Stage 2: Rasterized ───────────────────────

/// Pipeline state after rasterization.
///
/// Call [`measure`](Self::measure) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .measure() to continue"]
pub struct Rasterized {
    volume: Arc<Volume>,
    regions: Vec<Region>,
    config: PipelineConfig,
    rasters: Vec<RegionRaster>,
}

impl Rasterized {
    /// Masks computed for the region at `index`.
    #[must_use]
    pub fn slices(&self, index: usize) -> Option<&[RasterizedRegion]> {
        self.rasters.get(index).map(|r| r.slices.as_slice())
    }

    /// Compute HU statistics for every region.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MaskShapeMismatch`] if a mask does not
    /// match its frame.
    pub fn measure(self) -> Result<Measured, PipelineError> {
        let volume = &self.volume;
        let statistics = try_map(&self.rasters, self.config.parallel, |raster| {
            let mut acc = StatisticsAccumulator::new();
            for slice in &raster.slices {
                acc.add(&volume.frames()[slice.frame_index], &slice.mask)?;
            }
            Ok(acc.finish())
        })?;

        let regions: Vec<RegionAnalysis> = self
            .regions
            .into_iter()
            .zip(self.rasters)
            .zip(statistics)
            .map(|((region, raster), statistics)| RegionAnalysis {
                region,
                slices: raster.slices,
                statistics,
                counts: raster.counts,
            })
            .collect();

        tracing::debug!(regions = regions.len(), "measured regions");
        Ok(Measured {
            volume: self.volume,
            regions,
        })
    }
}

// ───────────────────────── Stage 3: Measured ─────────────────────────

/// Final pipeline state.
#[must_use = "call .into_result() to take the analysis"]
pub struct Measured {
    volume: Arc<Volume>,
    regions: Vec<RegionAnalysis>,
}

impl Measured {
    /// Per-region results.
    #[must_use]
    pub fn regions(&self) -> &[RegionAnalysis] {
        &self.regions
    }

    /// Take the results together with the volume's warnings.
    #[must_use]
    pub fn into_result(self) -> Analysis {
        Analysis {
            regions: self.regions,
            warnings: self.volume.warnings().to_vec(),
        }
    }
}

/// Map `f` over `items`, in parallel when enabled, stopping at the first
/// error.
#[cfg(feature = "rayon")]
fn try_map<T, U, F>(items: &[T], parallel: bool, f: F) -> Result<Vec<U>, PipelineError>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U, PipelineError> + Sync + Send,
{
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    if parallel {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

#[cfg(not(feature = "rayon"))]
fn try_map<T, U, F>(items: &[T], _parallel: bool, f: F) -> Result<Vec<U>, PipelineError>
where
    F: Fn(&T) -> Result<U, PipelineError>,
{
    items.iter().map(f).collect()
}
