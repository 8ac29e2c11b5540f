//! rtstat-pipeline: radiotherapy contours to per-region HU statistics
//! (sans-IO).
//!
//! Takes a CT [`Volume`] and named regions of patient-space contours and
//! produces, per region, one even-odd mask per contoured slice and a
//! [`Statistics`] record over every masked voxel:
//! slice matching -> projection -> rasterization -> statistics.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! frames and contours. Reading DICOM files lives in `rtstat-io`.

pub mod cancel;
pub mod diagnostics;
pub mod id;
pub mod matcher;
pub mod pipeline;
pub mod raster;
pub mod session;
pub mod stats;
pub mod structure;
pub mod transform;
pub mod types;
pub mod volume;
pub mod worker;

use std::sync::Arc;

pub use cancel::CancelToken;
pub use id::{IdAllocator, code};
pub use pipeline::{Analysis, ContourCounts, Pipeline, RasterizedRegion, RegionAnalysis};
pub use raster::{Rasterizer, RasterizerKind};
pub use session::{AnalysisJob, JobOutput, Session};
pub use stats::{Statistics, Summary};
pub use structure::{ContourInstance, Region, RoiContours};
pub use transform::SlicePlane;
pub use types::{
    ContourError, Dimensions, FrameError, Mask, PipelineConfig, PipelineError, Point, Point3,
    Ring, Warning,
};
pub use volume::{Frame, FrameHeader, Orientation, PixelSpacing, Volume};
pub use worker::AnalysisWorker;

/// Give each parsed region the next id from `ids`, in input order.
#[must_use]
pub fn label_regions(rois: Vec<RoiContours>, ids: &mut IdAllocator) -> Vec<Region> {
    rois.into_iter()
        .map(|roi| Region::new(ids.allocate(), roi))
        .collect()
}

/// Run the full pipeline over `rois` on `volume`.
///
/// Regions are labelled `A`, `B`, ... in input order by a fresh
/// [`IdAllocator`].
///
/// # Pipeline steps
///
/// 1. Match each region's contours to frames by instance UID
/// 2. Project matched contours to pixel space
/// 3. Rasterize with even-odd parity (strategy from `config`)
/// 4. Aggregate masked HU values per region
///
/// # Errors
///
/// Returns [`PipelineError::MaskShapeMismatch`] if a mask does not match
/// its frame; this does not happen for masks built by the pipeline.
pub fn process(
    volume: Arc<Volume>,
    rois: Vec<RoiContours>,
    config: &PipelineConfig,
) -> Result<Analysis, PipelineError> {
    let regions = label_regions(rois, &mut IdAllocator::new());
    Ok(Pipeline::new(volume, regions, config.clone())
        .match_slices()
        .rasterize(&CancelToken::new())?
        .measure()?
        .into_result())
}
