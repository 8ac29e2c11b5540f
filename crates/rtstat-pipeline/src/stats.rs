//! Volumetric HU statistics under a region's masks.

use serde::{Deserialize, Serialize};

use crate::types::{Mask, PipelineError};
use crate::volume::{Frame, Volume};

/// Summary of the HU values selected by a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Middle value; mean of the two middle values for an even count.
    pub median: f64,
    /// Number of selected voxels.
    pub volume: usize,
}

/// Statistics for one region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Statistics {
    /// The masks selected no voxels.
    NoData,
    /// At least one voxel was selected.
    Measured(Summary),
}

impl Statistics {
    /// Summarize a multiset of values.
    ///
    /// The result does not depend on the input order: values are sorted
    /// before any arithmetic.
    #[must_use]
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::NoData;
        }
        values.sort_by(f64::total_cmp);

        let n = values.len();
        #[allow(clippy::cast_precision_loss)]
        let count = n as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / count;
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        Self::Measured(Summary {
            min: values[0],
            max: values[n - 1],
            mean,
            std: variance.sqrt(),
            median,
            volume: n,
        })
    }

    /// The summary, or `None` for [`Statistics::NoData`].
    #[must_use]
    pub const fn summary(&self) -> Option<&Summary> {
        match self {
            Self::NoData => None,
            Self::Measured(s) => Some(s),
        }
    }

    /// Number of selected voxels (zero for [`Statistics::NoData`]).
    #[must_use]
    pub const fn volume(&self) -> usize {
        match self {
            Self::NoData => 0,
            Self::Measured(s) => s.volume,
        }
    }
}

/// Collects the HU values under a region's masks, one frame at a time.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAccumulator {
    values: Vec<f64>,
}

impl StatisticsAccumulator {
    /// An empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add every HU value of `frame` selected by `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MaskShapeMismatch`] if the mask does not
    /// have the frame's dimensions.
    pub fn add(&mut self, frame: &Frame, mask: &Mask) -> Result<(), PipelineError> {
        if mask.dimensions() != frame.dimensions() {
            return Err(PipelineError::MaskShapeMismatch {
                expected: frame.dimensions(),
                actual: mask.dimensions(),
            });
        }
        let hu = frame.hu().as_slice();
        self.values.extend(mask.indices().map(|i| hu[i]));
        Ok(())
    }

    /// Number of values collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Summarize everything collected.
    #[must_use]
    pub fn finish(self) -> Statistics {
        Statistics::from_values(self.values)
    }
}

/// Statistics for one region given one mask per frame, in volume order.
///
/// # Errors
///
/// Returns [`PipelineError::MaskCountMismatch`] if `masks` and the volume
/// differ in length, or [`PipelineError::MaskShapeMismatch`] if any mask
/// does not match its frame.
pub fn measure(volume: &Volume, masks: &[Mask]) -> Result<Statistics, PipelineError> {
    if masks.len() != volume.len() {
        return Err(PipelineError::MaskCountMismatch {
            expected: volume.len(),
            actual: masks.len(),
        });
    }
    let mut acc = StatisticsAccumulator::new();
    for (frame, mask) in volume.frames().iter().zip(masks) {
        acc.add(frame, mask)?;
    }
    Ok(acc.finish())
}
