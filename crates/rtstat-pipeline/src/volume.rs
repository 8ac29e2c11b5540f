//! CT frames and the volume they form.
//!
//! A [`Frame`] is one validated CT slice: raw stored pixels, the derived
//! Hounsfield grid, and the geometry needed to project patient-space
//! contours onto it. A [`Volume`] owns the frames in a fixed, documented
//! order and remembers which candidate frames were rejected.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, FrameError, Grid, Point3, Warning};

/// Maximum deviation from unit length / perpendicularity accepted for
/// the orientation cosines.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Physical pixel size in millimetres, in DICOM `PixelSpacing` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSpacing {
    /// Distance between the centres of adjacent rows.
    pub row: f64,
    /// Distance between the centres of adjacent columns.
    pub column: f64,
}

impl PixelSpacing {
    /// Create a new spacing.
    #[must_use]
    pub const fn new(row: f64, column: f64) -> Self {
        Self { row, column }
    }

    fn is_valid(self) -> bool {
        self.row.is_finite() && self.column.is_finite() && self.row > 0.0 && self.column > 0.0
    }
}

/// Direction cosines of a slice, as stored in `ImageOrientationPatient`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Direction of increasing column index.
    pub row: Point3,
    /// Direction of increasing row index.
    pub column: Point3,
}

impl Orientation {
    /// Standard axial orientation `[1, 0, 0, 0, 1, 0]`.
    pub const AXIAL: Self = Self::from_cosines([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

    /// Split the six-component cosine vector into its two directions.
    #[must_use]
    pub const fn from_cosines(c: [f64; 6]) -> Self {
        Self {
            row: Point3::new(c[0], c[1], c[2]),
            column: Point3::new(c[3], c[4], c[5]),
        }
    }

    /// The six-component cosine vector.
    #[must_use]
    pub const fn cosines(self) -> [f64; 6] {
        [
            self.row.x,
            self.row.y,
            self.row.z,
            self.column.x,
            self.column.y,
            self.column.z,
        ]
    }

    /// Slice normal (`row × column`).
    #[must_use]
    pub fn normal(self) -> Point3 {
        self.row.cross(self.column)
    }

    /// Whether both cosines are unit length and mutually perpendicular
    /// within `tolerance`.
    #[must_use]
    pub fn is_orthonormal(self, tolerance: f64) -> bool {
        self.row.is_finite()
            && self.column.is_finite()
            && (self.row.norm() - 1.0).abs() <= tolerance
            && (self.column.norm() - 1.0).abs() <= tolerance
            && self.row.dot(self.column).abs() <= tolerance
    }
}

/// Header fields describing one CT slice.
///
/// This is the contract with whatever reads the image files: every field
/// must be present before a [`Frame`] can be built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// SOP Instance UID of the slice.
    pub instance_uid: String,
    /// Columns x rows.
    pub dimensions: Dimensions,
    /// Multiplier from stored value to HU.
    pub rescale_slope: f64,
    /// Offset from stored value to HU.
    pub rescale_intercept: f64,
    /// Patient-space position of the centre of the first pixel.
    pub position: Point3,
    /// Row and column direction cosines.
    pub orientation: Orientation,
    /// Pixel spacing.
    pub spacing: PixelSpacing,
}

/// One validated CT slice. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    header: FrameHeader,
    pixels: Grid<i32>,
    hu: Grid<f64>,
}

impl Frame {
    /// Validate the header and derive the HU grid.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the spacing is not positive, the
    /// orientation is not orthonormal, the position or rescale values are
    /// not finite, or `pixels` does not hold `rows * columns` values.
    pub fn new(header: FrameHeader, pixels: Vec<i32>) -> Result<Self, FrameError> {
        let dims = header.dimensions;
        if dims.cell_count() == 0 {
            return Err(FrameError::EmptyGrid);
        }
        if !header.spacing.is_valid() {
            return Err(FrameError::InvalidSpacing {
                row: header.spacing.row,
                column: header.spacing.column,
            });
        }
        if !header.orientation.is_orthonormal(ORTHONORMAL_TOLERANCE) {
            return Err(FrameError::NonOrthonormalOrientation(
                header.orientation.cosines(),
            ));
        }
        if !header.position.is_finite() {
            return Err(FrameError::NonFinitePosition);
        }
        let (slope, intercept) = (header.rescale_slope, header.rescale_intercept);
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(FrameError::NonFiniteRescale { slope, intercept });
        }

        let actual = pixels.len();
        let pixels = Grid::from_vec(dims, pixels).ok_or(FrameError::PixelCountMismatch {
            expected: dims.cell_count(),
            actual,
        })?;
        let hu = pixels.map(|&v| f64::from(v).mul_add(slope, intercept));

        Ok(Self { header, pixels, hu })
    }

    /// The header this frame was built from.
    #[must_use]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// SOP Instance UID.
    #[must_use]
    pub fn instance_uid(&self) -> &str {
        &self.header.instance_uid
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.header.dimensions
    }

    /// Raw stored pixel values.
    #[must_use]
    pub const fn pixels(&self) -> &Grid<i32> {
        &self.pixels
    }

    /// Hounsfield values (`pixel * slope + intercept`).
    #[must_use]
    pub const fn hu(&self) -> &Grid<f64> {
        &self.hu
    }

    /// Signed distance of the slice along its own normal.
    #[must_use]
    pub fn normal_offset(&self) -> f64 {
        self.header
            .position
            .dot(self.header.orientation.normal())
    }
}

/// An ordered, immutable stack of frames.
///
/// Frames are sorted by the projection of their position onto their
/// slice normal, ascending. Frames at the same offset keep their input
/// order. Instance UIDs are unique.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    frames: Vec<Frame>,
    by_uid: HashMap<String, usize>,
    warnings: Vec<Warning>,
}

impl Volume {
    /// Assemble a volume from already-validated frames.
    ///
    /// Duplicate instance UIDs are dropped with a warning.
    #[must_use]
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self::assemble(
            frames
                .into_iter()
                .map(|f| (f.instance_uid().to_string(), Ok(f))),
        )
    }

    /// Assemble a volume from per-slice build results.
    ///
    /// Each candidate carries a name used in warnings (typically the
    /// file name). Rejected frames and duplicate UIDs become
    /// [`Warning`]s; everything else is kept.
    #[must_use]
    pub fn assemble<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<Frame, FrameError>)>,
    {
        Self::assemble_with_warnings(candidates, Vec::new())
    }

    /// Like [`assemble`](Self::assemble), keeping `warnings` raised
    /// earlier (e.g. files that could not be read at all) ahead of the
    /// ones found here.
    #[must_use]
    pub fn assemble_with_warnings<I>(candidates: I, mut warnings: Vec<Warning>) -> Self
    where
        I: IntoIterator<Item = (String, Result<Frame, FrameError>)>,
    {
        let mut frames: Vec<Frame> = Vec::new();
        let mut seen = HashSet::new();

        for (source_name, candidate) in candidates {
            match candidate {
                Ok(frame) => {
                    if seen.insert(frame.instance_uid().to_string()) {
                        frames.push(frame);
                    } else {
                        let w = Warning::DuplicateInstance {
                            source_name,
                            instance_uid: frame.instance_uid().to_string(),
                        };
                        tracing::warn!("{w}");
                        warnings.push(w);
                    }
                }
                Err(error) => {
                    let w = Warning::MalformedFrame { source_name, error };
                    tracing::warn!("{w}");
                    warnings.push(w);
                }
            }
        }

        frames.sort_by(|a, b| a.normal_offset().total_cmp(&b.normal_offset()));

        let by_uid = frames
            .iter()
            .enumerate()
            .map(|(i, f)| (f.instance_uid().to_string(), i))
            .collect();

        tracing::debug!(
            frames = frames.len(),
            rejected = warnings.len(),
            "assembled volume"
        );

        Self {
            frames,
            by_uid,
            warnings,
        }
    }

    /// Frames in volume order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the volume has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Position (in volume order) of the frame with this instance UID.
    #[must_use]
    pub fn index_of(&self, instance_uid: &str) -> Option<usize> {
        self.by_uid.get(instance_uid).copied()
    }

    /// Problems encountered while assembling the volume.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}
