//! Shared value types for the rtstat pipeline.

use geo::{Area, BoundingRect, Centroid};
use serde::{Deserialize, Serialize};

use crate::raster::RasterizerKind;

/// A 2D point in pixel space.
///
/// `x` grows with the column index and `y` with the row index. The
/// centre of pixel `(column c, row r)` sits at `(c, r)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (columns from the left edge).
    pub x: f64,
    /// Vertical position (rows from the top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point (or vector) in 3D patient space, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// Patient x (right to left).
    pub x: f64,
    /// Patient y (anterior to posterior).
    pub y: f64,
    /// Patient z (inferior to superior).
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build from a `[x, y, z]` array.
    #[must_use]
    pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y.mul_add(other.y, self.z * other.z))
    }

    /// Cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y.mul_add(other.z, -(self.z * other.y)),
            self.z.mul_add(other.x, -(self.x * other.z)),
            self.x.mul_add(other.y, -(self.y * other.x)),
        )
    }

    /// Euclidean length.
    #[must_use]
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Whether all three components are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Sub for Point3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// A closed polygon ring in pixel space.
///
/// The last point always repeats the first (unless the ring is empty),
/// so consecutive pairs enumerate every edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring(Vec<Point>);

impl Ring {
    /// Build a ring from an ordered vertex list, appending a copy of the
    /// first vertex when the list is not already closed.
    #[must_use]
    pub fn closed(mut points: Vec<Point>) -> Self {
        if let (Some(&first), Some(&last)) = (points.first(), points.last())
            && first != last
        {
            points.push(first);
        }
        Self(points)
    }

    /// Returns `true` if the ring has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of stored points, including the closing duplicate.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Number of vertices, not counting the closing duplicate.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// A ring with fewer than three vertices encloses nothing.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.vertex_count() < 3
    }

    /// All points, including the closing duplicate.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Iterate over the ring's edges as `(start, end)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }

    /// Axis-aligned bounding box as `(min, max)` corners.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let rect = self.to_line_string().bounding_rect()?;
        Some((
            Point::new(rect.min().x, rect.min().y),
            Point::new(rect.max().x, rect.max().y),
        ))
    }

    /// Area-weighted centroid, or `None` for an empty ring.
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        self.to_polygon()
            .centroid()
            .map(|c| Point::new(c.x(), c.y()))
    }

    /// Enclosed area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.to_polygon().unsigned_area()
    }

    /// Vertices rounded to the nearest pixel, for outline drawing.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn rounded(&self) -> Vec<(i64, i64)> {
        self.0
            .iter()
            .map(|p| (p.x.round() as i64, p.y.round() as i64))
            .collect()
    }

    fn to_line_string(&self) -> geo::LineString<f64> {
        self.0
            .iter()
            .map(|p| geo::Coord { x: p.x, y: p.y })
            .collect()
    }

    fn to_polygon(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(self.to_line_string(), Vec::new())
    }
}

/// Grid dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major linear index of `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub const fn index(self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }
}

/// A dense row-major 2D grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    dimensions: Dimensions,
    data: Vec<T>,
}

impl<T> Grid<T> {
    /// Wrap a row-major buffer.
    ///
    /// Returns `None` if the buffer length does not match `dimensions`.
    #[must_use]
    pub fn from_vec(dimensions: Dimensions, data: Vec<T>) -> Option<Self> {
        (data.len() == dimensions.cell_count()).then_some(Self { dimensions, data })
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Cell at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        self.dimensions.index(x, y).map(|i| &self.data[i])
    }

    /// Row-major view of every cell.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Apply `f` to every cell, producing a grid of the same shape.
    #[must_use]
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Grid<U> {
        Grid {
            dimensions: self.dimensions,
            data: self.data.iter().map(f).collect(),
        }
    }
}

const WORD_BITS: usize = u64::BITS as usize;

/// A bit-packed boolean mask, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dimensions: Dimensions,
    words: Vec<u64>,
}

impl Mask {
    /// An all-false mask.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            words: vec![0; dimensions.cell_count().div_ceil(WORD_BITS)],
        }
    }

    /// Build a mask that is true wherever the overlap count is odd.
    ///
    /// Returns `None` if `counts` does not match `dimensions`.
    #[must_use]
    pub fn from_parity(dimensions: Dimensions, counts: &[u32]) -> Option<Self> {
        if counts.len() != dimensions.cell_count() {
            return None;
        }
        let mut mask = Self::empty(dimensions);
        for (i, _) in counts.iter().enumerate().filter(|&(_, c)| c % 2 == 1) {
            mask.words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
        }
        Some(mask)
    }

    /// Mask dimensions (always equal to the frame grid it belongs to).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Value at column `x`, row `y`; out-of-bounds reads are `false`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.dimensions
            .index(x, y)
            .is_some_and(|i| self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0)
    }

    /// Number of true cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no cell is set.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Row-major indices of the true cells, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(wi * WORD_BITS + bit)
            })
        })
    }
}

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which rasterization strategy fills the contours.
    pub rasterizer: RasterizerKind,

    /// Rasterize regions in parallel. Only has an effect when the crate
    /// is built with the `rayon` feature.
    pub parallel: bool,
}

impl PipelineConfig {
    /// Default rasterization strategy.
    pub const DEFAULT_RASTERIZER: RasterizerKind = RasterizerKind::ScanLine;

    /// Parallel rasterization is on by default.
    pub const DEFAULT_PARALLEL: bool = true;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rasterizer: Self::DEFAULT_RASTERIZER,
            parallel: Self::DEFAULT_PARALLEL,
        }
    }
}

/// Why a CT frame was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum FrameError {
    /// Pixel spacing is zero, negative, or not finite.
    #[error("pixel spacing must be positive and finite, got {row} x {column}")]
    InvalidSpacing {
        /// Spacing between rows (mm).
        row: f64,
        /// Spacing between columns (mm).
        column: f64,
    },

    /// Row and column cosines are not unit length or not perpendicular.
    #[error("orientation cosines are not orthonormal: {0:?}")]
    NonOrthonormalOrientation([f64; 6]),

    /// Image position has a non-finite component.
    #[error("image position is not finite")]
    NonFinitePosition,

    /// Rescale slope or intercept is not finite.
    #[error("rescale slope {slope} / intercept {intercept} is not finite")]
    NonFiniteRescale {
        /// Rescale slope.
        slope: f64,
        /// Rescale intercept.
        intercept: f64,
    },

    /// The grid has zero rows or columns.
    #[error("pixel grid is empty")]
    EmptyGrid,

    /// The pixel buffer does not match the declared grid size.
    #[error("pixel buffer holds {actual} values, expected {expected}")]
    PixelCountMismatch {
        /// `rows * columns`.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
}

/// Why a contour instance was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ContourError {
    /// The flat coordinate list is not a multiple of three.
    #[error("contour data has {0} values, not a whole number of (x, y, z) triplets")]
    IncompleteTriplet(usize),

    /// A coordinate is NaN or infinite.
    #[error("contour point {0} is not finite")]
    NonFinitePoint(usize),

    /// The contour does not name the slice it was drawn on.
    #[error("contour has no referenced image")]
    MissingReference,
}

/// A non-fatal problem found while preparing or running the pipeline.
///
/// Each warning affects a single frame or contour; everything else is
/// still processed.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum Warning {
    /// A CT frame failed header validation and was left out.
    #[error("skipped frame {source_name}: {error}")]
    MalformedFrame {
        /// Where the frame came from (file name or instance UID).
        source_name: String,
        /// What was wrong with it.
        error: FrameError,
    },

    /// A second frame claimed an instance UID already in the volume.
    #[error("skipped frame {source_name}: duplicate instance UID {instance_uid}")]
    DuplicateInstance {
        /// Where the duplicate came from.
        source_name: String,
        /// The repeated UID.
        instance_uid: String,
    },

    /// A contour instance could not be used.
    #[error("skipped contour in region {region}: {error}")]
    MalformedContour {
        /// Name of the region owning the contour.
        region: String,
        /// What was wrong with it.
        error: ContourError,
    },

    /// An input could not be read at all (missing header field, decode
    /// failure, unreadable file).
    #[error("skipped {source_name}: {message}")]
    Unreadable {
        /// Where the input came from.
        source_name: String,
        /// Reader-provided explanation.
        message: String,
    },
}

/// Errors that stop a pipeline operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The run was cancelled before it finished.
    #[error("analysis was cancelled")]
    Cancelled,

    /// No region with this id exists in the session.
    #[error("unknown region id {0}")]
    UnknownRegion(String),

    /// The id was already issued or reserved in this session.
    #[error("region id {0} is already in use")]
    DuplicateRegion(String),

    /// A background analysis thread exited without a result.
    #[error("analysis worker stopped without a result")]
    WorkerLost,

    /// A mask does not have the shape of the frame it is applied to.
    #[error("mask is {actual:?} but frame grid is {expected:?}")]
    MaskShapeMismatch {
        /// Frame grid shape.
        expected: Dimensions,
        /// Mask shape.
        actual: Dimensions,
    },

    /// The number of masks differs from the number of frames.
    #[error("got {actual} masks for a volume of {expected} frames")]
    MaskCountMismatch {
        /// Number of frames.
        expected: usize,
        /// Number of masks supplied.
        actual: usize,
    },
}
