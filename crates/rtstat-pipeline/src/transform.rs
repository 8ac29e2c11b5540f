//! Patient space to pixel space.

use crate::types::{Point, Point3, Ring};
use crate::volume::{Frame, Orientation, PixelSpacing};

/// The geometry needed to map patient coordinates onto one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePlane {
    /// Centre of the first pixel.
    pub position: Point3,
    /// Row and column direction cosines.
    pub orientation: Orientation,
    /// Pixel spacing.
    pub spacing: PixelSpacing,
}

impl SlicePlane {
    /// The plane of `frame`.
    #[must_use]
    pub const fn of(frame: &Frame) -> Self {
        let header = frame.header();
        Self {
            position: header.position,
            orientation: header.orientation,
            spacing: header.spacing,
        }
    }

    /// Map one patient-space point to pixel space.
    ///
    /// The position is subtracted first, the offset is projected onto the
    /// row and column cosines, and each projection is divided by the
    /// spacing along it. The result may lie outside the grid.
    #[must_use]
    pub fn project(&self, p: Point3) -> Point {
        let d = p - self.position;
        Point::new(
            d.dot(self.orientation.row) / self.spacing.column,
            d.dot(self.orientation.column) / self.spacing.row,
        )
    }

    /// Map a patient-space contour to a closed pixel-space ring.
    ///
    /// Point order is preserved; the first point is appended when the
    /// contour is not already closed.
    #[must_use]
    pub fn project_ring(&self, points: &[Point3]) -> Ring {
        Ring::closed(points.iter().map(|&p| self.project(p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(position: [f64; 3], cosines: [f64; 6], row: f64, column: f64) -> SlicePlane {
        SlicePlane {
            position: Point3::from_array(position),
            orientation: Orientation::from_cosines(cosines),
            spacing: PixelSpacing::new(row, column),
        }
    }

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn axial_subtracts_then_scales() {
        let p = plane([-250.0, -250.0, 10.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 0.5, 0.5);
        let got = p.project(Point3::new(-200.0, -240.0, 10.0));
        assert!(close(got, Point::new(100.0, 20.0)), "{got:?}");
    }

    #[test]
    fn position_maps_to_origin() {
        let p = plane([3.0, -7.0, 2.5], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 0.8, 1.2);
        assert!(close(p.project(Point3::new(3.0, -7.0, 2.5)), Point::new(0.0, 0.0)));
    }

    #[test]
    fn anisotropic_spacing_uses_column_spacing_for_x() {
        // Row spacing 2 mm, column spacing 0.5 mm.
        let p = plane([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 2.0, 0.5);
        let got = p.project(Point3::new(10.0, 10.0, 0.0));
        assert!(close(got, Point::new(20.0, 5.0)), "{got:?}");
    }

    #[test]
    fn flipped_axes() {
        let p = plane([100.0, 100.0, 0.0], [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0], 1.0, 1.0);
        let got = p.project(Point3::new(90.0, 80.0, 0.0));
        assert!(close(got, Point::new(10.0, 20.0)), "{got:?}");
    }

    #[test]
    fn coronal_plane_uses_z_for_rows() {
        let p = plane([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 0.0, -1.0], 1.0, 1.0);
        let got = p.project(Point3::new(4.0, 55.0, -9.0));
        assert!(close(got, Point::new(4.0, 9.0)), "{got:?}");
    }

    #[test]
    fn out_of_grid_points_are_kept() {
        let p = plane([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 1.0, 1.0);
        let got = p.project(Point3::new(-50.0, 1e4, 0.0));
        assert!(close(got, Point::new(-50.0, 1e4)));
    }

    #[test]
    fn ring_is_closed_and_ordered() {
        let p = plane([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 1.0, 1.0);
        let pts = [
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(4.0, 1.0, 0.0),
            Point3::new(4.0, 3.0, 0.0),
        ];
        let ring = p.project_ring(&pts);
        assert_eq!(ring.len(), 4);
        assert!(close(ring.points()[1], Point::new(4.0, 1.0)));
        assert_eq!(ring.points()[0], ring.points()[3]);
    }
}
