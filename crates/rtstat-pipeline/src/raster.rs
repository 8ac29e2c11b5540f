//! Polygon rasterization: fill pixel-space rings into an even-odd mask.
//!
//! This module defines the [`Rasterizer`] trait for pluggable fill
//! algorithms and the [`RasterizerKind`] enum for selecting one at
//! runtime.
//!
//! # Boundary rule
//!
//! A pixel centre lying on a ring's outline (a vertex or any point of an
//! edge) is inside that ring. Away from the outline, every strategy uses
//! the same half-open crossing rule: an edge crosses row `y` iff exactly
//! one of its endpoints has `vy > y`, and a centre `(x, y)` is inside iff
//! an odd number of that row's crossings lie strictly to its right.
//! Because both rules are shared, the strategies produce identical
//! masks, boundaries included. For an axis-aligned square with vertices
//! on pixel centres every edge centre is selected.
//!
//! # Overlap parity
//!
//! Each ring adds one to a per-pixel counter for every centre it
//! contains. The final mask is `count % 2 == 1`, so a ring nested inside
//! another cuts a hole instead of being swallowed by a union.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Mask, Point, Ring};

/// Selects which rasterization algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RasterizerKind {
    /// Crossing-number test for every pixel centre in the ring's padded
    /// bounding box.
    ///
    /// Simple and easy to audit; cost grows with the bounding box area
    /// times the edge count.
    PointInPolygon,

    /// Per row, sort the edge crossings and fill the spans between them.
    ///
    /// Cost grows with the number of rows times the edge count plus the
    /// filled area. Default.
    #[default]
    ScanLine,
}

/// Trait for rasterization strategies.
///
/// Input: pixel-space rings for one (region, frame) pair and the frame's
/// grid dimensions.
/// Output: a mask of the same dimensions.
pub trait Rasterizer {
    /// Add one to `counts` for every pixel centre inside `ring`.
    ///
    /// `counts` is row-major and holds `dimensions.cell_count()` cells.
    fn accumulate(&self, ring: &Ring, dimensions: Dimensions, counts: &mut [u32]);

    /// Fill `rings` into an even-odd mask.
    ///
    /// Rings with fewer than three vertices are skipped.
    fn rasterize(&self, rings: &[Ring], dimensions: Dimensions) -> Mask {
        let mut counts = vec![0_u32; dimensions.cell_count()];
        for ring in rings.iter().filter(|r| !r.is_degenerate()) {
            self.accumulate(ring, dimensions, &mut counts);
        }
        Mask::from_parity(dimensions, &counts).unwrap_or_else(|| Mask::empty(dimensions))
    }
}

impl Rasterizer for RasterizerKind {
    fn accumulate(&self, ring: &Ring, dimensions: Dimensions, counts: &mut [u32]) {
        match *self {
            Self::PointInPolygon => accumulate_point_in_polygon(ring, dimensions, counts),
            Self::ScanLine => accumulate_scan_line(ring, dimensions, counts),
        }
    }
}

/// Where the edge `a -> b` crosses the horizontal line at `y`, if it
/// does under the half-open rule.
fn crossing(a: Point, b: Point, y: f64) -> Option<f64> {
    ((a.y > y) != (b.y > y)).then(|| (y - a.y).mul_add((b.x - a.x) / (b.y - a.y), a.x))
}

/// The closed x-interval the segment `a -> b` occupies on row `y`, if it
/// touches that row at all.
///
/// Endpoints on the row return their own x exactly so a vertex on a
/// pixel centre is never missed to rounding.
#[allow(clippy::float_cmp)]
fn on_row(a: Point, b: Point, y: f64) -> Option<(f64, f64)> {
    if y < a.y.min(b.y) || y > a.y.max(b.y) {
        return None;
    }
    if a.y == b.y {
        return Some((a.x.min(b.x), a.x.max(b.x)));
    }
    let x = if y == a.y {
        a.x
    } else if y == b.y {
        b.x
    } else {
        (y - a.y).mul_add((b.x - a.x) / (b.y - a.y), a.x)
    };
    Some((x, x))
}

/// Inclusive index range covering `[lo, hi]` padded by one cell and
/// clipped to `0..len`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn padded_range(lo: f64, hi: f64, len: u32) -> Option<(u32, u32)> {
    if len == 0 {
        return None;
    }
    let lo = (lo.floor() - 1.0).max(0.0);
    let hi = (hi.ceil() + 1.0).min(f64::from(len - 1));
    (lo <= hi).then_some((lo as u32, hi as u32))
}

/// Row and column ranges of the ring's padded bounding box on the grid.
fn bounding_ranges(ring: &Ring, dimensions: Dimensions) -> Option<((u32, u32), (u32, u32))> {
    let (min, max) = ring.bounds()?;
    let columns = padded_range(min.x, max.x, dimensions.width)?;
    let rows = padded_range(min.y, max.y, dimensions.height)?;
    Some((columns, rows))
}

fn accumulate_point_in_polygon(ring: &Ring, dimensions: Dimensions, counts: &mut [u32]) {
    let Some(((x0, x1), (y0, y1))) = bounding_ranges(ring, dimensions) else {
        return;
    };
    let width = dimensions.width as usize;

    for row in y0..=y1 {
        let y = f64::from(row);
        for column in x0..=x1 {
            let x = f64::from(column);
            let on_outline = ring
                .edges()
                .filter_map(|(a, b)| on_row(a, b, y))
                .any(|(lo, hi)| lo <= x && x <= hi);
            let inside = on_outline
                || ring
                    .edges()
                    .filter_map(|(a, b)| crossing(a, b, y))
                    .filter(|&cx| cx > x)
                    .count()
                    % 2
                    == 1;
            if inside {
                counts[row as usize * width + column as usize] += 1;
            }
        }
    }
}

/// Mark `columns[lo..=hi]` after clipping to the row.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn mark(hit: &mut [bool], lo: f64, hi: f64) {
    let last = hit.len() as i64 - 1;
    let start = (lo as i64).max(0);
    let end = (hi as i64).min(last);
    for column in start..=end {
        hit[column as usize] = true;
    }
}

fn accumulate_scan_line(ring: &Ring, dimensions: Dimensions, counts: &mut [u32]) {
    let Some((_, (y0, y1))) = bounding_ranges(ring, dimensions) else {
        return;
    };
    let width = dimensions.width as usize;
    let mut crossings = Vec::new();
    let mut hit = vec![false; width];

    for row in y0..=y1 {
        let y = f64::from(row);
        hit.fill(false);

        crossings.clear();
        crossings.extend(ring.edges().filter_map(|(a, b)| crossing(a, b, y)));
        crossings.sort_by(f64::total_cmp);

        // Inside iff an odd number of crossings are > x, i.e. an odd
        // number are <= x, i.e. a[2k] <= x < a[2k + 1].
        for span in crossings.chunks_exact(2) {
            mark(&mut hit, span[0].ceil(), span[1].ceil() - 1.0);
        }
        for (lo, hi) in ring.edges().filter_map(|(a, b)| on_row(a, b, y)) {
            mark(&mut hit, lo.ceil(), hi.floor());
        }

        let offset = row as usize * width;
        for (count, _) in counts[offset..offset + width]
            .iter_mut()
            .zip(&hit)
            .filter(|(_, h)| **h)
        {
            *count += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KINDS: [RasterizerKind; 2] = [RasterizerKind::PointInPolygon, RasterizerKind::ScanLine];

    fn ring(points: &[(f64, f64)]) -> Ring {
        Ring::closed(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        ring(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    /// Deterministic star-shaped polygon with `n` spikes.
    #[allow(clippy::cast_precision_loss)]
    fn star(cx: f64, cy: f64, n: usize, seed: u64) -> Ring {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1_u64 << 53) as f64
        };
        let points = (0..n)
            .map(|i| {
                let theta = std::f64::consts::TAU * i as f64 / n as f64;
                let r = 3.0 + 12.0 * next();
                (cx + r * theta.cos(), cy + r * theta.sin())
            })
            .collect::<Vec<_>>();
        ring(&points)
    }

    #[test]
    fn default_is_scan_line() {
        assert_eq!(RasterizerKind::default(), RasterizerKind::ScanLine);
    }

    #[test]
    fn half_integer_square_covers_enclosed_centres() {
        let dims = Dimensions::new(512, 512);
        let rings = [square(99.5, 99.5, 109.5, 109.5)];
        for kind in KINDS {
            let mask = kind.rasterize(&rings, dims);
            assert_eq!(mask.count(), 100, "{kind:?}");
            assert!(mask.get(100, 100));
            assert!(mask.get(109, 109));
            assert!(!mask.get(110, 100));
            assert!(!mask.get(99, 105));
        }
    }

    #[test]
    fn integer_square_includes_its_outline() {
        let dims = Dimensions::new(10, 10);
        let rings = [square(2.0, 2.0, 5.0, 5.0)];
        for kind in KINDS {
            let mask = kind.rasterize(&rings, dims);
            assert_eq!(mask.count(), 16, "{kind:?}");
            assert!(mask.get(2, 2));
            assert!(mask.get(5, 5));
            assert!(mask.get(5, 3));
            assert!(mask.get(3, 5));
            assert!(!mask.get(6, 3));
            assert!(!mask.get(3, 1));
        }
    }

    #[test]
    fn square_on_pixel_centres_selects_ten_by_ten() {
        let dims = Dimensions::new(512, 512);
        let rings = [square(100.0, 100.0, 109.0, 109.0)];
        for kind in KINDS {
            let mask = kind.rasterize(&rings, dims);
            assert_eq!(mask.count(), 100, "{kind:?}");
            assert!(mask.get(109, 105));
            assert!(mask.get(105, 109));
            assert!(mask.get(100, 100));
            assert!(mask.get(109, 109));
            assert!(!mask.get(110, 105));
        }
    }

    #[test]
    fn diagonal_edges_through_centres_are_inside() {
        let dims = Dimensions::new(12, 12);
        // Diamond whose edges pass exactly through (4, 2), (2, 4), ...
        let rings = [ring(&[(5.0, 1.0), (9.0, 5.0), (5.0, 9.0), (1.0, 5.0)])];
        let expected = RasterizerKind::PointInPolygon.rasterize(&rings, dims);
        assert_eq!(RasterizerKind::ScanLine.rasterize(&rings, dims), expected);
        assert!(expected.get(5, 1));
        assert!(expected.get(3, 3));
        assert!(expected.get(7, 7));
        assert!(!expected.get(2, 2));
        // 1 + 3 + 5 + 7 + 9 + 7 + 5 + 3 + 1 centres.
        assert_eq!(expected.count(), 41);
    }

    #[test]
    fn shared_edge_selects_its_centres_in_both_rings() {
        let dims = Dimensions::new(12, 6);
        let rings = [square(1.0, 1.0, 4.0, 4.0), square(4.0, 1.0, 7.0, 4.0)];
        for kind in KINDS {
            let mask = kind.rasterize(&rings, dims);
            // Column 4 lies on both outlines: counted twice, even.
            assert!(!mask.get(4, 2), "{kind:?}");
            assert!(mask.get(3, 2));
            assert!(mask.get(5, 2));
            assert_eq!(mask.count(), 2 * 16 - 2 * 4);
        }
    }

    #[test]
    fn nested_rings_make_an_annulus() {
        let dims = Dimensions::new(20, 20);
        let rings = [square(1.5, 1.5, 11.5, 11.5), square(4.5, 4.5, 8.5, 8.5)];
        for kind in KINDS {
            let mask = kind.rasterize(&rings, dims);
            assert_eq!(mask.count(), 100 - 16, "{kind:?}");
            assert!(mask.get(2, 2));
            assert!(!mask.get(6, 6));
        }
    }

    #[test]
    fn ring_order_does_not_matter() {
        let dims = Dimensions::new(20, 20);
        let a = square(1.5, 1.5, 11.5, 11.5);
        let b = square(4.5, 4.5, 8.5, 8.5);
        for kind in KINDS {
            assert_eq!(
                kind.rasterize(&[a.clone(), b.clone()], dims),
                kind.rasterize(&[b.clone(), a.clone()], dims),
            );
        }
    }

    #[test]
    fn identical_rings_cancel() {
        let dims = Dimensions::new(8, 8);
        let r = square(0.5, 0.5, 5.5, 5.5);
        for kind in KINDS {
            assert!(kind.rasterize(&[r.clone(), r.clone()], dims).is_clear());
        }
    }

    #[test]
    fn degenerate_rings_are_ignored() {
        let dims = Dimensions::new(8, 8);
        let line = ring(&[(0.0, 0.0), (7.0, 7.0)]);
        for kind in KINDS {
            assert!(kind.rasterize(&[line.clone()], dims).is_clear());
            assert!(kind.rasterize(&[], dims).is_clear());
        }
    }

    #[test]
    fn ring_outside_grid_fills_nothing() {
        let dims = Dimensions::new(16, 16);
        let rings = [square(-40.0, -40.0, -20.0, -20.0), square(30.0, 2.0, 50.0, 9.0)];
        for kind in KINDS {
            assert!(kind.rasterize(&rings, dims).is_clear());
        }
    }

    #[test]
    fn ring_larger_than_grid_fills_everything() {
        let dims = Dimensions::new(16, 12);
        let rings = [square(-100.0, -100.0, 100.0, 100.0)];
        for kind in KINDS {
            assert_eq!(kind.rasterize(&rings, dims).count(), 16 * 12);
        }
    }

    #[test]
    fn triangle_with_vertex_on_centre() {
        let dims = Dimensions::new(12, 12);
        let rings = [ring(&[(5.0, 1.0), (10.0, 9.0), (0.5, 9.0)])];
        let expected = RasterizerKind::PointInPolygon.rasterize(&rings, dims);
        assert_eq!(RasterizerKind::ScanLine.rasterize(&rings, dims), expected);
        assert!(expected.get(5, 6));
        assert!(!expected.get(1, 2));
    }

    #[test]
    fn strategies_agree_on_irregular_polygons() {
        let dims = Dimensions::new(64, 48);
        for seed in 0..20 {
            let rings = [
                star(20.0, 20.0, 7 + (seed as usize % 9), seed),
                star(30.0, 25.0, 5 + (seed as usize % 4), seed + 100),
            ];
            assert_eq!(
                RasterizerKind::PointInPolygon.rasterize(&rings, dims),
                RasterizerKind::ScanLine.rasterize(&rings, dims),
                "seed {seed}",
            );
        }
    }

    #[test]
    fn convex_polygon_contains_its_centroid() {
        let dims = Dimensions::new(40, 40);
        let r = ring(&[(3.2, 4.1), (30.7, 2.9), (35.3, 20.2), (18.0, 33.6), (4.4, 22.8)]);
        let c = r.centroid().unwrap();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (cx, cy) = (c.x.round() as u32, c.y.round() as u32);
        for kind in KINDS {
            assert!(kind.rasterize(&[r.clone()], dims).get(cx, cy));
        }
    }

    #[test]
    fn rasterization_is_deterministic() {
        let dims = Dimensions::new(64, 48);
        let rings = [star(25.0, 22.0, 11, 7)];
        for kind in KINDS {
            assert_eq!(kind.rasterize(&rings, dims), kind.rasterize(&rings, dims));
        }
    }

    #[test]
    fn serde_uses_variant_names() {
        let json = serde_json::to_string(&RasterizerKind::PointInPolygon).unwrap();
        assert_eq!(json, r#""PointInPolygon""#);
    }
}
