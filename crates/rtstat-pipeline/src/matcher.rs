//! Associate contour instances with the slice they were drawn on.

use crate::structure::ContourInstance;
use crate::volume::Volume;

/// Contours grouped by frame, in volume order.
///
/// Contours are referred to by their index in the slice passed to
/// [`match_slices`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SliceMatch {
    per_frame: Vec<Vec<usize>>,
    unmatched: usize,
}

impl SliceMatch {
    /// Indices of the contours drawn on the frame at `index` (empty when
    /// none match or the index is out of range).
    #[must_use]
    pub fn for_frame(&self, index: usize) -> &[usize] {
        self.per_frame.get(index).map_or(&[], Vec::as_slice)
    }

    /// Resolve the contours drawn on the frame at `index`.
    pub fn contours_for<'a>(
        &'a self,
        contours: &'a [ContourInstance],
        index: usize,
    ) -> impl Iterator<Item = &'a ContourInstance> + 'a {
        self.for_frame(index).iter().filter_map(|&i| contours.get(i))
    }

    /// Contours that matched some frame.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.per_frame.iter().map(Vec::len).sum()
    }

    /// Contours whose referenced UID is not in the volume.
    #[must_use]
    pub const fn unmatched(&self) -> usize {
        self.unmatched
    }
}

/// Group `contours` by the frame whose instance UID they reference.
///
/// Matching is exact string equality. A frame may collect several
/// contours; a contour referencing no frame is counted and dropped.
#[must_use]
pub fn match_slices(contours: &[ContourInstance], volume: &Volume) -> SliceMatch {
    let mut per_frame = vec![Vec::new(); volume.len()];
    let mut unmatched = 0;
    for (i, contour) in contours.iter().enumerate() {
        match volume.index_of(&contour.referenced_uid) {
            Some(frame) => per_frame[frame].push(i),
            None => unmatched += 1,
        }
    }
    SliceMatch {
        per_frame,
        unmatched,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, Point3};
    use crate::volume::{Frame, FrameHeader, Orientation, PixelSpacing};

    fn volume(uids: &[&str]) -> Volume {
        Volume::from_frames(uids.iter().enumerate().map(|(i, uid)| {
            #[allow(clippy::cast_precision_loss)]
            let z = i as f64;
            Frame::new(
                FrameHeader {
                    instance_uid: (*uid).to_string(),
                    dimensions: Dimensions::new(1, 1),
                    rescale_slope: 1.0,
                    rescale_intercept: 0.0,
                    position: Point3::new(0.0, 0.0, z),
                    orientation: Orientation::AXIAL,
                    spacing: PixelSpacing::new(1.0, 1.0),
                },
                vec![0],
            )
            .unwrap()
        }))
    }

    fn contour(uid: &str, x: f64) -> ContourInstance {
        ContourInstance::new(uid, vec![Point3::new(x, 0.0, 0.0)])
    }

    #[test]
    fn groups_by_uid() {
        let v = volume(&["a", "b", "c"]);
        let contours = [contour("c", 0.0), contour("a", 1.0), contour("c", 2.0)];
        let m = match_slices(&contours, &v);
        assert_eq!(m.for_frame(0), &[1]);
        assert!(m.for_frame(1).is_empty());
        assert_eq!(m.for_frame(2), &[0, 2]);
        let on_c: Vec<f64> = m.contours_for(&contours, 2).map(|c| c.points[0].x).collect();
        assert_eq!(on_c, vec![0.0, 2.0]);
        assert_eq!(m.matched(), 3);
        assert_eq!(m.unmatched(), 0);
    }

    #[test]
    fn unknown_uid_is_counted_not_matched() {
        let v = volume(&["a"]);
        let contours = [contour("a ", 0.0), contour("zzz", 0.0)];
        let m = match_slices(&contours, &v);
        assert_eq!(m.matched(), 0);
        assert_eq!(m.unmatched(), 2);
        assert!(m.for_frame(7).is_empty());
    }
}
