//! Regions of interest and their contours.

use serde::{Deserialize, Serialize};

use crate::types::{ContourError, Point3};

/// One closed contour drawn on one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourInstance {
    /// Instance UID of the slice the contour was drawn on.
    pub referenced_uid: String,
    /// Ordered ring vertices in patient space (mm).
    pub points: Vec<Point3>,
}

impl ContourInstance {
    /// Create a contour from already-parsed points.
    #[must_use]
    pub fn new(referenced_uid: impl Into<String>, points: Vec<Point3>) -> Self {
        Self {
            referenced_uid: referenced_uid.into(),
            points,
        }
    }

    /// Build a contour from a flat `x0, y0, z0, x1, ...` coordinate list.
    ///
    /// # Errors
    ///
    /// Returns [`ContourError::IncompleteTriplet`] if the length is not a
    /// multiple of three and [`ContourError::NonFinitePoint`] if any
    /// coordinate is NaN or infinite.
    pub fn from_flat(
        referenced_uid: impl Into<String>,
        coordinates: &[f64],
    ) -> Result<Self, ContourError> {
        if coordinates.len() % 3 != 0 {
            return Err(ContourError::IncompleteTriplet(coordinates.len()));
        }
        let points = coordinates
            .chunks_exact(3)
            .enumerate()
            .map(|(i, c)| {
                let p = Point3::new(c[0], c[1], c[2]);
                if p.is_finite() {
                    Ok(p)
                } else {
                    Err(ContourError::NonFinitePoint(i))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::new(referenced_uid, points))
    }
}

/// A named region as read from a structure set, before it is given an id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoiContours {
    /// Display name.
    pub name: String,
    /// Contours in file order.
    pub contours: Vec<ContourInstance>,
}

impl RoiContours {
    /// Create a region with the given contours.
    #[must_use]
    pub fn new(name: impl Into<String>, contours: Vec<ContourInstance>) -> Self {
        Self {
            name: name.into(),
            contours,
        }
    }
}

/// A region of interest with its allocated id code.
///
/// The id and name are fixed at construction and the contour list is
/// read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: String,
    name: String,
    contours: Vec<ContourInstance>,
}

impl Region {
    /// Attach an id to a parsed region.
    #[must_use]
    pub fn new(id: impl Into<String>, roi: RoiContours) -> Self {
        Self {
            id: id.into(),
            name: roi.name,
            contours: roi.contours,
        }
    }

    /// Allocated short code.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contour instances.
    #[must_use]
    pub fn contours(&self) -> &[ContourInstance] {
        &self.contours
    }
}
