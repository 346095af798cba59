//! Region-of-interest geometry.
//!
//! An [`Roi`] is fixed at construction: member pixels, boundary pixels,
//! centroid and bounding box never change afterwards. Detected and manually
//! placed regions share the type and differ only by [`Provenance`].

use crate::error::{ConfigError, Result};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default diameter of a manually placed disc ROI, in pixels.
pub const DEFAULT_MANUAL_DIAMETER: u32 = 16;

/// Pixel coordinate within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelCoord {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl PixelCoord {
    /// Creates a new coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another coordinate.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }

    /// Returns true if the coordinates are 8-connected neighbours.
    #[must_use]
    pub fn is_adjacent(&self, other: &Self) -> bool {
        self != other && self.x.abs_diff(other.x) <= 1 && self.y.abs_diff(other.y) <= 1
    }
}

/// Inclusive axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    /// Smallest x.
    pub min_x: u32,
    /// Smallest y.
    pub min_y: u32,
    /// Largest x.
    pub max_x: u32,
    /// Largest y.
    pub max_y: u32,
}

impl BoundingBox {
    /// Creates a rectangle from its inclusive corners.
    #[must_use]
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Returns true if `(x, y)` lies inside, edges included.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Returns true if the rectangles share at least one pixel.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    fn enclosing(points: &[PixelCoord]) -> Self {
        let mut bounds = Self::new(u32::MAX, u32::MAX, 0, 0);
        for p in points {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        bounds
    }
}

/// How an ROI came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Provenance {
    /// Placed by the user as a fixed-size disc.
    Manual,
    /// Produced by a detection run.
    Detected,
}

impl Provenance {
    /// Prefix used in display names.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Manual => "ManualROI",
            Self::Detected => "ROI",
        }
    }
}

/// Stable identity of an ROI within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiKey {
    /// Origin of the ROI.
    pub provenance: Provenance,
    /// Number within its provenance.
    pub id: u32,
}

impl std::fmt::Display for RoiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.provenance.prefix(), self.id)
    }
}

/// A region of interest tracked across all frames.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Roi {
    key: RoiKey,
    members: Vec<PixelCoord>,
    boundary: Vec<PixelCoord>,
    centroid: PixelCoord,
    bounds: BoundingBox,
}

impl Roi {
    /// Builds an ROI from member and boundary pixels.
    ///
    /// Duplicate members are dropped (first occurrence wins); boundary pixels
    /// that are not members are ignored.
    ///
    /// # Errors
    /// Returns an error if `members` is empty.
    pub fn new(
        provenance: Provenance,
        id: u32,
        members: Vec<PixelCoord>,
        boundary: Vec<PixelCoord>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(members.len());
        let members: Vec<PixelCoord> = members.into_iter().filter(|p| seen.insert(*p)).collect();
        if members.is_empty() {
            return Err(ConfigError::out_of_range("ROI member count", 0, "at least 1").into());
        }
        let mut boundary_seen = HashSet::with_capacity(boundary.len());
        let boundary = boundary
            .into_iter()
            .filter(|p| seen.contains(p) && boundary_seen.insert(*p))
            .collect();
        Ok(Self {
            key: RoiKey { provenance, id },
            centroid: truncated_mean(&members),
            bounds: BoundingBox::enclosing(&members),
            members,
            boundary,
        })
    }

    /// Builds an ROI from a detection run.
    ///
    /// # Errors
    /// Returns an error if `members` is empty.
    pub fn detected(id: u32, members: Vec<PixelCoord>, boundary: Vec<PixelCoord>) -> Result<Self> {
        Self::new(Provenance::Detected, id, members, boundary)
    }

    /// Builds a manual disc ROI of the given diameter centred on `center`.
    ///
    /// The disc covers offsets `-r..r` on both axes (r = diameter / 2) whose
    /// distance from the centre is at most `r`; pixels within one pixel of
    /// the rim are boundary pixels. A centre closer than `r` to an edge of a
    /// `width x height` frame yields a single-pixel ROI.
    ///
    /// # Errors
    /// Returns an error if `center` lies outside the frame.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn manual_disc(
        id: u32,
        center: PixelCoord,
        diameter: u32,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let w = u64::try_from(width).unwrap_or(u64::MAX);
        let h = u64::try_from(height).unwrap_or(u64::MAX);
        if u64::from(center.x) >= w || u64::from(center.y) >= h {
            return Err(ConfigError::out_of_range(
                "manual ROI centre",
                format!("({}, {})", center.x, center.y),
                "inside the frame",
            )
            .into());
        }
        let r = diameter / 2;
        let mut members = vec![center];
        let mut boundary = Vec::new();
        let interior = center.x > r
            && u64::from(center.x) < w.saturating_sub(u64::from(r))
            && center.y > r
            && u64::from(center.y) < h.saturating_sub(u64::from(r));
        if interior {
            let r = i64::from(r);
            let radius = r as f64;
            for dx in -r..r {
                for dy in -r..r {
                    let dist = ((dx * dx + dy * dy) as f64).sqrt();
                    if dist > radius {
                        continue;
                    }
                    let p = PixelCoord::new(
                        (i64::from(center.x) + dx) as u32,
                        (i64::from(center.y) + dy) as u32,
                    );
                    members.push(p);
                    if dist + 1.0 >= radius {
                        boundary.push(p);
                    }
                }
            }
        }
        Self::new(Provenance::Manual, id, members, boundary)
    }

    /// Identity of the ROI.
    #[must_use]
    pub fn key(&self) -> RoiKey {
        self.key
    }

    /// Number within its provenance.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.key.id
    }

    /// Origin of the ROI.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.key.provenance
    }

    /// Display name, `ROI{id}` or `ManualROI{id}`.
    #[must_use]
    pub fn name(&self) -> String {
        self.key.to_string()
    }

    /// Member pixels in discovery order.
    #[must_use]
    pub fn members(&self) -> &[PixelCoord] {
        &self.members
    }

    /// Boundary pixels, a subset of the members.
    #[must_use]
    pub fn boundary(&self) -> &[PixelCoord] {
        &self.boundary
    }

    /// Truncated mean of the member coordinates.
    #[must_use]
    pub fn centroid(&self) -> PixelCoord {
        self.centroid
    }

    /// Inclusive bounding box of the members.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Number of member pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: an ROI has at least one member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if `(x, y)` is a member pixel.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.bounds.contains(x, y) && self.members.iter().any(|p| p.x == x && p.y == y)
    }

    /// Returns true if any member pixel lies inside `rect`.
    #[must_use]
    pub fn is_in_rectangle(&self, rect: &BoundingBox) -> bool {
        self.bounds.intersects(rect) && self.members.iter().any(|p| rect.contains(p.x, p.y))
    }

    /// Returns true if the ROIs share at least one pixel.
    #[must_use]
    pub fn overlaps(&self, other: &Roi) -> bool {
        self.bounds.intersects(&other.bounds)
            && self.members.iter().any(|p| other.contains(p.x, p.y))
    }

    /// Euclidean distance between centroids.
    #[must_use]
    pub fn centroid_distance(&self, other: &Roi) -> f64 {
        self.centroid.distance(&other.centroid)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncated_mean(points: &[PixelCoord]) -> PixelCoord {
    let n = points.len().max(1) as u64;
    let (sx, sy) = points.iter().fold((0u64, 0u64), |(sx, sy), p| {
        (sx + u64::from(p.x), sy + u64::from(p.y))
    });
    PixelCoord::new((sx / n) as u32, (sy / n) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: u32, y0: u32, side: u32) -> Vec<PixelCoord> {
        let mut pixels = Vec::new();
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                pixels.push(PixelCoord::new(x, y));
            }
        }
        pixels
    }

    #[test]
    fn test_geometry() {
        let roi = Roi::detected(3, square(10, 20, 3), Vec::new()).unwrap();
        assert_eq!(roi.name(), "ROI3");
        assert_eq!(roi.len(), 9);
        assert_eq!(roi.centroid(), PixelCoord::new(11, 21));
        assert_eq!(roi.bounds(), BoundingBox::new(10, 20, 12, 22));
        assert!(roi.contains(12, 22));
        assert!(!roi.contains(13, 22));
    }

    #[test]
    fn test_centroid_truncates() {
        let roi = Roi::detected(
            0,
            vec![PixelCoord::new(0, 0), PixelCoord::new(1, 1)],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(roi.centroid(), PixelCoord::new(0, 0));
    }

    #[test]
    fn test_members_deduplicated_and_non_empty() {
        let roi = Roi::detected(
            0,
            vec![PixelCoord::new(1, 1), PixelCoord::new(1, 1), PixelCoord::new(2, 1)],
            vec![PixelCoord::new(2, 1), PixelCoord::new(9, 9)],
        )
        .unwrap();
        assert_eq!(roi.len(), 2);
        assert_eq!(roi.boundary(), &[PixelCoord::new(2, 1)]);
        assert!(Roi::detected(0, Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_manual_disc() {
        let roi = Roi::manual_disc(0, PixelCoord::new(32, 32), 16, 64, 64).unwrap();
        assert_eq!(roi.name(), "ManualROI0");
        assert_eq!(roi.provenance(), Provenance::Manual);
        assert!(roi.contains(32, 32));
        assert!(roi.contains(24, 32));
        assert!(!roi.contains(40, 32));
        assert!(roi.len() > 150 && roi.len() < 260, "len = {}", roi.len());
        assert!(!roi.boundary().contains(&PixelCoord::new(32, 32)));
        assert!(roi.boundary().contains(&PixelCoord::new(24, 32)));

        let unique: HashSet<_> = roi.members().iter().collect();
        assert_eq!(unique.len(), roi.len());
    }

    #[test]
    fn test_manual_disc_near_edge_is_single_pixel() {
        let roi = Roi::manual_disc(1, PixelCoord::new(3, 30), 16, 64, 64).unwrap();
        assert_eq!(roi.members(), &[PixelCoord::new(3, 30)]);
        assert!(Roi::manual_disc(1, PixelCoord::new(64, 3), 16, 64, 64).is_err());
    }

    #[test]
    fn test_overlap_and_rectangle() {
        let a = Roi::detected(0, square(0, 0, 4), Vec::new()).unwrap();
        let b = Roi::detected(1, square(3, 3, 4), Vec::new()).unwrap();
        let c = Roi::detected(2, square(10, 10, 2), Vec::new()).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(c.is_in_rectangle(&BoundingBox::new(11, 11, 20, 20)));
        assert!(!c.is_in_rectangle(&BoundingBox::new(12, 0, 20, 20)));
        assert!((a.centroid_distance(&c) - (2.0f64 * 81.0).sqrt()).abs() < 1e-12);
    }
}
