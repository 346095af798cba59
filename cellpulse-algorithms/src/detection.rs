//! Connected-component ROI segmentation.
//!
//! Pixels strictly above the threshold are foreground. Components are grown
//! with an explicit stack over a dense visited bitmap, seeded in raster order
//! (rows top to bottom, columns left to right), so ids, member order and
//! boundary sets are reproducible for identical input.

use std::fmt;

use cellpulse_core::config::DEFAULT_SIZE_CAP;
use cellpulse_core::{Frame, PixelCoord, Roi};
use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Neighbour visiting order as `(dx, dy)`.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A component hit the size cap and was split.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceLimitWarning {
    /// Id of the truncated ROI.
    pub roi_id: u32,
    /// Pixel that seeded the fill.
    pub seed: PixelCoord,
    /// Size cap in effect.
    pub cap: usize,
}

impl fmt::Display for ResourceLimitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ROI{} seeded at ({}, {}) reached the {}-pixel cap and was truncated",
            self.roi_id, self.seed.x, self.seed.y, self.cap
        )
    }
}

/// ROIs from one detection run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    /// ROIs in discovery order.
    pub rois: Vec<Roi>,
    /// Components truncated by the size cap.
    pub warnings: Vec<ResourceLimitWarning>,
}

/// Flood-fill segmentation of a thresholded frame.
#[derive(Debug, Clone)]
pub struct RegionDetector {
    threshold: f32,
    size_cap: usize,
}

impl RegionDetector {
    /// Creates a detector with the default size cap.
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            size_cap: DEFAULT_SIZE_CAP,
        }
    }

    /// Sets the largest component size; values below 1 are raised to 1.
    #[must_use]
    pub fn with_size_cap(mut self, size_cap: usize) -> Self {
        self.size_cap = size_cap.max(1);
        self
    }

    /// Foreground threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Segments `frame` into ROIs.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn detect(&self, frame: &Frame) -> Detection {
        let (w, h) = (frame.width(), frame.height());
        let data = frame.as_slice();
        let foreground = |i: usize| data[i] > self.threshold;
        let coord = |i: usize| PixelCoord::new((i % w) as u32, (i / w) as u32);

        let mut visited = vec![false; w * h];
        let mut stack: Vec<usize> = Vec::new();
        let mut detection = Detection::default();

        for seed in 0..w * h {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            if !foreground(seed) {
                continue;
            }

            let mut members = Vec::new();
            let mut boundary = Vec::new();
            let mut truncated = false;
            stack.push(seed);

            while let Some(i) = stack.pop() {
                if members.len() == self.size_cap {
                    // Hand the unexpanded pixels back to the raster scan.
                    visited[i] = false;
                    for j in stack.drain(..) {
                        visited[j] = false;
                    }
                    truncated = true;
                    break;
                }
                let p = coord(i);
                members.push(p);

                let mut on_edge = false;
                for (dx, dy) in NEIGHBOURS {
                    let (Some(nx), Some(ny)) = (
                        (p.x as usize).checked_add_signed(dx),
                        (p.y as usize).checked_add_signed(dy),
                    ) else {
                        on_edge = true;
                        continue;
                    };
                    if nx >= w || ny >= h {
                        on_edge = true;
                        continue;
                    }
                    let n = ny * w + nx;
                    if !foreground(n) {
                        on_edge = true;
                        visited[n] = true;
                    } else if !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
                if on_edge {
                    boundary.push(p);
                }
            }

            let id = detection.rois.len() as u32;
            if truncated {
                let warning = ResourceLimitWarning {
                    roi_id: id,
                    seed: coord(seed),
                    cap: self.size_cap,
                };
                warn!("{warning}");
                detection.warnings.push(warning);
            }
            // Members are non-empty: the seed is always accepted.
            if let Ok(roi) = Roi::detected(id, members, boundary) {
                detection.rois.push(roi);
            }
        }

        debug!(
            "detected {} ROIs in {w}x{h} frame at threshold {}",
            detection.rois.len(),
            self.threshold
        );
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from(rows: &[&str]) -> Frame {
        let h = rows.len();
        let w = rows[0].len();
        Frame::from_fn(w, h, |x, y| {
            if rows[y].as_bytes()[x] == b'#' {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_all_below_threshold() {
        let frame = Frame::filled(5, 5, 0.2);
        let detection = RegionDetector::new(0.5).detect(&frame);
        assert!(detection.rois.is_empty());
        assert!(detection.warnings.is_empty());
    }

    #[test]
    fn test_full_3x3_component() {
        let frame = Frame::filled(3, 3, 1.0);
        let detection = RegionDetector::new(0.5).detect(&frame);
        assert_eq!(detection.rois.len(), 1);
        let roi = &detection.rois[0];
        assert_eq!(roi.len(), 9);
        assert_eq!(roi.boundary().len(), 8);
        assert!(!roi.boundary().contains(&PixelCoord::new(1, 1)));
        assert_eq!(roi.centroid(), PixelCoord::new(1, 1));
    }

    #[test]
    fn test_threshold_is_strict() {
        let frame = Frame::filled(2, 2, 0.5);
        assert!(RegionDetector::new(0.5).detect(&frame).rois.is_empty());
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let frame = frame_from(&["#....", ".#...", "..#..", ".....", "....#"]);
        let detection = RegionDetector::new(0.5).detect(&frame);
        assert_eq!(detection.rois.len(), 2);
        assert_eq!(detection.rois[0].len(), 3);
        assert_eq!(detection.rois[1].members(), &[PixelCoord::new(4, 4)]);
    }

    #[test]
    fn test_ids_follow_raster_order() {
        let frame = frame_from(&["....##", "##....", "......", "..#..."]);
        let detection = RegionDetector::new(0.5).detect(&frame);
        let names: Vec<String> = detection.rois.iter().map(Roi::name).collect();
        assert_eq!(names, vec!["ROI0", "ROI1", "ROI2"]);
        assert!(detection.rois[0].contains(4, 0));
        assert!(detection.rois[1].contains(0, 1));
        assert!(detection.rois[2].contains(2, 3));
    }

    #[test]
    fn test_size_cap_splits_component() {
        let frame = Frame::filled(10, 10, 1.0);
        let detection = RegionDetector::new(0.5).with_size_cap(30).detect(&frame);
        assert!(detection.rois.len() >= 4);
        assert!(detection.rois.iter().all(|r| r.len() <= 30));
        let total: usize = detection.rois.iter().map(Roi::len).sum();
        assert_eq!(total, 100);
        // The final fragment fits under the cap.
        assert!(!detection.warnings.is_empty());
        assert!(detection.warnings.len() < detection.rois.len());
        assert_eq!(detection.warnings[0].roi_id, 0);
        assert_eq!(detection.rois[0].len(), 30);
        assert_eq!(detection.warnings[0].cap, 30);
    }

    #[test]
    fn test_deterministic() {
        let frame = Frame::from_fn(40, 30, |x, y| {
            if (x / 5 + y / 4) % 3 == 0 && (x * y) % 7 != 0 {
                0.9
            } else {
                0.1
            }
        });
        let detector = RegionDetector::new(0.5).with_size_cap(20);
        let a = detector.detect(&frame);
        let b = detector.detect(&frame);
        assert_eq!(a, b);
        assert!(!a.rois.is_empty());
    }
}
