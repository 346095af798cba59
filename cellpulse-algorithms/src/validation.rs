//! Detection quality against manually placed reference ROIs.

use cellpulse_core::{BoundingBox, Roi, RoiKey};
use log::info;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Confusion counts of a detection run inside a rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValidationReport {
    /// Number of reference ROIs.
    pub condition_positives: usize,
    /// Detected ROIs claimed by a reference ROI.
    pub true_positives: usize,
    /// Detected ROIs in the rectangle claimed by nobody.
    pub false_positives: usize,
    /// Reference ROIs that touch no detected ROI.
    pub false_negatives: usize,
    /// Matches against a detected ROI another reference already claimed.
    pub merged: usize,
    /// Reference ROIs that touch at least one detected ROI.
    pub matched: Vec<RoiKey>,
}

impl ValidationReport {
    /// True positive rate, `None` without reference ROIs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sensitivity(&self) -> Option<f64> {
        (self.condition_positives > 0)
            .then(|| self.true_positives as f64 / self.condition_positives as f64)
    }

    /// Fraction of predictions that are correct, `None` without
    /// predictions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn positive_predictive_value(&self) -> Option<f64> {
        let predicted = self.true_positives + self.false_positives;
        (predicted > 0).then(|| self.true_positives as f64 / predicted as f64)
    }
}

/// Compares `detected` with the `reference` ROIs inside `area`.
///
/// Only detected ROIs with a member pixel in `area` take part. A reference
/// ROI matches a detected ROI when they share a pixel; the first reference
/// to match claims it, later ones count as merged.
#[must_use]
pub fn validate_detection(detected: &[Roi], reference: &[Roi], area: &BoundingBox) -> ValidationReport {
    let candidates: Vec<&Roi> = detected
        .iter()
        .filter(|roi| roi.is_in_rectangle(area))
        .collect();
    let mut claimed = vec![false; candidates.len()];
    let mut report = ValidationReport {
        condition_positives: reference.len(),
        ..ValidationReport::default()
    };

    for manual in reference {
        let mut found = false;
        for (slot, roi) in claimed.iter_mut().zip(&candidates) {
            if !manual.overlaps(roi) {
                continue;
            }
            found = true;
            if *slot {
                report.merged += 1;
            } else {
                *slot = true;
                report.true_positives += 1;
            }
        }
        if found {
            report.matched.push(manual.key());
        } else {
            report.false_negatives += 1;
        }
    }
    report.false_positives = claimed.iter().filter(|&&c| !c).count();

    info!(
        "validation: P={} TP={} FP={} FN={} merged={}",
        report.condition_positives,
        report.true_positives,
        report.false_positives,
        report.false_negatives,
        report.merged
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cellpulse_core::PixelCoord;

    fn square(id: u32, x0: u32, y0: u32, side: u32) -> Roi {
        let members = (y0..y0 + side)
            .flat_map(|y| (x0..x0 + side).map(move |x| PixelCoord::new(x, y)))
            .collect();
        Roi::detected(id, members, Vec::new()).unwrap()
    }

    fn manual(id: u32, x: u32, y: u32) -> Roi {
        Roi::manual_disc(id, PixelCoord::new(x, y), 4, 100, 100).unwrap()
    }

    #[test]
    fn test_counts() {
        let detected = vec![
            square(0, 10, 10, 6), // matched by manual 0
            square(1, 30, 30, 6), // matched by manual 1 and 2 -> one merge
            square(2, 50, 50, 4), // unmatched -> false positive
            square(3, 90, 90, 4), // outside the area, ignored
        ];
        let reference = vec![
            manual(0, 12, 12),
            manual(1, 31, 31),
            manual(2, 34, 34),
            manual(3, 70, 20), // false negative
        ];
        let area = BoundingBox::new(0, 0, 80, 80);
        let report = validate_detection(&detected, &reference, &area);
        assert_eq!(report.condition_positives, 4);
        assert_eq!(report.true_positives, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(report.false_positives, 1);
        assert_eq!(report.false_negatives, 1);
        assert_eq!(report.matched.len(), 3);
        assert_relative_eq!(report.sensitivity().unwrap(), 0.5);
        assert_relative_eq!(report.positive_predictive_value().unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_empty_inputs() {
        let report = validate_detection(&[], &[], &BoundingBox::new(0, 0, 10, 10));
        assert_eq!(report.sensitivity(), None);
        assert_eq!(report.positive_predictive_value(), None);
    }
}
