//! Per-ROI and per-frame trace statistics.

use cellpulse_core::TraceMatrix;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Summary of one ROI's activity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceSummary {
    /// Smallest raw value.
    pub min: f32,
    /// Largest raw value.
    pub max: f32,
    /// Mean raw value.
    pub mean: f32,
    /// Largest absolute dF/F0.
    pub peak_delta_f: f32,
}

/// Summarizes each ROI from its raw and dF/F0 rows.
///
/// Both matrices must have the same shape; extra rows of either are
/// ignored.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn summarize(raw: &TraceMatrix, delta_f: &TraceMatrix) -> Vec<TraceSummary> {
    raw.rows()
        .zip(delta_f.rows())
        .map(|(r, d)| {
            let (min, max) = r
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            let sum: f64 = r.iter().map(|&v| f64::from(v)).sum();
            TraceSummary {
                min,
                max,
                mean: (sum / r.len().max(1) as f64) as f32,
                peak_delta_f: d.iter().fold(0.0f32, |acc, v| acc.max(v.abs())),
            }
        })
        .collect()
}

/// Divides each row by its largest absolute value. All-zero rows stay zero.
#[must_use]
pub fn scale_to_peak(traces: &TraceMatrix) -> TraceMatrix {
    let mut out = traces.clone();
    for r in 0..out.n_rois() {
        let row = out.row_mut(r);
        let peak = row.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        if peak > 0.0 {
            for v in row.iter_mut() {
                *v /= peak;
            }
        }
    }
    out
}

/// Mean over ROIs for every frame.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn frame_means(traces: &TraceMatrix) -> Vec<f32> {
    let n = traces.n_rois().max(1) as f64;
    (0..traces.n_frames())
        .map(|t| {
            let sum: f64 = (0..traces.n_rois())
                .map(|r| f64::from(traces.get(r, t)))
                .sum();
            (sum / n) as f32
        })
        .collect()
}
