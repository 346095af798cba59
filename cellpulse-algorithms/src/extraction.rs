//! Per-ROI trace sampling.

use cellpulse_core::{
    Error, Footage, InsufficientDataError, MeasurementMode, Result, Roi, TraceMatrix,
};
use log::debug;

/// Samples one value per ROI per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalExtractor {
    mode: MeasurementMode,
}

impl SignalExtractor {
    /// Creates an extractor for `mode`.
    #[must_use]
    pub fn new(mode: MeasurementMode) -> Self {
        Self { mode }
    }

    /// Measurement mode.
    #[must_use]
    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }

    /// Builds the raw trace matrix, one row per ROI in input order.
    ///
    /// # Errors
    /// Returns [`InsufficientDataError`] for fewer than two frames or no
    /// ROIs, and [`Error::RoiOutOfBounds`] if an ROI leaves the frame.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn extract(&self, footage: &Footage, rois: &[Roi]) -> Result<TraceMatrix> {
        if footage.len() < 2 {
            return Err(InsufficientDataError::TooFewFrames {
                found: footage.len(),
                required: 2,
            }
            .into());
        }
        if rois.is_empty() {
            return Err(InsufficientDataError::NoRois.into());
        }

        let (w, h) = (footage.width(), footage.height());
        let mut pixel_sets = Vec::with_capacity(rois.len());
        for roi in rois {
            let b = roi.bounds();
            if b.max_x as usize >= w || b.max_y as usize >= h {
                return Err(Error::RoiOutOfBounds {
                    name: roi.name(),
                    x: b.max_x,
                    y: b.max_y,
                    width: w,
                    height: h,
                });
            }
            let indices: Vec<usize> = roi
                .members()
                .iter()
                .map(|p| p.y as usize * w + p.x as usize)
                .collect();
            pixel_sets.push(indices);
        }

        let mut traces = TraceMatrix::zeros(rois.len(), footage.len());
        for (r, indices) in pixel_sets.iter().enumerate() {
            let row = traces.row_mut(r);
            for (t, frame) in footage.iter().enumerate() {
                let data = frame.as_slice();
                row[t] = match self.mode {
                    MeasurementMode::Average => {
                        let sum: f64 = indices.iter().map(|&i| f64::from(data[i])).sum();
                        (sum / indices.len() as f64) as f32
                    }
                    MeasurementMode::Maximum => indices
                        .iter()
                        .map(|&i| data[i])
                        .fold(f32::NEG_INFINITY, f32::max),
                };
            }
        }

        debug!(
            "extracted {:?} traces for {} ROIs over {} frames",
            self.mode,
            rois.len(),
            footage.len()
        );
        Ok(traces)
    }
}
