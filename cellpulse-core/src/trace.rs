//! Per-ROI time series.

use crate::error::{ConfigError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest positive normal `f32`, used in place of zero and as the dF/F0
/// sentinel so downstream divisions never see exact zeros.
pub const SENTINEL: f32 = f32::MIN_POSITIVE;

/// Dense `(roi index, frame index)` matrix of samples.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceMatrix {
    rois: usize,
    frames: usize,
    data: Vec<f32>,
}

impl TraceMatrix {
    /// Zero-filled matrix.
    #[must_use]
    pub fn zeros(rois: usize, frames: usize) -> Self {
        Self {
            rois,
            frames,
            data: vec![0.0; rois * frames],
        }
    }

    /// Builds a matrix from one row per ROI.
    ///
    /// # Errors
    /// Returns an error if the rows differ in length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let frames = rows.first().map_or(0, Vec::len);
        let rois = rows.len();
        let mut data = Vec::with_capacity(rois * frames);
        for row in rows {
            if row.len() != frames {
                return Err(
                    ConfigError::out_of_range("trace length", row.len(), "equal for every ROI")
                        .into(),
                );
            }
            data.extend(row);
        }
        Ok(Self { rois, frames, data })
    }

    /// Number of ROIs (rows).
    #[must_use]
    pub fn n_rois(&self) -> usize {
        self.rois
    }

    /// Number of frames (columns).
    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.frames
    }

    /// Trace of one ROI.
    ///
    /// # Panics
    /// Panics if `roi >= n_rois()`.
    #[must_use]
    pub fn row(&self, roi: usize) -> &[f32] {
        &self.data[roi * self.frames..(roi + 1) * self.frames]
    }

    /// Mutable trace of one ROI.
    ///
    /// # Panics
    /// Panics if `roi >= n_rois()`.
    pub fn row_mut(&mut self, roi: usize) -> &mut [f32] {
        &mut self.data[roi * self.frames..(roi + 1) * self.frames]
    }

    /// Sample of `roi` at `frame`.
    #[must_use]
    pub fn get(&self, roi: usize, frame: usize) -> f32 {
        self.data[roi * self.frames + frame]
    }

    /// Iterates over ROI rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics, so a frame-less matrix yields nothing.
        self.data
            .chunks_exact(self.frames.max(1))
            .take(if self.frames == 0 { 0 } else { self.rois })
    }
}

/// Spike detector output for one ROI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventTrain {
    flags: Vec<bool>,
    spikes: Vec<usize>,
}

impl EventTrain {
    /// Creates a train from raw flags and emitted spike frames.
    ///
    /// Spike frames are sorted, deduplicated and clipped to the flag length.
    #[must_use]
    pub fn new(flags: Vec<bool>, mut spikes: Vec<usize>) -> Self {
        spikes.retain(|&f| f < flags.len());
        spikes.sort_unstable();
        spikes.dedup();
        Self { flags, spikes }
    }

    /// Raw detector flags, one per frame.
    #[must_use]
    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    /// Emitted spike frames in ascending order.
    #[must_use]
    pub fn spikes(&self) -> &[usize] {
        &self.spikes
    }

    /// Number of frames covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if the train covers no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Number of emitted spikes.
    #[must_use]
    pub fn spike_count(&self) -> usize {
        self.spikes.len()
    }

    /// Returns true if a spike was emitted at `frame`.
    #[must_use]
    pub fn is_spike(&self, frame: usize) -> bool {
        self.spikes.binary_search(&frame).is_ok()
    }

    /// 0/1 series with ones at emitted spike frames.
    #[must_use]
    pub fn indicator(&self) -> Vec<f32> {
        let mut series = vec![0.0; self.flags.len()];
        for &f in &self.spikes {
            series[f] = 1.0;
        }
        series
    }

    /// Returns true if both trains emit a spike on a common frame.
    #[must_use]
    pub fn overlaps(&self, other: &EventTrain) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.spikes.len() && j < other.spikes.len() {
            match self.spikes[i].cmp(&other.spikes[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }
}
