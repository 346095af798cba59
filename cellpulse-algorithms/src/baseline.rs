//! Rolling low-percentile baseline and dF/F0.

use cellpulse_core::{BaselineConfig, ConfigError, Frame, Result, TraceMatrix, SENTINEL};
use log::{debug, warn};

/// Percentage of the darkest first-frame pixels averaged into `F_min`.
const BACKGROUND_PERCENT: usize = 1;

/// Mean of the darkest 1% of pixels (at least one) of `frame`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn background_level(frame: &Frame) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mut values = frame.as_slice().to_vec();
    values.sort_unstable_by(f32::total_cmp);
    let count = (values.len() * BACKGROUND_PERCENT).div_ceil(100);
    let sum: f64 = values[..count].iter().map(|&v| f64::from(v)).sum();
    (sum / count as f64) as f32
}

/// dF/F0 for one sample.
///
/// Returns [`SENTINEL`] unless `raw >= f0` and `f0 > f_min`; the result is
/// never zero, negative or NaN for finite input, and saturates at
/// `f32::MAX`.
#[must_use]
pub fn delta_f_over_f0(raw: f32, f0: f32, f_min: f32) -> f32 {
    if raw >= f0 && f0 > f_min {
        ((raw - f0) / (f0 - f_min)).clamp(SENTINEL, f32::MAX)
    } else {
        SENTINEL
    }
}

/// Baseline and dF/F0 for every ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTraces {
    /// F0 per ROI per frame.
    pub baseline: TraceMatrix,
    /// dF/F0 per ROI per frame.
    pub delta_f: TraceMatrix,
    /// Background level shared by all ROIs.
    pub f_min: f32,
}

/// Computes rolling baselines from raw traces.
#[derive(Debug, Clone)]
pub struct BaselineNormalizer {
    config: BaselineConfig,
}

impl BaselineNormalizer {
    /// Creates a normalizer.
    ///
    /// # Errors
    /// Returns an error if the configuration is out of range.
    pub fn new(config: BaselineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Number of window samples averaged into F0.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn low_count(&self) -> usize {
        let l = self.config.window_length;
        let count = (l as f64 * f64::from(self.config.percentile) / 100.0).ceil() as usize;
        count.clamp(1, l)
    }

    /// F0 for every sample of one trace.
    ///
    /// Frames before `window_length` share the window made of the first
    /// `window_length` samples; later frames use the window ending at the
    /// frame itself. Zero samples count as [`SENTINEL`].
    ///
    /// # Errors
    /// Returns an error if the trace is shorter than the window.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn baseline(&self, trace: &[f32]) -> Result<Vec<f32>> {
        let l = self.config.window_length;
        if l > trace.len() {
            return Err(ConfigError::InsufficientFrames {
                name: "window_length",
                value: l,
                frames: trace.len(),
            }
            .into());
        }
        let low = self.low_count();
        let mut window = Vec::with_capacity(l);
        let baseline = (0..trace.len())
            .map(|t| {
                let start = if t < l { 0 } else { t + 1 - l };
                window.clear();
                window.extend(trace[start..start + l].iter().map(|&v| nonzero(v)));
                window.sort_unstable_by(f32::total_cmp);
                let sum: f64 = window[..low].iter().map(|&v| f64::from(v)).sum();
                (sum / low as f64) as f32
            })
            .collect();
        Ok(baseline)
    }

    /// Computes F0 and dF/F0 for every ROI.
    ///
    /// # Errors
    /// Returns an error if the traces are shorter than the window. No
    /// partial output is produced.
    pub fn normalize(&self, raw: &TraceMatrix, f_min: f32) -> Result<NormalizedTraces> {
        let mut baseline = TraceMatrix::zeros(raw.n_rois(), raw.n_frames());
        let mut delta_f = TraceMatrix::zeros(raw.n_rois(), raw.n_frames());
        let mut degenerate = 0usize;
        for (r, trace) in raw.rows().enumerate() {
            let f0 = self.baseline(trace)?;
            if f0.iter().all(|&b| b <= f_min) {
                degenerate += 1;
            }
            for (t, (&v, &b)) in trace.iter().zip(&f0).enumerate() {
                delta_f.row_mut(r)[t] = delta_f_over_f0(nonzero(v), b, f_min);
            }
            baseline.row_mut(r).copy_from_slice(&f0);
        }
        if degenerate > 0 {
            warn!("{degenerate} ROI(s) never rise above the background level {f_min}");
        }
        debug!(
            "normalized {} traces (window {}, lowest {})",
            raw.n_rois(),
            self.config.window_length,
            self.low_count()
        );
        Ok(NormalizedTraces {
            baseline,
            delta_f,
            f_min,
        })
    }
}

#[inline]
fn nonzero(v: f32) -> f32 {
    if v == 0.0 {
        SENTINEL
    } else {
        v
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn normalizer(window_length: usize, percentile: f32) -> BaselineNormalizer {
        BaselineNormalizer::new(BaselineConfig {
            window_length,
            percentile,
        })
        .unwrap()
    }

    #[test]
    fn test_background_level() {
        // 200 pixels: the darkest 1% is 2 pixels.
        let frame = Frame::from_fn(20, 10, |x, y| (y * 20 + x) as f32);
        assert_eq!(background_level(&frame), 0.5);
        assert_eq!(background_level(&Frame::filled(1, 1, 0.3)), 0.3);
    }

    #[test]
    fn test_low_count() {
        assert_eq!(normalizer(10, 10.0).low_count(), 1);
        assert_eq!(normalizer(10, 25.0).low_count(), 3);
        assert_eq!(normalizer(3, 1.0).low_count(), 1);
        assert_eq!(normalizer(4, 100.0).low_count(), 4);
    }

    #[test]
    fn test_early_frames_reuse_first_window() {
        let trace = [5.0, 3.0, 4.0, 9.0, 1.0, 8.0, 7.0];
        let n = normalizer(3, 50.0); // lowest 2 of 3
        let f0 = n.baseline(&trace).unwrap();
        // t < 3: window [5, 3, 4] -> mean(3, 4)
        assert_eq!(&f0[..3], &[3.5, 3.5, 3.5]);
        // t = 3: window [3, 4, 9]
        assert_eq!(f0[3], 3.5);
        // t = 4: window [4, 9, 1]
        assert_eq!(f0[4], 2.5);
        // t = 6: window [1, 8, 7]
        assert_eq!(f0[6], 4.0);
    }

    #[test]
    fn test_early_frames_match_full_window_baseline() {
        let trace: Vec<f32> = (0..12).map(|i| ((i * 37) % 11) as f32 + 1.0).collect();
        let n = normalizer(5, 40.0);
        let f0 = n.baseline(&trace).unwrap();
        let first = n.baseline(&trace[..5]).unwrap();
        assert_eq!(&f0[..5], &first[..]);
        assert!(f0[..5].iter().all(|&v| v == f0[4]));
    }

    #[test]
    fn test_window_longer_than_trace() {
        let err = normalizer(10, 10.0).baseline(&[1.0; 4]).unwrap_err();
        assert!(err.to_string().contains("window_length = 10"));
    }

    #[test]
    fn test_delta_f_policy() {
        assert_relative_eq!(delta_f_over_f0(3.0, 2.0, 1.0), 1.0);
        // Below baseline.
        assert_eq!(delta_f_over_f0(1.5, 2.0, 1.0), SENTINEL);
        // Baseline not above background.
        assert_eq!(delta_f_over_f0(3.0, 1.0, 1.0), SENTINEL);
        // Exactly at baseline stays positive.
        assert_eq!(delta_f_over_f0(2.0, 2.0, 1.0), SENTINEL);
        // Tiny denominators saturate instead of overflowing.
        assert_eq!(delta_f_over_f0(1e30, 1e-30, 0.0), f32::MAX);
    }

    #[test]
    fn test_normalize_never_nan_or_non_positive() {
        let raw = TraceMatrix::from_rows(vec![
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.1, 0.5, 0.0, 0.9, 0.2, 1.0],
            vec![1.0; 6],
        ])
        .unwrap();
        let out = normalizer(3, 34.0).normalize(&raw, 0.05).unwrap();
        for r in 0..3 {
            for &v in out.delta_f.row(r) {
                assert!(v.is_finite() && v > 0.0, "value {v}");
            }
        }
        // Spike in the middle trace rises above the sentinel.
        assert!(out.delta_f.get(1, 3) > 1.0);
    }
}
