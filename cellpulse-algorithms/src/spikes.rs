//! Adaptive z-score spike detection.
//!
//! The first `lag` frames are compared against the statistics of those same
//! frames. Every later frame is compared against the mean and standard
//! deviation of the previous `lag` samples of a filtered series in which
//! flagged samples (and large negative excursions) are damped by the
//! influence factor, so a long event does not inflate its own baseline.

use cellpulse_core::{ConfigError, EventTrain, Result, SpikeConfig, SpikeMode, TraceMatrix};
use log::debug;

/// Z-score event detector.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
}

impl SpikeDetector {
    /// Creates a detector.
    ///
    /// # Errors
    /// Returns an error if the configuration is out of range.
    pub fn new(config: SpikeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SpikeConfig {
        &self.config
    }

    /// Per-frame flags for one trace.
    ///
    /// # Errors
    /// Returns [`ConfigError::InsufficientFrames`] if the trace is shorter
    /// than the lag.
    pub fn flags(&self, trace: &[f32]) -> Result<Vec<bool>> {
        let SpikeConfig {
            lag,
            threshold,
            influence,
            ..
        } = self.config;
        if lag > trace.len() {
            return Err(ConfigError::InsufficientFrames {
                name: "lag",
                value: lag,
                frames: trace.len(),
            }
            .into());
        }
        let floor = if threshold > 0.0 {
            1.0 / (10.0 * threshold)
        } else {
            0.0
        };
        let stats = |window: &[f32]| {
            let (mean, sd) = mean_std(window);
            (mean, sd.max(floor))
        };

        let mut flags = vec![false; trace.len()];
        let mut filtered = trace.to_vec();

        let (mean, sd) = stats(&trace[..lag]);
        for (flag, &x) in flags.iter_mut().zip(&trace[..lag]) {
            *flag = x - mean > threshold * sd;
        }

        for i in lag..trace.len() {
            let (mean, sd) = stats(&filtered[i - lag..i]);
            let x = trace[i];
            let limit = threshold * sd;
            if x - mean > limit {
                flags[i] = true;
                filtered[i] = influence * x + (1.0 - influence) * filtered[i - 1];
            } else if -x - 2.0 * mean > limit {
                filtered[i] = influence * x + (1.0 - influence) * filtered[i - 1];
            }
        }
        Ok(flags)
    }

    /// Event train for one trace.
    ///
    /// # Errors
    /// Returns an error if the trace is shorter than the lag.
    pub fn detect(&self, trace: &[f32]) -> Result<EventTrain> {
        let flags = self.flags(trace)?;
        let spikes = emit_spikes(&flags, trace, self.config.mode);
        Ok(EventTrain::new(flags, spikes))
    }

    /// Event trains for every ROI.
    ///
    /// # Errors
    /// Returns an error if the lag exceeds the frame count; no trains are
    /// produced in that case.
    pub fn detect_all(&self, traces: &TraceMatrix) -> Result<Vec<EventTrain>> {
        if self.config.lag > traces.n_frames() {
            return Err(ConfigError::InsufficientFrames {
                name: "lag",
                value: self.config.lag,
                frames: traces.n_frames(),
            }
            .into());
        }
        let trains = traces
            .rows()
            .map(|row| self.detect(row))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "{} spikes across {} ROIs ({:?})",
            trains.iter().map(EventTrain::spike_count).sum::<usize>(),
            trains.len(),
            self.config.mode
        );
        Ok(trains)
    }
}

/// Converts flags into spike frames according to `mode`.
///
/// `values` supplies the ranking for [`SpikeMode::PeakOfBlock`]; the
/// earliest frame wins ties.
#[must_use]
pub fn emit_spikes(flags: &[bool], values: &[f32], mode: SpikeMode) -> Vec<usize> {
    let mut spikes = Vec::new();
    let mut i = 0;
    while i < flags.len() {
        if !flags[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < flags.len() && flags[i] {
            i += 1;
        }
        match mode {
            SpikeMode::FirstFrameOfBlock => spikes.push(start),
            SpikeMode::AllFramesInBlock => spikes.extend(start..i),
            SpikeMode::PeakOfBlock => {
                let mut peak = start;
                for f in start + 1..i {
                    if values[f] > values[peak] {
                        peak = f;
                    }
                }
                spikes.push(peak);
            }
        }
    }
    spikes
}

/// Mean and population standard deviation.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn mean_std(window: &[f32]) -> (f32, f32) {
    let n = window.len() as f64;
    let mean = window.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = window
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn step_trace() -> Vec<f32> {
        (0..20).map(|i| if i < 10 { 10.0 } else { 100.0 }).collect()
    }

    fn detector(lag: usize, threshold: f32, influence: f32, mode: SpikeMode) -> SpikeDetector {
        SpikeDetector::new(SpikeConfig {
            lag,
            threshold,
            influence,
            mode,
        })
        .unwrap()
    }

    #[test]
    fn test_step_first_frame() {
        let d = detector(5, 3.0, 0.0, SpikeMode::FirstFrameOfBlock);
        let train = d.detect(&step_trace()).unwrap();
        assert_eq!(train.spikes(), &[10]);
        // Influence 0 keeps the baseline at 10, so the plateau stays flagged.
        assert!(train.flags()[10..].iter().all(|&f| f));
        assert!(train.flags()[..10].iter().all(|&f| !f));
    }

    #[test]
    fn test_full_influence_adapts_to_plateau() {
        let d = detector(5, 3.0, 1.0, SpikeMode::AllFramesInBlock);
        let train = d.detect(&step_trace()).unwrap();
        assert!(train.flags()[10]);
        // Once the window is full of plateau samples nothing is flagged.
        assert!(!train.flags()[19]);
    }

    #[test]
    fn test_mode_policies() {
        let flags = [false, true, true, true, false, true, false, true, true];
        let values = [0.0, 1.0, 5.0, 2.0, 0.0, 3.0, 0.0, 4.0, 4.0];
        assert_eq!(
            emit_spikes(&flags, &values, SpikeMode::FirstFrameOfBlock),
            vec![1, 5, 7]
        );
        assert_eq!(
            emit_spikes(&flags, &values, SpikeMode::AllFramesInBlock),
            vec![1, 2, 3, 5, 7, 8]
        );
        assert_eq!(
            emit_spikes(&flags, &values, SpikeMode::PeakOfBlock),
            vec![2, 5, 7]
        );
    }

    #[test]
    fn test_all_frames_is_superset() {
        let trace: Vec<f32> = (0..60)
            .map(|i| {
                let base = 1.0 + 0.05 * ((i * 13 % 7) as f32);
                if (20..24).contains(&i) || (40..43).contains(&i) {
                    base + 3.0 + (i % 3) as f32
                } else {
                    base
                }
            })
            .collect();
        let make = |mode| detector(8, 2.5, 0.2, mode).detect(&trace).unwrap();
        let all = make(SpikeMode::AllFramesInBlock);
        let first = make(SpikeMode::FirstFrameOfBlock);
        let peak = make(SpikeMode::PeakOfBlock);
        assert!(!first.spikes().is_empty());
        for f in first.spikes().iter().chain(peak.spikes()) {
            assert!(all.is_spike(*f), "frame {f} missing from AllFramesInBlock");
        }
        assert_eq!(first.flags(), all.flags());
    }

    #[test]
    fn test_lag_longer_than_trace() {
        let d = detector(25, 3.0, 0.0, SpikeMode::FirstFrameOfBlock);
        let traces = TraceMatrix::from_rows(vec![step_trace(), step_trace()]).unwrap();
        let err = d.detect_all(&traces).unwrap_err();
        assert!(err.to_string().contains("lag = 25 exceeds the frame count 20"));
    }

    #[test]
    fn test_zero_threshold_has_no_floor() {
        // Constant trace: sd = 0 and threshold 0, nothing strictly exceeds.
        let d = detector(3, 0.0, 0.0, SpikeMode::AllFramesInBlock);
        let train = d.detect(&[1.0; 8]).unwrap();
        assert!(train.spikes().is_empty());
    }

    #[test]
    fn test_detect_all_row_order() {
        let quiet = vec![10.0; 20];
        let traces = TraceMatrix::from_rows(vec![quiet, step_trace()]).unwrap();
        let trains = detector(5, 3.0, 0.0, SpikeMode::FirstFrameOfBlock)
            .detect_all(&traces)
            .unwrap();
        assert_eq!(trains.len(), 2);
        assert!(trains[0].spikes().is_empty());
        assert_eq!(trains[1].spikes(), &[10]);
    }
}
