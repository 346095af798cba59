//! Analysis parameters.
//!
//! Each stage has its own configuration struct with sensible defaults and
//! builder-style setters. `validate` checks ranges before any computation.

use crate::error::ConfigError;
use crate::filter::MAX_SIGMA;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default flood-fill size cap in pixels.
pub const DEFAULT_SIZE_CAP: usize = 4000;

/// How a frame is sampled over an ROI's member pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MeasurementMode {
    /// Mean intensity over the members.
    #[default]
    Average,
    /// Maximum intensity over the members.
    Maximum,
}

/// Which frame the detection pipeline segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectionSource {
    /// A single frame by index.
    Frame(usize),
    /// The pixel-wise mean of all frames.
    #[default]
    Average,
}

/// Difference-of-Gaussians detection parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionConfig {
    /// Sigma of the narrow (signal) Gaussian.
    pub sigma_narrow: f64,
    /// Sigma of the wide (background) Gaussian.
    pub sigma_wide: f64,
    /// Foreground threshold on the difference frame.
    pub threshold: f32,
    /// Largest component size before a fill is truncated.
    pub size_cap: usize,
    /// Frame to segment.
    pub source: DetectionSource,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionPreset::Zoom10x.config()
    }
}

impl DetectionConfig {
    /// Sets both Gaussian widths.
    #[must_use]
    pub fn with_sigmas(mut self, narrow: f64, wide: f64) -> Self {
        self.sigma_narrow = narrow;
        self.sigma_wide = wide;
        self
    }

    /// Sets the foreground threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the component size cap.
    #[must_use]
    pub fn with_size_cap(mut self, size_cap: usize) -> Self {
        self.size_cap = size_cap;
        self
    }

    /// Sets the source frame.
    #[must_use]
    pub fn with_source(mut self, source: DetectionSource) -> Self {
        self.source = source;
        self
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, sigma) in [
            ("sigma_narrow", self.sigma_narrow),
            ("sigma_wide", self.sigma_wide),
        ] {
            if !(sigma.is_finite() && sigma > 0.0 && sigma <= MAX_SIGMA) {
                return Err(ConfigError::out_of_range(name, sigma, "finite, > 0 and <= 1024"));
            }
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::out_of_range(
                "detection threshold",
                self.threshold,
                "finite",
            ));
        }
        if self.size_cap == 0 {
            return Err(ConfigError::out_of_range("size_cap", 0, ">= 1"));
        }
        Ok(())
    }
}

/// Objective presets for the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectionPreset {
    /// 4x objective.
    Zoom4x,
    /// 10x objective.
    Zoom10x,
    /// 20x objective.
    Zoom20x,
}

impl DetectionPreset {
    /// Detection parameters for this preset.
    #[must_use]
    pub fn config(self) -> DetectionConfig {
        let (sigma_narrow, sigma_wide) = match self {
            Self::Zoom4x | Self::Zoom10x => (1.0, 2.5),
            Self::Zoom20x => (1.0, 4.0),
        };
        DetectionConfig {
            sigma_narrow,
            sigma_wide,
            threshold: 0.001,
            size_cap: DEFAULT_SIZE_CAP,
            source: DetectionSource::Average,
        }
    }
}

/// Rolling-percentile baseline parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineConfig {
    /// Number of samples in the baseline window.
    pub window_length: usize,
    /// Percentage of the lowest window samples averaged into F0.
    pub percentile: f32,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_length: 10,
            percentile: 10.0,
        }
    }
}

impl BaselineConfig {
    /// Sets the window length.
    #[must_use]
    pub fn with_window_length(mut self, window_length: usize) -> Self {
        self.window_length = window_length;
        self
    }

    /// Sets the percentile.
    #[must_use]
    pub fn with_percentile(mut self, percentile: f32) -> Self {
        self.percentile = percentile;
        self
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_length == 0 {
            return Err(ConfigError::out_of_range("window_length", 0, ">= 1"));
        }
        if !(1.0..=100.0).contains(&self.percentile) {
            return Err(ConfigError::out_of_range(
                "percentile",
                self.percentile,
                "within [1, 100]",
            ));
        }
        Ok(())
    }
}

/// How flagged frames are turned into emitted spikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpikeMode {
    /// Only the first frame of each run of flags.
    #[default]
    FirstFrameOfBlock,
    /// Every flagged frame.
    AllFramesInBlock,
    /// The highest-valued frame of each run.
    PeakOfBlock,
}

/// Adaptive z-score detector parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpikeConfig {
    /// Length of the trailing statistics window.
    pub lag: usize,
    /// Number of standard deviations a frame must exceed the mean by.
    pub threshold: f32,
    /// Weight of a flagged sample in the filtered series.
    pub influence: f32,
    /// Emission policy.
    pub mode: SpikeMode,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            lag: 10,
            threshold: 3.0,
            influence: 0.0,
            mode: SpikeMode::FirstFrameOfBlock,
        }
    }
}

impl SpikeConfig {
    /// Sets the lag.
    #[must_use]
    pub fn with_lag(mut self, lag: usize) -> Self {
        self.lag = lag;
        self
    }

    /// Sets the z-threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the influence.
    #[must_use]
    pub fn with_influence(mut self, influence: f32) -> Self {
        self.influence = influence;
        self
    }

    /// Sets the emission mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SpikeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checks parameter ranges that do not depend on the footage.
    ///
    /// # Errors
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lag == 0 {
            return Err(ConfigError::out_of_range("lag", 0, ">= 1"));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(ConfigError::out_of_range(
                "spike threshold",
                self.threshold,
                "finite and >= 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.influence) {
            return Err(ConfigError::out_of_range(
                "influence",
                self.influence,
                "within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Signal correlated between ROIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SimilaritySource {
    /// The 0/1 spike indicator series.
    #[default]
    EventTrain,
    /// The normalized (dF/F0) trace.
    Trace,
}

/// Pairwise connectivity parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectivityConfig {
    /// Distance gate as a fraction of the frame diagonal.
    pub max_distance: f64,
    /// Largest lag, in frames, tried in each direction.
    pub max_lag: usize,
    /// Similarity an edge must exceed.
    pub threshold: f32,
    /// Series to correlate.
    pub source: SimilaritySource,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            max_distance: 0.1,
            max_lag: 1,
            threshold: 0.33,
            source: SimilaritySource::EventTrain,
        }
    }
}

impl ConnectivityConfig {
    /// Sets the distance gate.
    #[must_use]
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Sets the lag window.
    #[must_use]
    pub fn with_max_lag(mut self, max_lag: usize) -> Self {
        self.max_lag = max_lag;
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the similarity source.
    #[must_use]
    pub fn with_source(mut self, source: SimilaritySource) -> Self {
        self.source = source;
        self
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_distance) {
            return Err(ConfigError::out_of_range(
                "max_distance",
                self.max_distance,
                "within [0, 1]",
            ));
        }
        if isize::try_from(self.max_lag).is_err() {
            return Err(ConfigError::out_of_range(
                "max_lag",
                self.max_lag,
                "at most isize::MAX",
            ));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::out_of_range(
                "similarity threshold",
                self.threshold,
                "finite",
            ));
        }
        Ok(())
    }
}

/// All parameters of one analysis pass.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisConfig {
    /// ROI detection.
    pub detection: DetectionConfig,
    /// Trace sampling.
    pub measurement: MeasurementMode,
    /// Baseline normalization.
    pub baseline: BaselineConfig,
    /// Spike detection.
    pub spikes: SpikeConfig,
    /// Connectivity inference.
    pub connectivity: ConnectivityConfig,
}

impl AnalysisConfig {
    /// Validates every stage.
    ///
    /// # Errors
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.baseline.validate()?;
        self.spikes.validate()?;
        self.connectivity.validate()
    }
}
