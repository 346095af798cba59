//! Error types for cellpulse-core.

use thiserror::Error;

/// Result type alias for cellpulse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cellpulse operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A parameter was rejected before any computation started.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Not enough frames or ROIs to run the requested stage.
    #[error("insufficient data: {0}")]
    InsufficientData(#[from] InsufficientDataError),

    /// Two frames (or a frame and the footage) disagree on dimensions.
    #[error("frame dimensions {found_width}x{found_height} do not match expected {width}x{height}")]
    DimensionMismatch {
        /// Expected width.
        width: usize,
        /// Expected height.
        height: usize,
        /// Offending width.
        found_width: usize,
        /// Offending height.
        found_height: usize,
    },

    /// An ROI reaches outside the footage it is sampled from.
    #[error("{name} extends to ({x}, {y}), outside a {width}x{height} frame")]
    RoiOutOfBounds {
        /// Display name of the ROI.
        name: String,
        /// Furthest x coordinate of the ROI.
        x: u32,
        /// Furthest y coordinate of the ROI.
        y: u32,
        /// Frame width.
        width: usize,
        /// Frame height.
        height: usize,
    },

    /// No ROI with the given name exists in the session.
    #[error("unknown ROI: {0}")]
    UnknownRoi(String),

    /// Derived data was computed for an older ROI/footage version.
    #[error("stale derived data: computed at version {computed}, session is at version {current}")]
    Stale {
        /// Version the data was computed at.
        computed: u64,
        /// Current session version.
        current: u64,
    },

    /// A stage was queried before it was run.
    #[error("{0} has not been computed")]
    NotComputed(&'static str),

    /// A long-running operation was cancelled by its observer.
    #[error("cancelled after {completed} of {total} steps")]
    Cancelled {
        /// Steps finished before cancellation.
        completed: usize,
        /// Total steps requested.
        total: usize,
    },
}

/// Invalid parameter values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric parameter fell outside its accepted range.
    #[error("{name} must be {requirement}, got {value}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value, formatted.
        value: String,
        /// Human readable constraint.
        requirement: &'static str,
    },

    /// A window-like parameter exceeds the number of available frames.
    #[error("{name} = {value} exceeds the frame count {frames}")]
    InsufficientFrames {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: usize,
        /// Frames available.
        frames: usize,
    },

    /// A convolution kernel is empty, even-sized or non-finite.
    #[error("invalid kernel: {0}")]
    InvalidKernel(String),
}

impl ConfigError {
    /// Builds an [`ConfigError::OutOfRange`] from any displayable value.
    pub fn out_of_range(
        name: &'static str,
        value: impl std::fmt::Display,
        requirement: &'static str,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.to_string(),
            requirement,
        }
    }
}

/// Not enough input to produce a meaningful result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsufficientDataError {
    /// Fewer frames than a stage requires.
    #[error("{found} frame(s) available, at least {required} required")]
    TooFewFrames {
        /// Frames available.
        found: usize,
        /// Frames required.
        required: usize,
    },

    /// The ROI list is empty.
    #[error("no ROIs to measure")]
    NoRois,

    /// A footage was built from zero frames.
    #[error("footage contains no frames")]
    EmptyFootage,
}
