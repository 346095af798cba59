//! cellpulse-core: core types for calcium-imaging activity analysis.
//!
//! This crate provides the data model shared by the processing stages:
//! frames and footage, separable kernels, ROI geometry, trace matrices,
//! event trains, stage configuration and the progress contract.
//!

pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod progress;
pub mod roi;
pub mod trace;

pub use config::{
    AnalysisConfig, BaselineConfig, ConnectivityConfig, DetectionConfig, DetectionPreset,
    DetectionSource, MeasurementMode, SimilaritySource, SpikeConfig, SpikeMode,
};
pub use error::{ConfigError, Error, InsufficientDataError, Result};
pub use filter::Filter;
pub use frame::{Footage, Frame};
pub use progress::{BatchDecision, BatchOptions, NoProgress, ProgressObserver};
pub use roi::{BoundingBox, PixelCoord, Provenance, Roi, RoiKey};
pub use trace::{EventTrain, TraceMatrix, SENTINEL};
