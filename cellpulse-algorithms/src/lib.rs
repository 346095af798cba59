//! cellpulse-algorithms: processing stages for calcium-imaging footage.
//!
//! This crate provides the numeric pipeline:
//! - **Convolution** - separable kernels, row/column partitioned with rayon
//! - **Detection** - explicit-stack flood fill over a difference-of-Gaussians frame
//! - **Extraction** - per-ROI average or maximum traces
//! - **Baseline** - rolling low-percentile F0 and dF/F0
//! - **Spikes** - adaptive z-score event detection
//! - **Connectivity** - gated lagged cross-correlation between ROIs
//!
//! [`AnalysisSession`] ties the stages together and refuses stale results.
//!
#![warn(missing_docs)]

mod baseline;
mod batch;
mod connectivity;
mod contrast;
mod convolution;
mod detection;
mod dog;
mod extraction;
mod session;
mod spikes;
pub mod summary;
mod validation;
pub mod xcorr;

pub use baseline::{background_level, delta_f_over_f0, BaselineNormalizer, NormalizedTraces};
pub use batch::{run_frame_batch, BatchOutcome};
pub use connectivity::{
    correlation_matrix, ConnectivityAnalyzer, ConnectivityNode, ConnectivityReport,
    CorrelationTable, Direction, Edge, LagProfile,
};
pub use contrast::{footage_range, stretch_footage};
pub use convolution::{convolve, convolve_partitioned, partition, SeparableConvolution};
pub use detection::{Detection, RegionDetector, ResourceLimitWarning};
pub use dog::{detect_mask, DogDetector, MASK_THRESHOLD};
pub use extraction::SignalExtractor;
pub use session::{Activity, AnalysisSession};
pub use spikes::{emit_spikes, SpikeDetector};
pub use summary::{frame_means, scale_to_peak, summarize, TraceSummary};
pub use validation::{validate_detection, ValidationReport};
pub use xcorr::{lag_profile, lagged_correlation, Centering};
