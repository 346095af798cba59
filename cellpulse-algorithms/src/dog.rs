//! Difference-of-Gaussians detection pipeline.
//!
//! The source frame is padded by the wide kernel's size, blurred with a
//! narrow and a wide Gaussian, differenced, cropped back and segmented.

use std::time::Instant;

use cellpulse_core::{
    ConfigError, DetectionConfig, DetectionSource, Filter, Footage, Frame, Result,
};
use log::{debug, info};

use crate::convolution::SeparableConvolution;
use crate::detection::{Detection, RegionDetector};

/// Threshold used to segment binary masks.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Blob detector built from two Gaussians.
#[derive(Debug, Clone)]
pub struct DogDetector {
    config: DetectionConfig,
    narrow: SeparableConvolution,
    wide: SeparableConvolution,
}

impl DogDetector {
    /// Builds the kernels for `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        let narrow = SeparableConvolution::new(Filter::gaussian(config.sigma_narrow)?);
        let wide = SeparableConvolution::new(Filter::gaussian(config.sigma_wide)?);
        Ok(Self {
            config,
            narrow,
            wide,
        })
    }

    /// Sets the convolution worker count (0 = hardware parallelism).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.narrow = self.narrow.with_workers(workers);
        self.wide = self.wide.with_workers(workers);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Narrow blur minus wide blur, same size as `frame`.
    ///
    /// # Errors
    /// Propagates frame size errors.
    pub fn difference_frame(&self, frame: &Frame) -> Result<Frame> {
        let border = self.narrow.filter().size().max(self.wide.filter().size());
        let padded = frame.extend(border);
        let narrow = self.narrow.apply(&padded);
        let wide = self.wide.apply(&padded);
        narrow.difference(&wide)?.shrink(border)
    }

    /// Segments one frame.
    ///
    /// # Errors
    /// Propagates frame size errors.
    pub fn detect_frame(&self, frame: &Frame) -> Result<Detection> {
        let start = Instant::now();
        let diff = self.difference_frame(frame)?;
        debug!(
            "difference of Gaussians ({}, {}) in {:.3}s",
            self.config.sigma_narrow,
            self.config.sigma_wide,
            start.elapsed().as_secs_f64()
        );
        let detection = RegionDetector::new(self.config.threshold)
            .with_size_cap(self.config.size_cap)
            .detect(&diff);
        info!(
            "{} ROIs detected ({} truncated)",
            detection.rois.len(),
            detection.warnings.len()
        );
        Ok(detection)
    }

    /// Segments the configured source frame of `footage`.
    ///
    /// # Errors
    /// Returns an error if the source frame index is out of range.
    pub fn detect(&self, footage: &Footage) -> Result<Detection> {
        let source = match self.config.source {
            DetectionSource::Frame(index) => footage.frame(index).cloned().ok_or_else(|| {
                ConfigError::out_of_range("detection frame", index, "less than the frame count")
            })?,
            DetectionSource::Average => footage.average_frame()?,
        };
        self.detect_frame(&source)
    }
}

/// Segments a binary mask, treating values above 0.5 as foreground.
#[must_use]
pub fn detect_mask(mask: &Frame, size_cap: usize) -> Detection {
    RegionDetector::new(MASK_THRESHOLD)
        .with_size_cap(size_cap)
        .detect(mask)
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use cellpulse_core::PixelCoord;

    fn spots(w: usize, h: usize, centres: &[(f32, f32)]) -> Frame {
        Frame::from_fn(w, h, |x, y| {
            centres
                .iter()
                .map(|&(cx, cy)| {
                    let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                    0.8 * (-d2 / 4.0).exp()
                })
                .sum::<f32>()
                + 0.1
        })
    }

    #[test]
    fn test_difference_frame_keeps_size() {
        let frame = spots(30, 20, &[(10.0, 10.0)]);
        let detector = DogDetector::new(DetectionConfig::default()).unwrap();
        let diff = detector.difference_frame(&frame).unwrap();
        assert_eq!((diff.width(), diff.height()), (30, 20));
    }

    #[test]
    fn test_detects_separate_spots() {
        let frame = spots(60, 40, &[(12.0, 12.0), (45.0, 28.0)]);
        let config = DetectionConfig::default()
            .with_threshold(0.01)
            .with_source(DetectionSource::Frame(0));
        let detector = DogDetector::new(config).unwrap();
        let footage = Footage::new(vec![frame]).unwrap();
        let detection = detector.detect(&footage).unwrap();
        assert_eq!(detection.rois.len(), 2);
        assert!(detection.rois[0].contains(12, 12));
        assert!(detection.rois[1].contains(45, 28));
        assert!(detection.rois[0].centroid().distance(&PixelCoord::new(12, 12)) <= 1.5);
    }

    #[test]
    fn test_flat_frame_has_no_rois() {
        let frame = Frame::filled(25, 25, 0.4);
        let detector = DogDetector::new(DetectionConfig::default()).unwrap();
        let detection = detector.detect_frame(&frame).unwrap();
        assert!(detection.rois.is_empty());
    }

    #[test]
    fn test_source_frame_out_of_range() {
        let footage = Footage::new(vec![Frame::filled(8, 8, 0.0)]).unwrap();
        let config = DetectionConfig::default().with_source(DetectionSource::Frame(3));
        let detector = DogDetector::new(config).unwrap();
        assert!(detector.detect(&footage).is_err());
    }

    #[test]
    fn test_mask_detection() {
        let mask = Frame::from_fn(6, 6, |x, y| if x < 2 && y < 2 { 1.0 } else { 0.0 });
        let detection = detect_mask(&mask, 4000);
        assert_eq!(detection.rois.len(), 1);
        assert_eq!(detection.rois[0].len(), 4);
    }
}
