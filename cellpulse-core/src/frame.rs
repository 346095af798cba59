//! Grayscale frames and footage.
//!
//! A [`Frame`] is an immutable row-major grid of `f32` intensities, nominally
//! normalized to `[0, 1]`. [`Footage`] is a time-ordered, non-empty sequence
//! of frames sharing one size.

use crate::error::{ConfigError, Error, InsufficientDataError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single grayscale frame stored row-major.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Frame {
    /// Creates a frame from row-major values.
    ///
    /// # Errors
    /// Returns an error if `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(ConfigError::out_of_range(
                "frame data length",
                data.len(),
                "equal to width * height",
            )
            .into());
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Creates a frame with every pixel set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Creates a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the frame has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major pixel values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the frame, returning its row-major values.
    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Linear index of `(x, y)`.
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Value at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the frame.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.index(x, y)]
    }

    /// One row of the frame.
    #[must_use]
    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Smallest and largest pixel value, `None` for an empty frame.
    #[must_use]
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let first = *self.data.first()?;
        Some(
            self.data
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Checks that `other` has the same dimensions.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] otherwise.
    pub fn ensure_same_size(&self, other: &Frame) -> Result<()> {
        if self.width == other.width && self.height == other.height {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                width: self.width,
                height: self.height,
                found_width: other.width,
                found_height: other.height,
            })
        }
    }

    /// Pads the frame by `border` pixels on every side, replicating the
    /// nearest edge pixel (corners included).
    #[must_use]
    pub fn extend(&self, border: usize) -> Frame {
        if self.is_empty() {
            return self.clone();
        }
        let (w, h) = (self.width, self.height);
        Frame::from_fn(w + 2 * border, h + 2 * border, |x, y| {
            let sx = x.saturating_sub(border).min(w - 1);
            let sy = y.saturating_sub(border).min(h - 1);
            self.get(sx, sy)
        })
    }

    /// Removes `border` pixels from every side. Inverse of [`Frame::extend`].
    ///
    /// # Errors
    /// Returns an error if the border consumes the whole frame.
    pub fn shrink(&self, border: usize) -> Result<Frame> {
        if 2 * border >= self.width || 2 * border >= self.height {
            return Err(ConfigError::out_of_range(
                "shrink border",
                border,
                "less than half of both frame dimensions",
            )
            .into());
        }
        Ok(Frame::from_fn(
            self.width - 2 * border,
            self.height - 2 * border,
            |x, y| self.get(x + border, y + border),
        ))
    }

    /// Pixel-wise `self - other`.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the sizes differ.
    pub fn difference(&self, other: &Frame) -> Result<Frame> {
        self.ensure_same_size(other)?;
        Ok(Frame {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a - b)
                .collect(),
        })
    }

    /// Linearly maps `[min, max]` onto `[0, 1]`.
    ///
    /// A zero or non-finite range leaves the scale at 1, so only the offset
    /// is applied.
    #[must_use]
    pub fn stretched(&self, min: f32, max: f32) -> Frame {
        let mut factor = 1.0 / (max - min);
        if !factor.is_finite() {
            factor = 1.0;
        }
        Frame {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| (v - min) * factor).collect(),
        }
    }

    /// Stretches the frame to its own value range.
    #[must_use]
    pub fn stretch_contrast(&self) -> Frame {
        match self.min_max() {
            Some((lo, hi)) => self.stretched(lo, hi),
            None => self.clone(),
        }
    }

    /// Pixel-wise mean of `frames`.
    ///
    /// # Errors
    /// Returns an error if `frames` is empty or sizes differ.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(frames: &[Frame]) -> Result<Frame> {
        let first = frames
            .first()
            .ok_or(InsufficientDataError::EmptyFootage)?;
        let mut sum = vec![0.0f64; first.len()];
        for frame in frames {
            first.ensure_same_size(frame)?;
            for (acc, &v) in sum.iter_mut().zip(&frame.data) {
                *acc += f64::from(v);
            }
        }
        let n = frames.len() as f64;
        #[allow(clippy::cast_possible_truncation)]
        let data = sum.into_iter().map(|s| (s / n) as f32).collect();
        Ok(Frame {
            width: first.width,
            height: first.height,
            data,
        })
    }
}

/// Time-ordered frames of identical size.
#[derive(Debug, Clone, PartialEq)]
pub struct Footage {
    frames: Vec<Frame>,
}

impl Footage {
    /// Wraps a frame sequence.
    ///
    /// # Errors
    /// Returns an error if `frames` is empty or the sizes are not uniform.
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        let first = frames
            .first()
            .ok_or(InsufficientDataError::EmptyFootage)?;
        for frame in &frames[1..] {
            first.ensure_same_size(frame)?;
        }
        Ok(Self { frames })
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false: footage holds at least one frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.frames[0].width()
    }

    /// Frame height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.frames[0].height()
    }

    /// Length of the frame diagonal in pixels.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        (self.width() as f64).hypot(self.height() as f64)
    }

    /// All frames in time order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The frame at `index`, if any.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Iterates over frames in time order.
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Pixel-wise mean over all frames.
    ///
    /// # Errors
    /// Never fails for a constructed footage; the signature follows
    /// [`Frame::average`].
    pub fn average_frame(&self) -> Result<Frame> {
        Frame::average(&self.frames)
    }

    /// Consumes the footage, returning its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl<'a> IntoIterator for &'a Footage {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> Frame {
        Frame::from_fn(width, height, |x, y| (y * width + x) as f32)
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(Frame::new(3, 3, vec![0.0; 8]).is_err());
        assert!(Frame::new(3, 3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn test_extend_replicates_edges() {
        let frame = ramp(3, 2);
        let ext = frame.extend(2);
        assert_eq!(ext.width(), 7);
        assert_eq!(ext.height(), 6);
        // Corners copy the corner pixel.
        assert_eq!(ext.get(0, 0), frame.get(0, 0));
        assert_eq!(ext.get(6, 5), frame.get(2, 1));
        // Top border copies the first row.
        assert_eq!(ext.get(3, 0), frame.get(1, 0));
        // Interior is the original frame.
        assert_eq!(ext.get(2, 2), frame.get(0, 0));
        assert_eq!(ext.get(4, 3), frame.get(2, 1));
    }

    #[test]
    fn test_extend_then_shrink_is_identity() {
        let frame = ramp(5, 4);
        let back = frame.extend(3).shrink(3).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_shrink_rejects_oversized_border() {
        let frame = ramp(4, 4);
        assert!(frame.shrink(2).is_err());
    }

    #[test]
    fn test_difference_checks_size() {
        let a = Frame::filled(2, 2, 1.0);
        let b = Frame::filled(2, 2, 0.25);
        let c = Frame::filled(3, 2, 0.0);
        assert_eq!(a.difference(&b).unwrap().as_slice(), &[0.75; 4]);
        assert!(matches!(
            a.difference(&c),
            Err(Error::DimensionMismatch { found_width: 3, .. })
        ));
    }

    #[test]
    fn test_stretch_contrast() {
        let frame = Frame::new(2, 1, vec![2.0, 4.0]).unwrap();
        assert_eq!(frame.stretch_contrast().as_slice(), &[0.0, 1.0]);

        // Flat frames keep a unit scale.
        let flat = Frame::filled(2, 2, 0.5);
        assert_eq!(flat.stretch_contrast().as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_average() {
        let a = Frame::filled(2, 2, 1.0);
        let b = Frame::filled(2, 2, 3.0);
        assert_eq!(Frame::average(&[a, b]).unwrap().as_slice(), &[2.0; 4]);
        assert!(Frame::average(&[]).is_err());
    }

    #[test]
    fn test_footage_requires_uniform_frames() {
        let ok = Footage::new(vec![Frame::filled(4, 3, 0.0), Frame::filled(4, 3, 1.0)]).unwrap();
        assert_eq!(ok.len(), 2);
        assert!((ok.diagonal() - 5.0).abs() < 1e-12);

        let mixed = Footage::new(vec![Frame::filled(4, 3, 0.0), Frame::filled(3, 4, 0.0)]);
        assert!(mixed.is_err());
        assert!(Footage::new(Vec::new()).is_err());
    }
}
