//! Separable convolution kernels.

use crate::error::{ConfigError, Result};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest Gaussian sigma accepted; the kernel then spans 6143 taps.
pub const MAX_SIGMA: f64 = 1024.0;

/// A separable 2-D kernel given by its horizontal and vertical 1-D factors.
///
/// Both factors have the same odd length `k`; the centre tap sits at
/// index `k / 2`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Filter {
    x_kernel: Vec<f32>,
    y_kernel: Vec<f32>,
}

impl Filter {
    /// Builds a filter from explicit factors.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidKernel`] if a factor is empty, has even
    /// length, contains non-finite values, or the lengths differ.
    pub fn new(x_kernel: Vec<f32>, y_kernel: Vec<f32>) -> Result<Self> {
        for (axis, kernel) in [("x", &x_kernel), ("y", &y_kernel)] {
            if kernel.len() % 2 == 0 {
                return Err(ConfigError::InvalidKernel(format!(
                    "{axis} kernel length {} is not odd",
                    kernel.len()
                ))
                .into());
            }
            if kernel.iter().any(|v| !v.is_finite()) {
                return Err(
                    ConfigError::InvalidKernel(format!("{axis} kernel has non-finite taps")).into(),
                );
            }
        }
        if x_kernel.len() != y_kernel.len() {
            return Err(ConfigError::InvalidKernel(format!(
                "x kernel length {} differs from y kernel length {}",
                x_kernel.len(),
                y_kernel.len()
            ))
            .into());
        }
        Ok(Self { x_kernel, y_kernel })
    }

    /// Gaussian kernel of width `6 * ceil(sigma) - 1`.
    ///
    /// Taps are `exp(-a^2 / 2 sigma^2) / (sigma * sqrt(2 pi))` and are not
    /// re-normalized, so for small sigma the truncated sum is below 1.
    /// Use [`Filter::normalized`] for a unit-gain kernel.
    ///
    /// # Errors
    /// Returns an error unless `sigma` is finite, positive and at most
    /// [`MAX_SIGMA`].
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn gaussian(sigma: f64) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0 && sigma <= MAX_SIGMA) {
            return Err(ConfigError::out_of_range("sigma", sigma, "finite, > 0 and <= 1024").into());
        }
        let size = (sigma.ceil() as usize)
            .checked_mul(6)
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| ConfigError::out_of_range("sigma", sigma, "finite, > 0 and <= 1024"))?;
        let radius = (size / 2) as i64;
        let scale = 1.0 / (sigma * (2.0 * PI).sqrt());
        let kernel: Vec<f32> = (-radius..=radius)
            .map(|a| {
                let a = a as f64;
                (scale * (-(a * a) / (2.0 * sigma * sigma)).exp()) as f32
            })
            .collect();
        Ok(Self {
            y_kernel: kernel.clone(),
            x_kernel: kernel,
        })
    }

    /// Flat kernel of ones.
    ///
    /// # Errors
    /// Returns an error unless `size` is odd.
    pub fn box_filter(size: usize) -> Result<Self> {
        let kernel = vec![1.0; size];
        Self::new(kernel.clone(), kernel)
    }

    /// Copy of the filter with each factor scaled to sum to 1.
    ///
    /// Factors whose sum is zero or not finite are left as they are.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn unit(kernel: &[f32]) -> Vec<f32> {
            let sum: f32 = kernel.iter().sum();
            if sum == 0.0 || !sum.is_finite() {
                kernel.to_vec()
            } else {
                kernel.iter().map(|v| v / sum).collect()
            }
        }
        Self {
            x_kernel: unit(&self.x_kernel),
            y_kernel: unit(&self.y_kernel),
        }
    }

    /// Horizontal factor.
    #[must_use]
    pub fn x_kernel(&self) -> &[f32] {
        &self.x_kernel
    }

    /// Vertical factor.
    #[must_use]
    pub fn y_kernel(&self) -> &[f32] {
        &self.y_kernel
    }

    /// Kernel length `k`.
    #[must_use]
    pub fn size(&self) -> usize {
        self.x_kernel.len()
    }

    /// Distance from the centre tap to either end, `k / 2`.
    #[must_use]
    pub fn radius(&self) -> usize {
        self.x_kernel.len() / 2
    }

    /// Full `k x k` kernel as the outer product of the factors, row-major
    /// with rows following `y_kernel`.
    #[must_use]
    pub fn dense(&self) -> Vec<f32> {
        self.y_kernel
            .iter()
            .flat_map(|&ky| self.x_kernel.iter().map(move |&kx| kx * ky))
            .collect()
    }
}

/// Two-dimensional Gaussian weight at offset `(a, b)` from the centre.
#[must_use]
pub fn gaussian_weight(a: f64, b: f64, sigma: f64) -> f64 {
    (1.0 / (2.0 * PI * sigma * sigma)) * (-(a * a + b * b) / (2.0 * sigma * sigma)).exp()
}
