//! Separable 2-D convolution.
//!
//! The kernel is applied as a horizontal pass followed by a vertical pass.
//! Each pass only writes the valid interior (at least `k / 2` pixels from
//! the edges it runs along); other pixels keep their input values. Callers
//! that need the full frame extend it with [`Frame::extend`] first and
//! shrink it back afterwards.

use std::ops::Range;

use cellpulse_core::{BatchOptions, Filter, Footage, Frame, ProgressObserver};
use rayon::prelude::*;

use crate::batch::{run_frame_batch, BatchOutcome};

/// Applies a separable [`Filter`] to frames.
#[derive(Debug, Clone)]
pub struct SeparableConvolution {
    filter: Filter,
    workers: usize,
}

impl SeparableConvolution {
    /// Creates a single-threaded convolution.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self { filter, workers: 1 }
    }

    /// Sets the number of partitions per pass; 0 selects the hardware
    /// parallelism. Results do not depend on this value.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// The kernel being applied.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Convolves one frame.
    #[must_use]
    pub fn apply(&self, frame: &Frame) -> Frame {
        let workers = BatchOptions::default()
            .with_workers(self.workers)
            .resolved_workers();
        if workers <= 1 {
            convolve(frame, &self.filter)
        } else {
            convolve_partitioned(frame, &self.filter, workers)
        }
    }

    /// Convolves every frame of `footage`, one frame per task.
    ///
    /// Frames run single-threaded inside the batch workers. Cancelling via
    /// the observer keeps the frames that had already finished.
    pub fn apply_batch(
        &self,
        footage: &Footage,
        options: &BatchOptions,
        observer: &mut dyn ProgressObserver,
    ) -> BatchOutcome {
        let frames = footage.frames();
        run_frame_batch(frames.len(), options, observer, |i| {
            convolve(&frames[i], &self.filter)
        })
    }
}

/// Single-threaded separable convolution.
#[must_use]
pub fn convolve(frame: &Frame, filter: &Filter) -> Frame {
    let (w, h) = (frame.width(), frame.height());
    let src = frame.as_slice();

    let mut tmp = src.to_vec();
    for y in 0..h {
        horizontal_row(
            &src[y * w..(y + 1) * w],
            &mut tmp[y * w..(y + 1) * w],
            filter.x_kernel(),
        );
    }

    let mut out = tmp.clone();
    vertical_columns(&tmp, w, h, 0..w, filter.y_kernel(), |x, y, v| {
        out[y * w + x] = v;
    });

    into_frame(w, h, out)
}

/// Multi-threaded separable convolution over `workers` contiguous row
/// ranges (horizontal pass) and column ranges (vertical pass).
///
/// Every output pixel is computed with the same operations in the same
/// order as [`convolve`], so both paths agree bit for bit.
#[must_use]
pub fn convolve_partitioned(frame: &Frame, filter: &Filter, workers: usize) -> Frame {
    let (w, h) = (frame.width(), frame.height());
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let src = frame.as_slice();

    let mut tmp = src.to_vec();
    let mut row_blocks = Vec::new();
    let mut rest = tmp.as_mut_slice();
    for range in partition(h, workers) {
        let (block, tail) = rest.split_at_mut(range.len() * w);
        row_blocks.push((range, block));
        rest = tail;
    }
    row_blocks.into_par_iter().for_each(|(rows, block)| {
        for (local, y) in rows.enumerate() {
            horizontal_row(
                &src[y * w..(y + 1) * w],
                &mut block[local * w..(local + 1) * w],
                filter.x_kernel(),
            );
        }
    });

    let column_blocks: Vec<(Range<usize>, Vec<f32>)> = partition(w, workers)
        .into_par_iter()
        .map(|cols| {
            let bw = cols.len();
            let mut block = Vec::with_capacity(bw * h);
            for y in 0..h {
                block.extend_from_slice(&tmp[y * w + cols.start..y * w + cols.end]);
            }
            let x0 = cols.start;
            vertical_columns(&tmp, w, h, cols, filter.y_kernel(), |x, y, v| {
                block[y * bw + (x - x0)] = v;
            });
            (x0..x0 + bw, block)
        })
        .collect();

    let mut out = tmp.clone();
    for (cols, block) in column_blocks {
        let bw = cols.len();
        for y in 0..h {
            out[y * w + cols.start..y * w + cols.end]
                .copy_from_slice(&block[y * bw..(y + 1) * bw]);
        }
    }

    into_frame(w, h, out)
}

/// Splits `0..len` into `parts` contiguous ranges; the last range takes the
/// remainder. Empty ranges are dropped.
#[must_use]
pub fn partition(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, len.max(1));
    let step = len / parts;
    (0..parts)
        .map(|i| {
            let start = i * step;
            let end = if i + 1 == parts { len } else { start + step };
            start..end
        })
        .filter(|r| !r.is_empty())
        .collect()
}

#[inline]
fn horizontal_row(src: &[f32], dst: &mut [f32], kernel: &[f32]) {
    let k = kernel.len();
    let r = k / 2;
    if src.len() < k {
        return;
    }
    for x in r..src.len() - r {
        let mut acc = 0.0f32;
        for (j, &kv) in kernel.iter().enumerate() {
            acc += src[x + r - j] * kv;
        }
        dst[x] = acc;
    }
}

#[inline]
fn vertical_columns(
    src: &[f32],
    w: usize,
    h: usize,
    cols: Range<usize>,
    kernel: &[f32],
    mut write: impl FnMut(usize, usize, f32),
) {
    let k = kernel.len();
    let r = k / 2;
    if h < k {
        return;
    }
    for x in cols {
        for y in r..h - r {
            let mut acc = 0.0f32;
            for (j, &kv) in kernel.iter().enumerate() {
                acc += src[(y + r - j) * w + x] * kv;
            }
            write(x, y, acc);
        }
    }
}

fn into_frame(w: usize, h: usize, data: Vec<f32>) -> Frame {
    // Length is w * h by construction.
    Frame::new(w, h, data).unwrap_or_else(|_| Frame::filled(w, h, 0.0))
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn textured(w: usize, h: usize) -> Frame {
        Frame::from_fn(w, h, |x, y| {
            ((x * 7 + y * 13) % 17) as f32 / 17.0 + (x as f32 * 0.31).sin() * 0.1
        })
    }

    #[test]
    fn test_box_filter_sums_neighbourhood() {
        let frame = Frame::filled(7, 7, 1.0);
        let out = convolve(&frame, &Filter::box_filter(3).unwrap());
        // Interior pixels sum the 3x3 neighbourhood.
        assert_eq!(out.get(3, 3), 9.0);
        assert_eq!(out.get(1, 1), 9.0);
        // Corners are untouched by both passes.
        assert_eq!(out.get(0, 0), 1.0);
        // Left edge column is only touched by the vertical pass.
        assert_eq!(out.get(0, 3), 3.0);
        // Top edge row is only touched by the horizontal pass.
        assert_eq!(out.get(3, 0), 3.0);
    }

    #[test]
    fn test_true_convolution_flips_kernel() {
        // An impulse reproduces the kernel mirrored around the centre.
        let mut data = vec![0.0; 25];
        data[2 * 5 + 2] = 1.0;
        let frame = Frame::new(5, 5, data).unwrap();
        let filter = Filter::new(vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]).unwrap();
        let out = convolve(&frame, &filter);
        assert_eq!(out.get(1, 2), 1.0);
        assert_eq!(out.get(2, 2), 2.0);
        assert_eq!(out.get(3, 2), 3.0);
    }

    #[test]
    fn test_small_frame_is_untouched() {
        let frame = textured(3, 3);
        let out = convolve(&frame, &Filter::gaussian(1.0).unwrap());
        assert_eq!(out, frame);
    }

    #[test]
    fn test_partitioned_matches_sequential() {
        let frame = textured(37, 23);
        let filter = Filter::gaussian(2.0).unwrap();
        let expected = convolve(&frame, &filter);
        for workers in [1, 2, 3, 4, 7, 64] {
            let got = convolve_partitioned(&frame, &filter, workers);
            assert_eq!(got, expected, "workers = {workers}");
        }
    }

    #[test]
    fn test_partition_ranges() {
        assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert_eq!(partition(0, 4), Vec::<Range<usize>>::new());
    }
}
