//! Footage-wide contrast normalization.

use cellpulse_core::{BatchOptions, Footage, ProgressObserver};
use log::debug;
use rayon::prelude::*;

use crate::batch::{run_frame_batch, BatchOutcome};

/// Global minimum and maximum over every frame.
#[must_use]
pub fn footage_range(footage: &Footage) -> Option<(f32, f32)> {
    footage
        .frames()
        .par_iter()
        .filter_map(cellpulse_core::Frame::min_max)
        .reduce_with(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)))
}

/// Maps the global value range of `footage` onto `[0, 1]`, frame by frame.
///
/// Uses one shared range so relative brightness between frames survives.
pub fn stretch_footage(
    footage: &Footage,
    options: &BatchOptions,
    observer: &mut dyn ProgressObserver,
) -> BatchOutcome {
    let (lo, hi) = footage_range(footage).unwrap_or((0.0, 1.0));
    debug!("stretching {} frames from [{lo}, {hi}]", footage.len());
    let frames = footage.frames();
    run_frame_batch(frames.len(), options, observer, |i| frames[i].stretched(lo, hi))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use cellpulse_core::{Frame, NoProgress};

    #[test]
    fn test_stretch_uses_global_range() {
        let footage = Footage::new(vec![
            Frame::new(2, 1, vec![2.0, 4.0]).unwrap(),
            Frame::new(2, 1, vec![6.0, 10.0]).unwrap(),
        ])
        .unwrap();
        assert_eq!(footage_range(&footage), Some((2.0, 10.0)));

        let out = stretch_footage(&footage, &BatchOptions::default(), &mut NoProgress)
            .into_footage()
            .unwrap();
        assert_eq!(out.frames()[0].as_slice(), &[0.0, 0.25]);
        assert_eq!(out.frames()[1].as_slice(), &[0.5, 1.0]);
    }
}
