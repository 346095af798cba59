//! Polled frame batches.
//!
//! Frames are split into contiguous index ranges, one scoped worker per
//! range. Workers send each finished frame over a channel; the calling
//! thread polls that channel, reports progress, and asks the observer
//! whether to continue each time another `slow_after` interval elapses.
//! Cancelling stops workers before their next frame. Frames that already
//! finished are kept, and a frame that is in flight still completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Instant;

use cellpulse_core::{BatchDecision, BatchOptions, Error, Footage, Frame, ProgressObserver, Result};
use log::{debug, info};

use crate::convolution::partition;

/// Result of a frame batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// One slot per input frame; `None` where the batch was cancelled first.
    pub frames: Vec<Option<Frame>>,
    /// True if the observer cancelled the batch.
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Number of frames that finished.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    /// Returns true if every frame finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.frames.iter().all(Option::is_some)
    }

    /// Collects the frames into footage.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if any frame is missing.
    pub fn into_footage(self) -> Result<Footage> {
        let total = self.frames.len();
        let completed = self.completed();
        if completed != total {
            return Err(Error::Cancelled { completed, total });
        }
        Footage::new(self.frames.into_iter().flatten().collect())
    }
}

/// Runs `job(i)` for `i in 0..total` on scoped workers.
pub fn run_frame_batch<F>(
    total: usize,
    options: &BatchOptions,
    observer: &mut dyn ProgressObserver,
    job: F,
) -> BatchOutcome
where
    F: Fn(usize) -> Frame + Sync,
{
    let workers = options.resolved_workers().min(total.max(1));
    let cancel_flag = AtomicBool::new(false);
    let mut frames: Vec<Option<Frame>> = vec![None; total];
    let mut completed = 0usize;
    let mut cancelled = false;
    let start = Instant::now();
    let mut next_prompt = options.slow_after;

    debug!("frame batch: {total} frames on {workers} workers");

    std::thread::scope(|scope| {
        let (tx, rx) = channel::<(usize, Frame)>();
        for range in partition(total, workers) {
            let tx = tx.clone();
            let cancel_flag = &cancel_flag;
            let job = &job;
            scope.spawn(move || {
                for i in range {
                    if cancel_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if tx.send((i, job(i))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        loop {
            match rx.recv_timeout(options.poll_interval) {
                Ok((i, frame)) => {
                    frames[i] = Some(frame);
                    completed += 1;
                    observer.on_progress(completed, total);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !cancelled && start.elapsed() >= next_prompt {
                match observer.on_slow(start.elapsed()) {
                    BatchDecision::Continue => next_prompt += options.slow_after,
                    BatchDecision::Cancel => {
                        cancelled = true;
                        cancel_flag.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
    });

    if cancelled {
        info!("frame batch cancelled with {completed}/{total} frames done");
    } else {
        debug!(
            "frame batch finished in {:.3}s",
            start.elapsed().as_secs_f64()
        );
    }

    BatchOutcome { frames, cancelled }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use cellpulse_core::NoProgress;
    use std::time::Duration;

    struct Recorder {
        seen: Vec<usize>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&mut self, completed: usize, _total: usize) {
            self.seen.push(completed);
        }
    }

    struct CancelImmediately;

    impl ProgressObserver for CancelImmediately {
        fn on_slow(&mut self, _elapsed: Duration) -> BatchDecision {
            BatchDecision::Cancel
        }
    }

    #[test]
    fn test_batch_runs_every_frame_in_order() {
        let options = BatchOptions::default().with_workers(3);
        let mut recorder = Recorder { seen: Vec::new() };
        let outcome = run_frame_batch(10, &options, &mut recorder, |i| {
            Frame::filled(2, 2, i as f32)
        });
        assert!(outcome.is_complete());
        assert!(!outcome.cancelled);
        assert_eq!(recorder.seen, (1..=10).collect::<Vec<_>>());
        let footage = outcome.into_footage().unwrap();
        for (i, frame) in footage.iter().enumerate() {
            assert_eq!(frame.get(0, 0), i as f32);
        }
    }

    #[test]
    fn test_cancel_keeps_finished_frames() {
        let options = BatchOptions::default()
            .with_workers(1)
            .with_poll_interval(Duration::from_millis(1))
            .with_slow_after(Duration::ZERO);
        let outcome = run_frame_batch(200, &options, &mut CancelImmediately, |i| {
            std::thread::sleep(Duration::from_millis(2));
            Frame::filled(1, 1, i as f32)
        });
        assert!(outcome.cancelled);
        assert!(outcome.completed() < 200);
        // A single worker finishes frames in order, so completed frames
        // form a prefix with the right contents.
        for (i, slot) in outcome.frames.iter().enumerate() {
            if let Some(frame) = slot {
                assert_eq!(frame.get(0, 0), i as f32);
            }
        }
        assert!(matches!(
            outcome.into_footage(),
            Err(Error::Cancelled { total: 200, .. })
        ));
    }

    #[test]
    fn test_empty_batch() {
        let outcome = run_frame_batch(0, &BatchOptions::default(), &mut NoProgress, |_| {
            Frame::filled(1, 1, 0.0)
        });
        assert!(outcome.frames.is_empty());
        assert!(!outcome.cancelled);
    }
}
