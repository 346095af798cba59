//! Versioned analysis session.
//!
//! The session owns the footage, the ROI list and everything derived from
//! them. Each structural change (new footage, re-detection, inserting or
//! deleting an ROI) bumps the version; derived results remember the version
//! they were computed at and are refused once it no longer matches.

use std::collections::HashMap;

use cellpulse_core::roi::DEFAULT_MANUAL_DIAMETER;
use cellpulse_core::{
    BaselineConfig, BatchOptions, BoundingBox, ConfigError, ConnectivityConfig, DetectionConfig,
    Error, EventTrain, Footage, Frame, MeasurementMode, PixelCoord, ProgressObserver, Provenance,
    Result, Roi, RoiKey, SimilaritySource, SpikeConfig, TraceMatrix,
};
use log::{debug, info, warn};

use crate::baseline::{background_level, BaselineNormalizer, NormalizedTraces};
use crate::connectivity::{
    ConnectivityAnalyzer, ConnectivityNode, ConnectivityReport, CorrelationTable,
};
use crate::detection::{Detection, ResourceLimitWarning};
use crate::dog::{detect_mask, DogDetector};
use crate::extraction::SignalExtractor;
use crate::spikes::SpikeDetector;
use crate::summary::{frame_means, scale_to_peak, summarize, TraceSummary};
use crate::validation::{validate_detection, ValidationReport};
use crate::xcorr::Centering;

/// Value tagged with the session version it was computed at.
#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

/// Raw and normalized traces from one activity recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// Measurement mode the traces were sampled with.
    pub mode: MeasurementMode,
    /// Raw traces, one row per ROI in session order.
    pub raw: TraceMatrix,
    /// Baseline and dF/F0.
    pub normalized: NormalizedTraces,
}

impl Activity {
    /// Per-ROI statistics over the raw and dF/F0 rows.
    #[must_use]
    pub fn summaries(&self) -> Vec<TraceSummary> {
        summarize(&self.raw, &self.normalized.delta_f)
    }

    /// dF/F0 with each ROI divided by its own peak magnitude.
    #[must_use]
    pub fn scaled_delta_f(&self) -> TraceMatrix {
        scale_to_peak(&self.normalized.delta_f)
    }

    /// Mean dF/F0 across ROIs for every frame.
    #[must_use]
    pub fn mean_delta_f(&self) -> Vec<f32> {
        frame_means(&self.normalized.delta_f)
    }
}

/// Owner of one footage, its ROIs and the derived arrays.
#[derive(Debug)]
pub struct AnalysisSession {
    footage: Footage,
    rois: Vec<Roi>,
    index: HashMap<RoiKey, usize>,
    next_manual_id: u32,
    version: u64,
    warnings: Vec<ResourceLimitWarning>,
    activity: Option<Versioned<Activity>>,
    events: Option<Versioned<Vec<EventTrain>>>,
    batch: BatchOptions,
}

impl AnalysisSession {
    /// Starts a session on `footage` with no ROIs.
    #[must_use]
    pub fn new(footage: Footage) -> Self {
        Self {
            footage,
            rois: Vec::new(),
            index: HashMap::new(),
            next_manual_id: 0,
            version: 0,
            warnings: Vec::new(),
            activity: None,
            events: None,
            batch: BatchOptions::default(),
        }
    }

    /// Sets the scheduling options used by convolution.
    #[must_use]
    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    /// Current footage.
    #[must_use]
    pub fn footage(&self) -> &Footage {
        &self.footage
    }

    /// Structural version; changes whenever the ROIs or footage change.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// ROIs in session order: manual ROIs first, then detected ones.
    #[must_use]
    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    /// Looks up an ROI by key.
    #[must_use]
    pub fn roi(&self, key: RoiKey) -> Option<&Roi> {
        self.index.get(&key).map(|&i| &self.rois[i])
    }

    /// Row of `key` in the trace matrices.
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoi`] if the session has no such ROI.
    pub fn index_of(&self, key: RoiKey) -> Result<usize> {
        self.index
            .get(&key)
            .copied()
            .ok_or_else(|| Error::UnknownRoi(key.to_string()))
    }

    /// Truncation warnings from the last detection run.
    #[must_use]
    pub fn warnings(&self) -> &[ResourceLimitWarning] {
        &self.warnings
    }

    /// Replaces the footage, discarding every ROI and derived result.
    pub fn replace_footage(&mut self, footage: Footage) {
        self.footage = footage;
        self.rois.clear();
        self.warnings.clear();
        self.next_manual_id = 0;
        self.structure_changed();
    }

    /// Runs difference-of-Gaussians detection and replaces the detected
    /// ROIs. Manual ROIs are kept.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid; the session is
    /// unchanged in that case.
    pub fn detect_rois(&mut self, config: &DetectionConfig) -> Result<usize> {
        let detection = DogDetector::new(config.clone())?
            .with_workers(self.batch.workers)
            .detect(&self.footage)?;
        Ok(self.install_detection(detection))
    }

    /// Segments a binary mask and replaces the detected ROIs.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the mask and footage sizes
    /// differ.
    pub fn detect_from_mask(&mut self, mask: &Frame, size_cap: usize) -> Result<usize> {
        if mask.width() != self.footage.width() || mask.height() != self.footage.height() {
            return Err(Error::DimensionMismatch {
                width: self.footage.width(),
                height: self.footage.height(),
                found_width: mask.width(),
                found_height: mask.height(),
            });
        }
        Ok(self.install_detection(detect_mask(mask, size_cap)))
    }

    fn install_detection(&mut self, detection: Detection) -> usize {
        let count = detection.rois.len();
        self.rois.retain(|roi| roi.provenance() == Provenance::Manual);
        self.rois.extend(detection.rois);
        self.warnings = detection.warnings;
        self.structure_changed();
        info!("{count} ROIs detected, {} in session", self.rois.len());
        count
    }

    /// Adds a manual disc ROI; `None` uses the default diameter.
    ///
    /// # Errors
    /// Returns an error if `center` is outside the footage.
    pub fn insert_manual_roi(&mut self, center: PixelCoord, diameter: Option<u32>) -> Result<RoiKey> {
        let roi = Roi::manual_disc(
            self.next_manual_id,
            center,
            diameter.unwrap_or(DEFAULT_MANUAL_DIAMETER),
            self.footage.width(),
            self.footage.height(),
        )?;
        self.next_manual_id += 1;
        let key = roi.key();
        let at = self
            .rois
            .iter()
            .take_while(|r| r.provenance() == Provenance::Manual)
            .count();
        self.rois.insert(at, roi);
        self.structure_changed();
        Ok(key)
    }

    /// Removes an ROI.
    ///
    /// # Errors
    /// Returns [`Error::UnknownRoi`] if the session has no such ROI.
    pub fn delete_roi(&mut self, key: RoiKey) -> Result<Roi> {
        let i = self.index_of(key)?;
        let roi = self.rois.remove(i);
        self.structure_changed();
        Ok(roi)
    }

    /// Samples and normalizes traces for every ROI.
    ///
    /// Event trains from an earlier pass are discarded on success.
    ///
    /// # Errors
    /// Returns an error for invalid parameters or insufficient data; earlier
    /// results are kept in that case.
    pub fn record_activity(&mut self, mode: MeasurementMode, baseline: &BaselineConfig) -> Result<()> {
        let normalizer = BaselineNormalizer::new(baseline.clone())?;
        let raw = SignalExtractor::new(mode).extract(&self.footage, &self.rois)?;
        if baseline.window_length > self.footage.len() {
            return Err(ConfigError::InsufficientFrames {
                name: "window_length",
                value: baseline.window_length,
                frames: self.footage.len(),
            }
            .into());
        }
        let f_min = self.footage.frame(0).map_or(0.0, background_level);
        let normalized = normalizer.normalize(&raw, f_min)?;
        debug!("background level {f_min}");
        self.activity = Some(Versioned {
            version: self.version,
            value: Activity {
                mode,
                raw,
                normalized,
            },
        });
        self.events = None;
        Ok(())
    }

    /// Runs spike detection on the current dF/F0 traces.
    ///
    /// # Errors
    /// Returns [`Error::NotComputed`] or [`Error::Stale`] without current
    /// activity. A lag longer than the footage also drops any earlier
    /// event trains.
    pub fn detect_spikes(&mut self, config: &SpikeConfig) -> Result<()> {
        let detector = SpikeDetector::new(config.clone())?;
        let version = self.version;
        let trains = match detector.detect_all(&self.activity()?.normalized.delta_f) {
            Ok(trains) => trains,
            Err(err @ Error::Config(ConfigError::InsufficientFrames { .. })) => {
                warn!("spike detection aborted: {err}");
                self.events = None;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.events = Some(Versioned {
            version,
            value: trains,
        });
        Ok(())
    }

    /// Current activity.
    ///
    /// # Errors
    /// Returns [`Error::NotComputed`] or [`Error::Stale`].
    pub fn activity(&self) -> Result<&Activity> {
        self.current(self.activity.as_ref(), "activity")
    }

    /// Current event trains, one per ROI in session order.
    ///
    /// # Errors
    /// Returns [`Error::NotComputed`] or [`Error::Stale`].
    pub fn events(&self) -> Result<&[EventTrain]> {
        self.current(self.events.as_ref(), "event trains")
            .map(Vec::as_slice)
    }

    /// Connectivity among `subset` (all ROIs when `None`).
    ///
    /// # Errors
    /// Returns an error for invalid parameters, unknown ROIs, missing or
    /// stale inputs, or cancellation by `observer`.
    pub fn connectivity(
        &self,
        config: &ConnectivityConfig,
        subset: Option<&[RoiKey]>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<ConnectivityReport> {
        let analyzer =
            ConnectivityAnalyzer::new(config.clone())?.with_slow_after(self.batch.slow_after);
        let (rows, series) = self.similarity_series(config.source, subset)?;
        let nodes: Vec<ConnectivityNode<'_>> = rows
            .iter()
            .zip(&series)
            .map(|(&r, s)| ConnectivityNode {
                key: self.rois[r].key(),
                centroid: self.rois[r].centroid(),
                series: s,
            })
            .collect();
        analyzer.analyze(&nodes, self.footage.diagonal(), observer)
    }

    /// Ungated correlation of every pair in `subset` (all ROIs when `None`)
    /// at a single `lag`, for export alongside the connectivity report.
    ///
    /// # Errors
    /// Returns an error for unknown ROIs or missing or stale inputs.
    pub fn correlation_table(
        &self,
        source: SimilaritySource,
        lag: isize,
        subset: Option<&[RoiKey]>,
    ) -> Result<CorrelationTable> {
        let (rows, series) = self.similarity_series(source, subset)?;
        let entries: Vec<(RoiKey, &[f32])> = rows
            .iter()
            .zip(&series)
            .map(|(&r, s)| (self.rois[r].key(), s.as_slice()))
            .collect();
        Ok(CorrelationTable::new(&entries, lag, Centering::MeanCentered))
    }

    /// Scores detected ROIs against manual ones inside `area`.
    #[must_use]
    pub fn validation(&self, area: &BoundingBox) -> ValidationReport {
        let (manual, detected): (Vec<Roi>, Vec<Roi>) = self
            .rois
            .iter()
            .cloned()
            .partition(|roi| roi.provenance() == Provenance::Manual);
        validate_detection(&detected, &manual, area)
    }

    fn similarity_series(
        &self,
        source: SimilaritySource,
        subset: Option<&[RoiKey]>,
    ) -> Result<(Vec<usize>, Vec<Vec<f32>>)> {
        let rows: Vec<usize> = match subset {
            Some(keys) => keys
                .iter()
                .map(|&k| self.index_of(k))
                .collect::<Result<_>>()?,
            None => (0..self.rois.len()).collect(),
        };
        let series = match source {
            SimilaritySource::EventTrain => {
                let events = self.events()?;
                rows.iter().map(|&r| events[r].indicator()).collect()
            }
            SimilaritySource::Trace => {
                let delta_f = &self.activity()?.normalized.delta_f;
                rows.iter().map(|&r| delta_f.row(r).to_vec()).collect()
            }
        };
        Ok((rows, series))
    }

    fn current<'a, T>(&self, slot: Option<&'a Versioned<T>>, stage: &'static str) -> Result<&'a T> {
        let data = slot.ok_or(Error::NotComputed(stage))?;
        if data.version != self.version {
            return Err(Error::Stale {
                computed: data.version,
                current: self.version,
            });
        }
        Ok(&data.value)
    }

    fn structure_changed(&mut self) {
        self.version += 1;
        self.index = self
            .rois
            .iter()
            .enumerate()
            .map(|(i, roi)| (roi.key(), i))
            .collect();
        debug!("session version {} with {} ROIs", self.version, self.rois.len());
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use cellpulse_core::{InsufficientDataError, NoProgress};

    fn footage(frames: usize) -> Footage {
        let frames = (0..frames)
            .map(|t| {
                Frame::from_fn(40, 40, |x, y| {
                    let pulse = if t % 7 == 3 { 0.4 } else { 0.0 };
                    if (8..14).contains(&x) && (8..14).contains(&y) {
                        0.3 + pulse
                    } else if (25..31).contains(&x) && (20..26).contains(&y) {
                        0.35
                    } else {
                        0.05
                    }
                })
            })
            .collect();
        Footage::new(frames).unwrap()
    }

    fn mask() -> Frame {
        Frame::from_fn(40, 40, |x, y| {
            let a = (8..14).contains(&x) && (8..14).contains(&y);
            let b = (25..31).contains(&x) && (20..26).contains(&y);
            if a || b {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_structural_changes_invalidate_activity() {
        let mut session = AnalysisSession::new(footage(30));
        assert_eq!(session.detect_from_mask(&mask(), 4000).unwrap(), 2);
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        assert_eq!(session.activity().unwrap().raw.n_rois(), 2);

        let key = session
            .insert_manual_roi(PixelCoord::new(20, 20), Some(4))
            .unwrap();
        assert_eq!(key.to_string(), "ManualROI0");
        assert!(matches!(session.activity(), Err(Error::Stale { .. })));
        assert_eq!(session.index_of(key).unwrap(), 0);

        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        assert_eq!(session.activity().unwrap().raw.n_rois(), 3);
        session.delete_roi(key).unwrap();
        assert!(session.activity().is_err());
        assert!(session.index_of(key).is_err());
    }

    #[test]
    fn test_failed_stage_keeps_previous_results() {
        let mut session = AnalysisSession::new(footage(30));
        session.detect_from_mask(&mask(), 4000).unwrap();
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        let before = session.activity().unwrap().clone();
        let bad = BaselineConfig::default().with_percentile(0.0);
        assert!(session.record_activity(MeasurementMode::Maximum, &bad).is_err());
        assert_eq!(session.activity().unwrap(), &before);
    }

    #[test]
    fn test_spike_lag_too_long_drops_events() {
        let mut session = AnalysisSession::new(footage(30));
        session.detect_from_mask(&mask(), 4000).unwrap();
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        session.detect_spikes(&SpikeConfig::default()).unwrap();
        assert_eq!(session.events().unwrap().len(), 2);
        let err = session
            .detect_spikes(&SpikeConfig::default().with_lag(31))
            .unwrap_err();
        assert!(err.to_string().contains("lag = 31"));
        assert!(matches!(session.events(), Err(Error::NotComputed(_))));
    }

    #[test]
    fn test_no_rois_is_insufficient_data() {
        let mut session = AnalysisSession::new(footage(5));
        let err = session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default().with_window_length(3))
            .unwrap_err();
        assert_eq!(err, Error::InsufficientData(InsufficientDataError::NoRois));
    }

    #[test]
    fn test_single_frame_is_insufficient_data_before_window_check() {
        let mut session = AnalysisSession::new(footage(1));
        session.detect_from_mask(&mask(), 4000).unwrap();
        let err = session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientData(InsufficientDataError::TooFewFrames {
                found: 1,
                required: 2
            })
        );
        assert!(matches!(session.activity(), Err(Error::NotComputed(_))));
    }

    #[test]
    fn test_window_longer_than_footage_is_config_error() {
        let mut session = AnalysisSession::new(footage(5));
        session.detect_from_mask(&mask(), 4000).unwrap();
        let err = session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            Error::Config(ConfigError::InsufficientFrames {
                name: "window_length",
                value: 10,
                frames: 5
            })
        );
    }

    #[test]
    fn test_no_rois_with_default_window_is_insufficient_data() {
        let mut session = AnalysisSession::new(footage(5));
        let err = session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap_err();
        assert_eq!(err, Error::InsufficientData(InsufficientDataError::NoRois));
    }

    #[test]
    fn test_connectivity_requires_events() {
        let mut session = AnalysisSession::new(footage(30));
        session.detect_from_mask(&mask(), 4000).unwrap();
        let config = ConnectivityConfig::default();
        assert!(matches!(
            session.connectivity(&config, None, &mut NoProgress),
            Err(Error::NotComputed(_))
        ));
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        session.detect_spikes(&SpikeConfig::default()).unwrap();
        let report = session
            .connectivity(&config.with_max_distance(1.0), None, &mut NoProgress)
            .unwrap();
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_activity_summaries() {
        let mut session = AnalysisSession::new(footage(30));
        session.detect_from_mask(&mask(), 4000).unwrap();
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        let activity = session.activity().unwrap();
        let summaries = activity.summaries();
        assert_eq!(summaries.len(), 2);
        assert!((summaries[0].min - 0.3).abs() < 1e-6);
        assert!((summaries[0].max - 0.7).abs() < 1e-6);
        assert!((summaries[1].mean - 0.35).abs() < 1e-6);

        let scaled = activity.scaled_delta_f();
        let peak = scaled.row(0).iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
        assert_eq!(activity.mean_delta_f().len(), 30);
    }

    #[test]
    fn test_correlation_table_from_traces() {
        let mut session = AnalysisSession::new(footage(30));
        session.detect_from_mask(&mask(), 4000).unwrap();
        assert!(matches!(
            session.correlation_table(SimilaritySource::Trace, 0, None),
            Err(Error::NotComputed(_))
        ));
        session
            .record_activity(MeasurementMode::Average, &BaselineConfig::default())
            .unwrap();
        let table = session
            .correlation_table(SimilaritySource::Trace, 0, None)
            .unwrap();
        assert_eq!(table.keys().len(), 2);
        assert_eq!(table.get(0, 0), 1.0);
        assert_eq!(table.get(1, 1), 1.0);
        // The second ROI never changes, so it correlates with nothing.
        assert_eq!(table.get(0, 1), 0.0);

        let only = [session.rois()[1].key()];
        let single = session
            .correlation_table(SimilaritySource::Trace, 0, Some(&only))
            .unwrap();
        assert_eq!(single.keys(), &only);
    }

    #[test]
    fn test_replace_footage_clears_rois() {
        let mut session = AnalysisSession::new(footage(10));
        session.detect_from_mask(&mask(), 4000).unwrap();
        session
            .insert_manual_roi(PixelCoord::new(20, 20), None)
            .unwrap();
        let v = session.version();
        session.replace_footage(footage(12));
        assert!(session.rois().is_empty());
        assert!(session.version() > v);
        let key = session
            .insert_manual_roi(PixelCoord::new(20, 20), None)
            .unwrap();
        assert_eq!(key.id, 0);
    }
}
