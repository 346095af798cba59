#![allow(clippy::cast_precision_loss, clippy::float_cmp)]
use cellpulse_algorithms::{AnalysisSession, Direction};
use cellpulse_core::{
    BaselineConfig, ConnectivityConfig, DetectionConfig, Footage, Frame, MeasurementMode,
    NoProgress, SimilaritySource, SpikeConfig,
};

const SIZE: usize = 64;
const FRAMES: usize = 40;

/// Gaussian spots at A (16, 16), B (30, 16) and C (50, 50). Each spot
/// brightens on its own pulse frames; B trails A by one frame and C fires
/// with A but sits far away.
fn generate_footage() -> Footage {
    let spots: [((f32, f32), [usize; 2]); 3] = [
        ((16.0, 16.0), [12, 27]),
        ((30.0, 16.0), [13, 28]),
        ((50.0, 50.0), [12, 27]),
    ];
    let frames = (0..FRAMES)
        .map(|t| {
            Frame::from_fn(SIZE, SIZE, |x, y| {
                let mut v = 0.1;
                for ((cx, cy), pulses) in &spots {
                    let amp = if pulses.contains(&t) { 1.0 } else { 0.6 };
                    let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                    v += amp * (-d2 / 8.0).exp();
                }
                v
            })
        })
        .collect();
    Footage::new(frames).unwrap()
}

fn analysed_session() -> AnalysisSession {
    let mut session = AnalysisSession::new(generate_footage());
    let found = session.detect_rois(&DetectionConfig::default()).unwrap();
    assert_eq!(found, 3, "expected one ROI per spot, found {}", found);
    assert!(session.warnings().is_empty());
    session
        .record_activity(MeasurementMode::Average, &BaselineConfig::default())
        .unwrap();
    session.detect_spikes(&SpikeConfig::default()).unwrap();
    session
}

#[test]
fn test_rois_follow_raster_order() {
    let session = analysed_session();
    let rois = session.rois();
    assert!(rois[0].contains(16, 16));
    assert!(rois[1].contains(30, 16));
    assert!(rois[2].contains(50, 50));
    for roi in rois {
        assert!(!roi.boundary().is_empty());
        assert!(roi.boundary().len() < roi.len());
    }
}

#[test]
fn test_spikes_at_pulse_frames() {
    let session = analysed_session();
    let events = session.events().unwrap();
    assert_eq!(events[0].spikes(), &[12, 27]);
    assert_eq!(events[1].spikes(), &[13, 28]);
    assert_eq!(events[2].spikes(), &[12, 27]);

    let delta_f = &session.activity().unwrap().normalized.delta_f;
    for row in delta_f.rows() {
        assert!(row.iter().all(|v| v.is_finite() && *v > 0.0));
    }
}

#[test]
fn test_distance_gate_and_direction() {
    let session = analysed_session();
    let config = ConnectivityConfig::default()
        .with_max_distance(0.2)
        .with_max_lag(1);
    let report = session.connectivity(&config, None, &mut NoProgress).unwrap();

    // A and C fire together but lie outside the gate.
    assert_eq!(report.edges().len(), 1);
    let edge = &report.edges()[0];
    assert_eq!(edge.a.to_string(), "ROI0");
    assert_eq!(edge.b.to_string(), "ROI1");
    assert_eq!(edge.lag, 1);
    assert_eq!(edge.direction, Direction::Forward);
    assert!(!report.is_adjacent(0, 2));
    assert_eq!(report.similarity(0, 2), 0.0);

    // Without the gate A and C correlate perfectly at lag 0.
    let open = session
        .connectivity(&config.with_max_distance(1.0), None, &mut NoProgress)
        .unwrap();
    assert!(open.is_adjacent(0, 2));
    assert_eq!(open.similarity(0, 2), 1.0);
}

#[test]
fn test_subset_and_trace_source() {
    let session = analysed_session();
    let keys = [session.rois()[2].key(), session.rois()[0].key()];
    let config = ConnectivityConfig::default()
        .with_max_distance(1.0)
        .with_source(SimilaritySource::Trace);
    let report = session
        .connectivity(&config, Some(&keys), &mut NoProgress)
        .unwrap();
    assert_eq!(report.keys(), &keys);
    assert_eq!(report.edges().len(), 1);
    assert!(report.edges()[0].similarity > 0.99);
}
