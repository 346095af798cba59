//! cellpulse command-line interface.
//!
//! Reads a footage stack, detects ROIs and exports traces, spikes and
//! connectivity tables.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use cellpulse_algorithms::{footage_range, stretch_footage, AnalysisSession};
use cellpulse_core::{
    BaselineConfig, BatchDecision, BatchOptions, BoundingBox, ConnectivityConfig, DetectionConfig,
    DetectionPreset, DetectionSource, MeasurementMode, PixelCoord, ProgressObserver,
    SimilaritySource, SpikeConfig, SpikeMode, TraceMatrix,
};
use cellpulse_io::{FootageReader, TableWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    CellpulseIo(#[from] cellpulse_io::Error),

    #[error("{0}")]
    Core(#[from] cellpulse_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    Argument(String),
}

/// Objective preset selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// 4x objective
    Zoom4x,
    /// 10x objective
    Zoom10x,
    /// 20x objective
    Zoom20x,
}

/// Trace sampling selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Measurement {
    /// Mean over member pixels
    Average,
    /// Maximum over member pixels
    Maximum,
}

/// Spike emission selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emission {
    /// First frame of each run of flagged frames
    First,
    /// Every flagged frame
    All,
    /// Highest frame of each run
    Peak,
}

/// Similarity source selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    /// Spike indicator series
    Events,
    /// dF/F0 traces
    Trace,
}

#[derive(Args, Debug)]
struct DetectionArgs {
    /// Objective preset supplying the Gaussian widths
    #[arg(long, value_enum, default_value = "zoom10x")]
    preset: Preset,

    /// Override the narrow Gaussian sigma
    #[arg(long)]
    sigma_narrow: Option<f64>,

    /// Override the wide Gaussian sigma
    #[arg(long)]
    sigma_wide: Option<f64>,

    /// Override the foreground threshold on the difference frame
    #[arg(long)]
    threshold: Option<f32>,

    /// Override the flood-fill size cap (pixels)
    #[arg(long)]
    size_cap: Option<usize>,

    /// Segment this frame instead of the average frame
    #[arg(long)]
    frame: Option<usize>,

    /// Segment the first frame of this stack as a binary mask instead
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Stretch the footage to [0, 1] before detection
    #[arg(long)]
    stretch: bool,

    /// Worker threads (0 = all cores)
    #[arg(short, long, default_value = "0")]
    workers: usize,
}

impl DetectionArgs {
    fn config(&self) -> DetectionConfig {
        let preset = match self.preset {
            Preset::Zoom4x => DetectionPreset::Zoom4x,
            Preset::Zoom10x => DetectionPreset::Zoom10x,
            Preset::Zoom20x => DetectionPreset::Zoom20x,
        };
        let base = preset.config();
        let narrow = self.sigma_narrow.unwrap_or(base.sigma_narrow);
        let wide = self.sigma_wide.unwrap_or(base.sigma_wide);
        let threshold = self.threshold.unwrap_or(base.threshold);
        let size_cap = self.size_cap.unwrap_or(base.size_cap);
        base.with_sigmas(narrow, wide)
            .with_threshold(threshold)
            .with_size_cap(size_cap)
            .with_source(self.frame.map_or(DetectionSource::Average, DetectionSource::Frame))
    }
}

/// Calcium-imaging ROI detection, activity traces and connectivity.
#[derive(Parser)]
#[command(name = "cellpulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a footage stack
    Info {
        /// Input stack
        input: PathBuf,
    },

    /// Detect ROIs and list them
    Detect {
        /// Input stack
        input: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Write ROI geometry as JSON
        #[arg(long)]
        rois_json: Option<PathBuf>,
    },

    /// Run the full pipeline and export CSV tables
    Analyze {
        /// Input stack
        input: PathBuf,

        /// Directory receiving the CSV files
        #[arg(short, long)]
        out_dir: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Manual ROI centre as X,Y (repeatable)
        #[arg(long = "manual", value_parser = parse_coord)]
        manual: Vec<PixelCoord>,

        /// Manual ROI diameter (pixels)
        #[arg(long)]
        manual_diameter: Option<u32>,

        /// Trace sampling
        #[arg(long, value_enum, default_value = "average")]
        measurement: Measurement,

        /// Baseline window length (frames)
        #[arg(long, default_value = "10")]
        window: usize,

        /// Baseline percentile (1-100)
        #[arg(long, default_value = "10")]
        percentile: f32,

        /// Spike detector lag (frames)
        #[arg(long, default_value = "10")]
        lag: usize,

        /// Spike z-score threshold
        #[arg(long, default_value = "3.0")]
        z_threshold: f32,

        /// Influence of flagged frames (0-1)
        #[arg(long, default_value = "0.0")]
        influence: f32,

        /// Spike emission policy
        #[arg(long, value_enum, default_value = "first")]
        emission: Emission,

        /// Distance gate as a fraction of the frame diagonal
        #[arg(long, default_value = "0.1")]
        max_distance: f64,

        /// Largest lag tried in each direction (frames)
        #[arg(long, default_value = "1")]
        max_lag: usize,

        /// Similarity an edge must exceed
        #[arg(long, default_value = "0.33")]
        similarity: f32,

        /// Series correlated between ROIs
        #[arg(long, value_enum, default_value = "events")]
        source: Source,

        /// Score detection against manual ROIs inside MINX,MINY,MAXX,MAXY
        #[arg(long, value_parser = parse_rect)]
        validate: Option<BoundingBox>,
    },
}

/// Prints progress and keeps slow runs going.
struct ConsoleProgress {
    label: &'static str,
    last: Instant,
}

impl ConsoleProgress {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            last: Instant::now(),
        }
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&mut self, completed: usize, total: usize) {
        if completed == total || self.last.elapsed() >= Duration::from_secs(1) {
            eprintln!("{}: {}/{}", self.label, completed, total);
            self.last = Instant::now();
        }
    }

    fn on_slow(&mut self, elapsed: Duration) -> BatchDecision {
        warn!("{} still running after {:.1}s", self.label, elapsed.as_secs_f64());
        BatchDecision::Continue
    }
}

fn parse_coord(s: &str) -> std::result::Result<PixelCoord, String> {
    let values = parse_numbers(s, 2)?;
    Ok(PixelCoord::new(values[0], values[1]))
}

fn parse_rect(s: &str) -> std::result::Result<BoundingBox, String> {
    let v = parse_numbers(s, 4)?;
    Ok(BoundingBox::new(v[0], v[1], v[2], v[3]))
}

fn parse_numbers(s: &str, count: usize) -> std::result::Result<Vec<u32>, String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("{s}: {e}"))?;
    if values.len() == count {
        Ok(values)
    } else {
        Err(format!("{s}: expected {count} comma-separated values"))
    }
}

fn load_session(input: &Path, detection: &DetectionArgs) -> Result<AnalysisSession> {
    let start = Instant::now();
    let reader = FootageReader::open(input)?;
    let mut footage = reader.read_footage()?;
    info!(
        "loaded {} frames of {}x{} in {:.3}s",
        footage.len(),
        footage.width(),
        footage.height(),
        start.elapsed().as_secs_f64()
    );
    let batch = BatchOptions::default().with_workers(detection.workers);
    if detection.stretch {
        footage = stretch_footage(&footage, &batch, &mut ConsoleProgress::new("stretch"))
            .into_footage()?;
    }
    Ok(AnalysisSession::new(footage).with_batch_options(batch))
}

fn detect(session: &mut AnalysisSession, detection: &DetectionArgs) -> Result<usize> {
    let config = detection.config();
    let Some(path) = &detection.mask else {
        return Ok(session.detect_rois(&config)?);
    };
    let mask = FootageReader::open(path)?.frame(0)?.ok_or_else(|| {
        CliError::Argument(format!("mask stack {} has no frames", path.display()))
    })?;
    Ok(session.detect_from_mask(&mask, config.size_cap)?)
}

fn table(dir: &Path, name: &str) -> Result<TableWriter<BufWriter<File>>> {
    Ok(TableWriter::create(dir.join(name))?)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input } => {
            let reader = FootageReader::open(&input)?;
            let header = reader.header();
            println!("File: {}", input.display());
            println!("Size: {} bytes", reader.file_size());
            println!("Frames: {}", header.frames);
            println!("Dimensions: {}x{}", header.width, header.height);
            let footage = reader.read_footage()?;
            if let Some((lo, hi)) = footage_range(&footage) {
                println!("Value range: [{}, {}]", lo, hi);
            }
        }

        Commands::Detect {
            input,
            detection,
            rois_json,
        } => {
            let mut session = load_session(&input, &detection)?;
            let start = Instant::now();
            let found = detect(&mut session, &detection)?;
            println!(
                "Detected {} ROIs in {:.3}s",
                found,
                start.elapsed().as_secs_f64()
            );
            for w in session.warnings() {
                println!("Warning: {}", w);
            }
            for roi in session.rois() {
                let c = roi.centroid();
                println!(
                    "{}: {} pixels, centroid ({}, {})",
                    roi.name(),
                    roi.len(),
                    c.x,
                    c.y
                );
            }
            if let Some(path) = rois_json {
                let file = BufWriter::new(File::create(&path)?);
                serde_json::to_writer_pretty(file, session.rois())?;
                println!("ROI geometry written to {}", path.display());
            }
        }

        Commands::Analyze {
            input,
            out_dir,
            detection,
            manual,
            manual_diameter,
            measurement,
            window,
            percentile,
            lag,
            z_threshold,
            influence,
            emission,
            max_distance,
            max_lag,
            similarity,
            source,
            validate,
        } => {
            if !out_dir.is_dir() {
                return Err(CliError::Argument(format!(
                    "output directory {} does not exist",
                    out_dir.display()
                )));
            }
            let mut session = load_session(&input, &detection)?;
            detect(&mut session, &detection)?;
            for center in manual {
                session.insert_manual_roi(center, manual_diameter)?;
            }
            for w in session.warnings() {
                println!("Warning: {}", w);
            }
            println!("{} ROIs", session.rois().len());

            if let Some(area) = validate {
                let report = session.validation(&area);
                println!("Validation:");
                println!("   Condition positives: {}", report.condition_positives);
                println!("   True positives: {}", report.true_positives);
                println!("   False positives: {}", report.false_positives);
                println!("   False negatives: {}", report.false_negatives);
                println!("   Merged: {}", report.merged);
                if let Some(tpr) = report.sensitivity() {
                    println!("   Sensitivity: {:.1}%", 100.0 * tpr);
                }
                if let Some(ppv) = report.positive_predictive_value() {
                    println!("   Positive predictive value: {:.1}%", 100.0 * ppv);
                }
            }

            let mode = match measurement {
                Measurement::Average => MeasurementMode::Average,
                Measurement::Maximum => MeasurementMode::Maximum,
            };
            let baseline = BaselineConfig::default()
                .with_window_length(window)
                .with_percentile(percentile);
            session.record_activity(mode, &baseline)?;

            let spikes = SpikeConfig::default()
                .with_lag(lag)
                .with_threshold(z_threshold)
                .with_influence(influence)
                .with_mode(match emission {
                    Emission::First => SpikeMode::FirstFrameOfBlock,
                    Emission::All => SpikeMode::AllFramesInBlock,
                    Emission::Peak => SpikeMode::PeakOfBlock,
                });
            session.detect_spikes(&spikes)?;

            let connectivity = ConnectivityConfig::default()
                .with_max_distance(max_distance)
                .with_max_lag(max_lag)
                .with_threshold(similarity)
                .with_source(match source {
                    Source::Events => SimilaritySource::EventTrain,
                    Source::Trace => SimilaritySource::Trace,
                });
            let report = session.connectivity(
                &connectivity,
                None,
                &mut ConsoleProgress::new("connectivity"),
            )?;

            let names: Vec<String> = session.rois().iter().map(|r| r.name()).collect();
            let activity = session.activity()?;
            table(&out_dir, "raw.csv")?.write_traces(&names, &activity.raw)?;
            table(&out_dir, "dff0.csv")?.write_traces(&names, &activity.normalized.delta_f)?;
            table(&out_dir, "spikes.csv")?.write_spikes(&names, session.events()?)?;
            table(&out_dir, "edges.csv")?.write_edges(&report, session.rois())?;
            table(&out_dir, "adjacency.csv")?.write_adjacency(&report)?;
            table(&out_dir, "similarity.csv")?.write_similarity(&report)?;
            let xcorr = session.correlation_table(connectivity.source, 0, None)?;
            table(&out_dir, "xcorr.csv")?.write_correlation(&xcorr)?;
            table(&out_dir, "summary.csv")?.write_summaries(&names, &activity.summaries())?;
            table(&out_dir, "dff0_scaled.csv")?.write_traces(&names, &activity.scaled_delta_f())?;
            let mean = TraceMatrix::from_rows(vec![activity.mean_delta_f()])?;
            table(&out_dir, "dff0_mean.csv")?.write_traces(&["Mean".to_string()], &mean)?;

            let spike_total: usize = session.events()?.iter().map(|t| t.spike_count()).sum();
            println!("Spikes: {}", spike_total);
            println!("Edges: {}", report.edges().len());
            println!("Tables written to {}", out_dir.display());
        }
    }

    Ok(())
}
