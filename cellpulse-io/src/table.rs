//! CSV export of traces, event trains and connectivity tables.
//!
//! Values use Rust's `Display`, which is locale independent. Trace tables
//! have a `Frame` header column and one column per ROI, with frame numbers
//! starting at 0.

use crate::Result;
use cellpulse_algorithms::{ConnectivityReport, CorrelationTable, TraceSummary};
use cellpulse_core::{EventTrain, PixelCoord, Roi, RoiKey, TraceMatrix};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes comma-separated tables.
pub struct TableWriter<W: Write> {
    writer: W,
}

impl TableWriter<BufWriter<File>> {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TableWriter<W> {
    /// Wraps any writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes one column per ROI, one row per frame.
    ///
    /// `names` labels the rows of `traces` in order.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_traces(&mut self, names: &[String], traces: &TraceMatrix) -> Result<()> {
        self.header("Frame", names)?;
        for t in 0..traces.n_frames() {
            write!(self.writer, "{t}")?;
            for r in 0..traces.n_rois() {
                write!(self.writer, ",{}", traces.get(r, t))?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the 0/1 spike indicator, one column per ROI.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_spikes(&mut self, names: &[String], trains: &[EventTrain]) -> Result<()> {
        self.header("Frame", names)?;
        let frames = trains.iter().map(EventTrain::len).max().unwrap_or(0);
        for t in 0..frames {
            write!(self.writer, "{t}")?;
            for train in trains {
                write!(self.writer, ",{}", u8::from(train.is_spike(t)))?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one line per edge with both centroids and the direction
    /// arrow.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_edges(&mut self, report: &ConnectivityReport, rois: &[Roi]) -> Result<()> {
        let centroids: HashMap<RoiKey, PixelCoord> =
            rois.iter().map(|r| (r.key(), r.centroid())).collect();
        let at = |key: &RoiKey| centroids.get(key).copied().unwrap_or_default();
        writeln!(
            self.writer,
            "ROI1,ROI2,ROI1 X,ROI1 Y,ROI2 X,ROI2 Y,Similarity,Lag,Connection"
        )?;
        for edge in report.edges() {
            let (a, b) = (at(&edge.a), at(&edge.b));
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{}",
                edge.a, edge.b, a.x, a.y, b.x, b.y, edge.similarity, edge.lag, edge.direction
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the binary adjacency matrix with ROI names on both axes.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_adjacency(&mut self, report: &ConnectivityReport) -> Result<()> {
        let names = key_names(report.keys());
        self.header("", &names)?;
        for (name, row) in names.iter().zip(report.adjacency_rows()) {
            write!(self.writer, "{name}")?;
            for &linked in row {
                write!(self.writer, ",{}", u8::from(linked))?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the gated similarity matrix with ROI names on both axes.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_similarity(&mut self, report: &ConnectivityReport) -> Result<()> {
        let names = key_names(report.keys());
        self.header("", &names)?;
        for (name, row) in names.iter().zip(report.similarity_rows()) {
            write!(self.writer, "{name}")?;
            for v in row {
                write!(self.writer, ",{v}")?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one line of statistics per ROI.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_summaries(&mut self, names: &[String], summaries: &[TraceSummary]) -> Result<()> {
        writeln!(self.writer, "ROI,Min,Max,Mean,Peak dF/F0")?;
        for (name, s) in names.iter().zip(summaries) {
            writeln!(
                self.writer,
                "{name},{},{},{},{}",
                s.min, s.max, s.mean, s.peak_delta_f
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an ungated correlation table with ROI names on both axes.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_correlation(&mut self, table: &CorrelationTable) -> Result<()> {
        let names = key_names(table.keys());
        self.header("", &names)?;
        for (name, row) in names.iter().zip(table.rows()) {
            write!(self.writer, "{name}")?;
            for v in row {
                write!(self.writer, ",{v}")?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn header(&mut self, first: &str, names: &[String]) -> Result<()> {
        write!(self.writer, "{first}")?;
        for name in names {
            write!(self.writer, ",{name}")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}

fn key_names(keys: &[RoiKey]) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}
