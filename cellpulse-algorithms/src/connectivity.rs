//! Pairwise connectivity from lagged cross-correlation.
//!
//! Every unordered pair of nodes closer than the distance gate is
//! correlated at each lag in `[-max_lag, max_lag]`. The best correlation is
//! the pair's similarity; pairs above the threshold become edges whose
//! direction comes from the sign of the maximizing lags.

use std::time::{Duration, Instant};

use cellpulse_core::{
    BatchDecision, ConnectivityConfig, Error, PixelCoord, ProgressObserver, Result, RoiKey,
};
use log::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::xcorr::{lag_profile, lagged_correlation, Centering};

/// Direction of an edge between ROIs `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Every maximizing lag is positive: `a` leads `b`.
    Forward,
    /// Every maximizing lag is negative: `b` leads `a`.
    Backward,
    /// Maximizing lags include zero or both signs.
    Undirected,
}

impl Direction {
    /// Classifies a set of maximizing lags.
    #[must_use]
    pub fn from_lags(lags: &[isize]) -> Self {
        if !lags.is_empty() && lags.iter().all(|&d| d > 0) {
            Self::Forward
        } else if !lags.is_empty() && lags.iter().all(|&d| d < 0) {
            Self::Backward
        } else {
            Self::Undirected
        }
    }

    /// Two-character arrow used in edge tables.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Forward => "->",
            Self::Backward => "<-",
            Self::Undirected => "--",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One ROI as seen by the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityNode<'a> {
    /// ROI identity.
    pub key: RoiKey,
    /// ROI centroid, used by the distance gate.
    pub centroid: PixelCoord,
    /// Series to correlate (event indicator or dF/F0).
    pub series: &'a [f32],
}

/// Best correlation of a pair and the lags reaching it.
#[derive(Debug, Clone, PartialEq)]
pub struct LagProfile {
    /// Maximum correlation over all lags.
    pub similarity: f32,
    /// Lags attaining the maximum, ascending.
    pub lags: Vec<isize>,
}

impl LagProfile {
    /// Direction implied by the maximizing lags.
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::from_lags(&self.lags)
    }
}

/// An accepted connection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Edge {
    /// First ROI, in input order.
    pub a: RoiKey,
    /// Second ROI, in input order.
    pub b: RoiKey,
    /// Correlation at the maximizing lag.
    pub similarity: f32,
    /// Smallest maximizing lag.
    pub lag: isize,
    /// Direction from the sign of the maximizing lags.
    pub direction: Direction,
}

/// Similarity matrix, adjacency and edge list for one node set.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityReport {
    keys: Vec<RoiKey>,
    similarity: Vec<f32>,
    adjacency: Vec<bool>,
    edges: Vec<Edge>,
}

impl ConnectivityReport {
    /// Node keys in matrix order.
    #[must_use]
    pub fn keys(&self) -> &[RoiKey] {
        &self.keys
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the report has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Similarity of nodes `i` and `j`; 0 on the diagonal and for gated
    /// pairs.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[must_use]
    pub fn similarity(&self, i: usize, j: usize) -> f32 {
        self.similarity[i * self.len() + j]
    }

    /// Returns true if an edge joins nodes `i` and `j`.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[must_use]
    pub fn is_adjacent(&self, i: usize, j: usize) -> bool {
        self.adjacency[i * self.len() + j]
    }

    /// Similarity matrix rows.
    pub fn similarity_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.similarity.chunks(self.len().max(1))
    }

    /// Adjacency matrix rows.
    pub fn adjacency_rows(&self) -> impl Iterator<Item = &[bool]> {
        self.adjacency.chunks(self.len().max(1))
    }

    /// Accepted edges, ordered by first then second node.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Gated pairwise correlation analysis.
#[derive(Debug, Clone)]
pub struct ConnectivityAnalyzer {
    config: ConnectivityConfig,
    centering: Centering,
    slow_after: Duration,
}

impl ConnectivityAnalyzer {
    /// Creates an analyzer.
    ///
    /// # Errors
    /// Returns an error if the configuration is out of range.
    pub fn new(config: ConnectivityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            centering: Centering::MeanCentered,
            slow_after: Duration::from_secs(10),
        })
    }

    /// Sets the centering used by the correlation.
    #[must_use]
    pub fn with_centering(mut self, centering: Centering) -> Self {
        self.centering = centering;
        self
    }

    /// Sets how often the observer is asked whether to continue.
    #[must_use]
    pub fn with_slow_after(mut self, slow_after: Duration) -> Self {
        self.slow_after = slow_after;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Correlation profile of one pair over the configured lag window.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::float_cmp)]
    pub fn pair_profile(&self, a: &[f32], b: &[f32]) -> LagProfile {
        let max_lag = self.config.max_lag;
        let offset = isize::try_from(max_lag).unwrap_or(isize::MAX);
        let profile = lag_profile(a, b, max_lag, self.centering);
        let similarity = profile.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let lags = profile
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s == similarity)
            .map(|(i, _)| i as isize - offset)
            .collect();
        LagProfile { similarity, lags }
    }

    /// Analyzes every unordered pair of `nodes`.
    ///
    /// `diagonal` is the frame diagonal the distance gate is a fraction of.
    /// Progress is reported once per completed row.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the observer cancels a slow run.
    pub fn analyze(
        &self,
        nodes: &[ConnectivityNode<'_>],
        diagonal: f64,
        observer: &mut dyn ProgressObserver,
    ) -> Result<ConnectivityReport> {
        let n = nodes.len();
        let gate = self.config.max_distance * diagonal;
        let mut similarity = vec![0.0f32; n * n];
        let mut adjacency = vec![false; n * n];
        let mut edges = Vec::new();
        let mut gated = 0usize;

        let start = Instant::now();
        let mut next_prompt = self.slow_after;
        for i in 0..n {
            for j in i + 1..n {
                let (a, b) = (&nodes[i], &nodes[j]);
                if a.centroid.distance(&b.centroid) >= gate {
                    gated += 1;
                    continue;
                }
                let profile = self.pair_profile(a.series, b.series);
                similarity[i * n + j] = profile.similarity;
                similarity[j * n + i] = profile.similarity;
                if profile.similarity > self.config.threshold {
                    adjacency[i * n + j] = true;
                    adjacency[j * n + i] = true;
                    edges.push(Edge {
                        a: a.key,
                        b: b.key,
                        similarity: profile.similarity,
                        lag: profile.lags[0],
                        direction: profile.direction(),
                    });
                }
            }
            observer.on_progress(i + 1, n);
            let elapsed = start.elapsed();
            if elapsed >= next_prompt && i + 1 < n {
                if observer.on_slow(elapsed) == BatchDecision::Cancel {
                    info!("connectivity cancelled after {} of {n} rows", i + 1);
                    return Err(Error::Cancelled {
                        completed: i + 1,
                        total: n,
                    });
                }
                next_prompt = elapsed + self.slow_after;
            }
        }

        debug!(
            "{} pairs, {gated} outside the distance gate, {:.3}s",
            n * n.saturating_sub(1) / 2,
            start.elapsed().as_secs_f64()
        );
        info!("{} edges among {n} ROIs", edges.len());
        Ok(ConnectivityReport {
            keys: nodes.iter().map(|node| node.key).collect(),
            similarity,
            adjacency,
            edges,
        })
    }
}

/// Ungated correlation of every ordered pair at a fixed lag.
#[must_use]
pub fn correlation_matrix(series: &[&[f32]], lag: isize, centering: Centering) -> Vec<Vec<f32>> {
    series
        .iter()
        .map(|a| {
            series
                .iter()
                .map(|b| lagged_correlation(a, b, lag, centering))
                .collect()
        })
        .collect()
}

/// Ungated lag-0 correlation of every pair of ROIs, labelled by key.
///
/// Unlike [`ConnectivityReport::similarity`], no distance gate or lag search
/// is applied, and the diagonal is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationTable {
    keys: Vec<RoiKey>,
    values: Vec<Vec<f32>>,
}

impl CorrelationTable {
    /// Correlates every series in `entries` with every other at `lag`.
    #[must_use]
    pub fn new(entries: &[(RoiKey, &[f32])], lag: isize, centering: Centering) -> Self {
        let series: Vec<&[f32]> = entries.iter().map(|&(_, s)| s).collect();
        let mut values = correlation_matrix(&series, lag, centering);
        for (i, row) in values.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        debug!("correlation table over {} ROIs at lag {lag}", entries.len());
        Self {
            keys: entries.iter().map(|&(key, _)| key).collect(),
            values,
        }
    }

    /// Row and column labels.
    #[must_use]
    pub fn keys(&self) -> &[RoiKey] {
        &self.keys
    }

    /// Correlation of ROI `i` with ROI `j`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i][j]
    }

    /// Rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.iter().map(Vec::as_slice)
    }
}
