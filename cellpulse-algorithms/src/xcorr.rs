//! Normalized lagged cross-correlation.
//!
//! Lag `d >= 0` pairs `a[f]` with `b[f + d]`; lag `d < 0` pairs `a[f - d]`
//! with `b[f]`. Only the overlap of `n - |d|` samples contributes.

/// Whether samples are mean-centered over the overlap before normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Centering {
    /// Subtract each overlap's mean (Pearson correlation).
    #[default]
    MeanCentered,
    /// Use the samples as they are (cosine similarity).
    Raw,
}

/// Correlation of `a` and `b` at `lag`, in [-1, 1].
///
/// A series whose overlap has zero norm yields 0. A series correlated with
/// itself at lag 0 yields exactly 1 (0 if its norm is zero).
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn lagged_correlation(a: &[f32], b: &[f32], lag: isize, centering: Centering) -> f32 {
    let n = a.len().min(b.len());
    let shift = lag.unsigned_abs();
    if shift >= n {
        return 0.0;
    }
    let overlap = n - shift;
    let (xs, ys) = if lag >= 0 {
        (&a[..overlap], &b[shift..shift + overlap])
    } else {
        (&a[shift..shift + overlap], &b[..overlap])
    };

    let (mx, my) = match centering {
        Centering::MeanCentered => (mean(xs), mean(ys)),
        Centering::Raw => (0.0, 0.0),
    };
    let mut dot = 0.0f64;
    let mut nx = 0.0f64;
    let mut ny = 0.0f64;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = f64::from(x) - mx;
        let dy = f64::from(y) - my;
        dot += dx * dy;
        nx += dx * dx;
        ny += dy * dy;
    }
    if nx == 0.0 || ny == 0.0 {
        return 0.0;
    }
    if lag == 0 && xs == ys {
        return 1.0;
    }
    let r = dot / (nx.sqrt() * ny.sqrt());
    r.clamp(-1.0, 1.0) as f32
}

/// Correlations for every lag in `[-max_lag, max_lag]`, indexed by
/// `lag + max_lag`. `max_lag` saturates at `isize::MAX`.
#[must_use]
pub fn lag_profile(a: &[f32], b: &[f32], max_lag: usize, centering: Centering) -> Vec<f32> {
    let d = isize::try_from(max_lag).unwrap_or(isize::MAX);
    (-d..=d)
        .map(|lag| lagged_correlation(a, b, lag, centering))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f32]) -> f64 {
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}
