//! Optimal assignment of predicted centers to ground-truth rings and the
//! normalized error metrics derived from it.
//!
//! The matching is a minimum-cost perfect matching over the center-distance
//! cost matrix, solved with the Jonker–Volgenant shortest-augmenting-path
//! scheme in O(n³). Cardinalities must agree; there is no partial matching.

use nalgebra::DMatrix;

use crate::cloud::Ring;
use crate::dist;
use crate::radius::{self, RadiusError};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised while scoring a clustering run against ground truth.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignError {
    /// Predicted cluster count differs from the ground-truth ring count.
    CardinalityMismatch { predicted: usize, truth: usize },
    /// A matched cluster's radius could not be estimated.
    UnderdeterminedRadius(RadiusError),
}

impl std::fmt::Display for AssignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CardinalityMismatch { predicted, truth } => write!(
                f,
                "cannot assign {} predicted centers to {} ground-truth rings",
                predicted, truth
            ),
            Self::UnderdeterminedRadius(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for AssignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnderdeterminedRadius(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RadiusError> for AssignError {
    fn from(err: RadiusError) -> Self {
        Self::UnderdeterminedRadius(err)
    }
}

// ── Weights and evaluation ─────────────────────────────────────────────────

/// Blend of center vs. radius error in the combined score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorWeights {
    pub center: f64,
    pub radius: f64,
}

impl Default for ErrorWeights {
    fn default() -> Self {
        Self {
            center: 0.9,
            radius: 0.1,
        }
    }
}

/// Scored matching of one clustering run against ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// `[predicted index, ground-truth index]`, sorted by predicted index.
    pub pairs: Vec<[usize; 2]>,
    /// Estimated radius per predicted-cluster index.
    pub radii: Vec<f64>,
    /// Mean matched-center distance over the normalization constant.
    pub centers_error: f64,
    /// Mean relative radius error over matched pairs.
    pub radii_error: f64,
    /// `w_c · centers_error + w_r · radii_error`.
    pub total_error: f64,
}

/// Build the center-distance cost matrix and solve the optimal assignment.
pub fn find_pairs(
    predicted: &[[f64; 2]],
    truth: &[[f64; 2]],
) -> Result<Vec<[usize; 2]>, AssignError> {
    if predicted.len() != truth.len() {
        return Err(AssignError::CardinalityMismatch {
            predicted: predicted.len(),
            truth: truth.len(),
        });
    }
    let cost = DMatrix::from_fn(predicted.len(), truth.len(), |i, j| {
        dist(predicted[i], truth[j])
    });
    Ok(solve(&cost))
}

/// Evaluate predicted centers against the ground-truth rings.
///
/// Pairs come from [`find_pairs`]; radii are estimated from each predicted
/// cluster's membership column and cached on the returned evaluation so
/// callers never recompute them.
pub fn evaluate(
    predicted: &[[f64; 2]],
    rings: &[Ring],
    points: &[[f64; 2]],
    membership: &DMatrix<f64>,
    threshold: f64,
    weights: ErrorWeights,
    center_norm: f64,
) -> Result<Evaluation, AssignError> {
    let truth: Vec<[f64; 2]> = rings.iter().map(|r| r.center).collect();
    let pairs = find_pairs(predicted, &truth)?;

    let mut radii = vec![0.0; predicted.len()];
    for &[p, _] in &pairs {
        let column: Vec<f64> = membership.column(p).iter().copied().collect();
        radii[p] = radius::estimate(predicted[p], points, &column, threshold, p)?;
    }

    let n = pairs.len() as f64;
    let centers_error = pairs
        .iter()
        .map(|&[p, t]| dist(predicted[p], rings[t].center))
        .sum::<f64>()
        / n
        / center_norm;
    let radii_error = pairs
        .iter()
        .map(|&[p, t]| (radii[p] - rings[t].radius).abs() / rings[t].radius)
        .sum::<f64>()
        / n;
    let total_error = weights.center * centers_error + weights.radius * radii_error;

    Ok(Evaluation {
        pairs,
        radii,
        centers_error,
        radii_error,
        total_error,
    })
}

// ── Solver ─────────────────────────────────────────────────────────────────

/// Minimum-cost perfect matching over a square cost matrix.
///
/// Shortest augmenting path with row/column potentials, 1-indexed with a
/// virtual zero slot. Returns `[row, column]` pairs sorted by row.
fn solve(cost: &DMatrix<f64>) -> Vec<[usize; 2]> {
    let n = cost.nrows();
    debug_assert_eq!(n, cost.ncols(), "cost matrix must be square");
    if n == 0 {
        return Vec::new();
    }

    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // Row currently matched to each column; 0 means free.
    let mut row_of = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        row_of[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = row_of[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[row_of[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if row_of[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            row_of[j0] = row_of[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<[usize; 2]> = (1..=n).map(|j| [row_of[j] - 1, j - 1]).collect();
    pairs.sort_unstable_by_key(|p| p[0]);
    pairs
}
