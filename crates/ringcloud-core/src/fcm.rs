//! Fuzzy c-means clustering engine.
//!
//! Soft memberships via the standard inverse-distance-ratio update and
//! `u^m`-weighted center re-estimation, iterated until no center moves
//! further than a configured tolerance or the iteration cap is reached.

use nalgebra::DMatrix;
use rand::Rng;

use crate::dist;

/// Points closer to a center than this are treated as coincident with it.
const ZERO_DIST: f64 = 1e-12;

/// Iteration controls for one clustering run.
#[derive(Debug, Clone)]
pub struct FcmParams {
    /// Hard cap on update iterations.
    pub max_iters: usize,
    /// Convergence tolerance: stop once the maximum per-center displacement
    /// drops to this value or below.
    pub epsilon: f64,
    /// Coordinate domain `[lo, hi]` used for random center initialization.
    pub bounds: [f64; 2],
}

impl Default for FcmParams {
    fn default() -> Self {
        Self {
            max_iters: 100,
            epsilon: 1e-4,
            bounds: [0.0, 100.0],
        }
    }
}

/// Output of one clustering run.
#[derive(Debug, Clone)]
pub struct FcmRun {
    /// Final cluster centers.
    pub centers: Vec<[f64; 2]>,
    /// Membership degrees: one row per point, one column per center. Rows
    /// sum to 1 within floating tolerance.
    pub membership: DMatrix<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the tolerance was reached before the iteration cap.
    pub converged: bool,
}

/// Run fuzzy c-means over `points` with `k` clusters and fuzziness `m > 1`.
///
/// Centers are initialized uniformly at random inside `params.bounds`. A
/// point coinciding with a center receives membership 1 for the first such
/// center and 0 elsewhere, never a division by zero. Deterministic for a
/// seeded `rng`.
pub fn cluster(
    points: &[[f64; 2]],
    k: usize,
    m: f64,
    params: &FcmParams,
    rng: &mut impl Rng,
) -> FcmRun {
    debug_assert!(k >= 1, "cluster count must be positive");
    debug_assert!(m > 1.0, "fuzziness exponent must exceed 1");

    let [lo, hi] = params.bounds;
    let mut centers: Vec<[f64; 2]> = (0..k)
        .map(|_| [rng.gen_range(lo..=hi), rng.gen_range(lo..=hi)])
        .collect();
    let mut membership = DMatrix::zeros(points.len(), k);

    let mut iterations = 0;
    let mut converged = false;
    while iterations < params.max_iters {
        update_membership(points, &centers, m, &mut membership);
        let moved = update_centers(points, &membership, m, &mut centers);
        iterations += 1;
        if moved <= params.epsilon {
            converged = true;
            break;
        }
    }

    tracing::debug!(k, m, iterations, converged, "fcm run finished");
    FcmRun {
        centers,
        membership,
        iterations,
        converged,
    }
}

/// Membership update: `u[i][j] = 1 / Σ_l (d(i,j)/d(i,l))^(2/(m−1))`, with the
/// explicit one-hot rule for points coinciding with a center.
fn update_membership(
    points: &[[f64; 2]],
    centers: &[[f64; 2]],
    m: f64,
    membership: &mut DMatrix<f64>,
) {
    let expo = 2.0 / (m - 1.0);
    let mut dists = vec![0.0f64; centers.len()];

    for (i, &p) in points.iter().enumerate() {
        for (j, &c) in centers.iter().enumerate() {
            dists[j] = dist(p, c);
        }

        if let Some(hit) = dists.iter().position(|&d| d < ZERO_DIST) {
            for j in 0..centers.len() {
                membership[(i, j)] = if j == hit { 1.0 } else { 0.0 };
            }
            continue;
        }

        for j in 0..centers.len() {
            let denom: f64 = dists.iter().map(|&dl| (dists[j] / dl).powf(expo)).sum();
            membership[(i, j)] = 1.0 / denom;
        }
    }
}

/// Center update: weighted mean of all points with weights `u[i][j]^m`.
/// Returns the maximum center displacement. A cluster with vanishing total
/// weight keeps its previous center.
fn update_centers(
    points: &[[f64; 2]],
    membership: &DMatrix<f64>,
    m: f64,
    centers: &mut [[f64; 2]],
) -> f64 {
    let mut max_shift = 0.0f64;
    for (j, center) in centers.iter_mut().enumerate() {
        let mut wsum = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for (i, &p) in points.iter().enumerate() {
            let w = membership[(i, j)].powf(m);
            wsum += w;
            cx += w * p[0];
            cy += w * p[1];
        }
        if wsum <= f64::MIN_POSITIVE {
            continue;
        }
        let next = [cx / wsum, cy / wsum];
        max_shift = max_shift.max(dist(*center, next));
        *center = next;
    }
    max_shift
}
