//! Membership-weighted ring radius estimation.

use crate::dist;

// ── Error type ─────────────────────────────────────────────────────────────

/// Failure to estimate a ring radius.
#[derive(Debug, Clone, PartialEq)]
pub enum RadiusError {
    /// No point reaches the membership threshold for the cluster.
    Underdetermined { cluster: usize, threshold: f64 },
}

impl std::fmt::Display for RadiusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Underdetermined { cluster, threshold } => write!(
                f,
                "radius of cluster {} is underdetermined: no membership at or above {}",
                cluster, threshold
            ),
        }
    }
}

impl std::error::Error for RadiusError {}

// ── Estimator ──────────────────────────────────────────────────────────────

/// Estimate a ring radius as the membership-weighted mean distance from
/// `center` to the points whose membership is at or above `threshold`.
///
/// `weights` is the cluster's membership column, aligned with `points`;
/// `cluster` labels the error when nothing qualifies.
pub fn estimate(
    center: [f64; 2],
    points: &[[f64; 2]],
    weights: &[f64],
    threshold: f64,
    cluster: usize,
) -> Result<f64, RadiusError> {
    debug_assert_eq!(points.len(), weights.len());

    let mut wsum = 0.0;
    let mut acc = 0.0;
    for (&p, &w) in points.iter().zip(weights) {
        if w >= threshold {
            wsum += w;
            acc += w * dist(center, p);
        }
    }
    if wsum <= 0.0 {
        return Err(RadiusError::Underdetermined { cluster, threshold });
    }
    Ok(acc / wsum)
}
