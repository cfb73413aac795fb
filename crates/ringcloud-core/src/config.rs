//! Immutable run configuration.
//!
//! One validated value passed into the orchestrator and the optimizer; never
//! process-global, never mutated while a run is in flight.

use crate::assign::ErrorWeights;
use crate::fcm::FcmParams;

// ── Error type ─────────────────────────────────────────────────────────────

/// Configuration rejected before any file is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Fuzziness range must satisfy `1 < min <= max`.
    FuzzinessRange { min: f64, max: f64 },
    /// Attempt count must be at least 1.
    Attempts,
    /// Iteration cap must be at least 1.
    MaxIters,
    /// Convergence tolerance must be positive and finite.
    Epsilon { epsilon: f64 },
    /// Membership threshold must lie in [0, 1].
    MembershipThreshold { threshold: f64 },
    /// Error weights must be non-negative and sum to 1.
    Weights { center: f64, radius: f64 },
    /// Center-error normalization must be positive and finite.
    CenterNorm { norm: f64 },
    /// Coordinate domain must satisfy `lo < hi`.
    Bounds { lo: f64, hi: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FuzzinessRange { min, max } => write!(
                f,
                "fuzziness range must satisfy 1 < min <= max, got {},{}",
                min, max
            ),
            Self::Attempts => write!(f, "attempt count must be at least 1"),
            Self::MaxIters => write!(f, "iteration cap must be at least 1"),
            Self::Epsilon { epsilon } => {
                write!(f, "convergence tolerance must be positive, got {}", epsilon)
            }
            Self::MembershipThreshold { threshold } => write!(
                f,
                "membership threshold must lie in [0, 1], got {}",
                threshold
            ),
            Self::Weights { center, radius } => write!(
                f,
                "error weights must be non-negative and sum to 1, got {},{}",
                center, radius
            ),
            Self::CenterNorm { norm } => write!(
                f,
                "center-error normalization must be positive, got {}",
                norm
            ),
            Self::Bounds { lo, hi } => {
                write!(f, "coordinate domain must satisfy lo < hi, got {},{}", lo, hi)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ── Configuration ──────────────────────────────────────────────────────────

/// Engine configuration for one detection run.
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// Fuzziness exponent range `[min, max]`; one draw per attempt, `min > 1`.
    pub fuzziness: [f64; 2],
    /// Independent restarts per file in supervised runs.
    pub attempts: usize,
    /// Iteration cap per clustering run.
    pub max_iters: usize,
    /// Convergence tolerance on the maximum per-center displacement.
    pub epsilon: f64,
    /// Minimum membership for a point to count toward a ring radius.
    pub membership_threshold: f64,
    /// Blend of center vs. radius error in the attempt score.
    pub weights: ErrorWeights,
    /// Normalization constant for the mean matched-center offset.
    pub center_norm: f64,
    /// Coordinate domain `[lo, hi]` on both axes.
    pub bounds: [f64; 2],
    /// Base seed for per-attempt random sources; random when absent.
    pub seed: Option<u64>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            fuzziness: [1.5, 2.5],
            attempts: 10,
            max_iters: 100,
            epsilon: 1e-4,
            membership_threshold: 0.2,
            weights: ErrorWeights::default(),
            center_norm: 2000f64.sqrt(),
            bounds: [0.0, 100.0],
            seed: None,
        }
    }
}

impl DetectConfig {
    /// Check every field once, before any file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [min, max] = self.fuzziness;
        if !(min > 1.0 && max >= min && max.is_finite()) {
            return Err(ConfigError::FuzzinessRange { min, max });
        }
        if self.attempts == 0 {
            return Err(ConfigError::Attempts);
        }
        if self.max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(ConfigError::Epsilon {
                epsilon: self.epsilon,
            });
        }
        if !(0.0..=1.0).contains(&self.membership_threshold) {
            return Err(ConfigError::MembershipThreshold {
                threshold: self.membership_threshold,
            });
        }
        let ErrorWeights { center, radius } = self.weights;
        if !(center >= 0.0 && radius >= 0.0 && (center + radius - 1.0).abs() <= 1e-6) {
            return Err(ConfigError::Weights { center, radius });
        }
        if !(self.center_norm > 0.0 && self.center_norm.is_finite()) {
            return Err(ConfigError::CenterNorm {
                norm: self.center_norm,
            });
        }
        let [lo, hi] = self.bounds;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::Bounds { lo, hi });
        }
        Ok(())
    }

    /// Iteration parameters for the clustering engine.
    pub fn fcm(&self) -> FcmParams {
        FcmParams {
            max_iters: self.max_iters,
            epsilon: self.epsilon,
            bounds: self.bounds,
        }
    }
}
