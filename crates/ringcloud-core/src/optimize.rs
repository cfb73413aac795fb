//! Multi-attempt restart search over the clustering engine.
//!
//! Supervised runs fan independent attempts over a worker pool, score each
//! against ground truth, and keep the lowest-error run; unsupervised runs
//! perform a single unscored attempt with a caller-chosen cluster count.
//! Winner selection is deterministic regardless of completion order: ties
//! break toward the lower attempt index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::assign::{self, AssignError, Evaluation};
use crate::batch::CancelToken;
use crate::cloud::PointCloud;
use crate::config::DetectConfig;
use crate::fcm::{self, FcmRun};
use crate::radius::{self, RadiusError};
use crate::DetectionRecord;

// ── Error type ─────────────────────────────────────────────────────────────

/// Failures of the attempt search.
#[derive(Debug)]
pub enum SearchError {
    /// No attempt survived evaluation; carries the first failure.
    Evaluation(AssignError),
    /// Radius estimation failed for an output cluster.
    Radius(RadiusError),
    /// The run was cancelled.
    Cancelled,
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evaluation(err) => write!(f, "every clustering attempt failed: {}", err),
            Self::Radius(err) => err.fmt(f),
            Self::Cancelled => write!(f, "detection cancelled"),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Evaluation(err) => Some(err),
            Self::Radius(err) => Some(err),
            Self::Cancelled => None,
        }
    }
}

// ── Strategy seam ──────────────────────────────────────────────────────────

/// Detection strategy: supervised evaluation against known rings, or
/// unsupervised detection with a fixed cluster count. Both drive the same
/// clustering engine and radius estimator; only the evaluation step differs.
pub trait DetectionStrategy: Sync {
    /// Whether input records carry ground-truth ring labels.
    fn labeled(&self) -> bool;

    /// Run detection over one assembled cloud and produce its result record.
    ///
    /// `seed` anchors every random draw of the run; identical seeds and
    /// inputs yield identical records.
    fn detect(
        &self,
        cloud: &PointCloud,
        config: &DetectConfig,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<DetectionRecord, SearchError>;
}

/// Supervised strategy: multi-attempt search scored against ground truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisedEvaluation;

/// Unsupervised strategy: one attempt with a user-specified cluster count,
/// no scoring.
#[derive(Debug, Clone, Copy)]
pub struct UnsupervisedDetection {
    /// Number of clusters to fit. Must be at least 1.
    pub clusters: usize,
}

impl DetectionStrategy for SupervisedEvaluation {
    fn labeled(&self) -> bool {
        true
    }

    fn detect(
        &self,
        cloud: &PointCloud,
        config: &DetectConfig,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<DetectionRecord, SearchError> {
        let k = cloud.rings.len();
        let params = config.fcm();

        let outcomes: Vec<Result<(FcmRun, Evaluation), SearchError>> = (0..config.attempts)
            .into_par_iter()
            .map(|attempt| {
                if cancel.is_cancelled() {
                    return Err(SearchError::Cancelled);
                }
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(attempt as u64));
                let m = draw_fuzziness(&mut rng, config.fuzziness);
                let run = fcm::cluster(&cloud.points, k, m, &params, &mut rng);
                match assign::evaluate(
                    &run.centers,
                    &cloud.rings,
                    &cloud.points,
                    &run.membership,
                    config.membership_threshold,
                    config.weights,
                    config.center_norm,
                ) {
                    Ok(eval) => Ok((run, eval)),
                    Err(err) => {
                        tracing::warn!(attempt, %err, "attempt discarded");
                        Err(SearchError::Evaluation(err))
                    }
                }
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        // Minimum-by-error fold over attempts in index order; strict `<`
        // keeps the first of tied attempts.
        let mut winner: Option<(usize, FcmRun, Evaluation)> = None;
        let mut failure: Option<SearchError> = None;
        for (attempt, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok((run, eval)) => {
                    let better = winner
                        .as_ref()
                        .map_or(true, |(_, _, best)| eval.total_error < best.total_error);
                    if better {
                        winner = Some((attempt, run, eval));
                    }
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        match winner {
            Some((attempt, run, eval)) => {
                tracing::debug!(
                    attempt,
                    total_error = eval.total_error,
                    iterations = run.iterations,
                    "winning attempt selected"
                );
                Ok(DetectionRecord::supervised(cloud, &run, &eval))
            }
            None => Err(failure.unwrap_or(SearchError::Cancelled)),
        }
    }
}

impl DetectionStrategy for UnsupervisedDetection {
    fn labeled(&self) -> bool {
        false
    }

    fn detect(
        &self,
        cloud: &PointCloud,
        config: &DetectConfig,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<DetectionRecord, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let m = draw_fuzziness(&mut rng, config.fuzziness);
        let run = fcm::cluster(&cloud.points, self.clusters, m, &config.fcm(), &mut rng);

        let mut radii = Vec::with_capacity(self.clusters);
        for (j, &center) in run.centers.iter().enumerate() {
            let column: Vec<f64> = run.membership.column(j).iter().copied().collect();
            let r = radius::estimate(
                center,
                &cloud.points,
                &column,
                config.membership_threshold,
                j,
            )
            .map_err(SearchError::Radius)?;
            radii.push(r);
        }

        Ok(DetectionRecord::unsupervised(&run, radii))
    }
}

/// One fuzziness exponent draw from the configured `[min, max]` range.
fn draw_fuzziness(rng: &mut impl Rng, range: [f64; 2]) -> f64 {
    rng.gen_range(range[0]..=range[1])
}
