//! ringcloud-core — fuzzy-clustering detection of circular rings in noisy
//! 2-D point clouds.
//!
//! The pipeline stages are:
//!
//! 1. **Cloud** – point-set assembly: tabular records grouped into labeled
//!    rings and unlabeled noise.
//! 2. **Fcm** – fuzzy c-means: soft membership degrees plus iterative center
//!    re-estimation until centers stop moving.
//! 3. **Radius** – membership-weighted radius estimation per cluster.
//! 4. **Assign** – Hungarian matching of predicted centers to ground-truth
//!    rings and the normalized error metrics derived from it.
//! 5. **Optimize** – multi-attempt restart search selecting the lowest-error
//!    clustering run.
//! 6. **Batch** – dataset orchestration: categories → files → records, one
//!    atomically persisted results artifact per run.

pub mod assign;
pub mod batch;
pub mod cloud;
pub mod config;
pub mod fcm;
pub mod optimize;
pub mod radius;

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::assign::Evaluation;
use crate::cloud::PointCloud;
use crate::fcm::FcmRun;

// ── High-level re-exports ──────────────────────────────────────────────────

pub use crate::assign::{AssignError, ErrorWeights};
pub use crate::batch::{BatchConfig, BatchError, BatchReport, CancelToken};
pub use crate::cloud::{CloudError, CloudRecord, Ring};
pub use crate::config::{ConfigError, DetectConfig};
pub use crate::optimize::{
    DetectionStrategy, SearchError, SupervisedEvaluation, UnsupervisedDetection,
};
pub use crate::radius::RadiusError;

/// Euclidean distance between two points.
#[inline]
pub fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// A ground-truth ring as echoed into the results artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingEntry {
    /// Points labeled as belonging to the ring.
    pub points: Vec<[f64; 2]>,
    /// Ring center.
    pub center: [f64; 2],
    /// Ring radius.
    pub radius: f64,
}

/// Detection output for one input file. Immutable once constructed.
///
/// Ground-truth echoes, assignment pairs, and error metrics are present only
/// for supervised runs; unsupervised records omit those keys entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Ring count: ground truth when known, otherwise the configured cluster
    /// count.
    pub circs_num: usize,
    /// Ground-truth rings keyed by ring id.
    #[serde(
        rename = "circunferences",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub rings: Option<BTreeMap<String, RingEntry>>,
    /// Noise points.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub noise: Option<Vec<[f64; 2]>>,
    /// `[predicted index, ground-truth index]` assignment pairs.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pairs: Option<Vec<[usize; 2]>>,
    /// Final centers of the winning attempt, by predicted-cluster index.
    pub predicted_centers: Vec<[f64; 2]>,
    /// Estimated radii, aligned with `predicted_centers`.
    pub predicted_radii: Vec<f64>,
    /// The winning attempt's membership table, one row per point.
    pub membership_matrix: Vec<Vec<f64>>,
    /// Mean matched-center offset over the normalization constant.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub centers_error: Option<f64>,
    /// Mean relative radius error over matched pairs.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub radii_error: Option<f64>,
    /// Weighted blend of center and radius error.
    #[serde(rename = "tot_error", skip_serializing_if = "Option::is_none", default)]
    pub total_error: Option<f64>,
}

impl DetectionRecord {
    /// Assemble a supervised record from the winning attempt and its cached
    /// evaluation.
    pub fn supervised(cloud: &PointCloud, run: &FcmRun, eval: &Evaluation) -> Self {
        let rings = cloud
            .rings
            .iter()
            .map(|r| {
                (
                    r.id.to_string(),
                    RingEntry {
                        points: r.points.clone(),
                        center: r.center,
                        radius: r.radius,
                    },
                )
            })
            .collect();
        Self {
            circs_num: cloud.rings.len(),
            rings: Some(rings),
            noise: Some(cloud.noise.clone()),
            pairs: Some(eval.pairs.clone()),
            predicted_centers: run.centers.clone(),
            predicted_radii: eval.radii.clone(),
            membership_matrix: matrix_rows(&run.membership),
            centers_error: Some(eval.centers_error),
            radii_error: Some(eval.radii_error),
            total_error: Some(eval.total_error),
        }
    }

    /// Assemble an unsupervised record from a single unscored run.
    pub fn unsupervised(run: &FcmRun, radii: Vec<f64>) -> Self {
        Self {
            circs_num: run.centers.len(),
            rings: None,
            noise: None,
            pairs: None,
            predicted_centers: run.centers.clone(),
            predicted_radii: radii,
            membership_matrix: matrix_rows(&run.membership),
            centers_error: None,
            radii_error: None,
            total_error: None,
        }
    }
}

/// Batch-level results artifact: dataset category → filename → record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsStore(pub BTreeMap<String, BTreeMap<String, DetectionRecord>>);

impl ResultsStore {
    /// Insert a record under `category`/`filename`.
    pub fn insert(&mut self, category: &str, filename: &str, record: DetectionRecord) {
        self.0
            .entry(category.to_string())
            .or_default()
            .insert(filename.to_string(), record);
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate categories with their filename → record maps.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, DetectionRecord>)> {
        self.0.iter()
    }
}

fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| m.row(i).iter().copied().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Ring;

    fn sample_record() -> DetectionRecord {
        let cloud = PointCloud {
            points: vec![[1.0, 2.0], [3.0, 4.0], [10.0, 10.0]],
            rings: vec![Ring {
                id: 1,
                center: [2.0, 3.0],
                radius: 1.5,
                points: vec![[1.0, 2.0], [3.0, 4.0]],
            }],
            noise: vec![[10.0, 10.0]],
        };
        let run = FcmRun {
            centers: vec![[2.1, 2.9]],
            membership: DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]),
            iterations: 7,
            converged: true,
        };
        let eval = Evaluation {
            pairs: vec![[0, 0]],
            radii: vec![1.4],
            centers_error: 0.003,
            radii_error: 0.07,
            total_error: 0.0097,
        };
        DetectionRecord::supervised(&cloud, &run, &eval)
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: DetectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn record_uses_artifact_key_names() {
        let json = serde_json::to_string(&sample_record()).unwrap();
        assert!(json.contains("\"circunferences\""));
        assert!(json.contains("\"tot_error\""));
        assert!(json.contains("\"membership_matrix\""));
        assert!(!json.contains("total_error"));
    }

    #[test]
    fn unsupervised_record_omits_supervised_keys() {
        let run = FcmRun {
            centers: vec![[5.0, 5.0], [50.0, 50.0]],
            membership: DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.2, 0.8]),
            iterations: 3,
            converged: true,
        };
        let record = DetectionRecord::unsupervised(&run, vec![4.0, 6.0]);
        assert_eq!(record.circs_num, 2);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("circunferences"));
        assert!(!json.contains("pairs"));
        assert!(!json.contains("tot_error"));
    }

    #[test]
    fn store_round_trips_and_counts() {
        let mut store = ResultsStore::default();
        store.insert("clean", "1.csv", sample_record());
        store.insert("clean", "2.csv", sample_record());
        store.insert("collides", "1.csv", sample_record());
        assert_eq!(store.len(), 3);

        let json = serde_json::to_string(&store).unwrap();
        let back: ResultsStore = serde_json::from_str(&json).unwrap();
        assert_eq!(store, back);
        // Serializes as a bare category → filename mapping.
        assert!(json.starts_with("{\"clean\""));
    }
}
