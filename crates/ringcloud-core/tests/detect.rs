//! End-to-end detection scenarios over synthetic ring clouds.

use std::fs;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ringcloud_core::batch::{self, BatchConfig, CancelToken};
use ringcloud_core::cloud::{self, CloudRecord};
use ringcloud_core::config::DetectConfig;
use ringcloud_core::optimize::{DetectionStrategy, SupervisedEvaluation, UnsupervisedDetection};
use ringcloud_core::ResultsStore;

const CENTERS: [[f64; 2]; 3] = [[20.0, 20.0], [50.0, 80.0], [80.0, 20.0]];
const RADIUS: f64 = 10.0;

/// Sample `n` points per ring with radial jitter of at most 5% of the radius.
fn ring_records(n: usize, rng: &mut StdRng) -> Vec<CloudRecord> {
    let mut records = Vec::new();
    for (j, &center) in CENTERS.iter().enumerate() {
        for _ in 0..n {
            let theta = rng.gen::<f64>() * std::f64::consts::TAU;
            let r = RADIUS * (1.0 + 0.05 * (2.0 * rng.gen::<f64>() - 1.0));
            records.push(CloudRecord {
                point_x: center[0] + theta.cos() * r,
                point_y: center[1] + theta.sin() * r,
                center_x: Some(center[0]),
                center_y: Some(center[1]),
                radius: Some(RADIUS),
                circ_no: Some(j as f64 + 1.0),
            });
        }
    }
    records
}

fn scenario_config() -> DetectConfig {
    DetectConfig {
        fuzziness: [1.5, 2.5],
        attempts: 10,
        max_iters: 100,
        membership_threshold: 0.2,
        ..DetectConfig::default()
    }
}

#[test]
fn three_separated_rings_are_recovered_accurately() {
    let mut rng = StdRng::seed_from_u64(2024);
    let records = ring_records(500, &mut rng);
    let cloud = cloud::assemble(&records, [0.0, 100.0]).unwrap();
    assert_eq!(cloud.points.len(), 1500);
    assert_eq!(cloud.rings.len(), 3);

    let record = SupervisedEvaluation
        .detect(&cloud, &scenario_config(), 42, &CancelToken::new())
        .unwrap();

    let centers_error = record.centers_error.unwrap();
    let radii_error = record.radii_error.unwrap();
    assert!(
        centers_error < 0.05,
        "centers_error too large: {}",
        centers_error
    );
    assert!(radii_error < 0.1, "radii_error too large: {}", radii_error);

    let pairs = record.pairs.unwrap();
    assert_eq!(pairs.len(), 3);
    let mut predicted: Vec<usize> = pairs.iter().map(|p| p[0]).collect();
    let mut truth: Vec<usize> = pairs.iter().map(|p| p[1]).collect();
    predicted.sort_unstable();
    predicted.dedup();
    truth.sort_unstable();
    truth.dedup();
    assert_eq!(predicted.len(), 3, "duplicate predicted index in pairs");
    assert_eq!(truth.len(), 3, "duplicate ground-truth index in pairs");

    // Every membership row is a distribution.
    for row in &record.membership_matrix {
        assert_eq!(row.len(), 3);
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "row sums to {}", sum);
        assert!(row.iter().all(|&u| (0.0..=1.0).contains(&u)));
    }
}

#[test]
fn supervised_batch_round_trips_through_disk() {
    let root = tempfile::tempdir().unwrap();
    let dataset = root.path().join("dataset");
    fs::create_dir_all(dataset.join("clean")).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let records = ring_records(60, &mut rng);
    let mut out = fs::File::create(dataset.join("clean/1.csv")).unwrap();
    writeln!(out, "point_x;point_y;center_x;center_y;radius;circ_no").unwrap();
    for r in &records {
        writeln!(
            out,
            "{};{};{};{};{};{}",
            r.point_x,
            r.point_y,
            r.center_x.unwrap(),
            r.center_y.unwrap(),
            r.radius.unwrap(),
            r.circ_no.unwrap()
        )
        .unwrap();
    }
    drop(out);

    let config = BatchConfig {
        dataset,
        out_dir: root.path().join("results"),
        detect: DetectConfig {
            attempts: 5,
            seed: Some(21),
            ..scenario_config()
        },
    };
    let report = batch::run(&config, &SupervisedEvaluation, &CancelToken::new()).unwrap();
    assert_eq!(report.files, 1);

    let store: ResultsStore =
        serde_json::from_str(&fs::read_to_string(&report.output).unwrap()).unwrap();
    let record = &store.0["clean"]["1.csv"];
    assert_eq!(record.circs_num, 3);
    assert_eq!(record.predicted_centers.len(), 3);
    assert_eq!(record.membership_matrix.len(), 180);
    assert_eq!(record.rings.as_ref().unwrap().len(), 3);
    assert!(record.total_error.is_some());
}

#[test]
fn unsupervised_batch_reads_point_only_files() {
    let root = tempfile::tempdir().unwrap();
    let dataset = root.path().join("dataset");
    fs::create_dir_all(dataset.join("unlabeled")).unwrap();

    let mut rng = StdRng::seed_from_u64(13);
    let records = ring_records(50, &mut rng);
    let mut out = fs::File::create(dataset.join("unlabeled/1.csv")).unwrap();
    writeln!(out, "point_x;point_y").unwrap();
    for r in &records {
        writeln!(out, "{};{}", r.point_x, r.point_y).unwrap();
    }
    drop(out);

    let config = BatchConfig {
        dataset,
        out_dir: root.path().join("results"),
        detect: DetectConfig {
            seed: Some(3),
            ..scenario_config()
        },
    };
    let strategy = UnsupervisedDetection { clusters: 2 };
    let report = batch::run(&config, &strategy, &CancelToken::new()).unwrap();

    let store: ResultsStore =
        serde_json::from_str(&fs::read_to_string(&report.output).unwrap()).unwrap();
    let record = &store.0["unlabeled"]["1.csv"];
    assert_eq!(record.circs_num, 2);
    assert_eq!(record.predicted_radii.len(), 2);
    assert!(record.rings.is_none());
    assert!(record.pairs.is_none());
    assert!(record.total_error.is_none());
}
