//! Point-set assembly: tabular point records grouped into labeled rings and
//! unlabeled noise.
//!
//! A record carries a point coordinate and, when ground truth is known, the
//! center, radius, and id of the ring it was sampled from. Records sharing a
//! ring id merge into one group; records with an empty id form the noise
//! group. A ring's identity, center, and radius are always all present
//! together — partially labeled records are rejected.

use serde::Deserialize;

// ── Error type ─────────────────────────────────────────────────────────────

/// Malformed-record errors raised during point-set assembly.
///
/// `record` is the 1-based index of the offending data row.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudError {
    /// Point coordinates are non-finite or outside the coordinate domain.
    OutOfDomain { record: usize, x: f64, y: f64 },
    /// Ground-truth fields are only partially populated.
    PartialLabel { record: usize },
    /// The input yielded no usable points.
    Empty,
    /// Labeled assembly found no ring groups.
    NoRings,
}

impl std::fmt::Display for CloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfDomain { record, x, y } => {
                write!(
                    f,
                    "malformed record {}: point ({}, {}) outside the coordinate domain",
                    record, x, y
                )
            }
            Self::PartialLabel { record } => {
                write!(
                    f,
                    "malformed record {}: ring center, radius, and id must be given together",
                    record
                )
            }
            Self::Empty => write!(f, "input contains no usable points"),
            Self::NoRings => write!(f, "labeled input contains no ring groups"),
        }
    }
}

impl std::error::Error for CloudError {}

// ── Records and groups ─────────────────────────────────────────────────────

/// One row of a dataset CSV file (`;`-separated, header row).
///
/// Ground-truth fields are empty for noise points and may be absent entirely
/// in unlabeled datasets. `circ_no` is read as a float because the upstream
/// writer emits ids through a nullable float column.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudRecord {
    pub point_x: f64,
    pub point_y: f64,
    #[serde(default)]
    pub center_x: Option<f64>,
    #[serde(default)]
    pub center_y: Option<f64>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub circ_no: Option<f64>,
}

/// A ground-truth ring with its member points.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub id: u32,
    pub center: [f64; 2],
    pub radius: f64,
    pub points: Vec<[f64; 2]>,
}

/// An assembled input file: every point in record order, rings sorted by
/// ascending id, and the noise points.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f64; 2]>,
    pub rings: Vec<Ring>,
    pub noise: Vec<[f64; 2]>,
}

/// A point group under assembly: a labeled ring or the noise group.
enum Group {
    Ring(Ring),
    Noise(Vec<[f64; 2]>),
}

impl Group {
    fn matches(&self, label: Option<u32>) -> bool {
        match (self, label) {
            (Group::Ring(r), Some(id)) => r.id == id,
            (Group::Noise(_), None) => true,
            _ => false,
        }
    }

    fn push(&mut self, point: [f64; 2]) {
        match self {
            Group::Ring(r) => r.points.push(point),
            Group::Noise(points) => points.push(point),
        }
    }
}

// ── Assembly ───────────────────────────────────────────────────────────────

/// Assemble labeled records into a [`PointCloud`].
///
/// Records sharing a ring id merge into one ring group (first occurrence
/// defines its center and radius); records with empty ground-truth fields
/// merge into the noise group. Fails on out-of-domain coordinates, partial
/// labels, an empty input, or an input without a single ring.
pub fn assemble(records: &[CloudRecord], bounds: [f64; 2]) -> Result<PointCloud, CloudError> {
    let mut points = Vec::with_capacity(records.len());
    let mut groups: Vec<Group> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let point = validate_point(record, idx + 1, bounds)?;
        points.push(point);

        let label = ground_truth(record, idx + 1)?;
        match groups.iter_mut().find(|g| g.matches(label.map(|l| l.0))) {
            Some(group) => group.push(point),
            None => groups.push(match label {
                Some((id, center, radius)) => Group::Ring(Ring {
                    id,
                    center,
                    radius,
                    points: vec![point],
                }),
                None => Group::Noise(vec![point]),
            }),
        }
    }

    if points.is_empty() {
        return Err(CloudError::Empty);
    }

    let mut rings = Vec::new();
    let mut noise = Vec::new();
    for group in groups {
        match group {
            Group::Ring(ring) => rings.push(ring),
            Group::Noise(mut pts) => noise.append(&mut pts),
        }
    }
    rings.sort_by_key(|r| r.id);

    if rings.is_empty() {
        return Err(CloudError::NoRings);
    }

    Ok(PointCloud {
        points,
        rings,
        noise,
    })
}

/// Assemble unlabeled records: every point goes into the ordered point list,
/// ground-truth columns are ignored, and ring/noise separation is skipped.
pub fn assemble_unlabeled(
    records: &[CloudRecord],
    bounds: [f64; 2],
) -> Result<PointCloud, CloudError> {
    let mut points = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        points.push(validate_point(record, idx + 1, bounds)?);
    }
    if points.is_empty() {
        return Err(CloudError::Empty);
    }
    Ok(PointCloud {
        points,
        rings: Vec::new(),
        noise: Vec::new(),
    })
}

fn validate_point(
    record: &CloudRecord,
    idx: usize,
    bounds: [f64; 2],
) -> Result<[f64; 2], CloudError> {
    let (x, y) = (record.point_x, record.point_y);
    let in_domain = |v: f64| v.is_finite() && v >= bounds[0] && v <= bounds[1];
    if !in_domain(x) || !in_domain(y) {
        return Err(CloudError::OutOfDomain { record: idx, x, y });
    }
    Ok([x, y])
}

/// Extract the ground-truth label of a record: `Some((id, center, radius))`
/// for a ring point, `None` for noise. Upstream NaNs count as empty fields.
fn ground_truth(
    record: &CloudRecord,
    idx: usize,
) -> Result<Option<(u32, [f64; 2], f64)>, CloudError> {
    let present = |v: Option<f64>| v.filter(|x| !x.is_nan());
    let cx = present(record.center_x);
    let cy = present(record.center_y);
    let radius = present(record.radius);
    let id = present(record.circ_no);

    match (cx, cy, radius, id) {
        (Some(cx), Some(cy), Some(radius), Some(id)) => Ok(Some((id as u32, [cx, cy], radius))),
        (None, None, None, None) => Ok(None),
        _ => Err(CloudError::PartialLabel { record: idx }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: [f64; 2] = [0.0, 100.0];

    fn ring_record(x: f64, y: f64, id: f64, center: [f64; 2], radius: f64) -> CloudRecord {
        CloudRecord {
            point_x: x,
            point_y: y,
            center_x: Some(center[0]),
            center_y: Some(center[1]),
            radius: Some(radius),
            circ_no: Some(id),
        }
    }

    fn noise_record(x: f64, y: f64) -> CloudRecord {
        CloudRecord {
            point_x: x,
            point_y: y,
            center_x: None,
            center_y: None,
            radius: None,
            circ_no: None,
        }
    }

    #[test]
    fn groups_by_ring_id_and_sorts_ascending() {
        let records = vec![
            ring_record(10.0, 10.0, 2.0, [12.0, 12.0], 3.0),
            noise_record(50.0, 50.0),
            ring_record(20.0, 20.0, 1.0, [22.0, 22.0], 4.0),
            ring_record(11.0, 11.0, 2.0, [12.0, 12.0], 3.0),
            noise_record(60.0, 60.0),
        ];
        let cloud = assemble(&records, BOUNDS).unwrap();

        assert_eq!(cloud.points.len(), 5);
        assert_eq!(cloud.points[0], [10.0, 10.0]);
        assert_eq!(cloud.rings.len(), 2);
        assert_eq!(cloud.rings[0].id, 1);
        assert_eq!(cloud.rings[1].id, 2);
        assert_eq!(cloud.rings[1].points, vec![[10.0, 10.0], [11.0, 11.0]]);
        assert_eq!(cloud.noise, vec![[50.0, 50.0], [60.0, 60.0]]);
    }

    #[test]
    fn first_record_fixes_ring_definition() {
        let records = vec![
            ring_record(10.0, 10.0, 1.0, [12.0, 12.0], 3.0),
            ring_record(11.0, 11.0, 1.0, [99.0, 99.0], 9.0),
        ];
        let cloud = assemble(&records, BOUNDS).unwrap();
        assert_eq!(cloud.rings[0].center, [12.0, 12.0]);
        assert_eq!(cloud.rings[0].radius, 3.0);
    }

    #[test]
    fn rejects_out_of_domain_point() {
        let records = vec![noise_record(10.0, 120.0)];
        assert_eq!(
            assemble_unlabeled(&records, BOUNDS),
            Err(CloudError::OutOfDomain {
                record: 1,
                x: 10.0,
                y: 120.0
            })
        );
    }

    #[test]
    fn rejects_non_finite_point() {
        let records = vec![noise_record(f64::NAN, 10.0)];
        assert!(matches!(
            assemble_unlabeled(&records, BOUNDS),
            Err(CloudError::OutOfDomain { record: 1, .. })
        ));
    }

    #[test]
    fn rejects_partial_label() {
        let mut record = ring_record(10.0, 10.0, 1.0, [12.0, 12.0], 3.0);
        record.radius = None;
        assert_eq!(
            assemble(&[record], BOUNDS),
            Err(CloudError::PartialLabel { record: 1 })
        );
    }

    #[test]
    fn nan_label_counts_as_noise() {
        let nan_labeled = ring_record(10.0, 10.0, f64::NAN, [f64::NAN, f64::NAN], f64::NAN);
        let ringed = ring_record(20.0, 20.0, 1.0, [22.0, 22.0], 4.0);
        let cloud = assemble(&[nan_labeled, ringed], BOUNDS).unwrap();
        assert_eq!(cloud.noise, vec![[10.0, 10.0]]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(assemble(&[], BOUNDS), Err(CloudError::Empty));
        assert_eq!(assemble_unlabeled(&[], BOUNDS), Err(CloudError::Empty));
    }

    #[test]
    fn all_noise_labeled_input_is_an_error() {
        let records = vec![noise_record(10.0, 10.0)];
        assert_eq!(assemble(&records, BOUNDS), Err(CloudError::NoRings));
    }

    #[test]
    fn unlabeled_assembly_ignores_ground_truth() {
        let records = vec![
            ring_record(10.0, 10.0, 1.0, [12.0, 12.0], 3.0),
            noise_record(50.0, 50.0),
        ];
        let cloud = assemble_unlabeled(&records, BOUNDS).unwrap();
        assert_eq!(cloud.points.len(), 2);
        assert!(cloud.rings.is_empty());
        assert!(cloud.noise.is_empty());
    }

    #[test]
    fn parses_semicolon_csv_with_float_ids() {
        let data = "point_x;point_y;center_x;center_y;radius;circ_no\n\
                    10.5;11.5;12.0;12.0;3.0;1.0\n\
                    50.0;50.0;;;;\n";
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_reader(data.as_bytes());
        let records: Vec<CloudRecord> = reader.deserialize().map(Result::unwrap).collect();
        let cloud = assemble(&records, BOUNDS).unwrap();
        assert_eq!(cloud.rings.len(), 1);
        assert_eq!(cloud.rings[0].id, 1);
        assert_eq!(cloud.noise, vec![[50.0, 50.0]]);
    }

    #[test]
    fn parses_point_only_csv() {
        let data = "point_x;point_y\n10.5;11.5\n20.0;21.0\n";
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_reader(data.as_bytes());
        let records: Vec<CloudRecord> = reader.deserialize().map(Result::unwrap).collect();
        let cloud = assemble_unlabeled(&records, BOUNDS).unwrap();
        assert_eq!(cloud.points, vec![[10.5, 11.5], [20.0, 21.0]]);
    }
}
