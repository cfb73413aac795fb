//! Batch orchestration: dataset categories → files → detection records, with
//! a single atomically persisted results artifact.
//!
//! Categories are the sorted subdirectories of the dataset root; files are
//! the sorted `*.csv` entries within each. All reads happen before the
//! compute phase of a file and the one artifact write happens after every
//! file is done; a cancelled batch writes nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cloud::{self, CloudError, CloudRecord};
use crate::config::{ConfigError, DetectConfig};
use crate::optimize::{DetectionStrategy, SearchError};
use crate::ResultsStore;

/// Cooperative cancellation flag shared with the caller.
///
/// Checked between files and between attempts. Cancellation aborts the batch
/// before the artifact write, so the output is all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Batch-level failures. Any of these aborts the run without an artifact.
#[derive(Debug)]
pub enum BatchError {
    /// Configuration rejected before any file was touched.
    Config(ConfigError),
    /// Dataset root or a category listing could not be read.
    Dataset {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A file could not be read as `;`-separated CSV records.
    Parse { file: PathBuf, source: csv::Error },
    /// A record failed domain validation; the batch aborts rather than
    /// skipping the file.
    Malformed { file: PathBuf, source: CloudError },
    /// Detection failed for a file.
    Detection { file: PathBuf, source: SearchError },
    /// The results artifact could not be written.
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The run was cancelled; nothing was persisted.
    Cancelled,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {}", err),
            Self::Dataset { path, source } => {
                write!(f, "cannot read dataset {}: {}", path.display(), source)
            }
            Self::Parse { file, source } => {
                write!(f, "cannot parse {}: {}", file.display(), source)
            }
            Self::Malformed { file, source } => {
                write!(f, "{}: {}", file.display(), source)
            }
            Self::Detection { file, source } => {
                write!(f, "detection failed for {}: {}", file.display(), source)
            }
            Self::Persist { path, source } => {
                write!(f, "cannot write results to {}: {}", path.display(), source)
            }
            Self::Cancelled => write!(f, "batch cancelled; no results were written"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Dataset { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            Self::Detection { source, .. } => Some(source),
            Self::Persist { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

impl From<ConfigError> for BatchError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

// ── Batch run ──────────────────────────────────────────────────────────────

/// Batch inputs: where the dataset lives and where the artifact goes.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Dataset root; each subdirectory is one category of CSV files.
    pub dataset: PathBuf,
    /// Directory receiving the results artifact.
    pub out_dir: PathBuf,
    /// Engine configuration shared by every file.
    pub detect: DetectConfig,
}

/// Outcome of a completed batch.
#[derive(Debug)]
pub struct BatchReport {
    /// Files processed.
    pub files: usize,
    /// Categories processed.
    pub categories: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Path of the persisted artifact.
    pub output: PathBuf,
}

/// Run detection across every category and file of the dataset.
///
/// A malformed file aborts the whole batch. On success the store is written
/// exactly once as `results_<timestamp>.json`, via temp file + rename so a
/// partial artifact is never observable.
pub fn run(
    config: &BatchConfig,
    strategy: &dyn DetectionStrategy,
    cancel: &CancelToken,
) -> Result<BatchReport, BatchError> {
    config.detect.validate()?;
    let started = Instant::now();
    let base_seed = config.detect.seed.unwrap_or_else(rand::random);
    tracing::info!(dataset = %config.dataset.display(), seed = base_seed, "batch started");

    let mut store = ResultsStore::default();
    let mut files = 0usize;
    let mut ordinal = 0u64;

    let categories = sorted_dirs(&config.dataset)?;
    for category in &categories {
        let name = dir_name(category);
        let csv_files = sorted_csv_files(category)?;
        tracing::info!(category = %name, files = csv_files.len(), "predicting clouds");

        for file in csv_files {
            if cancel.is_cancelled() {
                return Err(BatchError::Cancelled);
            }

            let records = read_records(&file)?;
            let bounds = config.detect.bounds;
            let cloud = if strategy.labeled() {
                cloud::assemble(&records, bounds)
            } else {
                cloud::assemble_unlabeled(&records, bounds)
            }
            .map_err(|source| BatchError::Malformed {
                file: file.clone(),
                source,
            })?;

            // Attempt offsets stay below 2^20, so per-file seed blocks
            // never overlap.
            let seed = base_seed.wrapping_add(ordinal << 20);
            let record = strategy
                .detect(&cloud, &config.detect, seed, cancel)
                .map_err(|source| match source {
                    SearchError::Cancelled => BatchError::Cancelled,
                    other => BatchError::Detection {
                        file: file.clone(),
                        source: other,
                    },
                })?;

            store.insert(&name, &dir_name(&file), record);
            files += 1;
            ordinal += 1;
        }
    }

    if cancel.is_cancelled() {
        return Err(BatchError::Cancelled);
    }
    let output = persist(&store, &config.out_dir)?;
    let elapsed = started.elapsed();
    tracing::info!(
        files,
        elapsed_s = elapsed.as_secs_f64(),
        output = %output.display(),
        "batch persisted"
    );

    Ok(BatchReport {
        files,
        categories: categories.len(),
        elapsed,
        output,
    })
}

/// Serialize the store to `results_<timestamp>.json` inside `out_dir`.
pub fn persist(store: &ResultsStore, out_dir: &Path) -> Result<PathBuf, BatchError> {
    let persist_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| BatchError::Persist { path, source }
    };

    fs::create_dir_all(out_dir).map_err(persist_err(out_dir))?;
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let path = out_dir.join(format!("results_{stamp}.json"));
    let json = serde_json::to_string(store).map_err(|source| BatchError::Persist {
        path: path.clone(),
        source: source.into(),
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(persist_err(&tmp))?;
    fs::rename(&tmp, &path).map_err(persist_err(&path))?;
    Ok(path)
}

// ── Dataset listing ────────────────────────────────────────────────────────

fn sorted_dirs(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(root).map_err(|source| BatchError::Dataset {
        path: root.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| BatchError::Dataset {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn sorted_csv_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|source| BatchError::Dataset {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| BatchError::Dataset {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_records(file: &Path) -> Result<Vec<CloudRecord>, BatchError> {
    let parse_err = |source: csv::Error| BatchError::Parse {
        file: file.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(file)
        .map_err(parse_err)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row.map_err(parse_err)?);
    }
    Ok(records)
}
