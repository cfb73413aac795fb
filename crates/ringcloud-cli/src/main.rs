//! ringcloud CLI — detect circular rings in noisy 2-D point clouds.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use ringcloud_core::batch::{self, BatchConfig, CancelToken};
use ringcloud_core::config::DetectConfig;
use ringcloud_core::optimize::{SupervisedEvaluation, UnsupervisedDetection};
use ringcloud_core::{ErrorWeights, ResultsStore};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ringcloud")]
#[command(about = "Detect circular rings in noisy 2-D point clouds (fuzzy c-means + optimal assignment)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect rings across a dataset and persist a results artifact.
    Detect(DetectArgs),

    /// Generate a synthetic ring/noise dataset in the detection input format.
    Generate(GenerateArgs),

    /// Summarize accuracy figures from a persisted results artifact.
    Stats(StatsArgs),
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Dataset root; each subdirectory is one category of CSV files.
    #[arg(long)]
    dataset: PathBuf,

    /// Directory to write the results artifact into.
    #[arg(long)]
    out: PathBuf,

    /// Fuzziness exponent range, one draw per attempt.
    #[arg(long, value_parser = parse_pair::<f64>, default_value = "1.5,2.5")]
    fuzziness: (f64, f64),

    /// Independent clustering attempts per file (labeled datasets only).
    #[arg(long, default_value = "10")]
    attempts: usize,

    /// Iteration cap per clustering run.
    #[arg(long, default_value = "100")]
    max_iters: usize,

    /// Convergence tolerance on the maximum center displacement.
    #[arg(long, default_value = "1e-4")]
    epsilon: f64,

    /// Minimum membership for a point to count toward a ring radius.
    #[arg(long, default_value = "0.2")]
    membership_threshold: f64,

    /// Center/radius blend of the attempt score; must sum to 1.
    #[arg(long, value_parser = parse_pair::<f64>, default_value = "0.9,0.1")]
    weights: (f64, f64),

    /// Normalization constant for the mean center offset (default √2000).
    #[arg(long)]
    center_norm: Option<f64>,

    /// Treat the dataset as unlabeled: no ground truth, no scoring.
    #[arg(long)]
    unlabeled: bool,

    /// Cluster count for unlabeled datasets.
    #[arg(long, required_if_eq("unlabeled", "true"), value_parser = clap::value_parser!(u64).range(1..))]
    clusters: Option<u64>,

    /// Seed for reproducible runs; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct GenerateArgs {
    /// Output directory for the generated CSV files.
    #[arg(long)]
    out: PathBuf,

    /// Number of files to generate.
    #[arg(long, default_value = "10")]
    files: usize,

    /// Rings per file.
    #[arg(long, default_value = "3")]
    circles: usize,

    /// Ring tightness factor; 1.0 keeps points on the circle.
    #[arg(long, default_value = "1.0")]
    randomness: f64,

    /// Radius range for generated rings.
    #[arg(long, value_parser = parse_pair::<f64>, default_value = "5.0,15.0")]
    radius_range: (f64, f64),

    /// Point-count range per ring.
    #[arg(long, value_parser = parse_pair::<usize>, default_value = "30,50")]
    points_range: (usize, usize),

    /// Noise points as a fraction of generated ring points.
    #[arg(long, default_value = "0.05")]
    noise_ratio: f64,

    /// Seed for reproducible generation; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct StatsArgs {
    /// Path of a persisted results artifact.
    #[arg(long)]
    results: PathBuf,
}

/// Parse a `min,max` pair from one argument.
fn parse_pair<T>(s: &str) -> Result<(T, T), String>
where
    T: FromStr + Clone + Send + Sync + 'static,
    T::Err: std::fmt::Display,
{
    let (lo, hi) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `min,max`, got `{s}`"))?;
    let lo = lo
        .trim()
        .parse::<T>()
        .map_err(|e| format!("invalid min `{}`: {}", lo.trim(), e))?;
    let hi = hi
        .trim()
        .parse::<T>()
        .map_err(|e| format!("invalid max `{}`: {}", hi.trim(), e))?;
    Ok((lo, hi))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Generate(args) => run_generate(&args),
        Commands::Stats(args) => run_stats(&args),
    }
}

// ── detect ─────────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let detect = DetectConfig {
        fuzziness: [args.fuzziness.0, args.fuzziness.1],
        attempts: args.attempts,
        max_iters: args.max_iters,
        epsilon: args.epsilon,
        membership_threshold: args.membership_threshold,
        weights: ErrorWeights {
            center: args.weights.0,
            radius: args.weights.1,
        },
        center_norm: args.center_norm.unwrap_or_else(|| 2000f64.sqrt()),
        seed: args.seed,
        ..DetectConfig::default()
    };
    let config = BatchConfig {
        dataset: args.dataset.clone(),
        out_dir: args.out.clone(),
        detect,
    };

    let cancel = CancelToken::new();
    let report = if args.unlabeled {
        let clusters = args.clusters.expect("clap enforces --clusters with --unlabeled") as usize;
        batch::run(&config, &UnsupervisedDetection { clusters }, &cancel)?
    } else {
        batch::run(&config, &SupervisedEvaluation, &cancel)?
    };

    println!(
        "Processed {} files across {} categories in {:.1}s",
        report.files,
        report.categories,
        report.elapsed.as_secs_f64()
    );
    println!("Results saved in {}", report.output.display());
    Ok(())
}

// ── generate ───────────────────────────────────────────────────────────────

/// One output row; ground-truth fields stay empty for noise points.
#[derive(Debug, Serialize)]
struct GeneratedRow {
    point_x: f64,
    point_y: f64,
    center_x: Option<f64>,
    center_y: Option<f64>,
    radius: Option<f64>,
    circ_no: Option<u32>,
}

fn run_generate(args: &GenerateArgs) -> CliResult<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    fs::create_dir_all(&args.out)?;
    let mut counter = next_file_index(&args.out)?;

    for _ in 0..args.files {
        let rows = generate_cloud(args, &mut rng);
        let path = args.out.join(format!("{counter}.csv"));
        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(&path)?;
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        counter += 1;
    }

    println!("Generated {} files in {}", args.files, args.out.display());
    Ok(())
}

/// Continue numbering after the largest existing `N.csv` in the directory.
fn next_file_index(dir: &std::path::Path) -> CliResult<u64> {
    let mut last = 0u64;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(stem) = name.to_string_lossy().strip_suffix(".csv") {
            if let Ok(n) = stem.parse::<u64>() {
                last = last.max(n);
            }
        }
    }
    Ok(last + 1)
}

fn generate_cloud(args: &GenerateArgs, rng: &mut StdRng) -> Vec<GeneratedRow> {
    let mut rows = Vec::new();
    let mut ring_points = 0usize;

    for i in 0..args.circles {
        let circ_no = i as u32 + 1;
        let center = [rng.gen_range(0.0..=100.0), rng.gen_range(0.0..=100.0)];
        let radius = rng.gen_range(args.radius_range.0..=args.radius_range.1);
        let n = rng.gen_range(args.points_range.0..=args.points_range.1);

        for _ in 0..n {
            let theta = rng.gen::<f64>() * std::f64::consts::TAU;
            let x = center[0] + theta.cos() * radius * args.randomness + rng.gen::<f64>() / 10.0 * radius;
            let y = center[1] + theta.sin() * radius * args.randomness + rng.gen::<f64>() / 10.0 * radius;
            // Points falling outside the domain are dropped, which is how
            // boundary-extending rings arise in generated datasets.
            if (0.0..=100.0).contains(&x) && (0.0..=100.0).contains(&y) {
                rows.push(GeneratedRow {
                    point_x: x,
                    point_y: y,
                    center_x: Some(center[0]),
                    center_y: Some(center[1]),
                    radius: Some(radius),
                    circ_no: Some(circ_no),
                });
                ring_points += 1;
            }
        }
    }

    let n_noise = (ring_points as f64 * args.noise_ratio) as usize;
    for _ in 0..n_noise {
        rows.push(GeneratedRow {
            point_x: rng.gen_range(0.0..=100.0),
            point_y: rng.gen_range(0.0..=100.0),
            center_x: None,
            center_y: None,
            radius: None,
            circ_no: None,
        });
    }
    rows
}

// ── stats ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ErrorSums {
    total: f64,
    centers: f64,
    radii: f64,
    count: usize,
}

impl ErrorSums {
    fn accuracy(sum: f64, count: usize) -> f64 {
        (1.0 - sum / count as f64) * 100.0
    }

    fn print_row(&self, label: &str) {
        println!(
            "{:<12} {:>6} {:>9.2}% {:>9.2}% {:>9.2}%",
            label,
            self.count,
            Self::accuracy(self.total, self.count),
            Self::accuracy(self.centers, self.count),
            Self::accuracy(self.radii, self.count),
        );
    }
}

fn run_stats(args: &StatsArgs) -> CliResult<()> {
    let text = fs::read_to_string(&args.results)
        .map_err(|e| -> CliError { format!("cannot read {}: {}", args.results.display(), e).into() })?;
    let store: ResultsStore = serde_json::from_str(&text)?;

    println!(
        "{:<12} {:>6} {:>10} {:>10} {:>10}",
        "category", "files", "total", "centers", "radii"
    );

    let mut overall = ErrorSums::default();
    for (category, records) in store.iter() {
        let mut sums = ErrorSums::default();
        for record in records.values() {
            let (Some(total), Some(centers), Some(radii)) =
                (record.total_error, record.centers_error, record.radii_error)
            else {
                tracing::warn!(category = %category, "skipping unscored record");
                continue;
            };
            sums.total += total;
            sums.centers += centers;
            sums.radii += radii;
            sums.count += 1;
        }
        if sums.count == 0 {
            continue;
        }
        sums.print_row(category);
        overall.total += sums.total;
        overall.centers += sums.centers;
        overall.radii += sums.radii;
        overall.count += sums.count;
    }

    if overall.count == 0 {
        return Err("results contain no scored records".into());
    }
    overall.print_row("total");
    Ok(())
}
