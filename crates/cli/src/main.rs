//! EcoSDM CLI - species distribution modeling from environmental rasters

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ecosdm_algorithms::central::CentralMethod;
use ecosdm_algorithms::correlation::{select_layers, CorrelationMethod, CorrelationParams};
use ecosdm_algorithms::distance::{DistanceMetric, DistanceParams};
use ecosdm_algorithms::extract::augment_occurrences;
use ecosdm_algorithms::matrix::stack_to_grid;
use ecosdm_algorithms::model::{run_model, BioclimModel, DistanceModel, ModelOutput};
use ecosdm_algorithms::pca::{pca, PcaParams};
use ecosdm_algorithms::sampling::{add_pseudo_absences, PseudoAbsenceParams};
use ecosdm_core::io::{read_geotiff, write_geotiff, RasterProfile};
use ecosdm_core::occurrence::{ColumnNames, OccurrenceSet};
use ecosdm_core::stack::{load_stack, LayerStack, RasterSource};
use ecosdm_core::{Raster, SdmContext};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ecosdm")]
#[command(author, version, about = "Species distribution modeling", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Occurrence table and its column names
#[derive(Args)]
struct OccurrenceArgs {
    /// Occurrence CSV file
    #[arg(short, long)]
    occurrences: PathBuf,
    /// Latitude column
    #[arg(long, default_value = "decimalLatitude")]
    lat_col: String,
    /// Longitude column
    #[arg(long, default_value = "decimalLongitude")]
    lon_col: String,
    /// Presence column (created with value 1 if absent)
    #[arg(long, default_value = "presence")]
    presence_col: String,
}

impl OccurrenceArgs {
    fn columns(&self) -> ColumnNames {
        ColumnNames {
            latitude: self.lat_col.clone(),
            longitude: self.lon_col.clone(),
            presence: self.presence_col.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add one column per layer with the values at each occurrence
    Extract {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        occ: OccurrenceArgs,
        /// Output CSV file
        #[arg(long)]
        output: PathBuf,
    },
    /// Append random background points (presence = 0) to an occurrence table
    PseudoAbsence {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        occ: OccurrenceArgs,
        /// Output CSV file
        #[arg(long)]
        output: PathBuf,
        /// Number of points (default: ratio x occurrence count)
        #[arg(short, long)]
        count: Option<usize>,
        /// Fraction of the occurrence count used when --count is not given
        #[arg(long, default_value = "0.3")]
        ratio: f64,
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
        /// Candidate draws before giving up
        #[arg(long, default_value = "10000000")]
        max_attempts: u64,
        /// Never give up drawing candidates
        #[arg(long)]
        unbounded: bool,
    },
    /// Distance to the occurrence centroid for every pixel
    Distance {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        occ: OccurrenceArgs,
        /// Output raster
        #[arg(long)]
        output: PathBuf,
        /// Metric: euclidean, manhattan, chebyshev, canberra, cosine, minkowski, mahalanobis
        #[arg(short, long, default_value = "euclidean")]
        metric: String,
        /// Central point: mean, median, mode
        #[arg(long, default_value = "mean")]
        central: String,
        /// Minkowski order
        #[arg(short, default_value = "3.0")]
        p: f64,
    },
    /// Bioclim climatic envelope suitability
    Bioclim {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        #[command(flatten)]
        occ: OccurrenceArgs,
        /// Output raster (fraction of layers inside the envelope)
        #[arg(long)]
        output: PathBuf,
        /// Also write the binary full-envelope map here
        #[arg(long)]
        full_envelope: Option<PathBuf>,
    },
    /// Drop highly correlated layers
    Correlation {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        /// Correlation method: pearson, spearman
        #[arg(short, long, default_value = "pearson")]
        method: String,
        /// Absolute correlation above which a pair is collinear
        #[arg(short, long, default_value = "0.75")]
        threshold: f64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Principal components of the layers, one raster per component
    Pca {
        /// Raster directory, file, or list of files
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
        /// Output directory for pca_component_N.tif
        #[arg(long, default_value = "pca_components")]
        output_dir: PathBuf,
        /// Number of components
        #[arg(short = 'n', long, default_value = "3")]
        components: usize,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_stack(paths: &[PathBuf]) -> Result<LayerStack> {
    let pb = spinner("Reading layers...");
    let source = RasterSource::from_args(paths).context("Invalid raster source")?;
    let stack = load_stack(&source).context("Failed to load raster layers")?;
    pb.finish_and_clear();
    let (rows, cols) = stack.shape();
    info!("Layers: {} ({} x {})", stack.names().join(", "), cols, rows);
    Ok(stack)
}

fn read_occurrences(args: &OccurrenceArgs) -> Result<OccurrenceSet> {
    let occ = OccurrenceSet::read_csv(&args.occurrences, &args.columns())
        .with_context(|| format!("Failed to read {}", args.occurrences.display()))?;
    info!("Occurrences: {} ({} presences)", occ.len(), occ.presence_count());
    Ok(occ)
}

fn write_result(raster: &Raster, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    let profile = RasterProfile::for_raster(raster);
    write_geotiff(raster, path, &profile).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn report_model(output: &ModelOutput) {
    let stats = output.surface.statistics();
    if let (Some(min), Some(max)) = (stats.min, stats.max) {
        info!(
            "{}: range [{:.4}, {:.4}], {} valid pixels",
            output.kind, min, max, stats.valid_count
        );
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let ctx = SdmContext::new("ecosdm");

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let pb = spinner("Reading raster...");
            let raster = read_geotiff(&input).context("Failed to read raster")?;
            pb.finish_and_clear();

            let (rows, cols) = raster.shape();
            let (res_x, res_y) = raster.resolution();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            if json {
                let value = serde_json::json!({
                    "file": input.display().to_string(),
                    "name": raster.name(),
                    "rows": rows,
                    "cols": cols,
                    "resolution": [res_x, res_y],
                    "bounds": bounds,
                    "transform": raster.transform(),
                    "crs": raster.crs().map(|c| c.to_string()),
                    "nodata": raster.nodata(),
                    "statistics": {
                        "min": stats.min,
                        "max": stats.max,
                        "mean": stats.mean,
                        "valid_count": stats.valid_count,
                        "nodata_count": stats.nodata_count,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Resolution: {} x {}", res_x, res_y);
            println!("Bounds: {}", bounds);
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Extract ──────────────────────────────────────────────────
        Commands::Extract { rasters, occ, output } => {
            let stack = read_stack(&rasters)?;
            let mut occurrences = read_occurrences(&occ)?;
            let start = Instant::now();
            augment_occurrences(&mut occurrences, &stack, &ctx).context("Failed to extract values")?;
            let elapsed = start.elapsed();
            occurrences
                .write_csv(&output, &occ.columns())
                .context("Failed to write output")?;
            done("Occurrences with layer values", &output, elapsed);
        }

        // ── Pseudo-absences ──────────────────────────────────────────
        Commands::PseudoAbsence {
            rasters,
            occ,
            output,
            count,
            ratio,
            seed,
            max_attempts,
            unbounded,
        } => {
            let stack = read_stack(&rasters)?;
            let mut occurrences = read_occurrences(&occ)?;
            let params = PseudoAbsenceParams {
                count,
                ratio,
                max_attempts: if unbounded { None } else { Some(max_attempts) },
                seed,
            };
            let pb = spinner("Sampling pseudo-absences...");
            let start = Instant::now();
            let added = add_pseudo_absences(&mut occurrences, &stack, &params, &ctx)
                .context("Failed to generate pseudo-absences")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();
            occurrences
                .write_csv(&output, &occ.columns())
                .context("Failed to write output")?;
            info!("Added {} pseudo-absences", added);
            done("Occurrences with pseudo-absences", &output, elapsed);
        }

        // ── Distance ─────────────────────────────────────────────────
        Commands::Distance {
            rasters,
            occ,
            output,
            metric,
            central,
            p,
        } => {
            let metric: DistanceMetric = metric.parse()?;
            let central: CentralMethod = central.parse()?;
            let stack = read_stack(&rasters)?;
            let occurrences = read_occurrences(&occ)?;

            let model = DistanceModel {
                distance: DistanceParams { metric, p },
                central,
            };
            let pb = spinner("Scoring pixels...");
            let start = Instant::now();
            let result = run_model(&model, &stack, &occurrences, &ctx)
                .with_context(|| format!("Failed to compute {} distance", metric))?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            report_model(&result);
            write_result(&result.surface, &output)?;
            done("Distance", &output, elapsed);
        }

        // ── Bioclim ──────────────────────────────────────────────────
        Commands::Bioclim {
            rasters,
            occ,
            output,
            full_envelope,
        } => {
            let stack = read_stack(&rasters)?;
            let occurrences = read_occurrences(&occ)?;

            let pb = spinner("Scoring pixels...");
            let start = Instant::now();
            let result = run_model(&BioclimModel, &stack, &occurrences, &ctx)
                .context("Failed to compute Bioclim envelope")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            report_model(&result);
            write_result(&result.surface, &output)?;
            if let (Some(path), Some(map)) = (full_envelope.as_ref(), result.extras.first()) {
                write_result(map, path)?;
                println!("Full envelope saved to: {}", path.display());
            }
            done("Bioclim", &output, elapsed);
        }

        // ── Correlation ──────────────────────────────────────────────
        Commands::Correlation {
            rasters,
            method,
            threshold,
            json,
        } => {
            let method: CorrelationMethod = method.parse()?;
            let stack = read_stack(&rasters)?;
            let grid = stack_to_grid(&stack).context("Failed to build feature grid")?;

            let start = Instant::now();
            let report = select_layers(&grid, &CorrelationParams { method, threshold }, &ctx)
                .context("Failed to filter layers")?;
            let elapsed = start.elapsed();

            if json {
                let matrix: Vec<Vec<f64>> = report
                    .matrix
                    .outer_iter()
                    .map(|row| row.to_vec())
                    .collect();
                let value = serde_json::json!({
                    "method": method.to_string(),
                    "threshold": threshold,
                    "layers": report.names,
                    "matrix": matrix,
                    "kept": report.kept_names(),
                    "removed": report.removed_names(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Kept layers: {}", report.kept_names().join(", "));
                println!("Removed layers: {}", report.removed_names().join(", "));
                println!("  Processing time: {:.2?}", elapsed);
            }
        }

        // ── PCA ──────────────────────────────────────────────────────
        Commands::Pca {
            rasters,
            output_dir,
            components,
        } => {
            let stack = read_stack(&rasters)?;
            let grid = stack_to_grid(&stack).context("Failed to build feature grid")?;

            let pb = spinner("Computing principal components...");
            let start = Instant::now();
            let result = pca(&grid, &PcaParams { n_components: components }, &ctx)
                .context("Failed to compute PCA")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            for (component, ratio) in result.components.iter().zip(&result.explained_variance_ratio) {
                let path = output_dir.join(format!("{}.tif", component.name()));
                write_result(component, &path)?;
                info!("{}: {:.1}% of variance", component.name(), 100.0 * ratio);
            }
            done("PCA components", &output_dir, elapsed);
        }
    }

    Ok(())
}
