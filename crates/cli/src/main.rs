//! slopeclass CLI - slope classification of DEM tiles

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use slopeclass_algorithms::grid::{GridFit, Interpolation, MatchMode, OverlapMode};
use slopeclass_core::io::read_geotiff;
use slopeclass_core::raster::{DataType, Raster};
use slopeclass_pipeline::{
    run_pipeline, CalculatorRequest, Feedback, Geoprocessor, LogFeedback, MosaicRequest,
    NativeProcessor, OutputPaths, PipelineParams, PolygonizeRequest, ResampleRequest,
    SlopeRequest,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "slopeclass")]
#[command(author, version, about = "Slope classification of DEM tiles", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Mosaic, resample, slope, classify and vectorize in one run
    Run {
        /// Input DEM tiles
        inputs: Vec<PathBuf>,
        /// YAML or JSON parameter file (replaces the inputs and output paths)
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Directory receiving all artifacts
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Cell size of the input tiles
        #[arg(long)]
        original_grain: Option<f64>,
        /// Cell size of the slope analysis
        #[arg(long)]
        desired_grain: Option<f64>,
    },
    /// Mosaic several rasters onto one grid
    Mosaic {
        /// Input rasters
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Target cell size
        #[arg(short, long)]
        cell_size: f64,
        /// Interpolation: nearest, bilinear, bicubic, bspline
        #[arg(long, default_value = "bilinear", value_parser = parse_interpolation)]
        resampling: Interpolation,
        /// Overlap handling: first, last, min, max, mean, feather
        #[arg(long, default_value = "mean", value_parser = parse_overlap)]
        overlap: OverlapMode,
        /// Feathering distance
        #[arg(long, default_value = "0")]
        blend_distance: f64,
        /// Radiometric matching: none, regression
        #[arg(long, default_value = "none", value_parser = parse_matching)]
        matching: MatchMode,
        /// Grid fit: nodes, cells
        #[arg(long, default_value = "cells", value_parser = parse_fit)]
        fit: GridFit,
        /// Output data type
        #[arg(long, default_value = "float32", value_parser = parse_data_type)]
        data_type: DataType,
    },
    /// Resample a raster to a new cell size
    Resample {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Target cell size
        #[arg(short, long)]
        cell_size: f64,
        /// Interpolation when coarsening
        #[arg(long, default_value = "bspline", value_parser = parse_interpolation)]
        scale_up: Interpolation,
        /// Interpolation when refining
        #[arg(long, default_value = "bspline", value_parser = parse_interpolation)]
        scale_down: Interpolation,
        /// Store as float32 instead of the input's data type
        #[arg(long)]
        float: bool,
        /// Grid fit: nodes, cells
        #[arg(long, default_value = "cells", value_parser = parse_fit)]
        fit: GridFit,
    },
    /// Calculate slope from a DEM
    Slope {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Band to read (1-based)
        #[arg(short, long, default_value = "1")]
        band: usize,
        /// Ratio of horizontal to vertical units
        #[arg(short, long, default_value = "1.0")]
        scale: f64,
        /// Output units: degrees, percent
        #[arg(short, long, default_value = "degrees")]
        units: String,
        /// Also compute border cells
        #[arg(long)]
        compute_edges: bool,
        /// Zevenbergen-Thorne instead of Horn
        #[arg(long)]
        zevenbergen: bool,
    },
    /// Evaluate a formula over one or more rasters (a = first grid, b = second, ...)
    Calc {
        /// Formula, e.g. "ifelse(gt(a, 30), 1, 0)"
        formula: String,
        /// Output file
        output: PathBuf,
        /// Input grids, in formula order
        #[arg(short, long = "grid", required = true)]
        grids: Vec<PathBuf>,
        /// Interpolation for grids on another grid system
        #[arg(long, default_value = "bspline", value_parser = parse_interpolation)]
        interpolation: Interpolation,
        /// Evaluate no-data cells instead of skipping them
        #[arg(long)]
        use_nodata: bool,
        /// Output data type
        #[arg(long, default_value = "float32", value_parser = parse_data_type)]
        data_type: DataType,
    },
    /// Convert raster regions to GeoJSON polygons
    Polygonize {
        /// Input raster
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Band to read (1-based)
        #[arg(short, long, default_value = "1")]
        band: usize,
        /// Attribute receiving the cell value
        #[arg(short, long, default_value = "DN")]
        field: String,
        /// Join diagonal neighbours
        #[arg(long)]
        eight: bool,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid spinner template")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn parse_interpolation(s: &str) -> std::result::Result<Interpolation, String> {
    Interpolation::from_name(s).ok_or_else(|| {
        format!("unknown interpolation '{}' (nearest, bilinear, bicubic, bspline)", s)
    })
}

fn parse_overlap(s: &str) -> std::result::Result<OverlapMode, String> {
    match s.to_lowercase().as_str() {
        "first" => Ok(OverlapMode::First),
        "last" => Ok(OverlapMode::Last),
        "min" | "minimum" => Ok(OverlapMode::Minimum),
        "max" | "maximum" => Ok(OverlapMode::Maximum),
        "mean" => Ok(OverlapMode::Mean),
        "feather" | "feathering" => Ok(OverlapMode::Feathering),
        _ => Err(format!("unknown overlap mode '{}'", s)),
    }
}

fn parse_matching(s: &str) -> std::result::Result<MatchMode, String> {
    match s.to_lowercase().as_str() {
        "none" => Ok(MatchMode::None),
        "regression" => Ok(MatchMode::Regression),
        _ => Err(format!("unknown matching mode '{}'", s)),
    }
}

fn parse_fit(s: &str) -> std::result::Result<GridFit, String> {
    match s.to_lowercase().as_str() {
        "nodes" => Ok(GridFit::Nodes),
        "cells" => Ok(GridFit::Cells),
        _ => Err(format!("unknown grid fit '{}' (nodes, cells)", s)),
    }
}

fn parse_data_type(s: &str) -> std::result::Result<DataType, String> {
    DataType::from_name(s).ok_or_else(|| format!("unknown data type '{}'", s))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Pipeline feedback shown on a spinner; Ctrl-C cancels at the next stage
struct SpinnerFeedback {
    inner: LogFeedback,
    pb: ProgressBar,
}

impl Feedback for SpinnerFeedback {
    fn set_progress_text(&self, text: &str) {
        self.pb.suspend(|| self.inner.set_progress_text(text));
        self.pb.set_message(text.to_string());
    }

    fn is_canceled(&self) -> bool {
        self.inner.is_canceled()
    }
}

fn pipeline_params(
    inputs: Vec<PathBuf>,
    params: Option<PathBuf>,
    out_dir: &Path,
    original_grain: Option<f64>,
    desired_grain: Option<f64>,
) -> Result<PipelineParams> {
    let mut p = match params {
        Some(path) => {
            if !inputs.is_empty() {
                bail!("Give either input tiles or --params, not both");
            }
            PipelineParams::from_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => PipelineParams::new(inputs, OutputPaths::in_dir(out_dir)),
    };
    if let Some(g) = original_grain {
        p.original_grain = g;
    }
    if let Some(g) = desired_grain {
        p.desired_grain = g;
    }
    p.validate().context("Invalid pipeline parameters")?;
    Ok(p)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let processor = NativeProcessor::new();

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster: Raster<f64> = read_geotiff(&input, None).context("Failed to read raster")?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
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

        // ── Pipeline ─────────────────────────────────────────────────
        Commands::Run {
            inputs,
            params,
            out_dir,
            original_grain,
            desired_grain,
        } => {
            let params = pipeline_params(inputs, params, &out_dir, original_grain, desired_grain)?;
            info!(
                "{} tile(s), grain {} -> {}",
                params.inputs.len(),
                params.original_grain,
                params.desired_grain
            );

            let inner = LogFeedback::new();
            let flag = inner.cancel_flag();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .context("Failed to install Ctrl-C handler")?;
            let feedback = SpinnerFeedback {
                inner,
                pb: spinner("Mosaicking...")?,
            };

            let start = Instant::now();
            let result = run_pipeline(&params, &processor, &feedback);
            feedback.pb.finish_and_clear();
            let result = result.context("Slope classification failed")?;

            if result.is_empty() {
                info!("Canceled after {:.2?}", start.elapsed());
            } else {
                info!("Finished in {:.2?}", start.elapsed());
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to encode result")?
            );
        }

        // ── Single operations ────────────────────────────────────────
        Commands::Mosaic {
            inputs,
            output,
            cell_size,
            resampling,
            overlap,
            blend_distance,
            matching,
            fit,
            data_type,
        } => {
            let request = MosaicRequest {
                grids: inputs,
                data_type,
                resampling,
                overlap,
                blend_distance,
                matching,
                cell_size,
                fit,
                output,
            };
            let pb = spinner("Mosaicking...")?;
            let start = Instant::now();
            let written = processor.mosaic(&request);
            pb.finish_and_clear();
            let written = written.context("Failed to mosaic")?;
            done("Mosaic", &written, start.elapsed());
        }

        Commands::Resample {
            input,
            output,
            cell_size,
            scale_up,
            scale_down,
            float,
            fit,
        } => {
            let request = ResampleRequest {
                input,
                keep_type: !float,
                scale_up,
                scale_down,
                cell_size,
                fit,
                output,
            };
            let pb = spinner("Resampling...")?;
            let start = Instant::now();
            let written = processor.resample(&request);
            pb.finish_and_clear();
            let written = written.context("Failed to resample")?;
            done("Resampled raster", &written, start.elapsed());
        }

        Commands::Slope {
            input,
            output,
            band,
            scale,
            units,
            compute_edges,
            zevenbergen,
        } => {
            let as_percent = match units.to_lowercase().as_str() {
                "degrees" | "deg" | "d" => false,
                "percent" | "pct" | "%" => true,
                _ => bail!("Unknown units: {} (degrees, percent)", units),
            };
            let request = SlopeRequest {
                input,
                band,
                scale,
                as_percent,
                compute_edges,
                zevenbergen,
                output,
            };
            let pb = spinner("Calculating slope...")?;
            let start = Instant::now();
            let written = processor.slope(&request);
            pb.finish_and_clear();
            let written = written.context("Failed to calculate slope")?;
            done("Slope", &written, start.elapsed());
        }

        Commands::Calc {
            formula,
            output,
            grids,
            interpolation,
            use_nodata,
            data_type,
        } => {
            let request = CalculatorRequest {
                grids,
                formula,
                interpolation,
                use_nodata,
                data_type,
                output,
            };
            let pb = spinner("Evaluating formula...")?;
            let start = Instant::now();
            let written = processor.raster_calculator(&request);
            pb.finish_and_clear();
            let written = written.context("Failed to evaluate formula")?;
            done("Result", &written, start.elapsed());
        }

        Commands::Polygonize {
            input,
            output,
            band,
            field,
            eight,
        } => {
            let request = PolygonizeRequest {
                input,
                band,
                field,
                eight_connectedness: eight,
                output,
            };
            let pb = spinner("Polygonizing...")?;
            let start = Instant::now();
            let written = processor.polygonize(&request);
            pb.finish_and_clear();
            let written = written.context("Failed to polygonize")?;
            done("Polygons", &written, start.elapsed());
        }
    }

    Ok(())
}
