//! scanlattice CLI — lattice and scan-motion estimation for raw stacks.

use clap::{Args, Parser, Subcommand};
use nalgebra::Vector2;
use std::path::PathBuf;

use scanlattice::{
    estimate_lattice, find_interpolation_neighbors, ImageStack, LatticeConfig, LatticeReport,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "scanlattice")]
#[command(about = "Estimate the illumination lattice and scan motion of a spot-scan stack")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate lattice basis, per-frame shift and offset from a raw stack.
    Estimate(CliEstimateArgs),

    /// Map output grid points to their nearest scan events, using a
    /// previously written estimate.
    Neighbors(CliNeighborsArgs),
}

#[derive(Debug, Clone, Args)]
struct CliStackArgs {
    /// Path to the raw stack: little-endian u16, frame-major, row-major.
    #[arg(long)]
    stack: PathBuf,

    /// Number of frames in the stack.
    #[arg(long)]
    frames: usize,

    /// Frame width (rows, first image axis).
    #[arg(long)]
    width: usize,

    /// Frame height (columns, second image axis).
    #[arg(long)]
    height: usize,
}

#[derive(Debug, Clone, Args)]
struct CliEstimateArgs {
    #[command(flatten)]
    stack: CliStackArgs,

    /// Path to write the estimate (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Exclusion half-width (pixels) around each extracted spike.
    #[arg(long, default_value = "15")]
    extent: usize,

    /// Number of candidate spikes to extract.
    #[arg(long, default_value = "150")]
    num_spikes: usize,

    /// Harmonic match tolerance in spectrum pixels.
    #[arg(long, default_value = "3.0")]
    tolerance: f64,

    /// Cap on the harmonic order explored by the basis search.
    #[arg(long, default_value = "12")]
    max_harmonic_order: usize,

    /// Harmonics per basis vector used for phase-ramp shift fitting.
    #[arg(long, default_value = "3")]
    num_harmonics: usize,

    /// Maximum mean phase residual (radians) for a harmonic to enter the
    /// shift fit.
    #[arg(long, default_value = "1.0")]
    outlier_phase: f64,

    /// Keep the refined basis as-is instead of forcing the triple to sum
    /// to zero.
    #[arg(long)]
    no_closure: bool,
}

#[derive(Debug, Clone, Args)]
struct CliNeighborsArgs {
    /// Path to an estimate written by `scanlattice estimate` (JSON).
    #[arg(long)]
    estimate: PathBuf,

    /// Path to write the neighbor map (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Number of scan steps to triangulate.
    #[arg(long)]
    steps: usize,

    /// Output grid start along the first axis (pixels).
    #[arg(long)]
    x0: f64,

    /// Output grid end along the first axis (pixels, inclusive).
    #[arg(long)]
    x1: f64,

    /// Output grid start along the second axis (pixels).
    #[arg(long)]
    y0: f64,

    /// Output grid end along the second axis (pixels, inclusive).
    #[arg(long)]
    y1: f64,

    /// Output grid pitch (pixels).
    #[arg(long, default_value = "1.0")]
    pitch: f64,
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
        Commands::Estimate(args) => run_estimate(&args),
        Commands::Neighbors(args) => run_neighbors(&args),
    }
}

// ── estimate ──────────────────────────────────────────────────────────

fn load_stack(args: &CliStackArgs) -> CliResult<Vec<u16>> {
    let bytes = std::fs::read(&args.stack)?;
    if bytes.len() % 2 != 0 {
        return Err(format!(
            "{}: odd byte count, expected little-endian u16 samples",
            args.stack.display()
        )
        .into());
    }
    let data: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    tracing::info!(
        samples = data.len(),
        frames = args.frames,
        width = args.width,
        height = args.height,
        "loaded raw stack"
    );
    Ok(data)
}

fn run_estimate(args: &CliEstimateArgs) -> CliResult<()> {
    let data = load_stack(&args.stack)?;
    let stack = ImageStack::new(&data, args.stack.frames, args.stack.width, args.stack.height)?;

    let config = LatticeConfig {
        extent: args.extent,
        num_spikes: args.num_spikes,
        tolerance: args.tolerance,
        max_harmonic_order: args.max_harmonic_order,
        num_harmonics: args.num_harmonics,
        outlier_phase: args.outlier_phase,
        enforce_closure: !args.no_closure,
        ..LatticeConfig::default()
    };

    let estimate = estimate_lattice(&stack, &config)?;
    let report = LatticeReport::from(&estimate);

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Estimate written to {}", args.out.display());
    Ok(())
}

// ── neighbors ─────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct NeighborEntry {
    grid_point: [f64; 2],
    /// Scan step and spot position per neighbor, empty for grid points
    /// outside the triangulated scan cloud.
    neighbors: Vec<NeighborEvent>,
}

#[derive(Debug, serde::Serialize)]
struct NeighborEvent {
    frame: usize,
    position: [f64; 2],
}

#[derive(Debug, serde::Serialize)]
struct NeighborReport {
    grid_dims: [usize; 2],
    unmapped: usize,
    entries: Vec<NeighborEntry>,
}

fn grid_range(start: f64, end: f64, pitch: f64) -> CliResult<Vec<f64>> {
    if pitch <= 0.0 || end < start {
        return Err("grid range requires end >= start and pitch > 0".into());
    }
    let n = ((end - start) / pitch).floor() as usize + 1;
    Ok((0..n).map(|k| start + pitch * k as f64).collect())
}

fn run_neighbors(args: &CliNeighborsArgs) -> CliResult<()> {
    let json = std::fs::read_to_string(&args.estimate)?;
    let report: LatticeReport = serde_json::from_str(&json)?;

    let direct = [
        Vector2::new(report.direct[0][0], report.direct[0][1]),
        Vector2::new(report.direct[1][0], report.direct[1][1]),
    ];
    let shift = Vector2::new(report.shift[0], report.shift[1]);
    let offset = Vector2::new(report.offset[0], report.offset[1]);

    let grid_x = grid_range(args.x0, args.x1, args.pitch)?;
    let grid_y = grid_range(args.y0, args.y1, args.pitch)?;

    let map =
        find_interpolation_neighbors(&grid_x, &grid_y, &direct, shift, offset, args.steps)?;

    let mut unmapped = 0usize;
    let entries: Vec<NeighborEntry> = map
        .grid
        .iter()
        .zip(&map.neighbors)
        .map(|(point, resolved)| NeighborEntry {
            grid_point: [point.x, point.y],
            neighbors: match resolved {
                Ok(events) => events
                    .iter()
                    .map(|e| NeighborEvent {
                        frame: e.frame,
                        position: [e.position.x, e.position.y],
                    })
                    .collect(),
                Err(boundary) => {
                    tracing::debug!("{boundary}");
                    unmapped += 1;
                    Vec::new()
                }
            },
        })
        .collect();
    if unmapped > 0 {
        tracing::warn!(unmapped, total = entries.len(), "grid points left unmapped");
    }

    let out = NeighborReport {
        grid_dims: [map.grid_dims.0, map.grid_dims.1],
        unmapped,
        entries,
    };
    let json = serde_json::to_string_pretty(&out)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Neighbor map written to {}", args.out.display());
    Ok(())
}
