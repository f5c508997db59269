use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use moke_lab::analysis::reflection::{DEFAULT_MAP_POINTS, ReflectionAnalysis, parameter_map};
use moke_lab::app::run_viewer;
use moke_lab::figures::reflection_heatmaps;
use moke_lab::plot::render::render_all;
use moke_lab::state::AppState;

/// Polarization of light after reflection at an interface with relative
/// index `n = n1 / n2`, including total internal reflection.
#[derive(Parser, Debug)]
#[command(name = "reflection", version, about)]
struct Cli {
    /// Relative refractive index n1/n2 (≥ 1).
    #[arg(long)]
    n: f64,

    /// Polarization angle from the s direction.
    #[arg(long)]
    alpha: f64,

    /// Angle of incidence.
    #[arg(long)]
    theta: f64,

    /// Read `--alpha` and `--theta` as radians instead of degrees.
    #[arg(long)]
    radians: bool,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Render α' and η maps over all angles at this index.
    #[arg(long)]
    visualize: bool,

    /// Grid points per axis of the maps.
    #[arg(long, default_value_t = DEFAULT_MAP_POINTS)]
    points: usize,

    #[arg(short, long, default_value = "reflection_output")]
    out_dir: PathBuf,

    /// Browse the maps in the interactive viewer.
    #[arg(long)]
    show: bool,
}

fn main() -> Result<()> {
    moke_lab::init_logging();
    let cli = Cli::parse();

    let result = if cli.radians {
        ReflectionAnalysis::new(cli.n, cli.alpha, cli.theta)
    } else {
        ReflectionAnalysis::from_degrees(cli.n, cli.alpha, cli.theta)
    }
    .context("invalid reflection parameters")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{result}");
    }

    if cli.visualize {
        let map = parameter_map(cli.n, cli.points.max(2));
        render_all(&reflection_heatmaps(&map), &cli.out_dir, (1000, 800))?;
    }
    if cli.show {
        run_viewer("MOKE Lab – Reflection", AppState::for_reflection(cli.n))?;
    }
    Ok(())
}
