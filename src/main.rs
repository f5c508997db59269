use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use moke_lab::app::run_viewer;
use moke_lab::config::AnalysisConfig;
use moke_lab::data::filter::ExperimentFilter;
use moke_lab::data::loader::load_file;
use moke_lab::figures::pipeline_charts;
use moke_lab::pipeline::{analyze, write_outputs};
use moke_lab::plot::render::render_all;
use moke_lab::state::AppState;

/// Reduce a MOKE hysteresis scan: centre the loops, extract saturation and
/// coercivity, calibrate against the polarizer offsets and relate rotation
/// to ellipticity.
#[derive(Parser, Debug)]
#[command(name = "moke-lab", version, about)]
struct Cli {
    /// Scan export (.txt/.dat), single-loop CSV, or scan-set JSON.
    scan: PathBuf,

    /// Directory for data products and plots.
    #[arg(short, long, default_value = "moke_output")]
    out_dir: PathBuf,

    /// JSON analysis settings; defaults are used for missing keys.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Experiments to analyse, e.g. `1,3-5` (default: all).
    #[arg(short, long)]
    experiments: Option<ExperimentFilter>,

    /// Skip PNG rendering.
    #[arg(long)]
    no_plots: bool,

    /// Open the interactive viewer after writing the outputs.
    #[arg(long)]
    show: bool,
}

fn main() -> Result<()> {
    moke_lab::init_logging();
    let cli = Cli::parse();

    let config = AnalysisConfig::load(cli.config.as_deref())?;
    let set = load_file(&cli.scan, &config.markers)?;

    let filter = cli.experiments.unwrap_or_default();
    let analysis = analyze(&set, &config, &filter)
        .with_context(|| format!("analysing {}", cli.scan.display()))?;
    let written = write_outputs(&analysis, &cli.out_dir)?;
    log::info!("{} data files in {}", written.len(), cli.out_dir.display());

    let charts = pipeline_charts(&analysis);
    if !cli.no_plots {
        render_all(&charts, &cli.out_dir, (config.plot.width, config.plot.height))?;
    }

    for e in analysis.summary().experiments {
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.6}"));
        println!(
            "experiment {:>2}: θ_K = {:>12}  ε_K = {:>12}",
            e.experiment,
            fmt(e.kerr_rotation),
            fmt(e.kerr_ellipticity)
        );
    }

    if cli.show {
        let mut state = AppState::with_charts(charts);
        state.config = config;
        run_viewer("MOKE Lab – Results", state)?;
    }
    Ok(())
}
