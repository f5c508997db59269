use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use moke_lab::analysis::calibration::ManualCalibration;
use moke_lab::app::run_viewer;
use moke_lab::config::AnalysisConfig;
use moke_lab::data::loader::load_calibration_points;
use moke_lab::figures::manual_calibration;
use moke_lab::plot::render::render_chart;
use moke_lab::plot::{Chart, NamedChart};
use moke_lab::report::{manual_calibration_report, write_text};
use moke_lab::state::AppState;

/// Fit detector signal against polarizer angle, `s = k (θ + θ0)`, and
/// compare the slope with the instrument coefficient.
#[derive(Parser, Debug)]
#[command(name = "calibrate", version, about)]
struct Cli {
    /// Two columns: polarizer angle (arc-minutes) and detector signal.
    file: PathBuf,

    /// Instrument coefficient in degrees per signal unit; overrides
    /// `calibration.reference_coefficient` from the config.
    #[arg(short, long)]
    reference: Option<f64>,

    /// JSON analysis settings; defaults are used for missing keys.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "calibration_output")]
    out_dir: PathBuf,

    /// Skip the PNG figure.
    #[arg(long)]
    no_plots: bool,

    /// Show the fit in the interactive viewer.
    #[arg(long)]
    show: bool,
}

fn main() -> Result<()> {
    moke_lab::init_logging();
    let cli = Cli::parse();
    let mut config = AnalysisConfig::load(cli.config.as_deref())?;
    config.override_reference(cli.reference)?;

    let points = load_calibration_points(&cli.file)?;
    log::info!("Loaded {} calibration points from {}", points.len(), cli.file.display());
    let cal = ManualCalibration::fit(&points, config.calibration.reference_coefficient)
        .with_context(|| format!("fitting {}", cli.file.display()))?;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating output directory {}", cli.out_dir.display()))?;
    let report = manual_calibration_report(&cal, &cli.file);
    write_text(&cli.out_dir.join("calibration_results.txt"), &report)?;
    print!("{report}");

    let chart = Chart::Figure(manual_calibration(&cal));
    if !cli.no_plots {
        let size = (config.plot.width, config.plot.height);
        render_chart(&chart, &cli.out_dir.join("calibration_fit.png"), size)?;
    }
    if cli.show {
        let mut state = AppState::with_charts(vec![NamedChart {
            name: "calibration_fit".into(),
            chart,
        }]);
        state.config = config;
        run_viewer("MOKE Lab – Calibration", state)?;
    }
    Ok(())
}
