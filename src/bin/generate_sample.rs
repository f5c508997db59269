use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use moke_lab::config::DEFAULT_REFERENCE_COEFFICIENT;
use moke_lab::report::write_text;

/// Write a synthetic scan export and manual-calibration file for trying out
/// the other tools.
#[derive(Parser, Debug)]
#[command(name = "generate_sample", version, about)]
struct Cli {
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Experiments per channel; experiment i uses polarizer offset i-1 degrees.
    #[arg(short, long, default_value_t = 5)]
    experiments: usize,

    /// Field points per sweep direction.
    #[arg(short, long, default_value_t = 101)]
    points: usize,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Loop model
// ---------------------------------------------------------------------------

const FIELD_MAX: f64 = 30.0;
const COERCIVE_FIELD: f64 = 4.0;
const SWITCH_WIDTH: f64 = 1.5;
/// Centre shift per degree of extra polarizer angle.
const CENTRE_PER_DEGREE: f64 = 0.08;

struct LoopShape {
    centre: f64,
    amplitude: f64,
    noise: f64,
}

/// Up sweep then down sweep of a tanh loop.
fn hysteresis_loop(shape: &LoopShape, points: usize, rng: &mut SimpleRng) -> Vec<(f64, f64)> {
    let step = 2.0 * FIELD_MAX / (points - 1) as f64;
    let up = (0..points).map(|i| (-FIELD_MAX + step * i as f64, -COERCIVE_FIELD));
    let down = (0..points).map(|i| (FIELD_MAX - step * i as f64, COERCIVE_FIELD));
    up.chain(down)
        .map(|(h, hc)| {
            let m = shape.amplitude * ((h + hc) / SWITCH_WIDTH).tanh();
            (h, shape.centre + m + rng.gauss(0.0, shape.noise))
        })
        .collect()
}

fn write_block(out: &mut String, title: &str, data: &[(f64, f64)]) {
    let _ = writeln!(out, "<line>");
    let _ = writeln!(out, "<title>: {title}");
    let _ = writeln!(out, "<data>:");
    let _ = writeln!(out, " 磁感应强度(mT)  电压(V)  角度(度)");
    for &(h, angle) in data {
        let volts = angle / DEFAULT_REFERENCE_COEFFICIENT;
        let _ = writeln!(out, " {h:.3}  {volts:.6}  {angle:.6}");
    }
    let _ = writeln!(out, "</line>");
}

fn scan_export(cli: &Cli, rng: &mut SimpleRng) -> String {
    let mut out = String::new();
    for i in 0..cli.experiments {
        let rotation = LoopShape {
            centre: 0.05 + CENTRE_PER_DEGREE * i as f64,
            amplitude: 0.35,
            noise: 0.004,
        };
        let data = hysteresis_loop(&rotation, cli.points, rng);
        write_block(&mut out, &format!("克尔转角 experiment {}", i + 1), &data);
    }
    for i in 0..cli.experiments {
        // Experiments 4 and 5 were recorded with the opposite ellipticity sign.
        let sign = if i >= 3 { -1.0 } else { 1.0 };
        let ellipticity = LoopShape {
            centre: sign * (0.01 + 0.3 * CENTRE_PER_DEGREE * i as f64),
            amplitude: 0.12,
            noise: 0.003,
        };
        let data = hysteresis_loop(&ellipticity, cli.points, rng);
        write_block(&mut out, &format!("克尔椭率 experiment {}", i + 1), &data);
    }
    out
}

/// Polarizer angle (arc-minutes) against detector signal, `s = k (θ + θ0)`.
fn calibration_points(rng: &mut SimpleRng) -> String {
    let k = DEFAULT_REFERENCE_COEFFICIENT / 60.0 * 1.02;
    let theta0 = 3.5;
    let mut out = String::from("# angle(arcmin)  signal\n");
    for step in -6..=6 {
        let theta = 10.0 * step as f64;
        let s = k * (theta + theta0) + rng.gauss(0.0, 2e-4);
        let _ = writeln!(out, "{theta:.1}  {s:.6}");
    }
    out
}

fn main() -> Result<()> {
    moke_lab::init_logging();
    let cli = Cli::parse();
    if cli.points < 2 || cli.experiments == 0 {
        anyhow::bail!("need at least 2 points per sweep and 1 experiment");
    }
    let mut rng = SimpleRng::new(cli.seed);

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating output directory {}", cli.out_dir.display()))?;
    write_text(&cli.out_dir.join("sample_scan.txt"), &scan_export(&cli, &mut rng))?;
    write_text(&cli.out_dir.join("sample_calibration.txt"), &calibration_points(&mut rng))?;
    Ok(())
}
