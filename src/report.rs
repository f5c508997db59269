use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::analysis::calibration::{HysteresisCalibration, ManualCalibration};
use crate::analysis::relation::KerrRelation;

const RULE_WIDTH: usize = 60;

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Per-experiment centres, fits and range statistics.
pub fn relation_report(rel: &KerrRelation) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Kerr rotation centre vs Kerr ellipticity centre");
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(
        s,
        "{:^10} | {:^20} | {:^20} | {:^7}",
        "experiment", "rotation centre (deg)", "ellipticity centre (deg)", "flipped"
    );
    let _ = writeln!(s, "{}", rule('-'));
    for p in &rel.points {
        let _ = writeln!(
            s,
            "{:^10} | {:^21.6} | {:^24.6} | {:^7}",
            p.experiment,
            p.rotation_centre,
            p.ellipticity_centre,
            if p.flipped { "yes" } else { "no" }
        );
    }

    let _ = writeln!(s, "\nStatistics:");
    let _ = writeln!(
        s,
        "rotation centre range: [{:.6}, {:.6}] deg",
        rel.rotation_stats.min, rel.rotation_stats.max
    );
    let _ = writeln!(
        s,
        "ellipticity centre range: [{:.6}, {:.6}] deg",
        rel.ellipticity_stats.min, rel.ellipticity_stats.max
    );
    let _ = writeln!(s, "rotation centre mean: {:.6} deg", rel.rotation_stats.mean);
    let _ = writeln!(s, "ellipticity centre mean: {:.6} deg", rel.ellipticity_stats.mean);

    let _ = writeln!(s, "\nLinear fit: e = {:.6} * r + {:.6}", rel.linear.slope, rel.linear.intercept);
    let _ = writeln!(s, "R^2 = {:.6}", rel.linear.r_squared);
    if let Some(q) = &rel.quadratic {
        let _ = writeln!(
            s,
            "Quadratic fit: e = {:.6} * r^2 + {:.6} * r + {:.6}",
            q.coefficients[2], q.coefficients[1], q.coefficients[0]
        );
        let _ = writeln!(s, "R^2 = {:.6}", q.r_squared);
    }
    s
}

pub fn hysteresis_calibration_report(cal: &HysteresisCalibration) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Hysteresis calibration");
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "offset (deg)    centre        residual");
    for ((a, c), r) in cal.offsets_deg.iter().zip(&cal.centres).zip(cal.residuals()) {
        let _ = writeln!(s, "{a:12.3} {c:12.6} {r:12.6}");
    }
    let _ = writeln!(s, "\nslope     = {:.6e}", cal.fit.slope);
    let _ = writeln!(s, "intercept = {:.6e}", cal.fit.intercept);
    let _ = writeln!(s, "R^2       = {:.6}", cal.fit.r_squared);
    let _ = writeln!(s, "RMS       = {:.6e}", cal.rms_residual);
    match cal.scale {
        Some(k) => {
            let _ = writeln!(s, "scale     = {k:.6e} deg per signal unit");
        }
        None => {
            let _ = writeln!(s, "scale     = n/a (flat response)");
        }
    }
    s
}

/// Fit of `s = k (θ + θ0)` with the measured points and residuals.
pub fn manual_calibration_report(cal: &ManualCalibration, source: &Path) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "Manual calibration");
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "data file: {}", source.display());
    let _ = writeln!(s, "points: {}\n", cal.angles_arcmin.len());

    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "Fit");
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "model: s = k * (theta + theta_0)");
    let _ = writeln!(s, "k = {:.6e} signal per arc-minute", cal.k);
    let _ = writeln!(s, "theta_0 = {:.6} arc-minutes", cal.theta0_arcmin);
    let _ = writeln!(s, "theta_0 = {:.6} deg", cal.theta0_deg());
    let _ = writeln!(
        s,
        "linear coefficients: a = {:.6e}, b = {:.6e}",
        cal.fit.slope, cal.fit.intercept
    );
    let _ = writeln!(s, "R^2 = {:.6}\n", cal.r_squared());

    let _ = writeln!(s, "Comparison with the instrument coefficient:");
    let _ = writeln!(s, "instrument: {:.6e} deg per signal unit", cal.reference_coefficient);
    let _ = writeln!(s, "fitted k*60: {:.6e}", cal.k_per_degree());
    let _ = writeln!(s, "relative error: {:.2}%\n", cal.relative_error_percent());

    let _ = writeln!(s, "angle (min)  measured     predicted    residual");
    for r in cal.residuals() {
        let _ = writeln!(
            s,
            "{:8.1} {:12.6} {:12.6} {:12.6}",
            r.angle_arcmin, r.signal, r.predicted, r.residual
        );
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_report_lists_every_experiment() {
        let rel = KerrRelation::analyze(&[0.1, 0.2, 0.3], &[0.01, 0.02, -0.03], &[3]).unwrap();
        let text = relation_report(&rel);
        assert_eq!(text.matches(" | ").count(), 3 * 4);
        assert!(text.contains("Quadratic fit"));
        assert!(text.contains("rotation centre mean: 0.200000 deg"));
    }

    #[test]
    fn manual_report_has_residual_table() {
        let cal = ManualCalibration::fit(&[(0.0, 0.0), (30.0, 0.03), (60.0, 0.06)], 0.06).unwrap();
        let text = manual_calibration_report(&cal, Path::new("cal.txt"));
        assert!(text.contains("data file: cal.txt"));
        assert!(text.contains("relative error: 0.00%"));
        assert_eq!(text.lines().filter(|l| l.trim_start().starts_with("30.0")).count(), 1);
    }
}
