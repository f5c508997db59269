use crate::analysis::calibration::{HysteresisCalibration, ManualCalibration};
use crate::analysis::fit::mean;
use crate::analysis::reflection::ParameterMap;
use crate::analysis::relation::{KerrRelation, saturation_vs_centre};
use crate::color::{Gradient, Rgb, generate_palette};
use crate::data::model::{Channel, Loop};
use crate::pipeline::{Analysis, ChannelAnalysis, ParityCheck};
use crate::plot::{Figure, HLine, Heatmap, NamedChart, Series, SeriesStyle};

const FIELD_LABEL: &str = "Magnetic field (mT)";
const FIT_SAMPLES: usize = 100;

fn sample_curve(lo: f64, hi: f64, f: impl Fn(f64) -> f64) -> Vec<(f64, f64)> {
    (0..FIT_SAMPLES)
        .map(|i| {
            let x = lo + (hi - lo) * i as f64 / (FIT_SAMPLES - 1) as f64;
            (x, f(x))
        })
        .collect()
}

fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })
}

// ---------------------------------------------------------------------------
// Hysteresis loops
// ---------------------------------------------------------------------------

/// One line per experiment, coloured from an evenly spaced palette.
pub fn loops_figure(title: &str, channel: Channel, numbers: &[usize], loops: &[Loop]) -> Figure {
    let palette = generate_palette(loops.len());
    let mut fig = Figure::new(title, FIELD_LABEL, format!("{channel} (deg)"));
    for ((n, l), color) in numbers.iter().zip(loops).zip(palette) {
        fig = fig.with_series(Series::line(format!("experiment {n}"), l.points().collect(), color));
    }
    fig
}

pub fn raw_loops(ch: &ChannelAnalysis) -> Figure {
    loops_figure(&format!("{} hysteresis loops", ch.channel), ch.channel, &ch.numbers, &ch.raw)
}

/// Centred loops with the mean plateau levels as reference lines.
pub fn centred_loops(ch: &ChannelAnalysis) -> Figure {
    let mut fig = loops_figure(
        &format!("Centred {} hysteresis loops", ch.channel),
        ch.channel,
        &ch.numbers,
        &ch.centred,
    );
    let upper: Vec<f64> = ch.features.iter().filter_map(|f| f.upper).collect();
    let lower: Vec<f64> = ch.features.iter().filter_map(|f| f.lower).collect();
    if !upper.is_empty() {
        fig = fig.with_hline(mean(&upper), Some("upper plateau".into()), Rgb::GRAY);
    }
    if !lower.is_empty() {
        fig = fig.with_hline(mean(&lower), Some("lower plateau".into()), Rgb::GRAY);
    }
    fig
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

pub fn hysteresis_calibration(cal: &HysteresisCalibration) -> Figure {
    let points: Vec<(f64, f64)> = cal
        .offsets_deg
        .iter()
        .copied()
        .zip(cal.centres.iter().copied())
        .collect();
    let mut fig = Figure::new(
        "Hysteresis calibration",
        "Extra polarizer angle (deg)",
        "Rotation loop centre",
    )
    .with_series(Series::points("measured centres", points, Rgb::BLACK));
    if let Some((lo, hi)) = extent(cal.offsets_deg.iter().copied()) {
        let label = format!(
            "fit: y = {:.4e} x + {:.4e} (R² = {:.4})",
            cal.fit.slope, cal.fit.intercept, cal.fit.r_squared
        );
        fig = fig.with_series(Series::line(label, sample_curve(lo, hi, |x| cal.fit.predict(x)), Rgb::RED));
    }
    fig
}

pub fn manual_calibration(cal: &ManualCalibration) -> Figure {
    let points: Vec<(f64, f64)> = cal
        .angles_arcmin
        .iter()
        .copied()
        .zip(cal.signals.iter().copied())
        .collect();
    let mut fig = Figure::new("Manual calibration", "Polarizer angle (arc-minutes)", "Detector signal")
        .with_series(Series::points("measured", points, Rgb::BLACK));
    if let Some((lo, hi)) = extent(cal.angles_arcmin.iter().copied()) {
        let label = format!(
            "s = {:.4e} (θ + {:.3}′), R² = {:.4}",
            cal.k,
            cal.theta0_arcmin,
            cal.r_squared()
        );
        fig = fig.with_series(Series::line(label, sample_curve(lo, hi, |x| cal.predict(x)), Rgb::RED));
    }
    fig
}

// ---------------------------------------------------------------------------
// Relations between channels
// ---------------------------------------------------------------------------

pub fn kerr_relation(rel: &KerrRelation) -> Figure {
    let points: Vec<(f64, f64)> = rel
        .points
        .iter()
        .map(|p| (p.rotation_centre, p.ellipticity_centre))
        .collect();
    let palette = generate_palette(2);
    let mut fig = Figure::new(
        "Kerr ellipticity centre vs Kerr rotation centre",
        "Rotation centre (deg)",
        "Ellipticity centre (deg)",
    )
    .with_series(Series::points("experiments", points, Rgb::BLACK));

    if let Some((lo, hi)) = extent(rel.points.iter().map(|p| p.rotation_centre)) {
        let lin = format!(
            "linear: e = {:.4} r + {:.4} (R² = {:.4})",
            rel.linear.slope, rel.linear.intercept, rel.linear.r_squared
        );
        fig = fig.with_series(Series::line(lin, sample_curve(lo, hi, |x| rel.linear.predict(x)), palette[0]));
        if let Some(q) = &rel.quadratic {
            let label = format!("quadratic (R² = {:.4})", q.r_squared);
            fig = fig.with_series(Series::line(label, sample_curve(lo, hi, |x| q.predict(x)), palette[1]));
        }
    }
    fig
}

fn saturation_series(name: &str, ch: &ChannelAnalysis, centres: &[f64], color: Rgb) -> Series {
    let points = saturation_vs_centre(&ch.numbers, centres, &ch.saturations())
        .into_iter()
        .map(|p| (p.centre, p.saturation))
        .collect();
    Series::new(name, points, color, SeriesStyle::LinePoints)
}

/// Saturation of both channels against the rotation centre of the same
/// experiment.
pub fn saturation_vs_rotation_centre(a: &Analysis) -> Figure {
    let palette = generate_palette(2);
    let ell_centres: Vec<f64> = a
        .ellipticity
        .numbers
        .iter()
        .map(|&n| a.rotation.index_of(n).map_or(f64::NAN, |i| a.rotation.centres[i]))
        .collect();
    let mut fig = Figure::new("Saturation vs rotation centre", "Rotation centre (deg)", "Saturation (deg)")
        .with_series(saturation_series("rotation", &a.rotation, &a.rotation.centres, palette[0]))
        .with_series(saturation_series("ellipticity", &a.ellipticity, &ell_centres, palette[1]));
    fig.y_from_zero = true;
    fig
}

/// Ellipticity saturation against the sign-inverted ellipticity centre.
pub fn ellipticity_saturation_vs_centre(a: &Analysis) -> Figure {
    let centres: Vec<f64> = a.ellipticity.centres.iter().map(|c| -c).collect();
    let mut fig = Figure::new(
        "Ellipticity saturation vs ellipticity centre",
        "-Ellipticity centre (deg)",
        "Saturation (deg)",
    )
    .with_series(saturation_series("ellipticity", &a.ellipticity, &centres, generate_palette(2)[1]));
    fig.y_from_zero = true;
    fig
}

pub fn parity_check(p: &ParityCheck) -> Figure {
    let palette = generate_palette(2);
    Figure::new(
        format!("Parity check, experiment {} (loss {:.3e})", p.experiment, p.loss),
        FIELD_LABEL,
        "Kerr rotation (deg)",
    )
    .with_series(Series::line("measured", p.original.points().collect(), palette[0]))
    .with_series(Series::new("parity image", p.image.points().collect(), palette[1], SeriesStyle::Points))
    .with_hline(p.centre, Some(format!("centre {:.4}", p.centre)), Rgb::GRAY)
}

// ---------------------------------------------------------------------------
// Reflection maps
// ---------------------------------------------------------------------------

/// `α'` and `η` heatmaps over polarization angle (columns) and incidence
/// angle (rows), with the critical angle marked.
pub fn reflection_heatmaps(map: &ParameterMap) -> Vec<NamedChart> {
    let hline = map.critical_angle_deg.map(|c| HLine {
        y: c,
        label: Some(format!("critical angle {c:.2}°")),
        color: Rgb::RED,
    });
    let heatmap = |title: String, value_label: &str, values: &[Vec<f64>], gradient: Gradient| Heatmap {
        title,
        x_label: "Polarization angle α (deg)".into(),
        y_label: "Incidence angle θ (deg)".into(),
        value_label: value_label.into(),
        x: map.alpha_deg.clone(),
        y: map.theta_deg.clone(),
        values: values.to_vec(),
        gradient,
        hline: hline.clone(),
    };
    vec![
        NamedChart::heatmap(
            "reflection_alpha_prime",
            heatmap(
                format!("Reflected polarization angle α' (n = {:.2})", map.n),
                "α' (deg)",
                &map.alpha_prime_deg,
                Gradient::Viridis,
            ),
        ),
        NamedChart::heatmap(
            "reflection_eta",
            heatmap(
                format!("Ellipticity angle η (n = {:.2})", map.n),
                "η (deg)",
                &map.eta_deg,
                Gradient::Plasma,
            ),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Pipeline chart set
// ---------------------------------------------------------------------------

/// Every chart of a reduced session, in display order.
pub fn pipeline_charts(a: &Analysis) -> Vec<NamedChart> {
    let mut charts = Vec::new();
    for ch in [&a.rotation, &a.ellipticity] {
        if ch.is_empty() {
            continue;
        }
        let slug = ch.channel.slug();
        charts.push(NamedChart::figure(format!("{slug}_loops"), raw_loops(ch)));
        charts.push(NamedChart::figure(format!("{slug}_loops_centred"), centred_loops(ch)));
    }
    if let Some(cal) = &a.calibration {
        charts.push(NamedChart::figure("hysteresis_calibration", hysteresis_calibration(cal)));
    }
    if let Some(rel) = &a.relation {
        charts.push(NamedChart::figure("kerr_relation", kerr_relation(rel)));
    }
    if !a.rotation.is_empty() {
        charts.push(NamedChart::figure(
            "saturation_vs_rotation_centre",
            saturation_vs_rotation_centre(a),
        ));
    }
    if !a.ellipticity.is_empty() {
        charts.push(NamedChart::figure(
            "ellipticity_saturation_vs_centre",
            ellipticity_saturation_vs_centre(a),
        ));
    }
    if let Some(p) = &a.parity {
        charts.push(NamedChart::figure("parity_check", parity_check(p)));
    }
    charts
}
