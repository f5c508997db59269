use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::calibration::HysteresisCalibration;
use crate::analysis::features::{HysteresisFeatures, centre_loops, parity_loss, parity_transform};
use crate::analysis::fit::mean;
use crate::analysis::relation::KerrRelation;
use crate::config::AnalysisConfig;
use crate::data::filter::{ExperimentFilter, apply_filter, filtered_indices};
use crate::data::loader::save_scan_set_json;
use crate::data::model::{Channel, KerrPoint, Loop, ScanSet};
use crate::error::AnalysisResult;
use crate::report;

// ---------------------------------------------------------------------------
// Per-channel reduction
// ---------------------------------------------------------------------------

/// Centred loops and features of one channel.
#[derive(Debug, Clone)]
pub struct ChannelAnalysis {
    pub channel: Channel,
    /// 1-based experiment numbers as they appear in the source file.
    pub numbers: Vec<usize>,
    pub raw: Vec<Loop>,
    pub centred: Vec<Loop>,
    pub centres: Vec<f64>,
    pub features: Vec<HysteresisFeatures>,
}

impl ChannelAnalysis {
    pub fn run(
        channel: Channel,
        loops: &[Loop],
        filter: &ExperimentFilter,
        config: &AnalysisConfig,
    ) -> AnalysisResult<Self> {
        let numbers: Vec<usize> = filtered_indices(loops.len(), filter)
            .into_iter()
            .map(|i| i + 1)
            .collect();
        let raw: Vec<Loop> = numbers.iter().map(|&n| loops[n - 1].clone()).collect();
        let (centred, centres) = centre_loops(&raw)?;
        let features = centred
            .iter()
            .map(|l| HysteresisFeatures::extract(l, &config.features.plateau))
            .collect::<AnalysisResult<Vec<_>>>()?;

        for ((n, c), f) in numbers.iter().zip(&centres).zip(&features) {
            match f.saturation {
                Some(s) => log::info!("{channel} #{n}: centre {c:.6}, saturation {s:.6}"),
                None => log::warn!("{channel} #{n}: centre {c:.6}, no saturation plateau"),
            }
        }

        Ok(Self {
            channel,
            numbers,
            raw,
            centred,
            centres,
            features,
        })
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Position of experiment `number` in this channel.
    pub fn index_of(&self, number: usize) -> Option<usize> {
        self.numbers.iter().position(|&n| n == number)
    }

    pub fn saturations(&self) -> Vec<Option<f64>> {
        self.features.iter().map(|f| f.saturation).collect()
    }
}

// ---------------------------------------------------------------------------
// Whole-session analysis
// ---------------------------------------------------------------------------

/// Symmetry check of one loop against its parity image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityCheck {
    pub experiment: usize,
    pub centre: f64,
    /// Loss at the fitted centre.
    pub loss: f64,
    /// Loss with the centre forced to zero, for comparison.
    pub loss_uncentred: f64,
    pub original: Loop,
    pub image: Loop,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    /// Selected raw loops, renumbered from 1.
    pub scans: ScanSet,
    pub rotation: ChannelAnalysis,
    pub ellipticity: ChannelAnalysis,
    pub calibration: Option<HysteresisCalibration>,
    pub relation: Option<KerrRelation>,
    pub parity: Option<ParityCheck>,
    /// Factor applied to centred signals for Kerr quantities (1 when unscaled).
    pub scale: f64,
    pub kerr_points: Vec<KerrPoint>,
}

/// Reduce a scan set: centre, extract features, calibrate and relate.
pub fn analyze(
    set: &ScanSet,
    config: &AnalysisConfig,
    filter: &ExperimentFilter,
) -> AnalysisResult<Analysis> {
    let rotation = ChannelAnalysis::run(Channel::Rotation, &set.rotation, filter, config)?;
    let ellipticity = ChannelAnalysis::run(Channel::Ellipticity, &set.ellipticity, filter, config)?;

    let calibration = calibrate(&rotation, &config.calibration.extra_angles_deg);
    let relation = relate(&rotation, &ellipticity, &config.relation.flip_ellipticity);

    let scale = if config.calibration.apply_scale {
        match calibration.as_ref().and_then(|c| c.scale) {
            Some(s) => {
                log::info!("Applying calibration scale {s:.6}");
                s
            }
            None => {
                log::warn!("No calibration scale available, Kerr quantities left unscaled");
                1.0
            }
        }
    } else {
        1.0
    };

    let kerr_points = kerr_points(&rotation, &ellipticity, scale);
    let parity = parity_check(&rotation)?;

    Ok(Analysis {
        scans: apply_filter(set, filter),
        rotation,
        ellipticity,
        calibration,
        relation,
        parity,
        scale,
        kerr_points,
    })
}

/// Rotation centre against the extra polarizer angle of each experiment.
fn calibrate(rotation: &ChannelAnalysis, offsets: &[f64]) -> Option<HysteresisCalibration> {
    if rotation.numbers.iter().any(|&n| n > offsets.len()) {
        log::warn!(
            "{} polarizer offsets configured, experiments beyond that are not calibrated",
            offsets.len()
        );
    }
    let (x, y): (Vec<f64>, Vec<f64>) = rotation
        .numbers
        .iter()
        .zip(&rotation.centres)
        .filter_map(|(&n, &c)| offsets.get(n - 1).map(|&a| (a, c)))
        .unzip();

    match HysteresisCalibration::fit(&x, &y) {
        Ok(cal) => {
            log::info!(
                "Hysteresis calibration: slope {:.6e}, intercept {:.6e}, R² {:.6}",
                cal.fit.slope,
                cal.fit.intercept,
                cal.fit.r_squared
            );
            Some(cal)
        }
        Err(e) => {
            log::warn!("Hysteresis calibration skipped: {e}");
            None
        }
    }
}

fn relate(
    rotation: &ChannelAnalysis,
    ellipticity: &ChannelAnalysis,
    flips: &[usize],
) -> Option<KerrRelation> {
    let mut numbers = Vec::new();
    let mut rot = Vec::new();
    let mut ell = Vec::new();
    for (i, &n) in rotation.numbers.iter().enumerate() {
        if let Some(j) = ellipticity.index_of(n) {
            numbers.push(n);
            rot.push(rotation.centres[i]);
            ell.push(ellipticity.centres[j]);
        }
    }
    match KerrRelation::analyze_numbered(&numbers, &rot, &ell, flips) {
        Ok(rel) => {
            log::info!(
                "Kerr relation: slope {:.6}, R² {:.6}",
                rel.linear.slope,
                rel.linear.r_squared
            );
            Some(rel)
        }
        Err(e) => {
            log::warn!("Kerr relation skipped: {e}");
            None
        }
    }
}

/// Pair centred rotation and ellipticity samples of the same experiment.
fn kerr_points(rotation: &ChannelAnalysis, ellipticity: &ChannelAnalysis, scale: f64) -> Vec<KerrPoint> {
    let mut points = Vec::new();
    for (i, &n) in rotation.numbers.iter().enumerate() {
        let Some(j) = ellipticity.index_of(n) else {
            continue;
        };
        let (r, e) = (&rotation.centred[i], &ellipticity.centred[j]);
        if r.len() != e.len() {
            log::warn!(
                "Experiment {n}: {} rotation vs {} ellipticity points, not paired",
                r.len(),
                e.len()
            );
            continue;
        }
        points.extend(r.points().zip(&e.signal).map(|((field, rot), &ell)| KerrPoint {
            experiment: n,
            field,
            rotation: rot * scale,
            ellipticity: ell * scale,
        }));
    }
    points
}

/// Parity image of the first rotation loop with an even number of points.
fn parity_check(rotation: &ChannelAnalysis) -> AnalysisResult<Option<ParityCheck>> {
    let Some(i) = rotation.raw.iter().position(|l| !l.is_empty() && l.len() % 2 == 0) else {
        log::debug!("No even-length rotation loop for the parity check");
        return Ok(None);
    };
    let l = &rotation.raw[i];
    let centre = rotation.centres[i];
    let (xt, yt) = parity_transform(&l.field, &l.signal, 0.0, centre)?;
    Ok(Some(ParityCheck {
        experiment: rotation.numbers[i],
        centre,
        loss: parity_loss(&l.field, &l.signal, 0.0, centre)?,
        loss_uncentred: parity_loss(&l.field, &l.signal, 0.0, 0.0)?,
        original: l.clone(),
        image: Loop::new(xt, yt)?,
    }))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment: usize,
    pub rotation_centre: Option<f64>,
    pub ellipticity_centre: Option<f64>,
    pub rotation: Option<HysteresisFeatures>,
    pub ellipticity: Option<HysteresisFeatures>,
    /// θ_K: saturation amplitude of the centred rotation loop.
    pub kerr_rotation: Option<f64>,
    /// ε_K: saturation amplitude of the centred ellipticity loop.
    pub kerr_ellipticity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub scale: f64,
    pub experiments: Vec<ExperimentSummary>,
    pub calibration: Option<HysteresisCalibration>,
    pub relation: Option<KerrRelation>,
    pub parity_loss: Option<f64>,
}

impl Analysis {
    /// Experiment numbers present in either channel, ascending.
    pub fn experiment_numbers(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self
            .rotation
            .numbers
            .iter()
            .chain(&self.ellipticity.numbers)
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn summary(&self) -> Summary {
        let pick = |ch: &ChannelAnalysis, n: usize| {
            ch.index_of(n).map(|i| (ch.centres[i], ch.features[i]))
        };
        let experiments = self
            .experiment_numbers()
            .into_iter()
            .map(|n| {
                let rot = pick(&self.rotation, n);
                let ell = pick(&self.ellipticity, n);
                ExperimentSummary {
                    experiment: n,
                    rotation_centre: rot.map(|(c, _)| c),
                    ellipticity_centre: ell.map(|(c, _)| c),
                    rotation: rot.map(|(_, f)| f),
                    ellipticity: ell.map(|(_, f)| f),
                    kerr_rotation: rot.and_then(|(_, f)| f.saturation).map(|s| s * self.scale),
                    kerr_ellipticity: ell.and_then(|(_, f)| f.saturation).map(|s| s * self.scale),
                }
            })
            .collect();

        Summary {
            scale: self.scale,
            experiments,
            calibration: self.calibration.clone(),
            relation: self.relation.clone(),
            parity_loss: self.parity.as_ref().map(|p| p.loss),
        }
    }
}

// ---------------------------------------------------------------------------
// Output files
// ---------------------------------------------------------------------------

/// Centred loops with their centres and plateau levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentredData {
    pub data: Vec<Loop>,
    pub ycentre: Vec<f64>,
    pub max_ave: Vec<Option<f64>>,
    pub min_ave: Vec<Option<f64>>,
}

impl From<&ChannelAnalysis> for CentredData {
    fn from(ch: &ChannelAnalysis) -> Self {
        Self {
            data: ch.centred.clone(),
            ycentre: ch.centres.clone(),
            max_ave: ch.features.iter().map(|f| f.upper).collect(),
            min_ave: ch.features.iter().map(|f| f.lower).collect(),
        }
    }
}

/// One row of `hysteresis_results.csv`.
#[derive(Debug, Serialize)]
struct FeatureRow {
    experiment: String,
    rotation_centre: Option<f64>,
    rotation_saturation: Option<f64>,
    rotation_coercive_field: Option<f64>,
    rotation_remanence: Option<f64>,
    rotation_loop_area: Option<f64>,
    ellipticity_centre: Option<f64>,
    ellipticity_saturation: Option<f64>,
    ellipticity_coercive_field: Option<f64>,
    ellipticity_remanence: Option<f64>,
    ellipticity_loop_area: Option<f64>,
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let v: Vec<f64> = values.flatten().collect();
    (!v.is_empty()).then(|| mean(&v))
}

fn feature_rows(summary: &Summary) -> Vec<FeatureRow> {
    let mut rows: Vec<FeatureRow> = summary
        .experiments
        .iter()
        .map(|e| FeatureRow {
            experiment: e.experiment.to_string(),
            rotation_centre: e.rotation_centre,
            rotation_saturation: e.rotation.and_then(|f| f.saturation),
            rotation_coercive_field: e.rotation.and_then(|f| f.coercive_field),
            rotation_remanence: e.rotation.and_then(|f| f.remanence),
            rotation_loop_area: e.rotation.and_then(|f| f.loop_area),
            ellipticity_centre: e.ellipticity_centre,
            ellipticity_saturation: e.ellipticity.and_then(|f| f.saturation),
            ellipticity_coercive_field: e.ellipticity.and_then(|f| f.coercive_field),
            ellipticity_remanence: e.ellipticity.and_then(|f| f.remanence),
            ellipticity_loop_area: e.ellipticity.and_then(|f| f.loop_area),
        })
        .collect();

    let col = |get: fn(&FeatureRow) -> Option<f64>, rows: &[FeatureRow]| mean_of(rows.iter().map(get));
    let mean_row = FeatureRow {
        experiment: "mean".to_string(),
        rotation_centre: col(|r| r.rotation_centre, &rows),
        rotation_saturation: col(|r| r.rotation_saturation, &rows),
        rotation_coercive_field: col(|r| r.rotation_coercive_field, &rows),
        rotation_remanence: col(|r| r.rotation_remanence, &rows),
        rotation_loop_area: col(|r| r.rotation_loop_area, &rows),
        ellipticity_centre: col(|r| r.ellipticity_centre, &rows),
        ellipticity_saturation: col(|r| r.ellipticity_saturation, &rows),
        ellipticity_coercive_field: col(|r| r.ellipticity_coercive_field, &rows),
        ellipticity_remanence: col(|r| r.ellipticity_remanence, &rows),
        ellipticity_loop_area: col(|r| r.ellipticity_loop_area, &rows),
    };
    rows.push(mean_row);
    rows
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush().with_context(|| format!("flushing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Write every data product of `analysis` into `out_dir`.
pub fn write_outputs(analysis: &Analysis, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let mut written = Vec::new();
    let mut out = |name: &str| {
        let p = out_dir.join(name);
        written.push(p.clone());
        p
    };

    save_scan_set_json(&out("experiment_data.json"), &analysis.scans)?;
    for ch in [&analysis.rotation, &analysis.ellipticity] {
        if ch.is_empty() {
            continue;
        }
        let name = format!("improved_{}_data.json", ch.channel.slug());
        write_json(&out(&name), &CentredData::from(ch))?;
    }

    let summary = analysis.summary();
    write_csv(&out("hysteresis_results.csv"), &feature_rows(&summary))?;
    write_csv(&out("kerr_points.csv"), &analysis.kerr_points)?;
    write_json(&out("summary.json"), &summary)?;

    if let Some(rel) = &analysis.relation {
        report::write_text(&out("kerr_relation_data.txt"), &report::relation_report(rel))?;
    }
    if let Some(cal) = &analysis.calibration {
        report::write_text(
            &out("hysteresis_calibration.txt"),
            &report::hysteresis_calibration_report(cal),
        )?;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square loop of half-height `amp` around `centre`, switching at ±1.5.
    fn loop_with(centre: f64, amp: f64) -> Loop {
        let mut field = Vec::new();
        let mut signal = Vec::new();
        for h in -10..=10 {
            field.push(h as f64);
            signal.push(centre + if h < 2 { -amp } else { amp });
        }
        for h in (-10..=10).rev() {
            field.push(h as f64);
            signal.push(centre + if h > -2 { amp } else { -amp });
        }
        Loop::new(field, signal).unwrap()
    }

    fn session() -> ScanSet {
        ScanSet {
            rotation: (0..5).map(|i| loop_with(0.1 * i as f64, 0.5)).collect(),
            ellipticity: (0..5)
                .map(|i| {
                    let c = 0.02 * i as f64;
                    loop_with(if i >= 3 { -c } else { c }, 0.2)
                })
                .collect(),
        }
    }

    #[test]
    fn full_session_is_reduced() {
        let a = analyze(&session(), &AnalysisConfig::default(), &ExperimentFilter::all()).unwrap();
        assert_eq!(a.rotation.len(), 5);

        let cal = a.calibration.as_ref().unwrap();
        assert!((cal.fit.slope - 0.1).abs() < 1e-9);
        assert!((cal.scale.unwrap() - 10.0).abs() < 1e-6);

        let rel = a.relation.as_ref().unwrap();
        assert!((rel.linear.slope - 0.2).abs() < 1e-9);

        let s = a.summary();
        assert_eq!(s.experiments.len(), 5);
        assert!((s.experiments[2].kerr_rotation.unwrap() - 0.5).abs() < 1e-12);
        assert!((s.experiments[2].kerr_ellipticity.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(a.kerr_points.len(), 5 * 42);
        assert!(a.parity.as_ref().unwrap().loss < a.parity.as_ref().unwrap().loss_uncentred + 1e-12);
    }

    #[test]
    fn scale_is_applied_on_request() {
        let mut config = AnalysisConfig::default();
        config.calibration.apply_scale = true;
        let a = analyze(&session(), &config, &ExperimentFilter::all()).unwrap();
        assert!((a.scale - 10.0).abs() < 1e-6);
        let s = a.summary();
        assert!((s.experiments[0].kerr_rotation.unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn filter_keeps_original_numbers() {
        let filter: ExperimentFilter = "2,4".parse().unwrap();
        let a = analyze(&session(), &AnalysisConfig::default(), &filter).unwrap();
        assert_eq!(a.rotation.numbers, vec![2, 4]);
        assert_eq!(a.scans.rotation.len(), 2);
        let rel = a.relation.unwrap();
        assert!(rel.points[1].flipped);
        // Offsets 1° and 3° for experiments 2 and 4.
        let cal = a.calibration.unwrap();
        assert_eq!(cal.offsets_deg, vec![1.0, 3.0]);
    }

    #[test]
    fn outputs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let a = analyze(&session(), &AnalysisConfig::default(), &ExperimentFilter::all()).unwrap();
        let written = write_outputs(&a, dir.path()).unwrap();
        for name in [
            "experiment_data.json",
            "improved_rotation_data.json",
            "improved_ellipticity_data.json",
            "hysteresis_results.csv",
            "kerr_points.csv",
            "summary.json",
            "kerr_relation_data.txt",
        ] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
        assert!(written.len() >= 7);

        let csv = std::fs::read_to_string(dir.path().join("hysteresis_results.csv")).unwrap();
        assert!(csv.starts_with("experiment,rotation_centre"));
        assert!(csv.lines().last().unwrap().starts_with("mean,"));
    }
}
