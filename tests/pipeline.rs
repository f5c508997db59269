use std::fmt::Write as _;

use moke_lab::analysis::calibration::ManualCalibration;
use moke_lab::analysis::reflection::ReflectionAnalysis;
use moke_lab::config::{AnalysisConfig, MarkerConfig};
use moke_lab::data::filter::ExperimentFilter;
use moke_lab::data::loader::{load_calibration_points, load_file, save_scan_set_json};
use moke_lab::figures::pipeline_charts;
use moke_lab::pipeline::{analyze, write_outputs};
use moke_lab::plot::render::render_all;

/// Square loop around `centre` with half-height `amp`, switching at ±1.5 mT.
fn square_loop(centre: f64, amp: f64) -> Vec<(f64, f64)> {
    let up = (-10..=10).map(|h| (h as f64, centre + if h < 2 { -amp } else { amp }));
    let down = (-10..=10)
        .rev()
        .map(|h| (h as f64, centre + if h > -2 { amp } else { -amp }));
    up.chain(down).collect()
}

fn write_block(out: &mut String, title: &str, data: &[(f64, f64)]) {
    let _ = writeln!(out, "<line>\n<title>: {title}\n<data>:");
    let _ = writeln!(out, " 磁感应强度(mT)  电压(V)  角度(度)");
    for (h, a) in data {
        let _ = writeln!(out, " {h} 0.0 {a}");
    }
    let _ = writeln!(out, "</line>");
}

/// Scan export with one rotation and one ellipticity block per experiment.
fn scan_with(experiments: usize, shape: impl Fn(f64, f64) -> Vec<(f64, f64)>) -> String {
    let mut out = String::new();
    for i in 0..experiments {
        write_block(&mut out, "克尔转角", &shape(0.1 * i as f64, 0.5));
    }
    for i in 0..experiments {
        write_block(&mut out, "克尔椭率", &shape(0.02 * i as f64, 0.2));
    }
    out
}

fn scan_text(experiments: usize) -> String {
    scan_with(experiments, square_loop)
}

/// Six samples, too few for a saturation plateau.
fn short_loop(centre: f64, amp: f64) -> Vec<(f64, f64)> {
    [(-2.0, -amp), (0.0, -amp), (2.0, amp), (2.0, amp), (0.0, amp), (-2.0, -amp)]
        .into_iter()
        .map(|(h, m)| (h, centre + m))
        .collect()
}

#[test]
fn scan_export_is_reduced_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let scan = dir.path().join("scan.txt");
    std::fs::write(&scan, scan_text(3)).unwrap();

    let config = AnalysisConfig::default();
    let set = load_file(&scan, &config.markers).unwrap();
    assert_eq!(set.rotation.len(), 3);
    assert_eq!(set.ellipticity.len(), 3);

    let analysis = analyze(&set, &config, &ExperimentFilter::all()).unwrap();
    let out = dir.path().join("out");
    write_outputs(&analysis, &out).unwrap();

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    let experiments = summary["experiments"].as_array().unwrap();
    assert_eq!(experiments.len(), 3);
    for (i, e) in experiments.iter().enumerate() {
        assert_eq!(e["experiment"].as_u64().unwrap(), i as u64 + 1);
        let theta_k = e["kerr_rotation"].as_f64().unwrap();
        let eps_k = e["kerr_ellipticity"].as_f64().unwrap();
        assert!((theta_k - 0.5).abs() < 1e-9, "θ_K = {theta_k}");
        assert!((eps_k - 0.2).abs() < 1e-9, "ε_K = {eps_k}");
        let centre = e["rotation_centre"].as_f64().unwrap();
        assert!((centre - 0.1 * i as f64).abs() < 1e-9);
        let hc = e["rotation"]["coercive_field"].as_f64().unwrap();
        assert!((hc - 1.5).abs() < 1e-9);
    }
    let slope = summary["calibration"]["fit"]["slope"].as_f64().unwrap();
    assert!((slope - 0.1).abs() < 1e-9);

    assert!(out.join("kerr_relation_data.txt").exists());
    assert!(out.join("hysteresis_calibration.txt").exists());
}

#[test]
fn selected_experiments_only() {
    let dir = tempfile::tempdir().unwrap();
    let scan = dir.path().join("scan.dat");
    std::fs::write(&scan, scan_text(4)).unwrap();

    let set = load_file(&scan, &MarkerConfig::default()).unwrap();
    let filter: ExperimentFilter = "2-3".parse().unwrap();
    let analysis = analyze(&set, &AnalysisConfig::default(), &filter).unwrap();
    assert_eq!(analysis.experiment_numbers(), vec![2, 3]);
    assert_eq!(analysis.calibration.unwrap().offsets_deg, vec![1.0, 2.0]);
}

#[test]
fn scan_set_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let scan = dir.path().join("scan.txt");
    std::fs::write(&scan, scan_text(2)).unwrap();
    let markers = MarkerConfig::default();
    let set = load_file(&scan, &markers).unwrap();

    let json = dir.path().join("experiment_data.json");
    save_scan_set_json(&json, &set).unwrap();
    let back = load_file(&json, &markers).unwrap();
    assert_eq!(back.rotation.len(), set.rotation.len());
    assert_eq!(back.ellipticity.len(), set.ellipticity.len());
    for (a, b) in back.rotation.iter().chain(&back.ellipticity).zip(set.rotation.iter().chain(&set.ellipticity)) {
        assert_eq!(a.field, b.field);
        assert!(a.signal.iter().zip(&b.signal).all(|(x, y)| (x - y).abs() < 1e-12));
    }
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.xyz");
    std::fs::write(&path, scan_text(1)).unwrap();
    let err = load_file(&path, &MarkerConfig::default()).unwrap_err();
    assert!(err.to_string().contains("Unsupported"));
}

#[test]
fn noiseless_manual_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.txt");
    let (k, theta0) = (1e-3, 5.0);
    let mut text = String::from("# angle signal\n");
    for a in [-30.0, -10.0, 0.0, 20.0, 40.0] {
        let _ = writeln!(text, "{a}\t{}", k * (a + theta0));
    }
    std::fs::write(&path, text).unwrap();

    let points = load_calibration_points(&path).unwrap();
    let cal = ManualCalibration::fit(&points, 0.06).unwrap();
    assert!((cal.k - k).abs() < 1e-12);
    assert!((cal.theta0_arcmin - theta0).abs() < 1e-9);
    assert!((cal.r_squared() - 1.0).abs() < 1e-12);
    assert!(cal.relative_error_percent().abs() < 1e-6);
}

#[test]
fn matched_interface_leaves_polarization_unchanged() {
    for (alpha, theta) in [(0.0, 0.0), (30.0, 45.0), (60.0, 80.0)] {
        let r = ReflectionAnalysis::from_degrees(1.0, alpha, theta).unwrap();
        assert!(!r.total_internal_reflection);
        assert!(r.critical_angle_deg.is_none());
        assert!(r.correction.rotation.abs() < 1e-12);
        assert!(r.correction.ellipticity.abs() < 1e-12);
    }
}

#[test]
fn unphysical_reflection_inputs_are_errors() {
    assert!(ReflectionAnalysis::from_degrees(0.5, 10.0, 10.0).is_err());
    assert!(ReflectionAnalysis::from_degrees(1.5, 120.0, 10.0).is_err());
    assert!(ReflectionAnalysis::from_degrees(1.5, 10.0, 95.0).is_err());
}

#[test]
fn loops_without_plateaus_still_produce_outputs_and_plots() {
    let dir = tempfile::tempdir().unwrap();
    let scan = dir.path().join("short.txt");
    std::fs::write(&scan, scan_with(3, short_loop)).unwrap();

    let config = AnalysisConfig::default();
    let set = load_file(&scan, &config.markers).unwrap();
    let analysis = analyze(&set, &config, &ExperimentFilter::all()).unwrap();
    assert!(analysis.rotation.saturations().iter().all(Option::is_none));

    let out = dir.path().join("out");
    write_outputs(&analysis, &out).unwrap();
    let charts = pipeline_charts(&analysis);
    let written = render_all(&charts, &out, (640, 480)).unwrap();

    assert!(written.contains(&out.join("rotation_loops.png")));
    assert!(!out.join("saturation_vs_rotation_centre.png").exists());
    assert!(!out.join("ellipticity_saturation_vs_centre.png").exists());
    assert!(written.iter().all(|p| p.exists()));
}

#[test]
fn single_row_block_does_not_abort_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let scan = dir.path().join("scan.txt");
    let mut text = scan_text(2);
    write_block(&mut text, "克尔转角", &[(0.0, 0.3)]);
    std::fs::write(&scan, text).unwrap();

    let config = AnalysisConfig::default();
    let set = load_file(&scan, &config.markers).unwrap();
    assert_eq!(set.rotation.len(), 3);
    let analysis = analyze(&set, &config, &ExperimentFilter::all()).unwrap();

    let summary = analysis.summary();
    let third = summary.experiments.iter().find(|e| e.experiment == 3).unwrap();
    let features = third.rotation.unwrap();
    assert!(features.loop_area.is_none());
    assert!(features.saturation.is_none());
    let first = summary.experiments.iter().find(|e| e.experiment == 1).unwrap();
    assert!(first.rotation.unwrap().loop_area.is_some());
}
