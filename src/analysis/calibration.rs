use serde::{Deserialize, Serialize};

use super::fit::{LinearFit, fit_line};
use crate::error::{AnalysisError, AnalysisResult};

/// Slopes smaller than this are treated as "no response" and give no scale.
pub const MIN_SLOPE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Hysteresis calibration
// ---------------------------------------------------------------------------

/// Linear response of the rotation-loop centre to a known extra polarizer
/// rotation. The inverse slope converts detector signal to degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HysteresisCalibration {
    pub offsets_deg: Vec<f64>,
    pub centres: Vec<f64>,
    pub fit: LinearFit,
    /// `1 / slope`, absent for a flat response.
    pub scale: Option<f64>,
    pub rms_residual: f64,
}

impl HysteresisCalibration {
    pub fn fit(offsets_deg: &[f64], centres: &[f64]) -> AnalysisResult<Self> {
        let fit = fit_line(offsets_deg, centres)?;
        let scale = (fit.slope.abs() > MIN_SLOPE).then(|| 1.0 / fit.slope);
        if scale.is_none() {
            log::warn!("calibration slope {:.3e} is too small for a scale factor", fit.slope);
        }
        Ok(Self {
            offsets_deg: offsets_deg.to_vec(),
            centres: centres.to_vec(),
            rms_residual: fit.rms_residual(offsets_deg, centres),
            fit,
            scale,
        })
    }

    pub fn residuals(&self) -> Vec<f64> {
        self.fit.residuals(&self.offsets_deg, &self.centres)
    }

    /// Convert a detector signal to physical units, if a scale exists.
    pub fn to_physical(&self, signal: f64) -> Option<f64> {
        self.scale.map(|s| s * signal)
    }
}

// ---------------------------------------------------------------------------
// Manual calibration
// ---------------------------------------------------------------------------

/// One row of the fitted-versus-measured table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResidual {
    pub angle_arcmin: f64,
    pub signal: f64,
    pub predicted: f64,
    pub residual: f64,
}

/// Fit of `s = k (θ + θ0)` to a polarizer sweep, θ in arc-minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualCalibration {
    pub angles_arcmin: Vec<f64>,
    pub signals: Vec<f64>,
    /// Signal per arc-minute.
    pub k: f64,
    pub theta0_arcmin: f64,
    pub fit: LinearFit,
    pub reference_coefficient: f64,
}

impl ManualCalibration {
    pub fn fit(points: &[(f64, f64)], reference_coefficient: f64) -> AnalysisResult<Self> {
        if reference_coefficient == 0.0 || !reference_coefficient.is_finite() {
            return Err(AnalysisError::invalid(
                "reference coefficient must be finite and non-zero",
            ));
        }
        let (angles, signals): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        let fit = fit_line(&angles, &signals)?;
        let k = fit.slope;
        let theta0_arcmin = if k != 0.0 { fit.intercept / k } else { 0.0 };
        Ok(Self {
            angles_arcmin: angles,
            signals,
            k,
            theta0_arcmin,
            fit,
            reference_coefficient,
        })
    }

    pub fn theta0_deg(&self) -> f64 {
        self.theta0_arcmin / 60.0
    }

    /// Signal per degree.
    pub fn k_per_degree(&self) -> f64 {
        self.k * 60.0
    }

    pub fn r_squared(&self) -> f64 {
        self.fit.r_squared
    }

    /// `|k·60 - reference| / reference` in percent; 0 for a flat sweep.
    pub fn relative_error_percent(&self) -> f64 {
        if self.k == 0.0 {
            return 0.0;
        }
        (self.k_per_degree() - self.reference_coefficient).abs()
            / self.reference_coefficient.abs()
            * 100.0
    }

    pub fn predict(&self, angle_arcmin: f64) -> f64 {
        self.k * (angle_arcmin + self.theta0_arcmin)
    }

    pub fn residuals(&self) -> Vec<CalibrationResidual> {
        self.angles_arcmin
            .iter()
            .zip(&self.signals)
            .map(|(&angle, &signal)| {
                let predicted = self.predict(angle);
                CalibrationResidual {
                    angle_arcmin: angle,
                    signal,
                    predicted,
                    residual: signal - predicted,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_scale_is_inverse_slope() {
        let offsets = [0.0, 1.0, 2.0, 3.0, 4.0];
        let centres: Vec<f64> = offsets.iter().map(|a| 0.2 * a - 0.05).collect();
        let cal = HysteresisCalibration::fit(&offsets, &centres).unwrap();
        assert!((cal.fit.slope - 0.2).abs() < 1e-12);
        assert!((cal.scale.unwrap() - 5.0).abs() < 1e-9);
        assert!(cal.rms_residual < 1e-12);
        assert!((cal.to_physical(0.4).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flat_response_has_no_scale() {
        let cal = HysteresisCalibration::fit(&[0.0, 1.0, 2.0], &[0.3, 0.3, 0.3]).unwrap();
        assert!(cal.scale.is_none());
        assert!(cal.to_physical(1.0).is_none());
    }

    #[test]
    fn manual_calibration_recovers_offset() {
        // s = 0.001 (θ + 12), θ in arc-minutes.
        let points: Vec<(f64, f64)> = (-5..=5)
            .map(|i| {
                let theta = i as f64 * 10.0;
                (theta, 0.001 * (theta + 12.0))
            })
            .collect();
        let cal = ManualCalibration::fit(&points, 0.06).unwrap();
        assert!((cal.k - 0.001).abs() < 1e-12);
        assert!((cal.theta0_arcmin - 12.0).abs() < 1e-9);
        assert!((cal.theta0_deg() - 0.2).abs() < 1e-9);
        assert!((cal.k_per_degree() - 0.06).abs() < 1e-12);
        assert!(cal.relative_error_percent() < 1e-6);
        assert!((cal.r_squared() - 1.0).abs() < 1e-12);
        assert!(cal.residuals().iter().all(|r| r.residual.abs() < 1e-12));
    }

    #[test]
    fn manual_calibration_reports_relative_error() {
        let points = [(0.0, 0.0), (60.0, 0.066)];
        let cal = ManualCalibration::fit(&points, 0.06).unwrap();
        assert!((cal.relative_error_percent() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn manual_calibration_rejects_zero_reference() {
        assert!(ManualCalibration::fit(&[(0.0, 0.0), (1.0, 1.0)], 0.0).is_err());
    }
}
