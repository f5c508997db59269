use std::f64::consts::FRAC_PI_2;
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Relative index used for parameter maps when none is given (dense flint glass).
pub const DEFAULT_MAP_INDEX: f64 = 1.7;
/// Grid points per axis of a parameter map.
pub const DEFAULT_MAP_POINTS: usize = 100;

const INDEX_MATCH_TOL: f64 = 1e-12;
const ELLIPTICAL_TOL: f64 = 1e-6;

/// Polarization state after reflection at the interface of a denser medium
/// (index `n1`) with a rarer one (`n2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Major-axis angle of the reflected polarization, radians from s.
    pub alpha_prime: f64,
    /// Ellipticity angle, radians; `tan η` is the axis ratio.
    pub eta: f64,
    pub rs: Complex64,
    pub rp: Complex64,
    pub total_internal: bool,
}

/// Change of the measured angles caused by the extra reflection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarizationCorrection {
    /// `α' - α`, radians.
    pub rotation: f64,
    /// `η`, radians.
    pub ellipticity: f64,
}

impl Reflection {
    pub fn correction(&self, alpha: f64) -> PolarizationCorrection {
        PolarizationCorrection {
            rotation: self.alpha_prime - alpha,
            ellipticity: self.eta,
        }
    }
}

fn check_inputs(n: f64, alpha: f64, theta: f64) -> AnalysisResult<()> {
    if !(n.is_finite() && n >= 1.0) {
        return Err(AnalysisError::invalid(format!(
            "relative index n must be >= 1, got {n}"
        )));
    }
    if !(0.0..=FRAC_PI_2).contains(&alpha) {
        return Err(AnalysisError::invalid(format!(
            "polarization angle {alpha} rad outside [0, pi/2]"
        )));
    }
    if !(0.0..FRAC_PI_2).contains(&theta) {
        return Err(AnalysisError::invalid(format!(
            "incidence angle {theta} rad outside [0, pi/2)"
        )));
    }
    Ok(())
}

/// Fresnel reflection of linearly polarized light.
///
/// * `n` – relative index `n1 / n2`, at least 1
/// * `alpha` – incident polarization angle from s, radians in `[0, π/2]`
/// * `theta` – angle of incidence, radians in `[0, π/2)`
///
/// Below the critical angle the reflected light stays linear. Beyond it both
/// coefficients have unit modulus and their phase difference makes the
/// light elliptical. With `n == 1` nothing is reflected and the
/// polarization is returned unchanged.
pub fn reflection_polarization(n: f64, alpha: f64, theta: f64) -> AnalysisResult<Reflection> {
    check_inputs(n, alpha, theta)?;

    if (n - 1.0).abs() < INDEX_MATCH_TOL {
        return Ok(Reflection {
            alpha_prime: alpha,
            eta: 0.0,
            rs: Complex64::new(0.0, 0.0),
            rp: Complex64::new(0.0, 0.0),
            total_internal: false,
        });
    }

    let cos_t = theta.cos();
    let sin_t2 = n * theta.sin();

    if sin_t2 <= 1.0 {
        let cos_t2 = (1.0 - sin_t2 * sin_t2).sqrt();
        let rs = (cos_t - cos_t2 / n) / (cos_t + cos_t2 / n);
        let rp = (cos_t - n * cos_t2) / (cos_t + n * cos_t2);

        let alpha_prime = if rs == 0.0 {
            FRAC_PI_2.copysign(rp)
        } else {
            ((rp / rs) * alpha.tan()).atan()
        };
        return Ok(Reflection {
            alpha_prime,
            eta: 0.0,
            rs: Complex64::new(rs, 0.0),
            rp: Complex64::new(rp, 0.0),
            total_internal: false,
        });
    }

    // Total internal reflection: r = e^{-iδ}.
    let kappa = (sin_t2 * sin_t2 - 1.0).sqrt();
    let delta_s = 2.0 * (n * kappa / cos_t).atan();
    let delta_p = 2.0 * (kappa / (n * cos_t)).atan();
    let delta = delta_p - delta_s;

    let tan_2a = (2.0 * alpha).tan();
    let (alpha_prime, eta) = if tan_2a.abs() < 1e-12 {
        (alpha, 0.0)
    } else {
        (
            0.5 * (tan_2a * delta.cos()).atan(),
            0.5 * (tan_2a * delta.sin()).atan(),
        )
    };

    Ok(Reflection {
        alpha_prime,
        eta,
        rs: Complex64::from_polar(1.0, -delta_s),
        rp: Complex64::from_polar(1.0, -delta_p),
        total_internal: true,
    })
}

/// Critical angle `asin(1/n)` in radians, `None` for index-matched media.
pub fn critical_angle(n: f64) -> Option<f64> {
    (n > 1.0 + INDEX_MATCH_TOL).then(|| (1.0 / n).asin())
}

// ---------------------------------------------------------------------------
// Detailed analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarizationType {
    Linear,
    Elliptical,
}

/// Everything worth reporting about one reflection, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionAnalysis {
    pub n: f64,
    pub alpha_deg: f64,
    pub theta_deg: f64,
    pub critical_angle_deg: Option<f64>,
    pub total_internal_reflection: bool,
    pub rs: Complex64,
    pub rp: Complex64,
    pub rs_abs: f64,
    pub rs_phase_deg: f64,
    pub rp_abs: f64,
    pub rp_phase_deg: f64,
    pub phase_difference_deg: f64,
    pub alpha_prime_deg: f64,
    pub eta_deg: f64,
    /// Axis ratio `tan η`.
    pub epsilon: f64,
    pub polarization: PolarizationType,
    pub correction: PolarizationCorrection,
}

impl ReflectionAnalysis {
    /// Angles in radians.
    pub fn new(n: f64, alpha: f64, theta: f64) -> AnalysisResult<Self> {
        let r = reflection_polarization(n, alpha, theta)?;
        let (rs_abs, rs_phase) = r.rs.to_polar();
        let (rp_abs, rp_phase) = r.rp.to_polar();
        let epsilon = if r.eta.abs() < 1e-12 { 0.0 } else { r.eta.tan() };
        Ok(Self {
            n,
            alpha_deg: alpha.to_degrees(),
            theta_deg: theta.to_degrees(),
            critical_angle_deg: critical_angle(n).map(f64::to_degrees),
            total_internal_reflection: r.total_internal,
            rs: r.rs,
            rp: r.rp,
            rs_abs,
            rs_phase_deg: rs_phase.to_degrees(),
            rp_abs,
            rp_phase_deg: rp_phase.to_degrees(),
            phase_difference_deg: (rp_phase - rs_phase).to_degrees(),
            alpha_prime_deg: r.alpha_prime.to_degrees(),
            eta_deg: r.eta.to_degrees(),
            epsilon,
            polarization: if r.eta.abs() > ELLIPTICAL_TOL {
                PolarizationType::Elliptical
            } else {
                PolarizationType::Linear
            },
            correction: r.correction(alpha),
        })
    }

    pub fn from_degrees(n: f64, alpha_deg: f64, theta_deg: f64) -> AnalysisResult<Self> {
        // Keep pure p exactly on the domain boundary.
        let alpha = if alpha_deg == 90.0 {
            FRAC_PI_2
        } else {
            alpha_deg.to_radians()
        };
        Self::new(n, alpha, theta_deg.to_radians())
    }
}

impl fmt::Display for ReflectionAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Reflected polarization")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Input:")?;
        writeln!(f, "  relative index n = {:.4}", self.n)?;
        writeln!(f, "  polarization angle alpha = {:.2} deg", self.alpha_deg)?;
        writeln!(f, "  incidence angle theta = {:.2} deg", self.theta_deg)?;
        match self.critical_angle_deg {
            Some(c) => writeln!(f, "  critical angle = {c:.2} deg")?,
            None => writeln!(f, "  critical angle = none (index matched)")?,
        }
        writeln!(
            f,
            "\nRegime: {}",
            if self.total_internal_reflection {
                "total internal reflection"
            } else {
                "partial reflection"
            }
        )?;
        writeln!(f, "\nCoefficients:")?;
        writeln!(f, "  r_s = {:.4} {:+.4}i", self.rs.re, self.rs.im)?;
        writeln!(f, "      |r_s| = {:.4}, phase = {:.2} deg", self.rs_abs, self.rs_phase_deg)?;
        writeln!(f, "  r_p = {:.4} {:+.4}i", self.rp.re, self.rp.im)?;
        writeln!(f, "      |r_p| = {:.4}, phase = {:.2} deg", self.rp_abs, self.rp_phase_deg)?;
        writeln!(f, "  phase difference = {:.2} deg", self.phase_difference_deg)?;
        writeln!(f, "\nReflected light:")?;
        writeln!(f, "  major axis alpha' = {:.4} deg", self.alpha_prime_deg)?;
        writeln!(f, "  ellipticity angle eta = {:.4} deg", self.eta_deg)?;
        writeln!(f, "  axis ratio tan(eta) = {:.6}", self.epsilon)?;
        writeln!(f, "  type: {:?}", self.polarization)?;
        write!(f, "{rule}")
    }
}

// ---------------------------------------------------------------------------
// Parameter map
// ---------------------------------------------------------------------------

/// `α'` and `η` (degrees) over a grid of polarization and incidence angles.
/// Rows follow `theta_deg`, columns follow `alpha_deg`; points outside the
/// valid domain are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMap {
    pub n: f64,
    pub alpha_deg: Vec<f64>,
    pub theta_deg: Vec<f64>,
    pub alpha_prime_deg: Vec<Vec<f64>>,
    pub eta_deg: Vec<Vec<f64>>,
    pub critical_angle_deg: Option<f64>,
}

fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..points)
            .map(|i| start + (end - start) * i as f64 / (points - 1) as f64)
            .collect(),
    }
}

pub fn parameter_map(n: f64, points: usize) -> ParameterMap {
    let alphas = linspace(0.0, FRAC_PI_2, points);
    let thetas = linspace(0.0, FRAC_PI_2, points);

    let mut alpha_prime_deg = Vec::with_capacity(points);
    let mut eta_deg = Vec::with_capacity(points);
    for &theta in &thetas {
        let (row_a, row_e): (Vec<f64>, Vec<f64>) = alphas
            .iter()
            .map(|&alpha| match reflection_polarization(n, alpha, theta) {
                Ok(r) => (r.alpha_prime.to_degrees(), r.eta.to_degrees()),
                Err(_) => (f64::NAN, f64::NAN),
            })
            .unzip();
        alpha_prime_deg.push(row_a);
        eta_deg.push(row_e);
    }

    ParameterMap {
        n,
        alpha_deg: alphas.iter().map(|a| a.to_degrees()).collect(),
        theta_deg: thetas.iter().map(|t| t.to_degrees()).collect(),
        alpha_prime_deg,
        eta_deg,
        critical_angle_deg: critical_angle(n).map(f64::to_degrees),
    }
}
