use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, ensure_same_len};

// ---------------------------------------------------------------------------
// Straight line
// ---------------------------------------------------------------------------

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// `y - predict(x)` for every point.
    pub fn residuals(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        x.iter().zip(y).map(|(&xi, &yi)| yi - self.predict(xi)).collect()
    }

    /// Root-mean-square residual.
    pub fn rms_residual(&self, x: &[f64], y: &[f64]) -> f64 {
        let r = self.residuals(x, y);
        if r.is_empty() {
            return 0.0;
        }
        (r.iter().map(|v| v * v).sum::<f64>() / r.len() as f64).sqrt()
    }
}

/// Ordinary least-squares fit of a straight line.
pub fn fit_line(x: &[f64], y: &[f64]) -> AnalysisResult<LinearFit> {
    ensure_same_len(x, y)?;
    if x.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            needed: 2,
            found: x.len(),
        });
    }

    let mx = mean(x);
    let my = mean(y);
    let sxx: f64 = x.iter().map(|&xi| (xi - mx).powi(2)).sum();
    let sxy: f64 = x.iter().zip(y).map(|(&xi, &yi)| (xi - mx) * (yi - my)).sum();
    if sxx == 0.0 {
        return Err(AnalysisError::DegenerateFit("all x values are equal".into()));
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let predicted: Vec<f64> = x.iter().map(|&xi| slope * xi + intercept).collect();
    Ok(LinearFit {
        slope,
        intercept,
        r_squared: r_squared(y, &predicted),
    })
}

// ---------------------------------------------------------------------------
// Polynomial
// ---------------------------------------------------------------------------

/// Least-squares polynomial; `coefficients[k]` multiplies `x^k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyFit {
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
}

impl PolyFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Fit a polynomial of `degree` by solving the normal equations.
pub fn fit_polynomial(x: &[f64], y: &[f64], degree: usize) -> AnalysisResult<PolyFit> {
    ensure_same_len(x, y)?;
    let n_coef = degree + 1;
    if x.len() < n_coef {
        return Err(AnalysisError::InsufficientData {
            needed: n_coef,
            found: x.len(),
        });
    }

    // Power sums Σ x^k for k = 0 ..= 2·degree.
    let mut power_sums = vec![0.0; 2 * degree + 1];
    let mut rhs = vec![0.0; n_coef];
    for (&xi, &yi) in x.iter().zip(y) {
        let mut p = 1.0;
        for (k, sum) in power_sums.iter_mut().enumerate() {
            *sum += p;
            if k < n_coef {
                rhs[k] += yi * p;
            }
            p *= xi;
        }
    }
    let normal = DMatrix::from_fn(n_coef, n_coef, |i, j| power_sums[i + j]);
    let coefficients = normal
        .lu()
        .solve(&DVector::from_vec(rhs))
        .filter(|c| c.iter().all(|v| v.is_finite()))
        .ok_or_else(|| AnalysisError::DegenerateFit("normal equations are singular".into()))?;

    let fit = PolyFit {
        coefficients: coefficients.iter().copied().collect(),
        r_squared: 0.0,
    };
    let predicted: Vec<f64> = x.iter().map(|&xi| fit.predict(xi)).collect();
    Ok(PolyFit {
        r_squared: r_squared(y, &predicted),
        ..fit
    })
}

// ---------------------------------------------------------------------------
// Shared statistics
// ---------------------------------------------------------------------------

/// Coefficient of determination `1 - SS_res / SS_tot`.
/// Returns 0 when the observations have no spread.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let m = mean(observed);
    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    let ss_tot: f64 = observed.iter().map(|o| (o - m).powi(2)).sum();
    if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_line_is_recovered() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5 - 2.0).collect();
        let y: Vec<f64> = x.iter().map(|v| -1.75 * v + 0.3).collect();
        let fit = fit_line(&x, &y).unwrap();
        assert!((fit.slope + 1.75).abs() < 1e-12);
        assert!((fit.intercept - 0.3).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!(fit.rms_residual(&x, &y) < 1e-12);
    }

    #[test]
    fn noisy_line_has_r_squared_below_one() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.1, 0.9, 2.2, 2.8];
        let fit = fit_line(&x, &y).unwrap();
        assert!(fit.r_squared < 1.0 && fit.r_squared > 0.9);
    }

    #[test]
    fn line_needs_two_distinct_x() {
        assert!(matches!(
            fit_line(&[1.0], &[2.0]),
            Err(AnalysisError::InsufficientData { needed: 2, found: 1 })
        ));
        assert!(matches!(
            fit_line(&[1.0, 1.0], &[2.0, 3.0]),
            Err(AnalysisError::DegenerateFit(_))
        ));
        assert!(matches!(
            fit_line(&[1.0, 2.0], &[2.0]),
            Err(AnalysisError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn flat_data_reports_zero_r_squared() {
        let fit = fit_line(&[0.0, 1.0, 2.0], &[4.0, 4.0, 4.0]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 0.0);
    }

    #[test]
    fn quadratic_is_recovered() {
        let x: Vec<f64> = (-4..=4).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v * v - 2.0 * v + 1.0).collect();
        let fit = fit_polynomial(&x, &y, 2).unwrap();
        assert_eq!(fit.degree(), 2);
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-9);
        assert!((fit.coefficients[1] + 2.0).abs() < 1e-9);
        assert!((fit.coefficients[2] - 0.5).abs() < 1e-9);
        assert!((fit.predict(3.0) - 0.5 * 9.0 + 6.0 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn degree_one_polynomial_matches_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.1, 0.9, 2.2, 2.8];
        let line = fit_line(&x, &y).unwrap();
        let poly = fit_polynomial(&x, &y, 1).unwrap();
        assert!((poly.coefficients[1] - line.slope).abs() < 1e-9);
        assert!((poly.coefficients[0] - line.intercept).abs() < 1e-9);
    }

    #[test]
    fn polynomial_with_repeated_x_is_singular() {
        let err = fit_polynomial(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0], 2).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateFit(_)));
    }
}
