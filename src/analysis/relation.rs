use serde::{Deserialize, Serialize};

use super::fit::{LinearFit, PolyFit, fit_line, fit_polynomial, mean};
use crate::error::{AnalysisError, AnalysisResult};

/// Rotation and (sign-corrected) ellipticity centre of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationPoint {
    pub experiment: usize,
    pub rotation_centre: f64,
    pub ellipticity_centre: f64,
    pub flipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentreStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl CentreStats {
    fn of(values: &[f64]) -> Self {
        Self {
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: mean(values),
        }
    }
}

/// How the ellipticity centre follows the rotation centre across experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KerrRelation {
    pub points: Vec<RelationPoint>,
    pub linear: LinearFit,
    /// Only fitted with three or more experiments.
    pub quadratic: Option<PolyFit>,
    pub rotation_stats: CentreStats,
    pub ellipticity_stats: CentreStats,
}

impl KerrRelation {
    /// Experiments are numbered `1..`; see [`KerrRelation::analyze_numbered`].
    pub fn analyze(
        rotation_centres: &[f64],
        ellipticity_centres: &[f64],
        flips: &[usize],
    ) -> AnalysisResult<Self> {
        let n = rotation_centres.len().min(ellipticity_centres.len());
        let numbers: Vec<usize> = (1..=n).collect();
        Self::analyze_numbered(&numbers, rotation_centres, ellipticity_centres, flips)
    }

    /// Pair centres by position, negate the ellipticity centre of every
    /// experiment number listed in `flips`, then fit.
    pub fn analyze_numbered(
        numbers: &[usize],
        rotation_centres: &[f64],
        ellipticity_centres: &[f64],
        flips: &[usize],
    ) -> AnalysisResult<Self> {
        if rotation_centres.len() != ellipticity_centres.len() {
            log::warn!(
                "{} rotation centres vs {} ellipticity centres, using the first {}",
                rotation_centres.len(),
                ellipticity_centres.len(),
                rotation_centres.len().min(ellipticity_centres.len())
            );
        }
        let n = numbers
            .len()
            .min(rotation_centres.len())
            .min(ellipticity_centres.len());
        if n < 2 {
            return Err(AnalysisError::InsufficientData { needed: 2, found: n });
        }

        let points: Vec<RelationPoint> = (0..n)
            .map(|i| {
                let flipped = flips.contains(&numbers[i]);
                let e = ellipticity_centres[i];
                RelationPoint {
                    experiment: numbers[i],
                    rotation_centre: rotation_centres[i],
                    ellipticity_centre: if flipped { -e } else { e },
                    flipped,
                }
            })
            .collect();

        let x: Vec<f64> = points.iter().map(|p| p.rotation_centre).collect();
        let y: Vec<f64> = points.iter().map(|p| p.ellipticity_centre).collect();
        let linear = fit_line(&x, &y)?;
        let quadratic = if n >= 3 {
            match fit_polynomial(&x, &y, 2) {
                Ok(fit) => Some(fit),
                Err(e) => {
                    log::warn!("quadratic relation fit skipped: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            rotation_stats: CentreStats::of(&x),
            ellipticity_stats: CentreStats::of(&y),
            points,
            linear,
            quadratic,
        })
    }
}

// ---------------------------------------------------------------------------
// Saturation statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationPoint {
    pub experiment: usize,
    pub centre: f64,
    pub saturation: f64,
}

/// Pair each experiment's centre with its saturation, dropping experiments
/// whose plateau could not be determined.
pub fn saturation_vs_centre(
    numbers: &[usize],
    centres: &[f64],
    saturations: &[Option<f64>],
) -> Vec<SaturationPoint> {
    numbers
        .iter()
        .zip(centres)
        .zip(saturations)
        .filter_map(|((&experiment, &centre), sat)| {
            sat.map(|saturation| SaturationPoint {
                experiment,
                centre,
                saturation,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_are_applied_by_experiment_number() {
        let rot = [0.1, 0.2, 0.3, 0.4, 0.5];
        // Experiments 4 and 5 were measured with the opposite sign.
        let ell = [0.02, 0.04, 0.06, -0.08, -0.10];
        let rel = KerrRelation::analyze(&rot, &ell, &[4, 5]).unwrap();
        assert!(rel.points[3].flipped && !rel.points[2].flipped);
        assert!((rel.points[4].ellipticity_centre - 0.10).abs() < 1e-12);
        assert!((rel.linear.slope - 0.2).abs() < 1e-9);
        assert!((rel.linear.r_squared - 1.0).abs() < 1e-9);
        let quad = rel.quadratic.unwrap();
        assert!(quad.coefficients[2].abs() < 1e-6);
        assert!((rel.rotation_stats.max - 0.5).abs() < 1e-12);
        assert!((rel.ellipticity_stats.mean - 0.06).abs() < 1e-12);
    }

    #[test]
    fn numbered_flips_follow_original_numbers() {
        let rel =
            KerrRelation::analyze_numbered(&[2, 4], &[0.0, 1.0], &[0.5, 0.5], &[4]).unwrap();
        assert!(!rel.points[0].flipped);
        assert!(rel.points[1].flipped);
        assert_eq!(rel.points[1].ellipticity_centre, -0.5);
        assert!(rel.quadratic.is_none());
    }

    #[test]
    fn single_experiment_is_rejected() {
        assert!(matches!(
            KerrRelation::analyze(&[0.1], &[0.2], &[]),
            Err(AnalysisError::InsufficientData { needed: 2, found: 1 })
        ));
    }

    #[test]
    fn saturation_points_skip_missing_plateaus() {
        let pts = saturation_vs_centre(&[1, 2, 3], &[0.1, 0.2, 0.3], &[Some(1.0), None, Some(3.0)]);
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[1].experiment, 3);
        assert_eq!(pts[1].saturation, 3.0);
    }
}
