use serde::{Deserialize, Serialize};

use super::fit::mean;
use crate::data::model::Loop;
use crate::error::{AnalysisError, AnalysisResult, ensure_same_len};

// ---------------------------------------------------------------------------
// Loop centre
// ---------------------------------------------------------------------------

/// Vertical offset of a loop.
///
/// The parity loss `Σ (x - x')² + (y - y')²` is quadratic in the centre
/// and its minimiser is the mean of `y`, so no search is needed.
pub fn find_ycentre(y: &[f64]) -> AnalysisResult<f64> {
    if y.is_empty() {
        return Err(AnalysisError::InsufficientData { needed: 1, found: 0 });
    }
    Ok(mean(y))
}

/// Point-reflect every sample through `(xc, yc)` and rotate the sequence
/// by half its length, so the reflected descending branch lines up with
/// the ascending one.
pub fn parity_transform(
    x: &[f64],
    y: &[f64],
    xc: f64,
    yc: f64,
) -> AnalysisResult<(Vec<f64>, Vec<f64>)> {
    ensure_same_len(x, y)?;
    let n = x.len();
    if n % 2 != 0 {
        return Err(AnalysisError::invalid(format!(
            "parity transform needs an even number of points, got {n}"
        )));
    }

    let mut xt: Vec<f64> = x.iter().map(|v| 2.0 * xc - v).collect();
    let mut yt: Vec<f64> = y.iter().map(|v| 2.0 * yc - v).collect();
    xt.rotate_right(n / 2);
    yt.rotate_right(n / 2);
    Ok((xt, yt))
}

/// Squared distance between a loop and its parity image.
pub fn parity_loss(x: &[f64], y: &[f64], xc: f64, yc: f64) -> AnalysisResult<f64> {
    let (xt, yt) = parity_transform(x, y, xc, yc)?;
    let loss = x
        .iter()
        .zip(y)
        .zip(xt.iter().zip(&yt))
        .map(|((a, b), (at, bt))| (a - at).powi(2) + (b - bt).powi(2))
        .sum();
    Ok(loss)
}

/// Subtract each loop's centre. Returns the centred loops and the centres.
pub fn centre_loops(loops: &[Loop]) -> AnalysisResult<(Vec<Loop>, Vec<f64>)> {
    let mut centred = Vec::with_capacity(loops.len());
    let mut centres = Vec::with_capacity(loops.len());
    for l in loops {
        let c = find_ycentre(&l.signal)?;
        centred.push(l.shifted(c));
        centres.push(c);
    }
    Ok((centred, centres))
}

// ---------------------------------------------------------------------------
// Saturation plateaus
// ---------------------------------------------------------------------------

/// How the saturated branches of a loop are located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PlateauMethod {
    /// Mean of the `count` largest and `count` smallest signal values.
    Extremes { count: usize },
    /// Mean signal of the `window` points at each end of the field range;
    /// rejected when the spread inside a window exceeds `threshold`.
    Window { window: usize, threshold: f64 },
}

impl Default for PlateauMethod {
    fn default() -> Self {
        PlateauMethod::Extremes { count: 7 }
    }
}

impl PlateauMethod {
    pub fn validate(&self) -> AnalysisResult<()> {
        match *self {
            PlateauMethod::Extremes { count } if count == 0 => {
                Err(AnalysisError::invalid("plateau count must be at least 1"))
            }
            PlateauMethod::Window { window, .. } if window < 2 => {
                Err(AnalysisError::invalid("plateau window must be at least 2"))
            }
            PlateauMethod::Window { threshold, .. } if !(threshold.is_finite() && threshold > 0.0) => {
                Err(AnalysisError::invalid("plateau threshold must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Upper and lower saturation levels of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plateau {
    pub upper: f64,
    pub lower: f64,
}

impl Plateau {
    /// Half the distance between the plateaus.
    pub fn saturation(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}

/// Locate the plateaus, or `None` when the loop is too short or does not
/// saturate under the window criterion.
pub fn plateau_levels(l: &Loop, method: &PlateauMethod) -> Option<Plateau> {
    match *method {
        PlateauMethod::Extremes { count } => {
            if l.len() < count || count == 0 {
                return None;
            }
            let mut sorted = l.signal.clone();
            sorted.sort_by(f64::total_cmp);
            Some(Plateau {
                upper: mean(&sorted[sorted.len() - count..]),
                lower: mean(&sorted[..count]),
            })
        }
        PlateauMethod::Window { window, threshold } => {
            if l.len() < window || window == 0 {
                return None;
            }
            let mut order: Vec<usize> = (0..l.len()).collect();
            order.sort_by(|&a, &b| l.field[a].total_cmp(&l.field[b]));

            let level = |idx: &[usize]| -> Option<f64> {
                let values: Vec<f64> = idx.iter().map(|&i| l.signal[i]).collect();
                let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if hi - lo > threshold {
                    log::debug!("window spread {:.3e} exceeds {threshold:.3e}", hi - lo);
                    return None;
                }
                Some(mean(&values))
            };
            let low_field = level(&order[..window])?;
            let high_field = level(&order[order.len() - window..])?;
            Some(Plateau {
                upper: low_field.max(high_field),
                lower: low_field.min(high_field),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Crossings
// ---------------------------------------------------------------------------

/// Interpolated `(a, b)` wherever `b` changes sign between neighbours.
fn zero_crossings(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.windows(2)
        .zip(b.windows(2))
        .filter(|(_, bw)| (bw[0] < 0.0) != (bw[1] < 0.0))
        .map(|(aw, bw)| aw[0] + (0.0 - bw[0]) * (aw[1] - aw[0]) / (bw[1] - bw[0]))
        .collect()
}

fn mean_abs(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64)
}

/// Coercive field: mean |H| over the sign changes of a centred loop.
pub fn coercive_field(l: &Loop) -> Option<f64> {
    mean_abs(&zero_crossings(&l.field, &l.signal))
}

/// Remanence: mean |M| where the field passes through zero.
pub fn remanence(l: &Loop) -> Option<f64> {
    mean_abs(&zero_crossings(&l.signal, &l.field))
}

/// Trapezoidal integral of the signal along acquisition order.
/// A closed loop traversed counter-clockwise gives a negative area.
/// Errors on loops with fewer than 2 points.
pub fn loop_area(l: &Loop) -> AnalysisResult<f64> {
    if l.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            needed: 2,
            found: l.len(),
        });
    }
    Ok(l.field
        .windows(2)
        .zip(l.signal.windows(2))
        .map(|(x, y)| 0.5 * (y[0] + y[1]) * (x[1] - x[0]))
        .sum())
}

// ---------------------------------------------------------------------------
// Feature set
// ---------------------------------------------------------------------------

/// Hysteresis features of one centred loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisFeatures {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub saturation: Option<f64>,
    pub coercive_field: Option<f64>,
    pub remanence: Option<f64>,
    /// `None` for loops too short to integrate.
    pub loop_area: Option<f64>,
}

impl HysteresisFeatures {
    pub fn extract(centred: &Loop, method: &PlateauMethod) -> AnalysisResult<Self> {
        let plateau = plateau_levels(centred, method);
        Ok(Self {
            upper: plateau.map(|p| p.upper),
            lower: plateau.map(|p| p.lower),
            saturation: plateau.map(|p| p.saturation()),
            coercive_field: coercive_field(centred),
            remanence: remanence(centred),
            loop_area: loop_area(centred).ok(),
        })
    }
}
