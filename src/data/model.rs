use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

// ---------------------------------------------------------------------------
// Table – fixed-column numeric file contents
// ---------------------------------------------------------------------------

/// Rows of a fixed-column numeric file, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: usize,
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Empty table with a fixed column count.
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; `line` is only used for the error message.
    pub(crate) fn push_row(&mut self, row: Vec<f64>, line: usize) -> AnalysisResult<()> {
        if row.len() != self.columns {
            return Err(AnalysisError::ColumnMismatch {
                line,
                expected: self.columns,
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Copy out one column, or `None` if `idx` is out of range.
    pub fn column(&self, idx: usize) -> Option<Vec<f64>> {
        (idx < self.columns).then(|| self.rows.iter().map(|r| r[idx]).collect())
    }
}

// ---------------------------------------------------------------------------
// Channel – which lock-in quantity a loop measures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Rotation,
    Ellipticity,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Rotation, Channel::Ellipticity];

    /// Short lowercase name used in file names and JSON keys.
    pub fn slug(self) -> &'static str {
        match self {
            Channel::Rotation => "rotation",
            Channel::Ellipticity => "ellipticity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Rotation => write!(f, "Kerr rotation"),
            Channel::Ellipticity => write!(f, "Kerr ellipticity"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loop – one hysteresis sweep
// ---------------------------------------------------------------------------

/// One field sweep: magnetic field (mT) and measured signal (degrees),
/// both in acquisition order.
///
/// Serialized as `[[field...], [signal...]]`, the layout the lab's JSON
/// interchange files use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "[Vec<f64>; 2]", try_from = "[Vec<f64>; 2]")]
pub struct Loop {
    pub field: Vec<f64>,
    pub signal: Vec<f64>,
}

impl Loop {
    pub fn new(field: Vec<f64>, signal: Vec<f64>) -> AnalysisResult<Self> {
        if field.len() != signal.len() {
            return Err(AnalysisError::LengthMismatch {
                left: field.len(),
                right: signal.len(),
            });
        }
        Ok(Self { field, signal })
    }

    pub fn len(&self) -> usize {
        self.field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    /// `(field, signal)` pairs in acquisition order.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.field.iter().copied().zip(self.signal.iter().copied())
    }

    /// Same sweep with `offset` subtracted from every signal value.
    pub fn shifted(&self, offset: f64) -> Loop {
        Loop {
            field: self.field.clone(),
            signal: self.signal.iter().map(|s| s - offset).collect(),
        }
    }

    /// Same sweep with every signal value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Loop {
        Loop {
            field: self.field.clone(),
            signal: self.signal.iter().map(|s| s * factor).collect(),
        }
    }
}

impl From<Loop> for [Vec<f64>; 2] {
    fn from(l: Loop) -> Self {
        [l.field, l.signal]
    }
}

impl TryFrom<[Vec<f64>; 2]> for Loop {
    type Error = AnalysisError;

    fn try_from([field, signal]: [Vec<f64>; 2]) -> Result<Self, Self::Error> {
        Loop::new(field, signal)
    }
}

// ---------------------------------------------------------------------------
// ScanSet – all loops of one measurement session
// ---------------------------------------------------------------------------

/// Rotation and ellipticity loops of one session. Experiment `i` of each
/// channel was taken with the same polarizer setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSet {
    #[serde(default)]
    pub rotation: Vec<Loop>,
    #[serde(default)]
    pub ellipticity: Vec<Loop>,
}

impl ScanSet {
    pub fn channel(&self, channel: Channel) -> &[Loop] {
        match channel {
            Channel::Rotation => &self.rotation,
            Channel::Ellipticity => &self.ellipticity,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut Vec<Loop> {
        match channel {
            Channel::Rotation => &mut self.rotation,
            Channel::Ellipticity => &mut self.ellipticity,
        }
    }

    /// Number of experiments with data in both channels.
    pub fn paired_len(&self) -> usize {
        self.rotation.len().min(self.ellipticity.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rotation.is_empty() && self.ellipticity.is_empty()
    }
}

// ---------------------------------------------------------------------------
// KerrPoint – derived quantities per field point
// ---------------------------------------------------------------------------

/// Calibrated Kerr rotation and ellipticity at one field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KerrPoint {
    /// 1-based experiment number.
    pub experiment: usize,
    pub field: f64,
    pub rotation: f64,
    pub ellipticity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rejects_ragged_rows() {
        let mut t = Table::new(2);
        t.push_row(vec![1.0, 2.0], 1).unwrap();
        let err = t.push_row(vec![1.0], 2).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ColumnMismatch {
                line: 2,
                expected: 2,
                found: 1
            }
        ));
        assert_eq!(t.n_rows(), 1);
        assert_eq!(t.column(1), Some(vec![2.0]));
        assert_eq!(t.column(2), None);
    }

    #[test]
    fn loop_json_layout_is_field_then_signal() {
        let l = Loop::new(vec![-1.0, 1.0], vec![0.5, -0.5]).unwrap();
        let text = serde_json::to_string(&l).unwrap();
        assert_eq!(text, "[[-1.0,1.0],[0.5,-0.5]]");

        let bad: Result<Loop, _> = serde_json::from_str("[[1.0, 2.0], [3.0]]");
        assert!(bad.is_err());
    }

    #[test]
    fn shifted_and_scaled_leave_field_alone() {
        let l = Loop::new(vec![0.0, 1.0], vec![2.0, 4.0]).unwrap();
        assert_eq!(l.shifted(1.0).signal, vec![1.0, 3.0]);
        assert_eq!(l.scaled(0.5).signal, vec![1.0, 2.0]);
        assert_eq!(l.scaled(0.5).field, l.field);
    }
}
