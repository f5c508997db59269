use std::ops::RangeInclusive;
use std::str::FromStr;

use super::model::ScanSet;
use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Experiment selection
// ---------------------------------------------------------------------------

/// Selected 1-based experiment numbers, kept as inclusive ranges.
/// No ranges means "no filter" (every experiment passes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentFilter {
    selected: Vec<RangeInclusive<usize>>,
}

impl ExperimentFilter {
    /// Filter that lets every experiment through.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.selected.is_empty()
    }

    /// Whether 1-based experiment `number` passes.
    pub fn contains(&self, number: usize) -> bool {
        self.selected.is_empty() || self.selected.iter().any(|r| r.contains(&number))
    }
}

/// Accepts comma-separated numbers and inclusive ranges: `1,3-5`.
impl FromStr for ExperimentFilter {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selected = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let bad = || AnalysisError::invalid(format!("bad experiment selection '{part}'"));
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: usize = lo.trim().parse().map_err(|_| bad())?;
                    let hi: usize = hi.trim().parse().map_err(|_| bad())?;
                    if lo == 0 || hi < lo {
                        return Err(bad());
                    }
                    selected.push(lo..=hi);
                }
                None => {
                    let n: usize = part.parse().map_err(|_| bad())?;
                    if n == 0 {
                        return Err(bad());
                    }
                    selected.push(n..=n);
                }
            }
        }
        Ok(Self { selected })
    }
}

/// Return 0-based indices of the first `len` experiments that pass `filter`.
pub fn filtered_indices(len: usize, filter: &ExperimentFilter) -> Vec<usize> {
    (0..len).filter(|&i| filter.contains(i + 1)).collect()
}

/// Keep only the selected experiments of both channels.
///
/// Experiments are renumbered afterwards; callers that report numbers
/// should keep the index list from [`filtered_indices`].
pub fn apply_filter(set: &ScanSet, filter: &ExperimentFilter) -> ScanSet {
    if filter.is_all() {
        return set.clone();
    }
    let pick = |loops: &[crate::data::model::Loop]| {
        filtered_indices(loops.len(), filter)
            .into_iter()
            .map(|i| loops[i].clone())
            .collect::<Vec<_>>()
    };
    ScanSet {
        rotation: pick(&set.rotation),
        ellipticity: pick(&set.ellipticity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Loop;

    #[test]
    fn parses_numbers_and_ranges() {
        let f: ExperimentFilter = "1, 3-5".parse().unwrap();
        assert!(f.contains(1));
        assert!(!f.contains(2));
        assert!(f.contains(4));
        assert!(!f.contains(6));
        assert_eq!(filtered_indices(6, &f), vec![0, 2, 3, 4]);
    }

    #[test]
    fn empty_selection_passes_everything() {
        let f: ExperimentFilter = "".parse().unwrap();
        assert!(f.is_all());
        assert_eq!(filtered_indices(3, &f), vec![0, 1, 2]);
    }

    #[test]
    fn rejects_zero_and_reversed_ranges() {
        assert!("0".parse::<ExperimentFilter>().is_err());
        assert!("4-2".parse::<ExperimentFilter>().is_err());
        assert!("a".parse::<ExperimentFilter>().is_err());
    }

    #[test]
    fn huge_range_is_not_expanded() {
        let f: ExperimentFilter = "2-4000000000".parse().unwrap();
        assert!(!f.contains(1));
        assert!(f.contains(2));
        assert!(f.contains(3_999_999_999));
        assert!(!f.contains(4_000_000_001));
        assert_eq!(filtered_indices(4, &f), vec![1, 2, 3]);
    }

    #[test]
    fn apply_filter_keeps_channels_aligned() {
        let l = |v: f64| Loop::new(vec![0.0], vec![v]).unwrap();
        let set = ScanSet {
            rotation: vec![l(1.0), l(2.0), l(3.0)],
            ellipticity: vec![l(-1.0), l(-2.0), l(-3.0)],
        };
        let out = apply_filter(&set, &"2-3".parse().unwrap());
        assert_eq!(out.rotation, vec![l(2.0), l(3.0)]);
        assert_eq!(out.ellipticity, vec![l(-2.0), l(-3.0)]);
    }
}
