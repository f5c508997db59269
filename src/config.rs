use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::analysis::features::PlateauMethod;

/// Instrument coefficient printed in the acquisition software's export,
/// in degrees per signal unit.
pub const DEFAULT_REFERENCE_COEFFICIENT: f64 = 5.77573876180815e-2;

/// Analysis settings. Every field has a default, so a config file only
/// needs to list what differs from the standard lab setup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub calibration: CalibrationConfig,
    pub features: FeatureConfig,
    pub relation: RelationConfig,
    pub markers: MarkerConfig,
    pub plot: PlotConfig,
}

impl AnalysisConfig {
    /// Read a JSON config file, or fall back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str::<AnalysisConfig>(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => AnalysisConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the manual-calibration reference coefficient when one is
    /// given on the command line.
    pub fn override_reference(&mut self, reference: Option<f64>) -> Result<()> {
        if let Some(k) = reference {
            self.calibration.reference_coefficient = k;
            self.validate()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.calibration.extra_angles_deg.is_empty() {
            bail!("calibration.extra_angles_deg must not be empty");
        }
        if !(self.calibration.reference_coefficient.is_finite()
            && self.calibration.reference_coefficient != 0.0)
        {
            bail!("calibration.reference_coefficient must be finite and non-zero");
        }
        self.features.plateau.validate()?;
        if self.relation.flip_ellipticity.contains(&0) {
            bail!("relation.flip_ellipticity uses 1-based experiment numbers");
        }
        if self.markers.rotation.is_empty() || self.markers.ellipticity.is_empty() {
            bail!("markers.rotation and markers.ellipticity need at least one keyword");
        }
        if self.plot.width < 200 || self.plot.height < 150 {
            bail!(
                "plot size {}x{} is too small",
                self.plot.width,
                self.plot.height
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Extra polarizer rotation (degrees) applied for each experiment, in order.
    pub extra_angles_deg: Vec<f64>,
    /// Coefficient the manual calibration is compared against.
    pub reference_coefficient: f64,
    /// Multiply centred loops by the hysteresis-calibration scale factor
    /// before deriving Kerr quantities.
    pub apply_scale: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            extra_angles_deg: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            reference_coefficient: DEFAULT_REFERENCE_COEFFICIENT,
            apply_scale: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeatureConfig {
    pub plateau: PlateauMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// 1-based experiments whose ellipticity centre changes sign
    /// (the analyzer was flipped to the other side of extinction).
    pub flip_ellipticity: Vec<usize>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            flip_ellipticity: vec![4, 5],
        }
    }
}

/// Keywords identifying the channel of a `<line>` block in the scan export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub rotation: Vec<String>,
    pub ellipticity: Vec<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            rotation: vec!["克尔转角".to_string(), "rotation".to_string()],
            ellipticity: vec!["克尔椭率".to_string(), "ellipticity".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.relation.flip_ellipticity, vec![4, 5]);
        assert_eq!(config.features.plateau, PlateauMethod::Extremes { count: 7 });
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "calibration": { "extra_angles_deg": [0, 2, 4] }, "plot": { "width": 640 } }"#,
        )
        .unwrap();

        let config = AnalysisConfig::load(Some(&path)).unwrap();
        assert_eq!(config.calibration.extra_angles_deg, vec![0.0, 2.0, 4.0]);
        assert_eq!(
            config.calibration.reference_coefficient,
            DEFAULT_REFERENCE_COEFFICIENT
        );
        assert_eq!(config.plot.width, 640);
        assert_eq!(config.plot.height, 800);
    }

    #[test]
    fn zero_based_flip_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.relation.flip_ellipticity = vec![0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn window_plateau_parses_from_json() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{ "features": { "plateau": { "method": "window", "window": 5, "threshold": 0.01 } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.features.plateau,
            PlateauMethod::Window {
                window: 5,
                threshold: 0.01
            }
        );
    }

    #[test]
    fn reference_comes_from_file_unless_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "calibration": { "reference_coefficient": 0.05 } }"#).unwrap();

        let mut config = AnalysisConfig::load(Some(&path)).unwrap();
        config.override_reference(None).unwrap();
        assert_eq!(config.calibration.reference_coefficient, 0.05);

        config.override_reference(Some(0.07)).unwrap();
        assert_eq!(config.calibration.reference_coefficient, 0.07);
        assert!(config.override_reference(Some(0.0)).is_err());
    }
}
