use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::analysis::reflection::{DEFAULT_MAP_POINTS, parameter_map};
use crate::config::AnalysisConfig;
use crate::data::filter::ExperimentFilter;
use crate::figures;
use crate::pipeline::{Analysis, analyze};
use crate::plot::NamedChart;

/// Range of the relative refractive index offered by the viewer slider.
pub const INDEX_RANGE: std::ops::RangeInclusive<f64> = 1.0..=4.0;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Charts available in the selector, in display order.
    pub charts: Vec<NamedChart>,

    /// Index into `charts` of the chart shown in the central panel.
    pub selected: usize,

    /// Series names hidden in the current chart.
    pub hidden: BTreeSet<String>,

    /// Normalise every series to [0, 1] before plotting.
    pub minmax_scaling: bool,

    /// Settings used when a new scan is opened from the File menu.
    pub config: AnalysisConfig,

    /// Relative index of the reflection maps; `None` when the viewer does
    /// not show reflection maps.
    pub reflection_index: Option<f64>,

    /// Bumped whenever chart contents change, so cached heatmap textures
    /// are rebuilt.
    pub generation: u64,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            charts: Vec::new(),
            selected: 0,
            hidden: BTreeSet::new(),
            minmax_scaling: false,
            config: AnalysisConfig::default(),
            reflection_index: None,
            generation: 0,
            status_message: None,
        }
    }
}

impl AppState {
    pub fn with_charts(charts: Vec<NamedChart>) -> Self {
        let mut state = Self::default();
        state.set_charts(charts);
        state
    }

    /// Viewer state for the reflection maps at index `n`.
    pub fn for_reflection(n: f64) -> Self {
        let mut state = Self::default();
        state.set_reflection_index(n);
        state
    }

    pub fn current(&self) -> Option<&NamedChart> {
        self.charts.get(self.selected)
    }

    /// Replace every chart and reset the selection.
    pub fn set_charts(&mut self, charts: Vec<NamedChart>) {
        self.charts = charts;
        self.selected = 0;
        self.hidden.clear();
        self.generation += 1;
    }

    pub fn select(&mut self, index: usize) {
        if index < self.charts.len() && index != self.selected {
            self.selected = index;
            self.hidden.clear();
        }
    }

    pub fn toggle_series(&mut self, name: &str) {
        if !self.hidden.remove(name) {
            self.hidden.insert(name.to_string());
        }
    }

    pub fn is_visible(&self, name: &str) -> bool {
        !self.hidden.contains(name)
    }

    /// Recompute the reflection heatmaps for a new index, keeping the
    /// selected map.
    pub fn set_reflection_index(&mut self, n: f64) {
        let n = n.clamp(*INDEX_RANGE.start(), *INDEX_RANGE.end());
        let selected = self.selected;
        self.reflection_index = Some(n);
        self.charts = figures::reflection_heatmaps(&parameter_map(n, DEFAULT_MAP_POINTS));
        self.selected = selected.min(self.charts.len().saturating_sub(1));
        self.generation += 1;
    }

    /// Ingest a reduced session.
    pub fn set_analysis(&mut self, analysis: &Analysis) {
        self.reflection_index = None;
        self.set_charts(figures::pipeline_charts(analysis));
        self.status_message = None;
    }

    /// Load and reduce a scan file with the current settings.
    pub fn open_scan(&mut self, path: PathBuf) {
        let result = crate::data::loader::load_file(&path, &self.config.markers).and_then(|set| {
            analyze(&set, &self.config, &ExperimentFilter::all()).map_err(anyhow::Error::from)
        });
        match result {
            Ok(analysis) => {
                log::info!(
                    "Loaded {} with {} experiments",
                    path.display(),
                    analysis.experiment_numbers().len()
                );
                self.set_analysis(&analysis);
            }
            Err(e) => {
                log::error!("Failed to load file: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
}
