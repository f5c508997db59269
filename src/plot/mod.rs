/// Backend-neutral description of every chart the tools produce.
///
/// The same [`Chart`] is rendered to PNG by [`render`] and shown live by the
/// viewer in `ui::plot`.
pub mod render;

use crate::color::{Gradient, Rgb};

// ---------------------------------------------------------------------------
// Line / scatter figures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    Line,
    Points,
    LinePoints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
    pub color: Rgb,
    pub style: SeriesStyle,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<(f64, f64)>, color: Rgb, style: SeriesStyle) -> Self {
        Self {
            name: name.into(),
            points,
            color,
            style,
        }
    }

    pub fn line(name: impl Into<String>, points: Vec<(f64, f64)>, color: Rgb) -> Self {
        Self::new(name, points, color, SeriesStyle::Line)
    }

    pub fn points(name: impl Into<String>, points: Vec<(f64, f64)>, color: Rgb) -> Self {
        Self::new(name, points, color, SeriesStyle::Points)
    }
}

/// Horizontal reference line, e.g. a plateau level or a critical angle.
#[derive(Debug, Clone, PartialEq)]
pub struct HLine {
    pub y: f64,
    pub label: Option<String>,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub hlines: Vec<HLine>,
    /// Start the y axis at zero (saturation statistics).
    pub y_from_zero: bool,
}

impl Figure {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            series: Vec::new(),
            hlines: Vec::new(),
            y_from_zero: false,
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_hline(mut self, y: f64, label: Option<String>, color: Rgb) -> Self {
        self.hlines.push(HLine { y, label, color });
        self
    }

    /// Data bounds `((x_min, x_max), (y_min, y_max))` over finite points,
    /// padded so degenerate ranges still draw. `None` when nothing is finite.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let pts = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .filter(|(x, y)| x.is_finite() && y.is_finite());
        let (mut x0, mut x1, mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in pts {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        if !x0.is_finite() {
            return None;
        }
        for h in self.hlines.iter().filter(|h| h.y.is_finite()) {
            y0 = y0.min(h.y);
            y1 = y1.max(h.y);
        }
        if self.y_from_zero {
            y0 = y0.min(0.0);
        }
        Some((pad(x0, x1, 0.02), pad(y0, y1, 0.08)))
    }
}

fn pad(lo: f64, hi: f64, frac: f64) -> (f64, f64) {
    let span = hi - lo;
    if span <= f64::EPSILON * hi.abs().max(1.0) {
        let d = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        return (lo - d, hi + d);
    }
    (lo - span * frac, hi + span * frac)
}

// ---------------------------------------------------------------------------
// Heatmaps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub value_label: String,
    /// Column coordinates.
    pub x: Vec<f64>,
    /// Row coordinates.
    pub y: Vec<f64>,
    /// `values[row][col]`; NaN cells are left blank.
    pub values: Vec<Vec<f64>>,
    pub gradient: Gradient,
    pub hline: Option<HLine>,
}

impl Heatmap {
    /// Min and max over finite cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut it = self.values.iter().flatten().copied().filter(|v| v.is_finite());
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Normalised position of `v` inside the value range.
    pub fn normalise(&self, v: f64, (lo, hi): (f64, f64)) -> f64 {
        if hi > lo { (v - lo) / (hi - lo) } else { 0.5 }
    }

    /// Width and height of one cell, from the grid spacing.
    pub fn cell_size(&self) -> (f64, f64) {
        let step = |v: &[f64]| match v {
            [a, b, ..] => (b - a).abs(),
            _ => 1.0,
        };
        (step(&self.x), step(&self.y))
    }
}

// ---------------------------------------------------------------------------
// Named charts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    Figure(Figure),
    Heatmap(Heatmap),
}

impl Chart {
    pub fn title(&self) -> &str {
        match self {
            Chart::Figure(f) => &f.title,
            Chart::Heatmap(h) => &h.title,
        }
    }

    /// Whether there is anything finite to draw.
    pub fn has_data(&self) -> bool {
        match self {
            Chart::Figure(f) => f.bounds().is_some(),
            Chart::Heatmap(h) => h.value_range().is_some(),
        }
    }
}

/// A chart together with the file stem it is saved under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedChart {
    pub name: String,
    pub chart: Chart,
}

impl NamedChart {
    pub fn figure(name: impl Into<String>, figure: Figure) -> Self {
        Self {
            name: name.into(),
            chart: Chart::Figure(figure),
        }
    }

    pub fn heatmap(name: impl Into<String>, heatmap: Heatmap) -> Self {
        Self {
            name: name.into(),
            chart: Chart::Heatmap(heatmap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_include_reference_lines_and_zero() {
        let mut fig = Figure::new("t", "x", "y")
            .with_series(Series::line("a", vec![(0.0, 1.0), (2.0, 3.0), (f64::NAN, 9.0)], Rgb::BLACK))
            .with_hline(5.0, None, Rgb::RED);
        fig.y_from_zero = true;
        let ((x0, x1), (y0, y1)) = fig.bounds().unwrap();
        assert!(x0 < 0.0 && x1 > 2.0);
        assert!(y0 < 0.0 && y1 > 5.0);
        assert!(y1 < 9.0);
    }

    #[test]
    fn empty_figure_has_no_bounds() {
        assert!(Figure::new("t", "x", "y").bounds().is_none());
    }

    #[test]
    fn single_point_is_padded() {
        let fig = Figure::new("t", "x", "y").with_series(Series::points("p", vec![(1.0, 1.0)], Rgb::BLACK));
        let ((x0, x1), (y0, y1)) = fig.bounds().unwrap();
        assert!(x0 < 1.0 && x1 > 1.0 && y0 < 1.0 && y1 > 1.0);
    }

    #[test]
    fn heatmap_range_ignores_nan() {
        let h = Heatmap {
            title: "h".into(),
            x_label: "x".into(),
            y_label: "y".into(),
            value_label: "v".into(),
            x: vec![0.0, 0.5],
            y: vec![0.0, 2.0],
            values: vec![vec![1.0, f64::NAN], vec![-2.0, 4.0]],
            gradient: Gradient::Viridis,
            hline: None,
        };
        assert_eq!(h.value_range(), Some((-2.0, 4.0)));
        assert_eq!(h.cell_size(), (0.5, 2.0));
        assert_eq!(h.normalise(1.0, (-2.0, 4.0)), 0.5);
    }
}
