use eframe::egui::{self, Color32, ColorImage, TextureHandle, TextureOptions, Ui};
use egui_plot::{HLine, Legend, Line, Plot, PlotImage, PlotPoint, PlotPoints, Points};

use crate::color::Rgb;
use crate::plot::{Chart, Figure, Heatmap, SeriesStyle};
use crate::state::AppState;

fn color32(c: Rgb) -> Color32 {
    Color32::from_rgb(c.0, c.1, c.2)
}

/// Rescale finite values of `y` to [0, 1].
pub fn minmax(y: &[f64]) -> Vec<f64> {
    let finite = y.iter().copied().filter(|v| v.is_finite());
    let min = finite.clone().fold(f64::INFINITY, f64::min);
    let max = finite.fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range.abs() < f64::EPSILON {
        vec![0.0; y.len()]
    } else {
        y.iter().map(|&yi| (yi - min) / range).collect()
    }
}

// ---------------------------------------------------------------------------
// Heatmap textures
// ---------------------------------------------------------------------------

/// Texture of the heatmap last shown, keyed by chart generation and index.
#[derive(Default)]
pub struct TextureCache {
    key: Option<(u64, usize)>,
    handle: Option<TextureHandle>,
}

impl TextureCache {
    fn get(&mut self, ctx: &egui::Context, key: (u64, usize), map: &Heatmap) -> Option<TextureHandle> {
        if self.key != Some(key) {
            self.handle = heatmap_image(map).map(|img| ctx.load_texture("heatmap", img, TextureOptions::NEAREST));
            self.key = Some(key);
        }
        self.handle.clone()
    }
}

/// Heatmap cells as an RGBA image; row 0 of the image is the largest `y`.
fn heatmap_image(map: &Heatmap) -> Option<ColorImage> {
    let range = map.value_range()?;
    let width = map.x.len();
    let height = map.values.len();
    let mut rgba = Vec::with_capacity(width * height * 4);
    for row in map.values.iter().rev() {
        for col in 0..width {
            match row.get(col).copied().filter(|v| v.is_finite()) {
                Some(v) => {
                    let c = map.gradient.sample(map.normalise(v, range));
                    rgba.extend_from_slice(&[c.0, c.1, c.2, 255]);
                }
                None => rgba.extend_from_slice(&[0, 0, 0, 0]),
            }
        }
    }
    Some(ColorImage::from_rgba_unmultiplied([width, height], &rgba))
}

// ---------------------------------------------------------------------------
// Chart plot (central panel)
// ---------------------------------------------------------------------------

/// Render the selected chart in the central panel.
pub fn chart_plot(ui: &mut Ui, state: &AppState, textures: &mut TextureCache) {
    let Some(named) = state.current() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a scan to view results  (File → Open scan…)");
        });
        return;
    };

    match &named.chart {
        Chart::Figure(fig) => figure_plot(ui, fig, state),
        Chart::Heatmap(map) => {
            let key = (state.generation, state.selected);
            let texture = textures.get(ui.ctx(), key, map);
            heatmap_plot(ui, map, texture.as_ref());
        }
    }
}

fn figure_plot(ui: &mut Ui, fig: &Figure, state: &AppState) {
    let y_label = if state.minmax_scaling {
        format!("{} (min-max scaled)", fig.y_label)
    } else {
        fig.y_label.clone()
    };

    Plot::new("figure_plot")
        .legend(Legend::default())
        .x_axis_label(fig.x_label.as_str())
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            if !state.minmax_scaling {
                for h in &fig.hlines {
                    let mut line = HLine::new(h.y).color(color32(h.color).gamma_multiply(0.7));
                    if let Some(label) = &h.label {
                        line = line.name(label);
                    }
                    plot_ui.hline(line);
                }
            }

            for s in fig.series.iter().filter(|s| state.is_visible(&s.name)) {
                let color = color32(s.color);
                let y: Vec<f64> = s.points.iter().map(|p| p.1).collect();
                let y = if state.minmax_scaling { minmax(&y) } else { y };
                let pts = || -> PlotPoints {
                    s.points
                        .iter()
                        .zip(&y)
                        .map(|(&(xi, _), &yi)| [xi, yi])
                        .collect()
                };

                if matches!(s.style, SeriesStyle::Line | SeriesStyle::LinePoints) {
                    plot_ui.line(Line::new(pts()).name(&s.name).color(color).width(1.5));
                }
                if matches!(s.style, SeriesStyle::Points | SeriesStyle::LinePoints) {
                    plot_ui.points(Points::new(pts()).name(&s.name).color(color).radius(3.0));
                }
            }
        });
}

fn heatmap_plot(ui: &mut Ui, map: &Heatmap, texture: Option<&TextureHandle>) {
    let Some(texture) = texture else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No finite values in this map");
        });
        return;
    };

    let (dx, dy) = map.cell_size();
    let span = |v: &[f64], d: f64| {
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min) - d / 2.0;
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max) + d / 2.0;
        (lo, hi)
    };
    let (x0, x1) = span(&map.x, dx);
    let (y0, y1) = span(&map.y, dy);

    Plot::new("heatmap_plot")
        .legend(Legend::default())
        .x_axis_label(map.x_label.as_str())
        .y_axis_label(map.y_label.as_str())
        .data_aspect(1.0)
        .show(ui, |plot_ui| {
            plot_ui.image(PlotImage::new(
                texture,
                PlotPoint::new((x0 + x1) / 2.0, (y0 + y1) / 2.0),
                egui::vec2((x1 - x0) as f32, (y1 - y0) as f32),
            ));
            if let Some(h) = &map.hline {
                let mut line = HLine::new(h.y).color(color32(h.color)).width(2.0);
                if let Some(label) = &h.label {
                    line = line.name(label);
                }
                plot_ui.hline(line);
            }
        });
}
