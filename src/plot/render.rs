use std::error::Error;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use plotters::prelude::*;

use super::{Chart, Figure, Heatmap, NamedChart, SeriesStyle};
use crate::color::Rgb;

fn rgb(c: Rgb) -> RGBColor {
    RGBColor(c.0, c.1, c.2)
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Render one chart to a PNG file.
pub fn render_chart(chart: &Chart, path: &Path, size: (u32, u32)) -> Result<()> {
    let drawn = match chart {
        Chart::Figure(fig) => draw_figure(fig, path, size),
        Chart::Heatmap(map) => draw_heatmap(map, path, size),
    };
    drawn.map_err(|e| anyhow!("rendering {}: {e}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Render every chart as `<out_dir>/<name>.png`. Charts without finite data
/// are skipped with a warning.
pub fn render_all(charts: &[NamedChart], out_dir: &Path, size: (u32, u32)) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let mut written = Vec::with_capacity(charts.len());
    for named in charts {
        if !named.chart.has_data() {
            log::warn!("Skipping '{}': nothing finite to plot", named.chart.title());
            continue;
        }
        let path = out_dir.join(format!("{}.png", named.name));
        render_chart(&named.chart, &path, size)?;
        written.push(path);
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Line / scatter
// ---------------------------------------------------------------------------

fn draw_figure(fig: &Figure, path: &Path, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let ((x0, x1), (y0, y1)) = fig
        .bounds()
        .ok_or_else(|| format!("figure '{}' has no finite points", fig.title))?;

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&fig.title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(75)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc(fig.x_label.as_str())
        .y_desc(fig.y_label.as_str())
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    let mut labelled = false;
    for h in &fig.hlines {
        let color = rgb(h.color);
        let anno = chart.draw_series(std::iter::once(PathElement::new(
            vec![(x0, h.y), (x1, h.y)],
            color.mix(0.7).stroke_width(1),
        )))?;
        if let Some(label) = &h.label {
            anno.label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.mix(0.7)));
            labelled = true;
        }
    }

    for s in &fig.series {
        let color = rgb(s.color);
        let finite: Vec<(f64, f64)> = s
            .points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();

        let anno = match s.style {
            SeriesStyle::Line => chart.draw_series(LineSeries::new(finite, color.stroke_width(2)))?,
            SeriesStyle::Points => chart.draw_series(
                finite.into_iter().map(|p| Circle::new(p, 4, color.filled())),
            )?,
            SeriesStyle::LinePoints => {
                chart.draw_series(finite.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
                chart.draw_series(LineSeries::new(finite, color.stroke_width(2)))?
            }
        };
        if !s.name.is_empty() {
            labelled = true;
            match s.style {
                SeriesStyle::Points => anno
                    .label(s.name.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled())),
                _ => anno
                    .label(s.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))),
            };
        }
    }

    if labelled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 15))
            .draw()?;
    }

    root.present()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Heatmap with colour bar
// ---------------------------------------------------------------------------

fn draw_heatmap(map: &Heatmap, path: &Path, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let (lo, hi) = map
        .value_range()
        .ok_or_else(|| format!("heatmap '{}' has no finite cells", map.title))?;
    let (dx, dy) = map.cell_size();
    let span = |v: &[f64], d: f64| {
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo - d / 2.0, hi + d / 2.0)
    };
    let (x0, x1) = span(&map.x, dx);
    let (y0, y1) = span(&map.y, dy);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let (main_area, bar_area) = root.split_horizontally(size.0.saturating_sub(130));

    let mut chart = ChartBuilder::on(&main_area)
        .caption(&map.title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(65)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(map.x_label.as_str())
        .y_desc(map.y_label.as_str())
        .label_style(("sans-serif", 16))
        .draw()?;

    chart.draw_series(map.values.iter().zip(&map.y).flat_map(|(row, &y)| {
        row.iter()
            .zip(&map.x)
            .filter(|(v, _)| v.is_finite())
            .map(move |(&v, &x)| {
                let c = rgb(map.gradient.sample(map.normalise(v, (lo, hi))));
                Rectangle::new(
                    [(x - dx / 2.0, y - dy / 2.0), (x + dx / 2.0, y + dy / 2.0)],
                    c.filled(),
                )
            })
    }))?;

    if let Some(h) = &map.hline {
        let color = rgb(h.color);
        let anno = chart.draw_series(std::iter::once(PathElement::new(
            vec![(x0, h.y), (x1, h.y)],
            color.stroke_width(2),
        )))?;
        if let Some(label) = &h.label {
            anno.label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }

    // Colour bar.
    let bar_hi = if hi > lo { hi } else { lo + 1.0 };
    let mut bar = ChartBuilder::on(&bar_area)
        .margin_top(55)
        .margin_bottom(65)
        .margin_right(10)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..1.0, lo..bar_hi)?;
    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(map.value_label.as_str())
        .label_style(("sans-serif", 14))
        .draw()?;
    const STEPS: usize = 100;
    let step = (bar_hi - lo) / STEPS as f64;
    bar.draw_series((0..STEPS).map(|i| {
        let v = lo + step * i as f64;
        let c = rgb(map.gradient.sample(i as f64 / (STEPS - 1) as f64));
        Rectangle::new([(0.0, v), (1.0, v + step)], c.filled())
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::reflection::parameter_map;
    use crate::color::Gradient;
    use crate::figures::reflection_heatmaps;
    use crate::plot::Series;

    fn non_empty(path: &Path) -> bool {
        std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
    }

    fn two_loops() -> Figure {
        let up: Vec<(f64, f64)> = (-5..=5).map(|h| (h as f64, (h as f64 / 2.0).tanh())).collect();
        let down: Vec<(f64, f64)> = up.iter().map(|&(h, m)| (h, -m)).collect();
        Figure::new("loops", "H (mT)", "θ (deg)")
            .with_series(Series::line("up", up, Rgb::BLACK))
            .with_series(Series::points("down", down, Rgb::GRAY))
            .with_hline(0.9, Some("plateau".into()), Rgb::RED)
    }

    #[test]
    fn empty_figure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let chart = Chart::Figure(Figure::new("empty", "x", "y"));
        let err = render_chart(&chart, &dir.path().join("empty.png"), (400, 300)).unwrap_err();
        assert!(err.to_string().contains("no finite points"));
    }

    #[test]
    fn empty_heatmap_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let chart = Chart::Heatmap(Heatmap {
            title: "nan".into(),
            x_label: "x".into(),
            y_label: "y".into(),
            value_label: "v".into(),
            x: vec![0.0],
            y: vec![0.0],
            values: vec![vec![f64::NAN]],
            gradient: Gradient::Plasma,
            hline: None,
        });
        assert!(render_chart(&chart, &dir.path().join("nan.png"), (400, 300)).is_err());
    }

    #[test]
    fn render_all_creates_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plots");
        let written = render_all(&[], &out, (400, 300)).unwrap();
        assert!(written.is_empty());
        assert!(out.is_dir());
    }

    #[test]
    fn figure_with_reference_line_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loops.png");
        render_chart(&Chart::Figure(two_loops()), &path, (640, 480)).unwrap();
        assert!(non_empty(&path));
    }

    #[test]
    fn reflection_maps_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let maps = reflection_heatmaps(&parameter_map(1.5, 10));
        assert!(!maps.is_empty());
        let written = render_all(&maps, dir.path(), (640, 480)).unwrap();
        assert_eq!(written.len(), maps.len());
        for (path, named) in written.iter().zip(&maps) {
            assert_eq!(path, &dir.path().join(format!("{}.png", named.name)));
            assert!(non_empty(path), "{} is empty", path.display());
        }
    }

    #[test]
    fn render_all_skips_charts_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let charts = [
            NamedChart::figure("empty", Figure::new("empty", "x", "y")),
            NamedChart::figure("loops", two_loops()),
        ];
        let written = render_all(&charts, dir.path(), (640, 480)).unwrap();
        assert_eq!(written, vec![dir.path().join("loops.png")]);
        assert!(!dir.path().join("empty.png").exists());
        assert!(non_empty(&written[0]));
    }
}
