use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::plot::render::{render_all, render_chart};
use crate::plot::Chart;
use crate::state::{AppState, INDEX_RANGE};

// ---------------------------------------------------------------------------
// Left side panel – chart selector and series toggles
// ---------------------------------------------------------------------------

/// Render the left chart panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Charts");
    ui.separator();

    if state.charts.is_empty() {
        ui.label("Nothing loaded.");
        return;
    }

    if let Some(n) = state.reflection_index {
        let mut value = n;
        ui.strong("Relative index n");
        let changed = ui
            .add(egui::Slider::new(&mut value, INDEX_RANGE).step_by(0.01))
            .changed();
        if changed {
            state.set_reflection_index(value);
        }
        ui.separator();
    }

    let titles: Vec<String> = state.charts.iter().map(|c| c.chart.title().to_string()).collect();
    egui::ComboBox::from_id_salt("chart_select")
        .selected_text(titles.get(state.selected).cloned().unwrap_or_default())
        .width(ui.available_width())
        .show_ui(ui, |ui: &mut Ui| {
            for (i, title) in titles.iter().enumerate() {
                if ui.selectable_label(state.selected == i, title).clicked() {
                    state.select(i);
                }
            }
        });
    ui.separator();

    let (series, range): (Vec<(String, Color32)>, Option<String>) = match state.current().map(|c| &c.chart) {
        Some(Chart::Figure(fig)) => (
            fig.series
                .iter()
                .map(|s| (s.name.clone(), Color32::from_rgb(s.color.0, s.color.1, s.color.2)))
                .collect(),
            None,
        ),
        Some(Chart::Heatmap(map)) => (
            Vec::new(),
            map.value_range()
                .map(|(lo, hi)| format!("{}: {lo:.3} … {hi:.3}", map.value_label)),
        ),
        None => return,
    };

    if let Some(range) = range {
        ui.label(range);
        return;
    }

    egui::CollapsingHeader::new(RichText::new(format!("Series  ({})", series.len())).strong())
        .id_salt("series")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ScrollArea::vertical()
                .auto_shrink([false, true])
                .show(ui, |ui: &mut Ui| {
                    for (name, color) in &series {
                        let mut checked = state.is_visible(name);
                        if ui.checkbox(&mut checked, RichText::new(name).color(*color)).changed() {
                            state.toggle_series(name);
                        }
                    }
                });
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open scan…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            let has_charts = !state.charts.is_empty();
            if ui.add_enabled(has_charts, egui::Button::new("Save PNG…")).clicked() {
                save_current_dialog(state);
                ui.close_menu();
            }
            if ui.add_enabled(has_charts, egui::Button::new("Save all PNGs…")).clicked() {
                save_all_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if !state.charts.is_empty() {
            ui.label(format!("{} charts", state.charts.len()));
        }

        ui.separator();

        if ui
            .selectable_label(state.minmax_scaling, "Min-Max Scaling")
            .clicked()
        {
            state.minmax_scaling = !state.minmax_scaling;
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open MOKE scan")
        .add_filter("Supported files", &["txt", "dat", "csv", "json"])
        .add_filter("Scan export", &["txt", "dat"])
        .add_filter("CSV", &["csv"])
        .add_filter("JSON", &["json"])
        .pick_file();

    if let Some(path) = file {
        state.open_scan(path);
    }
}

fn plot_size(state: &AppState) -> (u32, u32) {
    (state.config.plot.width, state.config.plot.height)
}

pub fn save_current_dialog(state: &mut AppState) {
    let Some(current) = state.current() else {
        return;
    };
    let file = rfd::FileDialog::new()
        .set_title("Save chart as PNG")
        .add_filter("PNG", &["png"])
        .set_file_name(format!("{}.png", current.name))
        .save_file();

    if let Some(path) = file {
        if let Err(e) = render_chart(&current.chart, &path, plot_size(state)) {
            log::error!("Failed to save chart: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}

pub fn save_all_dialog(state: &mut AppState) {
    let dir = rfd::FileDialog::new()
        .set_title("Save all charts into folder")
        .pick_folder();

    if let Some(dir) = dir {
        match render_all(&state.charts, &dir, plot_size(state)) {
            Ok(written) => {
                state.status_message = Some(format!("Saved {} charts to {}", written.len(), dir.display()));
            }
            Err(e) => {
                log::error!("Failed to save charts: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
}
