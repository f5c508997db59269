use anyhow::{Result, anyhow};
use eframe::egui;

use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MokeViewerApp {
    pub state: AppState,
    textures: plot::TextureCache,
}

impl MokeViewerApp {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            textures: plot::TextureCache::default(),
        }
    }
}

impl eframe::App for MokeViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: chart selection ----
        egui::SidePanel::left("chart_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: plot ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::chart_plot(ui, &self.state, &mut self.textures);
        });
    }
}

/// Open the viewer window and block until it is closed.
pub fn run_viewer(title: &str, state: AppState) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(|_cc| Ok(Box::new(MokeViewerApp::new(state)))),
    )
    .map_err(|e| anyhow!("viewer failed: {e}"))
}
