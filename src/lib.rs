//! Data reduction for magneto-optical Kerr effect (MOKE) measurements.
//!
//! The binaries in `src/bin` and `src/main.rs` are thin command-line shells
//! around [`pipeline`], [`analysis`] and [`figures`]; the optional result
//! viewer lives in [`app`], [`state`] and [`ui`].

pub mod analysis;
pub mod app;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod figures;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod state;
pub mod ui;

/// Initialise `env_logger` with `info` as the default level.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
