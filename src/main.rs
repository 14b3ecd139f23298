//! MOV Converter
//!
//! Main entry point for the application.

use std::path::PathBuf;

use mov_converter::app::ConverterApp;
use mov_converter::settings::Preferences;
use mov_converter::telemetry::{init_logging, LogConfig};

fn main() -> eframe::Result<()> {
    // Initialize logging; the guard flushes file output on exit
    let _log_guard = match init_logging(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Starting MOV Converter v{}", env!("CARGO_PKG_VERSION"));

    let preferences = Preferences::load();
    // Files handed over by the OS ("Open With") arrive as arguments
    let launch_files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([600.0, 400.0])
            .with_min_inner_size([480.0, 320.0])
            .with_title("MOV Converter"),
        ..Default::default()
    };

    eframe::run_native(
        "MOV Converter",
        native_options,
        Box::new(|cc| {
            let mut app = ConverterApp::new(cc, preferences);
            app.open_launch_files(launch_files);
            Box::new(app)
        }),
    )
}
