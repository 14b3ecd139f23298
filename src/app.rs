//! Converter window.
//!
//! A drop zone for a single MOV file, an output chooser, a progress bar and a
//! blocking alert. All conversion work happens on the coordinator's worker
//! thread; this window only polls its events once per frame.

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui::{self, Color32, RichText, Vec2};

use crate::converter::{
    is_supported_input, output_path_for, suggested_file_name, with_mp4_extension,
    ConversionEvent, ConversionHandle, ConversionOutcome, ConversionProgress, ConversionRequest,
    ConvertError, TranscodeCoordinator,
};
use crate::settings::Preferences;

/// Message shown in a blocking alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    fn from_error(error: &ConvertError) -> Self {
        Self::new(error.title(), error.to_string())
    }
}

/// Main application state
pub struct ConverterApp {
    coordinator: Option<Arc<TranscodeCoordinator>>,
    /// Why no coordinator could be built (FFmpeg missing)
    backend_error: Option<String>,
    preferences: Preferences,

    input: Option<PathBuf>,
    output: Option<PathBuf>,
    job: Option<ConversionHandle>,
    progress: ConversionProgress,
    alert: Option<Alert>,
}

impl ConverterApp {
    /// Create the window, locating FFmpeg from the preferences.
    pub fn new(_cc: &eframe::CreationContext<'_>, preferences: Preferences) -> Self {
        match preferences.ffmpeg_backend() {
            Ok(backend) => {
                let coordinator = Arc::new(TranscodeCoordinator::new(backend));
                Self::with_coordinator(Some(coordinator), preferences)
            }
            Err(e) => {
                tracing::error!(error = %e, "No conversion backend available");
                let mut app = Self::with_coordinator(None, preferences);
                app.backend_error = Some(e.to_string());
                app
            }
        }
    }

    pub fn with_coordinator(
        coordinator: Option<Arc<TranscodeCoordinator>>,
        preferences: Preferences,
    ) -> Self {
        Self {
            coordinator,
            backend_error: None,
            preferences,
            input: None,
            output: None,
            job: None,
            progress: ConversionProgress::default(),
            alert: None,
        }
    }

    pub fn is_converting(&self) -> bool {
        self.job.is_some()
    }

    pub fn can_convert(&self) -> bool {
        self.coordinator.is_some()
            && self.input.is_some()
            && self.output.is_some()
            && !self.is_converting()
    }

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    pub fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }

    /// Accept a dropped or picked file.
    pub fn accept_input(&mut self, path: PathBuf) {
        if self.is_converting() {
            return;
        }
        if !is_supported_input(&path) {
            tracing::debug!(path = %path.display(), "Rejected non-MOV input");
            self.alert = Some(Alert::new("Invalid File", "Please select a MOV file"));
            return;
        }

        self.output = self
            .preferences
            .default_output_dir()
            .map(|dir| output_path_for(&path, dir));
        self.input = Some(path);
    }

    /// Load a file the OS asked us to open (passed on the command line).
    ///
    /// Only the first MOV among `paths` is taken; anything else is ignored
    /// without an alert.
    pub fn open_launch_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        if let Some(path) = paths.into_iter().find(|p| is_supported_input(p)) {
            tracing::info!(path = %path.display(), "Opening file from launch arguments");
            self.accept_input(path);
        }
    }

    pub fn set_output(&mut self, path: PathBuf) {
        self.output = Some(with_mp4_extension(path));
    }

    /// Remember a default output folder and persist it.
    pub fn set_default_output_dir(&mut self, dir: PathBuf) {
        self.preferences.set_default_output_dir(dir);
        if let Err(e) = self.preferences.save() {
            tracing::warn!(error = %e, "Failed to save preferences");
        }
        if let (Some(input), Some(dir), None) = (
            self.input.as_ref(),
            self.preferences.default_output_dir(),
            self.output.as_ref(),
        ) {
            self.output = Some(output_path_for(input, dir));
        }
    }

    /// Kick off the conversion on the coordinator's worker thread.
    pub fn start_conversion(&mut self) {
        if !self.can_convert() {
            return;
        }
        let (Some(coordinator), Some(input), Some(output)) =
            (self.coordinator.as_ref(), self.input.clone(), self.output.clone())
        else {
            return;
        };

        self.progress = ConversionProgress::default();
        self.job = Some(coordinator.spawn(ConversionRequest::new(input, output)));
    }

    pub fn cancel_conversion(&self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }

    /// Drain worker events (non-blocking).
    pub fn poll_job(&mut self) {
        let events = match &self.job {
            Some(job) => job.poll_events(),
            None => return,
        };
        for event in events {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: ConversionEvent) {
        match event {
            ConversionEvent::Progress(progress) => self.progress = progress,
            ConversionEvent::Finished(outcome) => {
                self.job = None;
                match outcome {
                    ConversionOutcome::Success => {
                        self.input = None;
                        let message = match self.output.take() {
                            Some(output) => format!(
                                "Video converted successfully!\n\nThe file has been saved to:\n{}",
                                output.display()
                            ),
                            None => "Video converted successfully!".to_string(),
                        };
                        self.alert = Some(Alert::new("Success", message));
                    }
                    ConversionOutcome::Failure(e) => {
                        self.alert = Some(Alert::from_error(&e));
                    }
                }
            }
        }
    }

    /// Show the drop zone.
    fn show_drop_zone(&mut self, ui: &mut egui::Ui) {
        let is_hovering = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());
        let stroke_color = if is_hovering {
            Color32::from_rgb(100, 160, 255)
        } else {
            Color32::GRAY
        };

        egui::Frame::none()
            .stroke(egui::Stroke::new(2.0, stroke_color))
            .rounding(10.0)
            .fill(ui.visuals().faint_bg_color)
            .inner_margin(16.0)
            .show(ui, |ui| {
                ui.set_min_size(Vec2::new(ui.available_width(), 200.0));
                ui.vertical_centered(|ui| {
                    ui.add_space(40.0);
                    match &self.input {
                        Some(input) => {
                            ui.label(RichText::new("🎬").size(40.0));
                            let name = input
                                .file_name()
                                .map(|s| s.to_string_lossy().to_string())
                                .unwrap_or_default();
                            ui.label(RichText::new(name).strong());

                            if self.is_converting() {
                                ui.add_space(10.0);
                                ui.add_sized(
                                    Vec2::new(200.0, 12.0),
                                    egui::ProgressBar::new(self.progress.fraction() as f32),
                                );
                                ui.label(RichText::new(format!("{}%", self.progress.percent())).small());
                            }
                        }
                        None => {
                            ui.label(RichText::new("⬇").size(40.0).color(Color32::GRAY));
                            ui.label(RichText::new("Drop MOV file here").color(Color32::GRAY));
                        }
                    }
                });
            });
    }

    /// Show output path and control buttons.
    fn show_controls(&mut self, ui: &mut egui::Ui) {
        if let Some(output) = &self.output {
            ui.horizontal(|ui| {
                ui.label("Output:");
                ui.label(RichText::new(output.display().to_string()).monospace().small());
            });
        }

        ui.horizontal(|ui| {
            ui.add_enabled_ui(!self.is_converting(), |ui| {
                if ui.button("📂 Open MOV…").clicked() {
                    self.open_file_dialog();
                }
            });

            ui.add_enabled_ui(self.input.is_some() && !self.is_converting(), |ui| {
                if ui.button("Choose Output Location").clicked() {
                    self.open_save_dialog();
                }
            });

            if ui
                .add_enabled(self.can_convert(), egui::Button::new("▶ Convert"))
                .clicked()
            {
                self.start_conversion();
            }

            if self.is_converting() && ui.button("⏹ Cancel").clicked() {
                self.cancel_conversion();
            }
        });

        ui.horizontal(|ui| {
            if ui.button("📁 Set Default Output Folder").clicked() {
                self.open_folder_dialog();
            }
            if let Some(dir) = self.preferences.default_output_dir() {
                ui.label(RichText::new(dir.display().to_string()).small().color(Color32::GRAY));
            }
        });
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        let Some(alert) = self.alert.clone() else {
            return;
        };

        egui::Window::new(alert.title)
            .id(egui::Id::new("converter_alert"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(alert.message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    self.alert = None;
                }
            });
    }

    /// Handle dropped files.
    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Option<PathBuf> =
            ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.accept_input(path);
        }
    }

    fn open_file_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("QuickTime Movie", &["mov", "MOV"])
            .pick_file()
        {
            self.accept_input(path);
        }
    }

    fn open_save_dialog(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .add_filter("MPEG-4 Movie", &["mp4"])
            .set_title("Save MP4 Video")
            .set_file_name(suggested_file_name(self.input.as_deref()));
        if let Some(dir) = self.preferences.default_output_dir() {
            dialog = dialog.set_directory(dir);
        }

        if let Some(path) = dialog.save_file() {
            self.set_output(path);
        }
    }

    fn open_folder_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new().pick_folder() {
            self.set_default_output_dir(path);
        }
    }
}

impl eframe::App for ConverterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_job();

        if self.alert.is_none() {
            self.handle_dropped_files(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(error) = &self.backend_error {
                ui.horizontal(|ui| {
                    ui.label(RichText::new("⚠").color(Color32::YELLOW));
                    ui.label(RichText::new(error).color(Color32::YELLOW).small());
                });
                ui.separator();
            }

            ui.add_enabled_ui(self.alert.is_none(), |ui| {
                self.show_drop_zone(ui);
                ui.add_space(12.0);
                self.show_controls(ui);
            });
        });

        self.show_alert(ctx);

        // Request repaint while converting
        if self.is_converting() {
            ctx.request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{ExportSessionBackend, ExportStatus};
    use crate::converter::export::scripted::ScriptedFactory;
    use std::fs;
    use std::time::{Duration, Instant};

    fn app_with_steps(steps: Vec<(f32, ExportStatus)>) -> ConverterApp {
        let backend =
            ExportSessionBackend::new(ScriptedFactory::new(steps)).with_poll_interval(Duration::from_millis(1));
        ConverterApp::with_coordinator(
            Some(Arc::new(TranscodeCoordinator::new(backend))),
            Preferences::default(),
        )
    }

    fn wait_for_job(app: &mut ConverterApp) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.is_converting() && Instant::now() < deadline {
            app.poll_job();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_rejects_non_mov_drop() {
        let mut app = ConverterApp::with_coordinator(None, Preferences::default());
        app.accept_input(PathBuf::from("/videos/clip.mp4"));
        assert_eq!(
            app.alert(),
            Some(&Alert::new("Invalid File", "Please select a MOV file"))
        );
        assert!(!app.can_convert());
    }

    #[test]
    fn test_default_output_dir_prefills_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut prefs = Preferences::default();
        prefs.set_default_output_dir(dir.path().to_path_buf());

        let mut app = ConverterApp::with_coordinator(None, prefs);
        app.accept_input(PathBuf::from("/videos/Beach.MOV"));
        assert_eq!(app.output(), Some(&dir.path().join("Beach.mp4")));
        assert!(app.alert().is_none());
    }

    #[test]
    fn test_launch_arguments_take_first_mov() {
        let mut app = ConverterApp::with_coordinator(None, Preferences::default());
        app.open_launch_files(vec![
            PathBuf::from("--verbose"),
            PathBuf::from("/videos/notes.txt"),
            PathBuf::from("/videos/Beach.MOV"),
            PathBuf::from("/videos/Second.mov"),
        ]);
        assert_eq!(app.input, Some(PathBuf::from("/videos/Beach.MOV")));
        assert!(app.alert().is_none());

        let mut app = ConverterApp::with_coordinator(None, Preferences::default());
        app.open_launch_files(vec![PathBuf::from("/videos/clip.mp4")]);
        assert!(app.input.is_none());
        assert!(app.alert().is_none());
    }

    #[test]
    fn test_chosen_output_gets_mp4_extension() {
        let mut app = ConverterApp::with_coordinator(None, Preferences::default());
        app.set_output(PathBuf::from("/out/holiday"));
        assert_eq!(app.output(), Some(&PathBuf::from("/out/holiday.mp4")));
    }

    #[test]
    fn test_successful_conversion_resets_and_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        fs::write(&input, b"mov").unwrap();

        let mut app = app_with_steps(vec![(0.5, ExportStatus::Exporting), (1.0, ExportStatus::Completed)]);
        app.accept_input(input);
        app.set_output(dir.path().join("clip.mp4"));
        assert!(app.can_convert());

        app.start_conversion();
        assert!(app.is_converting());
        assert!(!app.can_convert());
        wait_for_job(&mut app);

        let saved_to = dir.path().join("clip.mp4");
        assert_eq!(
            app.alert(),
            Some(&Alert::new(
                "Success",
                format!(
                    "Video converted successfully!\n\nThe file has been saved to:\n{}",
                    saved_to.display()
                )
            ))
        );
        assert!(app.output().is_none());
        assert!(app.progress.is_complete());
    }

    #[test]
    fn test_failed_conversion_shows_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_steps(vec![(1.0, ExportStatus::Completed)]);
        app.accept_input(dir.path().join("vanished.mov"));
        app.set_output(dir.path().join("vanished.mp4"));

        app.start_conversion();
        wait_for_job(&mut app);

        let alert = app.alert().unwrap();
        assert_eq!(alert.title, "File Not Found");
        assert!(app.output().is_some());
    }
}
