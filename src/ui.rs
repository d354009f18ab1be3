//! # Window
//!
//! The eframe front end: an input box, a read-only output pane, "Process text"
//! and "Export" buttons, a status line and a modal error dialog. A side panel
//! browses the store read-only: terms per category and a lookup by term.
//!
//! Actions run on the UI thread. A click only queues the action on the
//! [`Shell`]; the frame after it has been painted with the busy status runs it.

use eframe::{App, NativeOptions, egui};

use crate::{
    error::VocabularyError,
    models::Term,
    shell::{ActionOutcome, Shell, ShellState},
};

pub const WINDOW_TITLE: &str = "Text to Vocabulary";

struct ErrorDialog {
    title: &'static str,
    message: String,
}

/// Cached reads for the store panel, refreshed after each action.
#[derive(Default)]
struct StoreView {
    categories: Vec<(String, i64)>,
    /// `None` lists every category.
    selected: Option<String>,
    terms: Vec<Term>,
    lookup: String,
    lookup_result: Option<String>,
}

pub struct VocabularyApp {
    shell: Shell,
    input: String,
    output: String,
    status: String,
    dialog: Option<ErrorDialog>,
    busy_frame_painted: bool,
    store_view: StoreView,
}

impl VocabularyApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, shell: Shell) -> Self {
        let mut output = String::new();
        let mut status = "Ready.".to_string();

        if let Some(report) = shell.import_report() {
            if !report.files_imported.is_empty() {
                status = format!(
                    "Imported {} terms from {} existing spreadsheet(s).",
                    report.rows(),
                    report.files_imported.len()
                );
            }
            for warning in &report.warnings {
                output.push_str(&format!("{warning}\n"));
            }
        }

        let mut app = Self {
            shell,
            input: String::new(),
            output,
            status,
            dialog: None,
            busy_frame_painted: false,
            store_view: StoreView::default(),
        };
        app.refresh_store_view();
        app
    }

    fn refresh_store_view(&mut self) {
        if let Err(err) = self.read_store_view() {
            self.show_error(&err);
        }
    }

    fn read_store_view(&mut self) -> Result<(), VocabularyError> {
        let categories = self.shell.category_counts()?;
        let still_known = |name: &String| categories.iter().any(|(known, _)| known == name);
        if !self.store_view.selected.as_ref().is_none_or(still_known) {
            self.store_view.selected = None;
        }
        self.store_view.terms = self.shell.terms(self.store_view.selected.as_deref())?;
        self.store_view.categories = categories;
        Ok(())
    }

    fn on_lookup(&mut self) {
        let wanted = self.store_view.lookup.trim().to_string();
        if wanted.is_empty() {
            self.store_view.lookup_result = None;
            return;
        }
        match self.shell.lookup(&wanted) {
            Ok(Some(term)) => {
                self.store_view.lookup_result = Some(format!("{}: {}", term.term, term.category));
            }
            Ok(None) => self.store_view.lookup_result = Some(format!("\"{wanted}\" is not stored")),
            Err(err) => self.show_error(&err),
        }
    }

    fn store_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Stored");

        let mut selected = self.store_view.selected.clone();
        let label = match &selected {
            Some(name) => name.clone(),
            None => "All categories".to_string(),
        };
        egui::ComboBox::from_id_source("category_picker")
            .selected_text(label)
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut selected, None, "All categories");
                for (name, count) in &self.store_view.categories {
                    let text = format!("{name} ({count})");
                    ui.selectable_value(&mut selected, Some(name.clone()), text);
                }
            });
        if selected != self.store_view.selected {
            self.store_view.selected = selected;
            self.refresh_store_view();
        }

        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.store_view.lookup)
                    .hint_text("Look up a term")
                    .desired_width(160.0),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Find").clicked() || submitted {
                self.on_lookup();
            }
        });
        if let Some(result) = &self.store_view.lookup_result {
            ui.label(result);
        }
        ui.separator();

        let all = self.store_view.selected.is_none();
        egui::ScrollArea::vertical()
            .id_source("store_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for term in &self.store_view.terms {
                    if all {
                        ui.label(format!("{}  ({})", term.term, term.category));
                    } else {
                        ui.label(&term.term);
                    }
                }
            });
    }

    fn show_error(&mut self, err: &VocabularyError) {
        let title = match err {
            VocabularyError::Configuration(_) => "Settings problem",
            VocabularyError::Storage(_) => "Database error",
            VocabularyError::Export(_) => "Export failed",
            VocabularyError::EmptyInput => "Missing input",
            VocabularyError::Busy(_) => "Please wait",
            _ => "Processing failed",
        };
        self.status = if err.is_fatal() {
            self.shell.status_line()
        } else {
            "Failed.".to_string()
        };
        self.dialog = Some(ErrorDialog {
            title,
            message: err.to_string(),
        });
    }

    fn on_process(&mut self) {
        match self.shell.request_process(&self.input) {
            Ok(()) => self.status = self.shell.status_line(),
            Err(err) => self.show_error(&err),
        }
    }

    fn on_export(&mut self) {
        match self.shell.request_export() {
            Ok(()) => self.status = self.shell.status_line(),
            Err(err) => self.show_error(&err),
        }
    }

    fn run_pending(&mut self) {
        match self.shell.run_pending() {
            Some(Ok(outcome)) => {
                self.status = outcome.status();
                if matches!(outcome, ActionOutcome::Processed(_)) {
                    self.refresh_store_view();
                }
                match outcome {
                    ActionOutcome::Processed(summary) => self.output = summary.table,
                    ActionOutcome::Exported(report) => {
                        let files: Vec<String> = report
                            .files
                            .iter()
                            .map(|path| path.display().to_string())
                            .collect();
                        self.output = format!("Exported to:\n{}", files.join("\n"));
                    }
                }
            }
            Some(Err(err)) => self.show_error(&err),
            None => {}
        }
    }

    fn error_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &self.dialog else {
            return;
        };
        let mut close = false;
        egui::Window::new(dialog.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&dialog.message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    close = true;
                }
            });
        if close {
            self.dialog = None;
        }
    }
}

impl App for VocabularyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let idle = self.dialog.is_none();
                let can_process = idle && self.shell.can_process();
                if ui
                    .add_enabled(can_process, egui::Button::new("Process text"))
                    .clicked()
                {
                    self.on_process();
                }
                let output_dir = self.shell.settings().output_dir.display().to_string();
                if ui
                    .add_enabled(idle && self.shell.can_export(), egui::Button::new("Export"))
                    .on_hover_text(format!("Writes to {output_dir}"))
                    .clicked()
                {
                    self.on_export();
                }
                ui.separator();
                ui.label(&self.status);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(format!("{} terms stored", self.shell.term_count()));
                });
            });
        });

        egui::SidePanel::right("store")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| self.store_panel(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                columns[0].heading("Text");
                egui::ScrollArea::vertical()
                    .id_source("input_scroll")
                    .auto_shrink([false, false])
                    .show(&mut columns[0], |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.input)
                                .hint_text("Paste text to analyze")
                                .desired_width(f32::INFINITY)
                                .desired_rows(24),
                        );
                    });

                columns[1].heading("Vocabulary");
                egui::ScrollArea::vertical()
                    .id_source("output_scroll")
                    .auto_shrink([false, false])
                    .show(&mut columns[1], |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.output.as_str())
                                .font(egui::TextStyle::Monospace)
                                .desired_width(f32::INFINITY)
                                .desired_rows(24),
                        );
                    });
            });
        });

        self.error_dialog(ctx);

        if self.shell.state() != ShellState::Idle {
            if self.busy_frame_painted {
                self.busy_frame_painted = false;
                self.run_pending();
            } else {
                self.busy_frame_painted = true;
            }
            ctx.request_repaint();
        }
    }
}

/// Open the window and block until it is closed.
pub fn run(shell: Shell) -> Result<(), eframe::Error> {
    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([1100.0, 700.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(|cc| Box::new(VocabularyApp::new(cc, shell))),
    )
}
