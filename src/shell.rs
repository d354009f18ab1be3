//! # Application shell
//!
//! Owns the settings, the store and the LLM client, and serializes user actions
//! through a small state machine:
//!
//! ```text
//! Idle --request_process--> Processing --run_pending--> Idle
//! Idle --request_export---> Exporting  --run_pending--> Idle
//! ```
//!
//! Requesting and running are separate steps so the window can paint the
//! "Processing…" status before the blocking call starts. Only one action can be in
//! flight; a second request gets [`VocabularyError::Busy`].
//!
//! Errors from an action are returned to the caller and logged. A fatal one
//! ([`VocabularyError::is_fatal`]) stops the shell: every later request fails with
//! the same message.

use std::fmt;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, warn};

use crate::{
    api::VocabularyClient,
    config::VocabularySettings,
    error::{Result, VocabularyError},
    export::{ExportReport, export_store},
    import::{ImportColumns, ImportReport, import_legacy},
    models::{SOURCE_LLM, Term},
    store::VocabularyStore,
    vocabulary::{CategorizedTerm, format_markdown_table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Processing,
    Exporting,
}

impl fmt::Display for ShellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShellState::Idle => "idle",
            ShellState::Processing => "processing text",
            ShellState::Exporting => "exporting",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingAction {
    Process(String),
    Export,
}

/// Result of processing one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Pairs in response order, duplicates included.
    pub pairs: Vec<CategorizedTerm>,
    pub inserted: usize,
    pub updated: usize,
    /// `| Type | Words |` table shown in the output pane.
    pub table: String,
}

/// What a finished action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Processed(ProcessSummary),
    Exported(ExportReport),
}

impl ActionOutcome {
    /// Short status-line message.
    pub fn status(&self) -> String {
        match self {
            ActionOutcome::Processed(summary) => format!(
                "Done: {} terms, {} new, {} re-categorized.",
                summary.pairs.len(),
                summary.inserted,
                summary.updated
            ),
            ActionOutcome::Exported(report) => format!(
                "Exported {} terms to {} file(s).",
                report.terms,
                report.files.len()
            ),
        }
    }
}

pub struct Shell {
    settings: VocabularySettings,
    store: VocabularyStore,
    client: VocabularyClient,
    runtime: Runtime,
    state: ShellState,
    pending: Option<PendingAction>,
    term_count: i64,
    fatal: Option<String>,
    import_report: Option<ImportReport>,
}

impl Shell {
    /// Open the store, build the client and, when enabled and the store is empty,
    /// import legacy spreadsheets from the output directory.
    ///
    /// # Errors
    /// [`VocabularyError::Configuration`] or [`VocabularyError::Storage`]; the
    /// application cannot start without a working store and client.
    pub fn new(settings: VocabularySettings) -> Result<Self> {
        let client = VocabularyClient::new(&settings)?;
        let mut store = VocabularyStore::open(&settings.db_path, settings.normalize_casefold)?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| VocabularyError::Configuration(format!("async runtime: {err}")))?;

        let import_report = if settings.auto_import_ods && store.is_empty()? {
            let report = import_legacy(
                &mut store,
                &settings.output_dir,
                ImportColumns {
                    term: &settings.import_term_columns,
                    category: &settings.import_category_columns,
                },
            )?;
            if !report.files_imported.is_empty() {
                info!(
                    "Imported {} rows from {} legacy file(s)",
                    report.rows(),
                    report.files_imported.len()
                );
            }
            Some(report)
        } else {
            None
        };

        let term_count = store.count()?;
        debug!("Shell ready with {} stored terms", term_count);

        Ok(Self {
            settings,
            store,
            client,
            runtime,
            state: ShellState::Idle,
            pending: None,
            term_count,
            fatal: None,
            import_report,
        })
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn settings(&self) -> &VocabularySettings {
        &self.settings
    }

    /// Report of the startup import, if one ran.
    pub fn import_report(&self) -> Option<&ImportReport> {
        self.import_report.as_ref()
    }

    /// The message of the fatal error that stopped the shell.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// Number of terms in the store as of the last action.
    pub fn term_count(&self) -> i64 {
        self.term_count
    }

    pub fn can_process(&self) -> bool {
        self.fatal.is_none() && self.state == ShellState::Idle
    }

    pub fn can_export(&self) -> bool {
        self.can_process() && self.term_count > 0
    }

    /// Status line text for the current state.
    pub fn status_line(&self) -> String {
        if let Some(reason) = &self.fatal {
            return format!("Stopped: {reason}");
        }
        match self.state {
            ShellState::Idle => "Ready.".to_string(),
            ShellState::Processing => "Sending request to the model…".to_string(),
            ShellState::Exporting => "Exporting ODS…".to_string(),
        }
    }

    /// Queue processing of `text`. Nothing runs until [`Shell::run_pending`].
    pub fn request_process(&mut self, text: &str) -> Result<()> {
        self.ensure_idle()?;
        if text.trim().is_empty() {
            return Err(VocabularyError::EmptyInput);
        }
        self.state = ShellState::Processing;
        self.pending = Some(PendingAction::Process(text.to_string()));
        Ok(())
    }

    /// Queue an export of the whole store.
    pub fn request_export(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.state = ShellState::Exporting;
        self.pending = Some(PendingAction::Export);
        Ok(())
    }

    /// Run the queued action, if any, and return to [`ShellState::Idle`].
    pub fn run_pending(&mut self) -> Option<Result<ActionOutcome>> {
        let result = match self.pending.take()? {
            PendingAction::Process(text) => self.run_process(&text).map(ActionOutcome::Processed),
            PendingAction::Export => self.run_export().map(ActionOutcome::Exported),
        };
        self.finish(&result);
        Some(result)
    }

    /// Process `text` right away. Same as requesting then running.
    pub fn process_text(&mut self, text: &str) -> Result<ProcessSummary> {
        self.request_process(text)?;
        self.pending = None;
        let result = self.run_process(text);
        self.finish(&result);
        result
    }

    /// Export right away. Same as requesting then running.
    pub fn export(&mut self) -> Result<ExportReport> {
        self.request_export()?;
        self.pending = None;
        let result = self.run_export();
        self.finish(&result);
        result
    }

    /// `(category, number of terms)` for the store view, sorted by category.
    pub fn category_counts(&mut self) -> Result<Vec<(String, i64)>> {
        self.read_store(|store| store.category_counts())
    }

    /// Stored terms, optionally of one category, ordered by term.
    pub fn terms(&mut self, category: Option<&str>) -> Result<Vec<Term>> {
        self.read_store(|store| store.query(category))
    }

    /// The stored row for `term`, matched by normalized key.
    pub fn lookup(&mut self, term: &str) -> Result<Option<Term>> {
        self.read_store(|store| store.find(term))
    }

    /// Run a read against the store. Storage errors stop the shell like they do
    /// during an action.
    fn read_store<T>(
        &mut self,
        read: impl FnOnce(&mut VocabularyStore) -> Result<T>,
    ) -> Result<T> {
        if let Some(reason) = &self.fatal {
            return Err(VocabularyError::Storage(reason.clone()));
        }
        let result = read(&mut self.store);
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("Fatal error, disabling actions: {}", err);
                self.fatal = Some(err.to_string());
            }
        }
        result
    }

    fn finish<T>(&mut self, result: &Result<T>) {
        self.state = ShellState::Idle;
        match result {
            Ok(_) => {}
            Err(err) if err.is_fatal() => {
                error!("Fatal error, disabling actions: {}", err);
                self.fatal = Some(err.to_string());
            }
            Err(err) => warn!("Action failed: {}", err),
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if let Some(reason) = &self.fatal {
            return Err(VocabularyError::Storage(reason.clone()));
        }
        if self.state != ShellState::Idle {
            return Err(VocabularyError::Busy(self.state.to_string()));
        }
        Ok(())
    }

    fn run_process(&mut self, text: &str) -> Result<ProcessSummary> {
        let pairs = self.runtime.block_on(self.client.analyze(text))?;

        let counts = self.store.upsert_all(&pairs, SOURCE_LLM)?;
        self.term_count = self.store.count()?;
        let known = self.store.list_categories()?;
        info!(
            "Processed text: {} terms, {} new, {} re-categorized",
            pairs.len(),
            counts.inserted,
            counts.updated
        );

        Ok(ProcessSummary {
            table: format_markdown_table(&pairs, &known),
            inserted: counts.inserted,
            updated: counts.updated,
            pairs,
        })
    }

    fn run_export(&mut self) -> Result<ExportReport> {
        debug!("Exporting in {} mode", self.settings.export_mode);
        export_store(
            &mut self.store,
            &self.settings.output_dir,
            self.settings.export_mode,
            &self.settings.consolidated_export_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExportMode, ods::read_workbook};
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir, endpoint: &str) -> VocabularySettings {
        let mut settings = VocabularySettings::new(endpoint, "mock_model", 0.0, "Categorize.");
        settings.db_path = dir.path().join("vocabulary.db");
        settings.output_dir = dir.path().join("exports");
        settings
    }

    fn mock_completion(server: &MockServer, content: &str) {
        let body = json!({ "choices": [ { "message": { "content": content } } ] });
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(body);
        });
    }

    #[test]
    fn test_process_scenario_normalizes_terms() {
        let server = MockServer::start();
        mock_completion(
            &server,
            r#"[["run", "verb"], ["Run", "verb"], ["quickly", "adverb"]]"#,
        );
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, &server.base_url())).unwrap();
        assert!(!shell.can_export());

        let summary = shell.process_text("Run, run quickly.").unwrap();

        assert_eq!(summary.pairs.len(), 3);
        assert_eq!(summary.inserted, 2);
        assert_eq!(shell.term_count(), 2);
        assert_eq!(shell.state(), ShellState::Idle);
        assert!(shell.can_export());
        assert!(summary.table.contains("| verb | run, Run |"));
        assert!(summary.table.contains("| adverb | quickly |"));
    }

    #[test]
    fn test_malformed_response_leaves_store_unchanged() {
        let server = MockServer::start();
        mock_completion(&server, "Sorry, I cannot help with that.");
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, &server.base_url())).unwrap();

        let err = shell.process_text("The cat sat.").unwrap_err();

        assert!(matches!(err, VocabularyError::LlmResponseFormat(_)));
        assert_eq!(shell.term_count(), 0);
        assert!(shell.fatal_error().is_none());
        assert!(shell.can_process());
    }

    #[test]
    fn test_request_gating() {
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, "http://127.0.0.1:9")).unwrap();

        assert!(matches!(
            shell.request_process("  \n"),
            Err(VocabularyError::EmptyInput)
        ));
        assert_eq!(shell.state(), ShellState::Idle);

        shell.request_export().unwrap();
        assert_eq!(shell.state(), ShellState::Exporting);
        assert!(matches!(
            shell.request_process("text"),
            Err(VocabularyError::Busy(_))
        ));

        // Exporting an empty store fails but returns to idle.
        let result = shell.run_pending().unwrap();
        assert!(matches!(result, Err(VocabularyError::Export(_))));
        assert_eq!(shell.state(), ShellState::Idle);
        assert!(shell.run_pending().is_none());
    }

    #[test]
    fn test_request_failure_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, "http://127.0.0.1:9")).unwrap();

        let err = shell.process_text("The cat sat.").unwrap_err();
        assert!(matches!(err, VocabularyError::LlmRequest { .. }));
        assert!(!err.is_fatal());
        assert!(shell.can_process());
    }

    #[test]
    fn test_storage_failure_is_fatal() {
        let server = MockServer::start();
        mock_completion(&server, r#"{"noun": ["cat"]}"#);
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, &server.base_url())).unwrap();

        let conn = rusqlite::Connection::open(dir.path().join("vocabulary.db")).unwrap();
        conn.execute_batch("DROP TABLE terms;").unwrap();
        drop(conn);

        let err = shell.process_text("The cat.").unwrap_err();
        assert!(matches!(err, VocabularyError::Storage(_)));
        assert!(shell.fatal_error().is_some());
        assert!(!shell.can_process());
        assert!(!shell.can_export());
        assert!(matches!(
            shell.request_export(),
            Err(VocabularyError::Storage(_))
        ));
        assert!(shell.status_line().starts_with("Stopped:"));
    }

    #[test]
    fn test_process_then_export_consolidated() {
        let server = MockServer::start();
        mock_completion(&server, r#"{"noun": ["cat"], "verb": ["sat"]}"#);
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir, &server.url("/v1"));
        settings.export_mode = ExportMode::Consolidated;
        let mut shell = Shell::new(settings).unwrap();

        shell.process_text("The cat sat.").unwrap();
        let report = shell.export().unwrap();

        assert_eq!(report.files, vec![dir.path().join("exports/vocabulary_all.ods")]);
        let sheets = read_workbook(&report.files[0]).unwrap();
        assert_eq!(sheets.len(), 2);
    }

    #[test]
    fn test_store_view_reads() {
        let server = MockServer::start();
        mock_completion(&server, r#"{"verb": ["run", "sat"], "noun": ["cat"]}"#);
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, &server.base_url())).unwrap();
        assert!(shell.category_counts().unwrap().is_empty());

        shell.process_text("The cat sat and ran.").unwrap();

        assert_eq!(
            shell.category_counts().unwrap(),
            vec![("noun".to_string(), 1), ("verb".to_string(), 2)]
        );
        let verbs: Vec<String> = shell
            .terms(Some("verb"))
            .unwrap()
            .into_iter()
            .map(|term| term.term)
            .collect();
        assert_eq!(verbs, vec!["run", "sat"]);
        assert_eq!(shell.terms(None).unwrap().len(), 3);
        assert_eq!(shell.lookup("CAT").unwrap().unwrap().category, "noun");
        assert!(shell.lookup("dog").unwrap().is_none());
        assert_eq!(shell.state(), ShellState::Idle);
    }

    #[test]
    fn test_store_view_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut shell = Shell::new(settings_in(&dir, "http://127.0.0.1:9")).unwrap();

        let conn = rusqlite::Connection::open(dir.path().join("vocabulary.db")).unwrap();
        conn.execute_batch("DROP TABLE terms;").unwrap();
        drop(conn);

        assert!(matches!(
            shell.category_counts(),
            Err(VocabularyError::Storage(_))
        ));
        assert!(shell.fatal_error().is_some());
        assert!(!shell.can_process());
        assert!(matches!(shell.terms(None), Err(VocabularyError::Storage(_))));
    }

    #[test]
    fn test_startup_imports_into_empty_store() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("exports")).unwrap();
        std::fs::write(dir.path().join("exports/noun.txt"), "cat\ndog\n").unwrap();

        let shell = Shell::new(settings_in(&dir, "http://127.0.0.1:9")).unwrap();
        assert_eq!(shell.term_count(), 2);
        assert_eq!(shell.import_report().unwrap().files_imported.len(), 1);
        assert!(shell.can_export());
        drop(shell);

        // A non-empty store is left alone on the next start.
        std::fs::write(dir.path().join("exports/verb.txt"), "run\n").unwrap();
        let shell = Shell::new(settings_in(&dir, "http://127.0.0.1:9")).unwrap();
        assert!(shell.import_report().is_none());
        assert_eq!(shell.term_count(), 2);
    }

    #[test]
    fn test_startup_import_disabled() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("exports")).unwrap();
        std::fs::write(dir.path().join("exports/noun.txt"), "cat\n").unwrap();

        let mut settings = settings_in(&dir, "http://127.0.0.1:9");
        settings.auto_import_ods = false;
        let shell = Shell::new(settings).unwrap();
        assert_eq!(shell.term_count(), 0);
    }
}
