//! # Legacy import
//!
//! Brings spreadsheets left in the output directory by earlier versions (or by
//! hand) into an empty store.
//!
//! Files considered, in name order, non-recursively:
//!
//! - `*.ods`: every sheet. The first row is a header when it names both a term
//!   column and a category column from the configured lists (case-insensitive).
//!   Without a header the first column holds the terms, so a plain word list may
//!   start with a word like `word` or `type` without losing it.
//! - `*.txt`: one term per line, category taken from the file stem. Skipped when an
//!   `.ods` with the same stem exists.
//!
//! When a row has no category the file stem is used for single-sheet workbooks and
//! the sheet name otherwise. A file that cannot be read is reported as an
//! [`ImportWarning`] and skipped; storage failures still abort the import.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    error::{ImportWarning, Result},
    models::SOURCE_ODS_IMPORT,
    ods::{Sheet, read_workbook},
    store::{UpsertCounts, VocabularyStore},
    vocabulary::CategorizedTerm,
};

/// Outcome of [`import_legacy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub files_imported: Vec<PathBuf>,
    pub counts: UpsertCounts,
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    /// Rows that reached the store, whether or not they changed it.
    pub fn rows(&self) -> usize {
        self.counts.inserted + self.counts.updated + self.counts.unchanged
    }
}

/// Header names recognized when reading legacy sheets.
#[derive(Debug, Clone, Copy)]
pub struct ImportColumns<'a> {
    pub term: &'a [String],
    pub category: &'a [String],
}

/// Import every `.ods` and `.txt` file found directly in `dir`.
///
/// A missing directory is not an error and yields an empty report.
pub fn import_legacy(
    store: &mut VocabularyStore,
    dir: &Path,
    columns: ImportColumns<'_>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    if !dir.is_dir() {
        return Ok(report);
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            let warning = ImportWarning {
                path: dir.to_path_buf(),
                reason: err.to_string(),
            };
            warn!("{}", warning);
            report.warnings.push(warning);
            return Ok(report);
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| matches!(extension(path).as_deref(), Some("ods" | "txt")))
        .collect();
    files.sort();

    let ods_stems: HashSet<String> = files
        .iter()
        .filter(|path| extension(path).as_deref() == Some("ods"))
        .map(|path| file_stem(path))
        .collect();

    for path in files {
        let is_txt = extension(&path).as_deref() == Some("txt");
        if is_txt && ods_stems.contains(&file_stem(&path)) {
            continue;
        }

        let parsed = if is_txt {
            read_txt(&path)
        } else {
            read_ods(&path, columns)
        };

        match parsed {
            Ok(pairs) => {
                let counts = store.upsert_all(&pairs, SOURCE_ODS_IMPORT)?;
                info!(
                    "Imported {} ({} rows, {} new)",
                    path.display(),
                    pairs.len(),
                    counts.inserted
                );
                report.counts += counts;
                report.files_imported.push(path);
            }
            Err(reason) => {
                let warning = ImportWarning { path, reason };
                warn!("{}", warning);
                report.warnings.push(warning);
            }
        }
    }

    Ok(report)
}

fn read_txt(path: &Path) -> std::result::Result<Vec<CategorizedTerm>, String> {
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let category = file_stem(path);
    Ok(text
        .lines()
        .filter_map(|line| CategorizedTerm::new(line, &category))
        .collect())
}

fn read_ods(
    path: &Path,
    columns: ImportColumns<'_>,
) -> std::result::Result<Vec<CategorizedTerm>, String> {
    let sheets = read_workbook(path).map_err(|err| err.to_string())?;
    let stem = file_stem(path);
    let single = sheets.len() == 1;

    let mut pairs = Vec::new();
    for sheet in &sheets {
        let fallback = if single || sheet.name.trim().is_empty() {
            stem.as_str()
        } else {
            sheet.name.as_str()
        };
        pairs.extend(sheet_pairs(sheet, fallback, columns));
    }
    Ok(pairs)
}

/// Pairs from one sheet, using `fallback` where no category is given.
fn sheet_pairs(sheet: &Sheet, fallback: &str, columns: ImportColumns<'_>) -> Vec<CategorizedTerm> {
    let header = sheet
        .rows
        .first()
        .and_then(|row| detect_header(row, columns));

    let (rows, term_col, category_col) = match header {
        Some((term_col, category_col)) => (&sheet.rows[1..], term_col, Some(category_col)),
        None => (&sheet.rows[..], 0, None),
    };

    rows.iter()
        .filter_map(|row| {
            let term = row.get(term_col)?;
            let category = category_col
                .and_then(|index| row.get(index))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .unwrap_or(fallback);
            CategorizedTerm::new(term, category)
        })
        .collect()
}

/// `(term column, category column)` if `row` names both columns.
fn detect_header(row: &[String], columns: ImportColumns<'_>) -> Option<(usize, usize)> {
    let position = |names: &[String]| {
        row.iter().position(|cell| {
            names
                .iter()
                .any(|name| cell.trim().eq_ignore_ascii_case(name.trim()))
        })
    };
    let term = position(columns.term)?;
    let category = position(columns.category).filter(|index| *index != term)?;
    Some((term, category))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExportMode, export::export_store, models::SOURCE_LLM, ods::write_workbook};
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn import(store: &mut VocabularyStore, dir: &Path) -> ImportReport {
        let term = names(&["term", "word", "lemma", "surface_form"]);
        let category = names(&["category", "type", "pos", "part_of_speech"]);
        import_legacy(
            store,
            dir,
            ImportColumns {
                term: &term,
                category: &category,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_missing_directory_is_empty_report() {
        let dir = TempDir::new().unwrap();
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, &dir.path().join("nope"));
        assert_eq!(report, ImportReport::default());
    }

    #[test]
    fn test_headerless_sheet_uses_file_stem() {
        let dir = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Words");
        sheet.push_row(["Cat"]);
        sheet.push_row(["dog"]);
        write_workbook(&dir.path().join("noun.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, dir.path());

        assert_eq!(report.rows(), 2);
        let terms = store.query(Some("noun")).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].term, "Cat");
        assert_eq!(terms[0].source, SOURCE_ODS_IMPORT);
    }

    #[test]
    fn test_header_columns_detected() {
        let dir = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Sheet1");
        sheet.push_row(["Notes", "Word", "POS"]);
        sheet.push_row(["seen twice", "quickly", "adverb"]);
        sheet.push_row(["", "sat", ""]);
        write_workbook(&dir.path().join("mixed.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        import(&mut store, dir.path());

        assert_eq!(store.find("quickly").unwrap().unwrap().category, "adverb");
        assert_eq!(store.find("sat").unwrap().unwrap().category, "mixed");
        assert!(store.find("Word").unwrap().is_none());
    }

    #[test]
    fn test_word_list_starting_with_header_name() {
        let dir = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Words");
        sheet.push_row(["word"]);
        sheet.push_row(["type"]);
        sheet.push_row(["lemma"]);
        write_workbook(&dir.path().join("noun.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, dir.path());

        assert_eq!(report.rows(), 3);
        assert_eq!(store.find("word").unwrap().unwrap().category, "noun");
    }

    #[test]
    fn test_term_header_without_category_is_data() {
        let dir = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Sheet1");
        sheet.push_row(["word", "notes"]);
        sheet.push_row(["cat", "pet"]);
        write_workbook(&dir.path().join("noun.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        import(&mut store, dir.path());

        assert_eq!(store.count().unwrap(), 2);
        assert!(store.find("word").unwrap().is_some());
    }

    #[test]
    fn test_older_consolidated_layout() {
        // Single "Vocabulary" sheet with the category column first.
        let dir = TempDir::new().unwrap();
        let mut sheet = Sheet::new("Vocabulary");
        sheet.push_row(["category", "word"]);
        sheet.push_row(["noun", "cat"]);
        sheet.push_row(["verb", "run"]);
        sheet.push_row(["phrasal_verb", "take off"]);
        write_workbook(&dir.path().join("vocabulary_all.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, dir.path());

        assert!(report.warnings.is_empty());
        assert_eq!(report.rows(), 3);
        assert_eq!(store.find("cat").unwrap().unwrap().category, "noun");
        assert_eq!(store.find("run").unwrap().unwrap().category, "verb");
        assert_eq!(
            store.find("take off").unwrap().unwrap().category,
            "phrasal_verb"
        );
        assert!(store.find("word").unwrap().is_none());
    }

    #[test]
    fn test_consolidated_export_then_import_restores_store() {
        let dir = TempDir::new().unwrap();
        let mut original = VocabularyStore::open_in_memory(true).unwrap();
        original.upsert("run", "verb", SOURCE_LLM).unwrap();
        original.upsert("cat", "noun", SOURCE_LLM).unwrap();
        original.upsert("dog", "noun", SOURCE_LLM).unwrap();
        original.upsert("take off", "phrasal verb", SOURCE_LLM).unwrap();
        export_store(
            &mut original,
            dir.path(),
            ExportMode::Consolidated,
            "vocabulary_all.ods",
        )
        .unwrap();

        let mut restored = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut restored, dir.path());

        assert_eq!(report.files_imported, vec![dir.path().join("vocabulary_all.ods")]);
        let pairs = |store: &mut VocabularyStore| -> Vec<(String, String)> {
            store
                .query(None)
                .unwrap()
                .into_iter()
                .map(|term| (term.term, term.category))
                .collect()
        };
        assert_eq!(pairs(&mut restored), pairs(&mut original));
    }

    #[test]
    fn test_multi_sheet_falls_back_to_sheet_name() {
        let dir = TempDir::new().unwrap();
        let mut nouns = Sheet::new("noun");
        nouns.push_row(["cat"]);
        let mut verbs = Sheet::new("verb");
        verbs.push_row(["run"]);
        write_workbook(&dir.path().join("all.ods"), &[nouns, verbs]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        import(&mut store, dir.path());

        assert_eq!(store.find("cat").unwrap().unwrap().category, "noun");
        assert_eq!(store.find("run").unwrap().unwrap().category, "verb");
    }

    #[test]
    fn test_txt_lists_and_ods_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("adverb.txt"), "quickly\n\n  slowly \n").unwrap();
        fs::write(dir.path().join("noun.txt"), "ignored\n").unwrap();
        let mut sheet = Sheet::new("noun");
        sheet.push_row(["cat"]);
        write_workbook(&dir.path().join("noun.ods"), &[sheet]).unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, dir.path());

        assert_eq!(report.files_imported.len(), 2);
        assert_eq!(store.count().unwrap(), 3);
        assert!(store.find("ignored").unwrap().is_none());
        assert_eq!(store.find("slowly").unwrap().unwrap().category, "adverb");
    }

    #[test]
    fn test_broken_file_becomes_warning() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.ods"), b"garbage").unwrap();
        fs::write(dir.path().join("verb.txt"), "run\n").unwrap();

        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut store, dir.path());

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, dir.path().join("broken.ods"));
        assert_eq!(report.files_imported, vec![dir.path().join("verb.txt")]);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_export_then_import_restores_store() {
        let dir = TempDir::new().unwrap();
        let mut original = VocabularyStore::open_in_memory(true).unwrap();
        original.upsert("run", "verb", SOURCE_LLM).unwrap();
        original.upsert("cat", "noun", SOURCE_LLM).unwrap();
        original.upsert("take off", "phrasal verb", SOURCE_LLM).unwrap();
        export_store(&mut original, dir.path(), ExportMode::PerCategory, "all.ods").unwrap();

        let mut restored = VocabularyStore::open_in_memory(true).unwrap();
        let report = import(&mut restored, dir.path());

        assert!(report.warnings.is_empty());
        assert_eq!(restored.count().unwrap(), 3);
        assert_eq!(
            restored.list_categories().unwrap(),
            original.list_categories().unwrap()
        );
        assert_eq!(
            restored.find("take off").unwrap().unwrap().category,
            "phrasal verb"
        );
    }
}
