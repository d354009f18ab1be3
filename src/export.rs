//! # Export
//!
//! Writes the vocabulary store to ODS workbooks in the output directory.
//!
//! - [`ExportMode::PerCategory`]: `noun.ods`, `verb.ods`, ... each with one sheet.
//! - [`ExportMode::Consolidated`]: one workbook, one sheet per category.
//!
//! Every sheet starts with a `term | category` header row. Categories and terms
//! come out in store order (alphabetical).
//!
//! Two categories can sanitize to the same file stem or sheet name
//! (`noun/pronoun`, `noun:pronoun`); the later one gets a `_2`, `_3`, ... suffix.
//! In per-category mode, single-sheet workbooks from an earlier export whose
//! category is no longer in the store are rewritten with only the header row, so
//! the directory never carries rows the store has moved elsewhere.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::{
    config::ExportMode,
    error::{Result, VocabularyError},
    ods::{Sheet, read_workbook, write_workbook},
    store::VocabularyStore,
};

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\p{L}\p{N}._ -]+"#).expect("valid regex"));
static UNSAFE_SHEET_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\[\]*?:/\\']"#).expect("valid regex"));

/// Header row written at the top of every sheet.
pub const HEADER: [&str; 2] = ["term", "category"];

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub mode: ExportMode,
    pub files: Vec<PathBuf>,
    /// Earlier per-category exports reduced to their header row.
    pub cleared: Vec<PathBuf>,
    pub terms: usize,
}

/// Turn a category label into a safe file stem. Never empty.
pub fn sanitize_file_stem(category: &str) -> String {
    let cleaned = UNSAFE_FILE_CHARS.replace_all(category.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == ' ');
    if cleaned.is_empty() {
        "category".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sheet names may not contain `[ ] * ? : / \ '` in office suites.
pub fn sanitize_sheet_name(category: &str) -> String {
    let cleaned = UNSAFE_SHEET_CHARS.replace_all(category, "_");
    if cleaned.trim().is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Return `base`, or `base_2`, `base_3`, ... if it is already in `taken`.
///
/// Names are compared case-insensitively since exports may land on a
/// case-insensitive file system.
fn claim_unique(base: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut suffix = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    candidate
}

/// Build one sheet per category from the store. Sheet names are unique.
pub fn category_sheets(store: &mut VocabularyStore) -> Result<Vec<(String, Sheet)>> {
    let mut sheets = Vec::new();
    let mut names = HashSet::new();
    for category in store.list_categories()? {
        let mut sheet = Sheet::new(claim_unique(sanitize_sheet_name(&category), &mut names));
        sheet.push_row(HEADER);
        for term in store.query(Some(category.as_str()))? {
            sheet.push_row([term.term, term.category]);
        }
        sheets.push((category, sheet));
    }
    Ok(sheets)
}

/// Export the whole store into `output_dir`.
///
/// # Parameters
/// - `store`: source of terms
/// - `output_dir`: created if missing
/// - `mode`: per-category files or one consolidated workbook
/// - `consolidated_name`: file name used in consolidated mode
///
/// # Errors
/// [`VocabularyError::Export`] when the store is empty or a file cannot be written;
/// [`VocabularyError::Storage`] when the store cannot be read.
pub fn export_store(
    store: &mut VocabularyStore,
    output_dir: &Path,
    mode: ExportMode,
    consolidated_name: &str,
) -> Result<ExportReport> {
    let terms = store.count()? as usize;
    if terms == 0 {
        return Err(VocabularyError::Export(
            "the vocabulary is empty; process some text first".to_string(),
        ));
    }

    fs::create_dir_all(output_dir).map_err(|err| {
        VocabularyError::Export(format!("cannot create {}: {err}", output_dir.display()))
    })?;

    let sheets = category_sheets(store)?;
    let mut files = Vec::new();
    let mut cleared = Vec::new();

    match mode {
        ExportMode::PerCategory => {
            let mut stems = HashSet::new();
            for (category, sheet) in sheets {
                let stem = claim_unique(sanitize_file_stem(&category), &mut stems);
                let path = output_dir.join(format!("{stem}.ods"));
                write_workbook(&path, std::slice::from_ref(&sheet))?;
                files.push(path);
            }
            cleared = clear_stale_exports(output_dir, &files)?;
        }
        ExportMode::Consolidated => {
            let path = output_dir.join(consolidated_file_name(consolidated_name));
            let sheets: Vec<Sheet> = sheets.into_iter().map(|(_, sheet)| sheet).collect();
            write_workbook(&path, &sheets)?;
            files.push(path);
        }
    }

    info!(
        "Exported {} terms to {} file(s) in {}",
        terms,
        files.len(),
        output_dir.display()
    );
    Ok(ExportReport {
        mode,
        files,
        cleared,
        terms,
    })
}

/// Rewrite earlier per-category exports in `output_dir` that were not written
/// this time with just the header row.
///
/// Only single-sheet workbooks whose first row is exactly [`HEADER`] are touched;
/// anything else in the directory, unreadable files included, is left alone.
fn clear_stale_exports(output_dir: &Path, written: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(output_dir).map_err(|err| {
        VocabularyError::Export(format!("cannot read {}: {err}", output_dir.display()))
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && !written.contains(path))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("ods"))
        })
        .collect();
    candidates.sort();

    let mut cleared = Vec::new();
    for path in candidates {
        let Ok(sheets) = read_workbook(&path) else {
            debug!("Leaving unreadable {} alone", path.display());
            continue;
        };
        let [sheet] = sheets.as_slice() else {
            continue;
        };
        let is_export = sheet
            .rows
            .first()
            .is_some_and(|row| row.iter().map(String::as_str).eq(HEADER));
        if !is_export || sheet.rows.len() == 1 {
            continue;
        }

        let mut emptied = Sheet::new(sheet.name.clone());
        emptied.push_row(HEADER);
        write_workbook(&path, &[emptied])?;
        info!("Cleared stale export {}", path.display());
        cleared.push(path);
    }
    Ok(cleared)
}

fn consolidated_file_name(name: &str) -> String {
    let stem = name.trim().strip_suffix(".ods").unwrap_or(name.trim());
    format!("{}.ods", sanitize_file_stem(stem))
}
