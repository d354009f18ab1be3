//! # Vocabulary domain
//!
//! Plain values shared by the client, the store and the shell:
//!
//! - [`CategorizedTerm`]: one `(term, category)` pair as returned by the model.
//! - Normalization helpers deciding when two spellings are the same term
//!   ([`normalize_surface`], [`normalized_key`], [`normalize_category`]).
//! - [`format_markdown_table`], the summary shown in the output pane.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Category used when the model returns an empty label.
pub const FALLBACK_CATEGORY: &str = "other";

/// A term together with the category the model assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedTerm {
    pub term: String,
    pub category: String,
}

impl CategorizedTerm {
    /// Build a pair, normalizing whitespace in the term and the category label.
    ///
    /// Returns `None` when the term is blank.
    pub fn new(term: &str, category: &str) -> Option<Self> {
        Some(Self {
            term: normalize_surface(term)?,
            category: normalize_category(category),
        })
    }
}

/// Trim and collapse internal whitespace. `None` if nothing is left.
pub fn normalize_surface(text: &str) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(text.trim(), " ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

/// The uniqueness key for a term.
///
/// With `casefold` the key is the lowercased surface form, otherwise the surface
/// form itself.
pub fn normalized_key(term: &str, casefold: bool) -> Option<String> {
    let surface = normalize_surface(term)?;
    Some(if casefold { surface.to_lowercase() } else { surface })
}

/// Lowercased, whitespace-collapsed category label; blank labels become
/// [`FALLBACK_CATEGORY`].
pub fn normalize_category(category: &str) -> String {
    normalize_surface(category)
        .map(|label| label.to_lowercase())
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
}

/// Group terms by category, keeping the order in which categories and terms first
/// appear and dropping exact duplicates within a category.
pub fn group_by_category(terms: &[CategorizedTerm]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for entry in terms {
        let index = match groups.iter().position(|(name, _)| *name == entry.category) {
            Some(index) => index,
            None => {
                groups.push((entry.category.clone(), Vec::new()));
                groups.len() - 1
            }
        };
        let words = &mut groups[index].1;
        if !words.contains(&entry.term) {
            words.push(entry.term.clone());
        }
    }
    groups
}

/// Render a `| Type | Words |` table, one row per category.
///
/// Categories listed in `always_show` appear even when empty (rendered as `-`),
/// followed by any other category present in `terms`.
pub fn format_markdown_table(terms: &[CategorizedTerm], always_show: &[String]) -> String {
    let groups = group_by_category(terms);
    let mut rows = Vec::new();

    for category in always_show {
        let words = groups
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, words)| words.as_slice())
            .unwrap_or_default();
        rows.push(table_row(category, words));
    }
    for (category, words) in &groups {
        if !always_show.contains(category) {
            rows.push(table_row(category, words));
        }
    }

    let mut table = String::from("| Type | Words |\n| --- | --- |");
    for row in rows {
        table.push('\n');
        table.push_str(&row);
    }
    table
}

fn table_row(category: &str, words: &[String]) -> String {
    let joined = if words.is_empty() {
        "-".to_string()
    } else {
        words.join(", ")
    };
    format!("| {category} | {joined} |")
}
