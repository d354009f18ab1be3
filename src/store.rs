//! # Vocabulary Store
//!
//! The SQLite-backed source of truth for every categorized term.
//!
//! One table, `terms`, keyed by `normalized_key` (see
//! [`crate::vocabulary::normalized_key`]). [`VocabularyStore::upsert`] is idempotent:
//! adding a term that is already stored only rewrites its category, so the store
//! can be fed duplicates freely, whether they come from one model response or from
//! re-importing an old spreadsheet.
//!
//! Every storage failure surfaces as [`crate::error::VocabularyError::Storage`]; nothing is
//! silently dropped.
//!
//! ```no_run
//! use text_to_vocabulary::store::VocabularyStore;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = VocabularyStore::open("vocabulary.db", true)?;
//! store.upsert("Run", "verb", "llm")?;
//! store.upsert("run", "noun", "llm")?;
//! assert_eq!(store.count()?, 1);
//! # Ok(()) }
//! ```

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use diesel::{connection::SimpleConnection, prelude::*};
use tracing::{debug, info};

use crate::{
    config::establish_connection,
    error::Result,
    models::{NewTerm, Term},
    schema::terms,
    vocabulary::{CategorizedTerm, normalize_category, normalize_surface, normalized_key},
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    term TEXT NOT NULL,
    category TEXT NOT NULL,
    normalized_key TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL DEFAULT 'llm',
    first_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_terms_category ON terms(category);
"#;

/// What a single [`VocabularyStore::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The key existed under a different category, which was overwritten.
    Updated,
    /// The key existed with the same category.
    Unchanged,
    /// The term was blank after normalization.
    Skipped,
}

/// Tally of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl UpsertCounts {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Owns the single SQLite connection of the application.
pub struct VocabularyStore {
    connection: SqliteConnection,
    casefold: bool,
}

impl VocabularyStore {
    /// Open (or create) the database file and make sure the schema exists.
    ///
    /// # Parameters
    /// - `db_path`: SQLite file; parent directories are created as needed.
    /// - `casefold`: whether terms differing only in case share one row.
    pub fn open(db_path: impl AsRef<Path>, casefold: bool) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening vocabulary store: {}", db_path.display());
        let connection = establish_connection(db_path)?;
        Self::with_connection(connection, casefold)
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn open_in_memory(casefold: bool) -> Result<Self> {
        let connection = SqliteConnection::establish(":memory:")?;
        Self::with_connection(connection, casefold)
    }

    fn with_connection(mut connection: SqliteConnection, casefold: bool) -> Result<Self> {
        connection.batch_execute(SCHEMA_SQL)?;
        Ok(Self {
            connection,
            casefold,
        })
    }

    /// Insert a term, or re-categorize it if its normalized key is already stored.
    ///
    /// On update only `category` changes; the stored surface form, `source` and
    /// `first_seen` stay as they were on first insert.
    ///
    /// # Parameters
    /// - `term`: surface form; whitespace is collapsed before storing.
    /// - `category`: label; normalized with [`normalize_category`].
    /// - `source`: provenance recorded on insert, see [`crate::models::SOURCE_LLM`].
    pub fn upsert(&mut self, term: &str, category: &str, source: &str) -> Result<UpsertOutcome> {
        let surface = normalize_surface(term);
        let key = normalized_key(term, self.casefold);
        let (Some(surface), Some(key)) = (surface, key) else {
            return Ok(UpsertOutcome::Skipped);
        };
        let category = normalize_category(category);

        let outcome = self
            .connection
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let existing: Option<Term> = terms::table
                    .filter(terms::normalized_key.eq(&key))
                    .select(Term::as_select())
                    .first(conn)
                    .optional()?;

                match existing {
                    Some(row) if row.category == category => Ok(UpsertOutcome::Unchanged),
                    Some(row) => {
                        diesel::update(terms::table.find(row.id))
                            .set(terms::category.eq(&category))
                            .execute(conn)?;
                        Ok(UpsertOutcome::Updated)
                    }
                    None => {
                        let new_term = NewTerm {
                            term: &surface,
                            category: &category,
                            normalized_key: &key,
                            source,
                            first_seen: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                        };
                        diesel::insert_into(terms::table)
                            .values(&new_term)
                            .execute(conn)?;
                        Ok(UpsertOutcome::Inserted)
                    }
                }
            })?;

        debug!("Upsert {:?} -> {} ({:?})", key, category, outcome);
        Ok(outcome)
    }

    /// Upsert every pair in order. Stops at the first storage error; rows already
    /// written stay written.
    pub fn upsert_all(&mut self, pairs: &[CategorizedTerm], source: &str) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        for pair in pairs {
            counts.record(self.upsert(&pair.term, &pair.category, source)?);
        }
        Ok(counts)
    }

    /// All stored terms, optionally restricted to one category, ordered by term.
    pub fn query(&mut self, category: Option<&str>) -> Result<Vec<Term>> {
        let mut query = terms::table
            .select(Term::as_select())
            .order((terms::term.asc(), terms::normalized_key.asc()))
            .into_boxed();
        if let Some(category) = category {
            query = query.filter(terms::category.eq(normalize_category(category)));
        }
        Ok(query.load(&mut self.connection)?)
    }

    /// Look up one term by its normalized key.
    pub fn find(&mut self, term: &str) -> Result<Option<Term>> {
        let Some(key) = normalized_key(term, self.casefold) else {
            return Ok(None);
        };
        Ok(terms::table
            .filter(terms::normalized_key.eq(key))
            .select(Term::as_select())
            .first(&mut self.connection)
            .optional()?)
    }

    /// Distinct categories present in the store, sorted.
    pub fn list_categories(&mut self) -> Result<Vec<String>> {
        Ok(terms::table
            .select(terms::category)
            .distinct()
            .order(terms::category.asc())
            .load(&mut self.connection)?)
    }

    /// `(category, number of terms)` for every category, sorted by category.
    pub fn category_counts(&mut self) -> Result<Vec<(String, i64)>> {
        Ok(terms::table
            .group_by(terms::category)
            .select((terms::category, diesel::dsl::count_star()))
            .order(terms::category.asc())
            .load(&mut self.connection)?)
    }

    pub fn count(&mut self) -> Result<i64> {
        Ok(terms::table.count().get_result(&mut self.connection)?)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.count()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SOURCE_LLM, SOURCE_ODS_IMPORT};
    use tempfile::TempDir;

    fn pairs(items: &[(&str, &str)]) -> Vec<CategorizedTerm> {
        items
            .iter()
            .filter_map(|(term, category)| CategorizedTerm::new(term, category))
            .collect()
    }

    #[test]
    fn test_upsert_twice_keeps_one_row_with_latest_category() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        assert_eq!(store.upsert("light", "noun", SOURCE_LLM).unwrap(), UpsertOutcome::Inserted);
        let first = store.find("light").unwrap().unwrap();

        assert_eq!(
            store.upsert("light", "adjective", SOURCE_LLM).unwrap(),
            UpsertOutcome::Updated
        );

        let rows = store.query(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "adjective");
        assert_eq!(rows[0].first_seen, first.first_seen);
    }

    #[test]
    fn test_casefold_merges_case_variants() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        store.upsert("Run", "verb", SOURCE_LLM).unwrap();
        assert_eq!(store.upsert("RUN", "verb", SOURCE_LLM).unwrap(), UpsertOutcome::Unchanged);

        let rows = store.query(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].term, "Run");
        assert_eq!(rows[0].normalized_key, "run");
    }

    #[test]
    fn test_without_casefold_case_variants_are_distinct() {
        let mut store = VocabularyStore::open_in_memory(false).unwrap();
        store.upsert("Run", "verb", SOURCE_LLM).unwrap();
        store.upsert("run", "verb", SOURCE_LLM).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_blank_term_is_skipped() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        assert_eq!(store.upsert("  ", "noun", SOURCE_LLM).unwrap(), UpsertOutcome::Skipped);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_update_keeps_source_and_surface() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        store.upsert("Take  off", "verb", SOURCE_ODS_IMPORT).unwrap();
        store.upsert("take off", "phrasal_verb", SOURCE_LLM).unwrap();

        let row = store.find("TAKE OFF").unwrap().unwrap();
        assert_eq!(row.term, "Take off");
        assert_eq!(row.source, SOURCE_ODS_IMPORT);
        assert_eq!(row.category, "phrasal_verb");
    }

    #[test]
    fn test_example_response_scenario() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        let response = pairs(&[("run", "verb"), ("Run", "verb"), ("quickly", "adverb")]);

        let counts = store.upsert_all(&response, SOURCE_LLM).unwrap();
        assert_eq!(counts.inserted, 2);
        assert_eq!(counts.unchanged, 1);

        let stored: Vec<(String, String)> = store
            .query(None)
            .unwrap()
            .into_iter()
            .map(|row| (row.normalized_key, row.category))
            .collect();
        assert_eq!(
            stored,
            vec![
                ("quickly".to_string(), "adverb".to_string()),
                ("run".to_string(), "verb".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_by_category_and_list_categories() {
        let mut store = VocabularyStore::open_in_memory(true).unwrap();
        store
            .upsert_all(
                &pairs(&[("dog", "noun"), ("cat", "noun"), ("run", "verb")]),
                SOURCE_LLM,
            )
            .unwrap();

        let nouns: Vec<String> = store
            .query(Some("Noun"))
            .unwrap()
            .into_iter()
            .map(|row| row.term)
            .collect();
        assert_eq!(nouns, vec!["cat", "dog"]);
        assert_eq!(store.list_categories().unwrap(), vec!["noun", "verb"]);
        assert_eq!(
            store.category_counts().unwrap(),
            vec![("noun".to_string(), 2), ("verb".to_string(), 1)]
        );
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("vocab.db");
        {
            let mut store = VocabularyStore::open(&db_path, true).unwrap();
            store.upsert("cat", "noun", SOURCE_LLM).unwrap();
        }

        let mut store = VocabularyStore::open(&db_path, true).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.find("Cat").unwrap().unwrap().category, "noun");
    }

    #[test]
    fn test_normalized_key_is_unique_in_schema() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("vocab.db");
        VocabularyStore::open(&db_path, true).unwrap();

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT INTO terms (term, category, normalized_key, first_seen) VALUES ('a', 'x', 'a', 'now')",
            [],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO terms (term, category, normalized_key, first_seen) VALUES ('A', 'y', 'a', 'now')",
            [],
        );
        assert!(duplicate.is_err());
    }
}
