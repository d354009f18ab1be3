//! # Database models
//!
//! Data structures that map to the `terms` table via **Diesel**.
//!
//! - [`Term`]: one stored vocabulary entry, as read back from the database.
//! - [`NewTerm`]: the insertable form, built by [`crate::store::VocabularyStore::upsert`].
//!
//! ## Basic usage
//!
//! ```no_run
//! use diesel::prelude::*;
//! use text_to_vocabulary::models::Term;
//! use text_to_vocabulary::schema::terms;
//!
//! # fn demo(conn: &mut SqliteConnection) -> Result<(), Box<dyn std::error::Error>> {
//! let verbs: Vec<Term> = terms::table
//!     .filter(terms::category.eq("verb"))
//!     .select(Term::as_select())
//!     .load(conn)?;
//! # Ok(()) }
//! ```
use diesel::prelude::*;

/// `source` value for rows created from a model response.
pub const SOURCE_LLM: &str = "llm";

/// `source` value for rows created by the legacy spreadsheet import.
pub const SOURCE_ODS_IMPORT: &str = "ods_import";

/// A stored vocabulary entry.
///
/// ### Table
/// - `terms`
///
/// ### Notes
/// - `normalized_key` is unique. It is the lookup key for upserts, so two
///   spellings that normalize alike share one row.
/// - `term`, `source` and `first_seen` keep the values from the first insert;
///   re-categorizing a term only rewrites `category`.
/// - `first_seen` is an RFC 3339 UTC timestamp.
#[derive(Queryable, Identifiable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::terms)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Term {
    /// Auto-increment primary key.
    pub id: i32,
    /// Surface form as first seen.
    pub term: String,
    /// Category label, already normalized.
    pub category: String,
    pub normalized_key: String,
    /// Where the row came from: [`SOURCE_LLM`] or [`SOURCE_ODS_IMPORT`].
    pub source: String,
    pub first_seen: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::terms)]
pub struct NewTerm<'a> {
    pub term: &'a str,
    pub category: &'a str,
    pub normalized_key: &'a str,
    pub source: &'a str,
    pub first_seen: String,
}
