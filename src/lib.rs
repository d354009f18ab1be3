//! # Text to Vocabulary (library root)
//!
//! Turns free text into categorized vocabulary lists with the help of an
//! OpenAI-compatible chat model, keeps them in SQLite and exchanges them as ODS
//! spreadsheets.
//!
//! Flow of one "Process text" action:
//!
//! ```text
//! text ──> api::VocabularyClient::analyze ──> [(term, category)]
//!                                               │
//!                                               v
//!                                store::VocabularyStore::upsert_all
//!                                               │
//!                                               v
//!                               vocabulary::format_markdown_table
//! ```
//!
//! "Export" writes the store with [`export::export_store`]; on startup an empty
//! store is seeded from existing spreadsheets by [`import::import_legacy`].
//!
//! ## Modules
//! - [`config`]: `settings.json` loading and validation, database connection
//! - [`error`]: the crate-wide [`error::VocabularyError`]
//! - [`vocabulary`]: term/category values and normalization
//! - [`token_budget`]: `max_tokens` from the context window
//! - [`api`]: chat-completion client and response parsing
//! - [`models`], [`schema`], [`store`]: the diesel-backed term store
//! - [`ods`], [`export`], [`import`]: spreadsheet container, export and legacy import
//! - [`shell`]: the action state machine behind the window
//! - [`ui`]: the eframe window
//! - [`commands`]: command-line arguments

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod ods;
pub mod schema;
pub mod shell;
pub mod store;
pub mod token_budget;
pub mod ui;
pub mod vocabulary;
