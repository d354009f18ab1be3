//! This module provides functionality for loading and handling the application's settings.
//!
//! It defines the [`VocabularySettings`] struct, which holds every configuration knob,
//! and [`load_settings`] to read it from a JSON file (`settings.json` next to the
//! executable's working directory by default).
//!
//! Four keys are required: `endpoint`, `model`, `temperature` and `system_prompt`.
//! Every other key is optional and falls back to a default. Optional values that
//! cannot be understood (for example `"auto_import_ods": "maybe"`) are replaced by
//! their default and a warning is logged, which mirrors how forgiving older
//! `settings.json` files expect the loader to be.
//!
//! # Examples
//!
//! Loading the settings from a file:
//!
//! ```no_run
//! use text_to_vocabulary::config::load_settings;
//!
//! let settings = load_settings("settings.json").unwrap();
//! println!("{} via {}", settings.model, settings.endpoint);
//! ```

use crate::error::{Result, VocabularyError};

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::*;

/// File name looked up in the working directory when no override is given.
pub const SETTINGS_FILENAME: &str = "settings.json";

const REQUIRED_KEYS: [&str; 4] = ["endpoint", "model", "temperature", "system_prompt"];

/// How [`crate::export::export_store`] lays out spreadsheet files.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// One `<category>.ods` file per category.
    #[default]
    PerCategory,
    /// One file holding a sheet per category.
    Consolidated,
}

impl FromStr for ExportMode {
    type Err = VocabularyError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "per_category" => Ok(Self::PerCategory),
            "consolidated" => Ok(Self::Consolidated),
            other => Err(VocabularyError::Configuration(format!(
                "export_mode must be 'per_category' or 'consolidated', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerCategory => f.write_str("per_category"),
            Self::Consolidated => f.write_str("consolidated"),
        }
    }
}

/// Represents the application's settings.
///
/// Loaded once at startup by [`load_settings`] and then handed by reference to every
/// component that needs it; nothing mutates it afterwards.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct VocabularySettings {
    /// Chat-completion endpoint, e.g. `http://127.0.0.1:1234/v1/chat/completions`.
    pub endpoint: String,

    /// The name of the model used to categorize the text.
    pub model: String,

    /// Sampling temperature sent with every request.
    pub temperature: f32,

    /// Instructions sent as the system message.
    pub system_prompt: String,

    /// Bearer token for hosted endpoints. Local servers usually need none.
    pub api_key: Option<String>,

    // SQLite database file
    pub db_path: PathBuf,

    // Whether case differences collapse onto one stored term
    pub normalize_casefold: bool,

    /// Deprecated. Still accepted in `settings.json` so older files keep loading,
    /// but nothing reads it: exports only happen on request.
    pub export_on_process: bool,

    pub export_mode: ExportMode,

    pub consolidated_export_name: String,

    // Import spreadsheets from `output_dir` into an empty store at startup
    pub auto_import_ods: bool,

    // Directory exports are written to and legacy spreadsheets are read from
    pub output_dir: PathBuf,

    pub request_timeout_secs: u64,

    // Context window of the model, in tokens
    pub context_limit: usize,

    // Upper bound for `max_tokens` in the request
    pub max_output_tokens: usize,

    // Tokens kept free between the prompt and the answer
    pub token_safety_margin: usize,

    /// Header names recognized as the term column when importing spreadsheets.
    pub import_term_columns: Vec<String>,

    /// Header names recognized as the category column when importing spreadsheets.
    pub import_category_columns: Vec<String>,
}

impl VocabularySettings {
    /// Build settings from the four required values, with every optional key at its default.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
            system_prompt: system_prompt.into(),
            api_key: None,
            db_path: PathBuf::from("vocabulary.db"),
            normalize_casefold: true,
            export_on_process: false,
            export_mode: ExportMode::PerCategory,
            consolidated_export_name: "vocabulary_all.ods".to_string(),
            auto_import_ods: true,
            output_dir: PathBuf::from("exports"),
            request_timeout_secs: 90,
            context_limit: 8192,
            max_output_tokens: 4096,
            token_safety_margin: 256,
            import_term_columns: ["term", "word", "lemma", "surface_form"]
                .map(String::from)
                .to_vec(),
            import_category_columns: ["category", "type", "pos", "part_of_speech"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Mirror of `settings.json` before validation.
///
/// Every field is kept as raw JSON so a malformed optional value can fall back to
/// its default instead of failing the whole file.
#[derive(Deserialize, Debug, Default)]
struct RawSettings {
    endpoint: Option<Value>,
    model: Option<Value>,
    temperature: Option<Value>,
    system_prompt: Option<Value>,
    api_key: Option<Value>,
    db_path: Option<Value>,
    normalize_casefold: Option<Value>,
    export_on_process: Option<Value>,
    export_mode: Option<Value>,
    consolidated_export_name: Option<Value>,
    auto_import_ods: Option<Value>,
    output_dir: Option<Value>,
    request_timeout_secs: Option<Value>,
    context_limit: Option<Value>,
    max_output_tokens: Option<Value>,
    token_safety_margin: Option<Value>,
    import_term_columns: Option<Value>,
    import_category_columns: Option<Value>,
}

/// Path of `settings.json` in the current working directory.
pub fn default_settings_path() -> Result<PathBuf> {
    let cwd = env::current_dir().map_err(|err| {
        VocabularyError::Configuration(format!("cannot determine working directory: {err}"))
    })?;
    Ok(cwd.join(SETTINGS_FILENAME))
}

/// Loads the application's settings from a JSON file.
///
/// Relative `db_path` and `output_dir` values are resolved against the directory
/// containing the settings file.
///
/// # Parameters
///
/// - `file`: The path to the JSON settings file.
///
/// # Returns
///
/// - `Ok(VocabularySettings)`: The validated settings.
/// - `Err(VocabularyError::Configuration)`: The file is missing, is not a JSON
///   object, or a required key is absent or unusable.
///
/// # Examples
///
/// ```no_run
/// use text_to_vocabulary::config::load_settings;
///
/// match load_settings("/path/to/settings.json") {
///     Ok(settings) => println!("{:?}", settings),
///     Err(err) => eprintln!("Error loading settings: {}", err),
/// }
/// ```
pub fn load_settings(file: impl AsRef<Path>) -> Result<VocabularySettings> {
    let file = file.as_ref();
    debug!("Loading settings from: {}", file.display());

    if !file.exists() {
        return Err(VocabularyError::Configuration(format!(
            "missing settings file at '{}'. Create it with the keys: {}",
            file.display(),
            REQUIRED_KEYS.join(", ")
        )));
    }

    let content = fs::read_to_string(file).map_err(|err| {
        VocabularyError::Configuration(format!("cannot read '{}': {err}", file.display()))
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|err| {
        VocabularyError::Configuration(format!("'{}' is not valid JSON: {err}", file.display()))
    })?;
    if !document.is_object() {
        return Err(VocabularyError::Configuration(format!(
            "'{}' must contain a JSON object",
            file.display()
        )));
    }
    let raw: RawSettings = serde_json::from_value(document)
        .map_err(|err| VocabularyError::Configuration(err.to_string()))?;

    let base_dir = file.parent().unwrap_or_else(|| Path::new("."));
    let settings = resolve_settings(raw, base_dir)?;
    debug!("Settings loaded: {:?}", settings);
    Ok(settings)
}

fn resolve_settings(raw: RawSettings, base_dir: &Path) -> Result<VocabularySettings> {
    let endpoint = required_string("endpoint", raw.endpoint)?;
    let model = required_string("model", raw.model)?;
    let temperature = match raw.temperature.as_ref().and_then(coerce_f64) {
        Some(value) => value as f32,
        None if raw.temperature.is_none() => return Err(missing_key("temperature")),
        None => {
            return Err(VocabularyError::Configuration(
                "temperature must be a number".to_string(),
            ));
        }
    };
    let system_prompt = required_string("system_prompt", raw.system_prompt)?;

    let mut settings = VocabularySettings::new(endpoint, model, temperature, system_prompt);

    settings.api_key = raw
        .api_key
        .as_ref()
        .and_then(coerce_string)
        .filter(|key| !key.trim().is_empty());

    if let Some(value) = raw.db_path.as_ref() {
        if let Some(path) = optional(value, "db_path", coerce_string) {
            settings.db_path = PathBuf::from(path);
        }
    }
    settings.db_path = resolve_path(base_dir, &settings.db_path);

    if let Some(value) = raw.output_dir.as_ref() {
        if let Some(path) = optional(value, "output_dir", coerce_string) {
            settings.output_dir = PathBuf::from(path);
        }
    }
    settings.output_dir = resolve_path(base_dir, &settings.output_dir);

    apply(
        &mut settings.normalize_casefold,
        raw.normalize_casefold,
        "normalize_casefold",
        coerce_bool,
    );
    apply(
        &mut settings.export_on_process,
        raw.export_on_process,
        "export_on_process",
        coerce_bool,
    );
    apply(
        &mut settings.auto_import_ods,
        raw.auto_import_ods,
        "auto_import_ods",
        coerce_bool,
    );
    apply(
        &mut settings.consolidated_export_name,
        raw.consolidated_export_name,
        "consolidated_export_name",
        coerce_string,
    );

    if let Some(value) = raw.export_mode.as_ref() {
        if let Some(mode) = optional(value, "export_mode", coerce_string) {
            settings.export_mode = mode.parse()?;
        }
    }

    apply(
        &mut settings.request_timeout_secs,
        raw.request_timeout_secs,
        "request_timeout_secs",
        |value| coerce_u64(value).filter(|secs| *secs > 0),
    );
    apply(&mut settings.context_limit, raw.context_limit, "context_limit", |value| {
        coerce_usize(value).filter(|limit| *limit > 0)
    });
    apply(
        &mut settings.max_output_tokens,
        raw.max_output_tokens,
        "max_output_tokens",
        |value| coerce_usize(value).filter(|limit| *limit > 0),
    );
    apply(
        &mut settings.token_safety_margin,
        raw.token_safety_margin,
        "token_safety_margin",
        coerce_usize,
    );
    apply(
        &mut settings.import_term_columns,
        raw.import_term_columns,
        "import_term_columns",
        coerce_string_list,
    );
    apply(
        &mut settings.import_category_columns,
        raw.import_category_columns,
        "import_category_columns",
        coerce_string_list,
    );

    Ok(settings)
}

fn missing_key(key: &str) -> VocabularyError {
    VocabularyError::Configuration(format!("missing required key '{key}' in settings"))
}

fn required_string(key: &str, value: Option<Value>) -> Result<String> {
    let value = value.ok_or_else(|| missing_key(key))?;
    if value.is_null() {
        return Err(missing_key(key));
    }
    coerce_string(&value).ok_or_else(|| {
        VocabularyError::Configuration(format!("'{key}' must be a non-empty string"))
    })
}

/// Coerce an optional value, logging and discarding it when unusable.
fn optional<T>(value: &Value, key: &str, coerce: impl Fn(&Value) -> Option<T>) -> Option<T> {
    if value.is_null() {
        return None;
    }
    let coerced = coerce(value);
    if coerced.is_none() {
        warn!("Ignoring invalid value for '{}': {}", key, value);
    }
    coerced
}

fn apply<T>(
    target: &mut T,
    value: Option<Value>,
    key: &str,
    coerce: impl Fn(&Value) -> Option<T>,
) {
    if let Some(value) = value.as_ref() {
        if let Some(coerced) = optional(value, key, coerce) {
            *target = coerced;
        }
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_usize(value: &Value) -> Option<usize> {
    coerce_u64(value).and_then(|number| usize::try_from(number).ok())
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Some(true),
            "false" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let names: Vec<String> = items
        .iter()
        .filter_map(coerce_string)
        .map(|name| name.trim().to_string())
        .collect();
    if names.is_empty() { None } else { Some(names) }
}

/// Opens the SQLite database at `db_path`, creating parent directories first.
pub fn establish_connection(db_path: &Path) -> Result<SqliteConnection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| VocabularyError::Storage(format!("{}: {err}", parent.display())))?;
    }
    let url = db_path.to_string_lossy();
    Ok(SqliteConnection::establish(&url)?)
}
