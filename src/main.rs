//! Entry point of the Text to Vocabulary desktop tool (`ttv`).
//!
//! Loads `settings.json`, opens the vocabulary store and shows the window.
//! Configuration and storage problems stop the program before the window opens.
//!
//! ```sh
//! ttv
//! ttv --settings ~/vocab/settings.json
//! RUST_LOG=debug ttv
//! ```

use std::error::Error;

use clap::Parser;
use once_cell::sync::OnceCell;
use text_to_vocabulary::{
    commands::Cli,
    config::{default_settings_path, load_settings},
    shell::Shell,
    ui,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });

    let cli = Cli::parse();
    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };

    debug!("Loading settings from: {}", settings_path.display());
    let shell = load_settings(&settings_path).and_then(Shell::new).map_err(|err| {
        error!("Startup failed: {}", err);
        eprintln!("{err}");
        err
    })?;

    info!("Opening window");
    ui::run(shell)?;
    Ok(())
}
