//! Command-line surface of the `ttv` binary, parsed with `clap`.
//!
//! There are no subcommands: running `ttv` opens the window. The only option
//! points at a different settings file.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use text_to_vocabulary::commands::Cli;
//!
//! let cli = Cli::parse();
//! if let Some(path) = cli.settings {
//!     println!("using {}", path.display());
//! }
//! ```

use std::path::PathBuf;

use clap::Parser;

/// Parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, color = clap::ColorChoice::Auto)]
pub struct Cli {
    /// Path to `settings.json`. Defaults to the file in the current directory.
    #[arg(short, long, env = "TTV_SETTINGS", value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments() {
        assert!(Cli::try_parse_from(["ttv"]).is_ok());
    }

    #[test]
    fn test_settings_override() {
        let cli = Cli::try_parse_from(["ttv", "--settings", "/tmp/other.json"]).unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/other.json")));
    }

    #[test]
    fn test_rejects_subcommands() {
        assert!(Cli::try_parse_from(["ttv", "ask"]).is_err());
    }
}
