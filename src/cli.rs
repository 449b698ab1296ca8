//! Command-line interface definitions for Listing Rotor.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most options can be provided via command-line flags or environment variables.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the Listing Rotor application.
///
/// # Examples
///
/// ```sh
/// # One manual cycle against the next target in rotation
/// listing_rotor --targets-file targets.yaml run
///
/// # Continuous loop, exporting JSON after every cycle
/// listing_rotor --targets-file targets.yaml -j ./json watch
///
/// # Print the published working set
/// listing_rotor list
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory of the durable JSON store
    #[arg(short, long, env = "STORE_DIR", default_value = "./data")]
    pub store_dir: PathBuf,

    /// Keep all state in memory for this process only
    #[arg(long)]
    pub ephemeral: bool,

    /// YAML file with a list of `{name, url}` targets
    #[arg(short, long, env = "TARGETS_FILE")]
    pub targets_file: Option<PathBuf>,

    /// `|`-separated target URLs, used when no targets file is given
    #[arg(long, env = "SOURCE_URLS")]
    pub source_urls: Option<String>,

    /// Chromium binary to launch; auto-detected when omitted
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Session profile: selectors and reveal tuning
    #[arg(long, value_enum)]
    pub profile: Option<ProfileArg>,

    /// Export listings and cycle reports to this directory after each cycle
    #[arg(short, long)]
    pub json_output_dir: Option<PathBuf>,

    /// Append a JSON line per new-listings alert to this file
    #[arg(long, env = "ALERTS_FILE")]
    pub alerts_file: Option<PathBuf>,

    /// Save page HTML here when a block page or an empty result list is seen
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one scrape cycle and print the cycle report
    Run,
    /// Run cycles continuously
    Watch {
        /// Seconds to wait after a successful cycle
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        /// Seconds to wait after a failed cycle
        #[arg(long, default_value_t = 60)]
        error_pause_secs: u64,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// Print the published listings, newest first
    List,
    /// Scrape every target once without touching any stored state
    Preview,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileArg {
    Interactive,
    Continuous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "listing_rotor",
            "--store-dir",
            "./state",
            "--targets-file",
            "targets.yaml",
            "run",
        ]);

        assert_eq!(cli.store_dir, PathBuf::from("./state"));
        assert_eq!(cli.targets_file, Some(PathBuf::from("targets.yaml")));
        assert_eq!(cli.command, Command::Run);
        assert!(!cli.ephemeral);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["listing_rotor", "-s", "/tmp/state", "-j", "/tmp/json", "list"]);

        assert_eq!(cli.store_dir, PathBuf::from("/tmp/state"));
        assert_eq!(cli.json_output_dir, Some(PathBuf::from("/tmp/json")));
        assert_eq!(cli.alerts_file, None);
        assert_eq!(cli.command, Command::List);
    }

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::parse_from(["listing_rotor", "--profile", "continuous", "watch"]);
        assert_eq!(cli.profile, Some(ProfileArg::Continuous));
        assert_eq!(
            cli.command,
            Command::Watch {
                interval_secs: 30,
                error_pause_secs: 60,
                max_cycles: None,
            }
        );
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["listing_rotor"]).is_err());
    }
}
