//! Command-line argument parsing.

use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// Parsed command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Run the daemon with the given config file
    Run { config_path: PathBuf },
    /// Show version information
    Version,
    /// Show usage
    Help,
}

/// Parse command-line arguments, program name included.
///
/// Unknown flags are ignored. A `--config` with no value falls back to the
/// default file.
///
/// ```
/// use accessh_daemon::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["accessh-daemon".to_string(), "-V".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                }
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config_path = PathBuf::from(path);
                }
            }
        }
    }

    CliCommand::Run { config_path }
}
