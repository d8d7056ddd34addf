//! Command-line interface.
//!
//! `main` parses arguments first and only starts the daemon for
//! [`CliCommand::Run`]:
//!
//! ```ignore
//! use accessh_daemon::cli::{parse_args, run_cli_command, CliCommand};
//!
//! let command = parse_args(std::env::args());
//! if let Some(code) = run_cli_command(&command) {
//!     std::process::exit(code);
//! }
//! ```

pub mod args;
pub mod version;

pub use args::{parse_args, CliCommand};
pub use version::{usage, version_line, VERSION};

/// Handle informational commands. Returns the exit code when the command
/// is fully handled, `None` when the daemon should run.
pub fn run_cli_command(command: &CliCommand) -> Option<i32> {
    match command {
        CliCommand::Version => {
            println!("{}", version_line());
            Some(0)
        }
        CliCommand::Help => {
            println!("{}", usage());
            Some(0)
        }
        CliCommand::Run { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_returns_none() {
        let command = CliCommand::Run {
            config_path: PathBuf::from("config.json"),
        };
        assert!(run_cli_command(&command).is_none());
        assert_eq!(run_cli_command(&CliCommand::Version), Some(0));
    }
}
