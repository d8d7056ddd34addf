//! Startup: preflight checks, then the daemon run.
//!
//! ```ignore
//! use accessh_daemon::startup::{production_deps, run_preflight_checks, run_until_shutdown};
//!
//! let editor = run_preflight_checks(&config, &cwd).await?;
//! let deps = production_deps(&config, editor)?;
//! let exit = run_until_shutdown(&config, deps, shutdown_signal()).await;
//! ```

pub mod preflight;
pub mod runner;

pub use preflight::run_preflight_checks;
pub use runner::{production_deps, run_until_shutdown};
