use std::path::PathBuf;
use std::process::ExitCode;

use accessh_daemon::cli::{parse_args, run_cli_command, CliCommand, VERSION};
use accessh_daemon::config::DaemonConfig;
use accessh_daemon::daemon::DaemonExit;
use accessh_daemon::error::DaemonError;
use accessh_daemon::startup::{production_deps, run_preflight_checks, run_until_shutdown};
use color_eyre::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(config: DaemonConfig) -> DaemonExit {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let deps = match run_preflight_checks(&config, &cwd).await {
        Ok(editor) => production_deps(&config, editor),
        Err(e) => Err(e),
    };
    let deps = match deps {
        Ok(deps) => deps,
        Err(e) => {
            error!("{} [{}] {}", e.user_message(), e.error_code(), e.recovery_hint());
            return DaemonExit::Failed(e);
        }
    };

    run_until_shutdown(&config, deps, shutdown_signal()).await
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let command = parse_args(std::env::args());
    if let Some(code) = run_cli_command(&command) {
        return Ok(exit_code(code));
    }
    let CliCommand::Run { config_path } = command else {
        return Ok(ExitCode::SUCCESS);
    };

    let config = match DaemonConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let e = DaemonError::from(e);
            eprintln!("Error: {}", e.user_message());
            eprintln!("{}", e.recovery_hint());
            return Ok(exit_code(e.exit_code()));
        }
    };

    init_tracing(&config.log_level);
    info!(
        "accessh-daemon {} starting (client version {})",
        VERSION, config.version
    );

    let exit = run(config).await;
    info!("Stopped: {}", exit);
    Ok(exit_code(exit.exit_code()))
}
