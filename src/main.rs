#![forbid(unsafe_code)]

//! `live-transmux` — runs one transmuxing session from a TOML file.
//!
//! Loads the session configuration, launches the transcoder, forwards
//! Ctrl-C / SIGTERM as a graceful termination request, and exits with the
//! transcoder's exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use live_transmux::{AppError, Result, Session, SessionConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "live-transmux", about = "Live stream transmuxing session", version, long_about = None)]
struct Cli {
    /// Path to the TOML session configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("live-transmux bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = SessionConfig::load_from_path(&args.config)?;
    info!(stream_path = %config.stream_path, "configuration loaded");

    let mut session = Session::new(config)?;
    let mut ended = session.subscribe();
    session.run()?;

    let end = tokio::select! {
        end = ended.wait() => end,
        signal = termination_request() => {
            info!(signal, "terminating transcoder");
            session.end();
            ended.wait().await
        }
    };

    let end = end.ok_or_else(|| AppError::State("session dropped before it ended".into()))?;
    info!(session_id = %end.session_id, reason = %end.reason, "session ended");

    if end.success() {
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(err) = &end.spawn_error {
        warn!(%err, "transcoder never started");
    }
    let code = end
        .exit_code
        .and_then(|c| u8::try_from(c).ok())
        .filter(|c| *c != 0)
        .unwrap_or(1);
    Ok(ExitCode::from(code))
}

/// Resolves with the name of the first stop signal the operator sends.
async fn termination_request() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            warn!("SIGTERM cannot be observed; only ctrl-c ends the session early");
            return wait_ctrl_c().await;
        };
        tokio::select! {
            name = wait_ctrl_c() => name,
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        wait_ctrl_c().await
    }
}

async fn wait_ctrl_c() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "ctrl-c listener failed; the session runs until the transcoder exits");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("live_transmux=info,warn"));
    let builder = fmt().with_env_filter(filter).with_target(false);

    let installed = match log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("log subscriber: {err}")))
}
