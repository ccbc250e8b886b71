use clap::Parser;
use log::{error, info};
use std::{path::PathBuf, process::ExitCode};
use tokio_util::sync::CancellationToken;

const EXIT_INTERRUPTED: u8 = 130;

/// Watch a Zara product and email when a watched size becomes available.
#[derive(Debug, Parser)]
#[command(name = "zara-watch", version)]
struct Cli {
    /// Path to config.json (overrides ZARA_WATCH_CONFIG and the default)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env is fine; the process environment still applies
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    match zara_watch::run(cli.config, token).await {
        Ok(()) => {
            info!("Interrupted.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
