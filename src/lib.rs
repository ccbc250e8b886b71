pub mod config;
pub mod csv_log;
pub mod error;
pub mod notify;
pub mod parser;
pub mod tracker;
pub mod transport;
pub mod worker;

use log::info;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub use config::{EmailSettings, PollSettings, WatchConfig};
pub use error::{Error, Result};
pub use parser::{ParseOutcome, SkuStateMap, parse, parse_response};
pub use tracker::{LastSeenState, TransitionEvent};
pub use worker::{PollOutcome, Watcher};

use crate::csv_log::CsvSink;
use crate::notify::SmtpNotifier;
use crate::transport::{CurlTransport, WatchUrls};

/// Checks for curl, loads configuration, and watches until `token` is cancelled.
///
/// # Errors
///
/// Returns a configuration error, [`Error::TransportMissing`], or the error of
/// a failed seed. Returns `Ok(())` only after cancellation.
pub async fn run(config_path: Option<PathBuf>, token: CancellationToken) -> Result<()> {
    transport::ensure_curl_available().await?;

    let path = config::resolve_config_path(config_path);
    info!("Loading config from {}", path.display());
    let watch = WatchConfig::load(&path)?;
    let settings = PollSettings::from_env()?;
    let email = EmailSettings::from_env()?;

    let urls = WatchUrls::from_config(&watch)?;
    let product_url = urls.product.to_string();
    let transport = CurlTransport::new(urls, settings.clone());

    let mut watcher = Watcher::new(watch, settings, product_url, Box::new(transport));
    if let Some(email) = email {
        watcher = watcher.with_notifier(Box::new(SmtpNotifier::new(email)));
    }
    if let Some(path) = config::csv_log_path() {
        watcher = watcher.with_csv(CsvSink::new(path));
    }

    watcher.run(token).await
}
