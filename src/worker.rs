use chrono::Local;
use log::{error, info, warn};
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::config::{PollSettings, WatchConfig};
use crate::csv_log::CsvSink;
use crate::error::Result;
use crate::notify::{MatchContext, Notifier};
use crate::parser::{ParseOutcome, parse_response};
use crate::tracker::{LastSeenState, TransitionEvent};
use crate::transport::Transport;

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The response looked blocked or garbled; cookies were re-seeded and no
    /// SKU state was touched.
    Reseeded,
    /// The response was evaluated; holds the transitions it produced.
    Checked(Vec<TransitionEvent>),
}

/// Owns the polling state for one product and drives the poll/reseed cycle.
pub struct Watcher {
    config: WatchConfig,
    settings: PollSettings,
    context: MatchContext,
    transport: Box<dyn Transport>,
    notifier: Option<Box<dyn Notifier>>,
    csv: Option<CsvSink>,
    last_seen: LastSeenState,
}

impl Watcher {
    pub fn new(
        config: WatchConfig,
        settings: PollSettings,
        product_url: String,
        transport: Box<dyn Transport>,
    ) -> Self {
        let context = MatchContext {
            product_id: config.product_id,
            store_id: config.store_id,
            product_url,
        };
        let last_seen = LastSeenState::new(&config.watch_skus);
        Self {
            config,
            settings,
            context,
            transport,
            notifier: None,
            csv: None,
            last_seen,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_csv(mut self, csv: CsvSink) -> Self {
        self.csv = Some(csv);
        self
    }

    #[must_use]
    pub fn last_seen(&self) -> &LastSeenState {
        &self.last_seen
    }

    /// Runs one cycle: check, then either reseed or evaluate transitions.
    ///
    /// # Errors
    ///
    /// Only a failed reseed is an error; everything else is absorbed.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        // Failed fetches and unrecognized bodies are both treated as a block
        let Some(raw) = self.transport.check().await else {
            return self.reseed().await;
        };
        let ParseOutcome::Parsed(states) = parse_response(&raw) else {
            return self.reseed().await;
        };

        let fired = self.last_seen.advance(
            &self.config.watch_skus,
            &self.config.valid_states,
            &states,
        );

        let mut events = Vec::with_capacity(fired.len());
        for (sku, availability) in fired {
            let event = TransitionEvent {
                sku,
                availability,
                raw_payload: raw.clone(),
                timestamp: Local::now(),
            };
            self.report(&event).await;
            events.push(event);
        }

        Ok(PollOutcome::Checked(events))
    }

    async fn reseed(&self) -> Result<PollOutcome> {
        info!("reseeding...");
        self.transport.seed().await?;
        Ok(PollOutcome::Reseeded)
    }

    // Sinks are best-effort: their failures never reach the caller.
    async fn report(&self, event: &TransitionEvent) {
        let detail = event.detail();
        println!(
            "[{}] MATCH {detail} {}",
            event.timestamp.format("%c"),
            event.raw_payload
        );

        if let Some(notifier) = &self.notifier {
            match notifier.notify(event, &self.context).await {
                Ok(()) => info!("email sent: {detail}"),
                Err(e) => error!("email failed: {e}"),
            }
        }

        if let Some(csv) = &self.csv
            && let Err(e) = csv.append(event, &self.context)
        {
            error!("csv log failed ({}): {e}", csv.path().display());
        }
    }

    /// Seeds the session, then polls until `token` is cancelled.
    ///
    /// Returns `Ok(())` only on cancellation; the loop has no other exit.
    ///
    /// # Errors
    ///
    /// Returns the seed error if the initial seed or any reseed fails.
    pub async fn run(&mut self, token: CancellationToken) -> Result<()> {
        // Startup configuration logging
        info!("Starting availability monitoring...");
        info!(
            "Product {} in store {}: {}",
            self.config.product_id, self.config.store_id, self.context.product_url
        );
        info!(
            "Watching SKUs {:?} for states {:?}",
            self.config.watch_skus, self.config.valid_states
        );
        info!("Poll interval: {:?}", self.settings.poll_interval);
        if self.notifier.is_some() {
            info!("Email is configured, a notification will be sent on every match");
        } else {
            warn!("Email is not configured, no notifications will be sent");
        }
        if let Some(csv) = &self.csv {
            info!("Matches will be logged to {}", csv.path().display());
        }

        select! {
            biased;
            () = token.cancelled() => {
                info!("Shutdown requested during initial seed");
                return Ok(());
            }
            result = self.transport.seed() => result?,
        }

        // Main monitoring loop
        loop {
            select! {
                biased;
                () = token.cancelled() => {
                    info!("Shutdown requested during poll");
                    return Ok(());
                }
                result = self.poll_once() => { result?; }
            }

            // Interruptible sleep
            select! {
                biased;
                () = token.cancelled() => {
                    info!("Shutdown requested during sleep");
                    return Ok(());
                }
                () = sleep(self.settings.poll_interval) => {},
            }
        }
    }
}
