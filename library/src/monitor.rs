//! Tracks whether each configured chain's daemon is synced and its wallet
//! reachable.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, SystemTime},
};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    pubsub::{Event, Publisher},
    rpc::{Daemon, RpcClient, RpcError, Wallet},
};

const DEFAULT_AVAILABLE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_UNAVAILABLE_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Wallet file opened (or created) on demand in cheat mode.
const CHEAT_WALLET_FILENAME: &str = "wallet";
const CHEAT_WALLET_PASSWORD: &str = "password";
const CHEAT_WALLET_LANGUAGE: &str = "English";

/// Latest known state of one chain's daemon and wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    /// Whether the daemon reported itself as fully synced.
    pub synced: bool,
    /// Daemon height.
    pub current_height: u64,
    /// Height the daemon is syncing towards.
    pub target_height: u64,
    /// Wallet height.
    pub wallet_height: u64,
    /// When this summary was taken.
    pub updated_at: SystemTime,
    /// Whether the daemon answered.
    pub daemon_available: bool,
    /// Whether the wallet answered.
    pub wallet_available: bool,
}

impl ChainSummary {
    fn empty(updated_at: SystemTime) -> ChainSummary {
        ChainSummary {
            synced: false,
            current_height: 0,
            target_height: 0,
            wallet_height: 0,
            updated_at,
            daemon_available: false,
            wallet_available: false,
        }
    }

    /// A chain is available when its daemon is synced and its wallet answers.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.synced && self.wallet_available
    }
}

/// How long the monitor waits between refreshes of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    /// Wait after a refresh that found the chain available.
    pub available: Duration,
    /// Wait after a refresh that found the chain unavailable, or failed.
    pub unavailable: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        RefreshIntervals {
            available: DEFAULT_AVAILABLE_REFRESH_INTERVAL,
            unavailable: DEFAULT_UNAVAILABLE_REFRESH_INTERVAL,
        }
    }
}

struct ChainClients<D, W> {
    daemon: D,
    wallet: W,
}

pub(crate) struct AvailabilityMonitor<D: Daemon = RpcClient, W: Wallet = RpcClient> {
    chains: HashMap<String, ChainClients<D, W>>,
    summaries: RwLock<HashMap<String, ChainSummary>>,
    cheat_mode: bool,
    publisher: Arc<Publisher>,
}

impl<D: Daemon, W: Wallet> AvailabilityMonitor<D, W> {
    pub fn new(
        chains: impl IntoIterator<Item = (String, D, W)>,
        cheat_mode: bool,
        publisher: Arc<Publisher>,
    ) -> Self {
        if cheat_mode {
            warn!("Cheat mode enabled. Missing wallets will be opened or created automatically.");
        }
        AvailabilityMonitor {
            chains: chains
                .into_iter()
                .map(|(code, daemon, wallet)| (code.to_uppercase(), ChainClients { daemon, wallet }))
                .collect(),
            summaries: RwLock::new(HashMap::new()),
            cheat_mode,
            publisher,
        }
    }

    pub fn is_configured(&self, crypto_code: &str) -> bool {
        self.chains.contains_key(&crypto_code.to_uppercase())
    }

    /// Configured chain codes, sorted.
    pub fn crypto_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.chains.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn daemon(&self, crypto_code: &str) -> Option<&D> {
        self.chains
            .get(&crypto_code.to_uppercase())
            .map(|clients| &clients.daemon)
    }

    pub fn wallet(&self, crypto_code: &str) -> Option<&W> {
        self.chains
            .get(&crypto_code.to_uppercase())
            .map(|clients| &clients.wallet)
    }

    pub fn summary(&self, crypto_code: &str) -> Option<ChainSummary> {
        self.summaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&crypto_code.to_uppercase())
            .cloned()
    }

    pub fn summaries(&self) -> BTreeMap<String, ChainSummary> {
        self.summaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, summary)| (code.clone(), summary.clone()))
            .collect()
    }

    /// Never-observed chains count as unavailable.
    pub fn is_available(&self, crypto_code: &str) -> bool {
        self.summary(crypto_code)
            .is_some_and(|summary| summary.is_available())
    }

    pub fn all_available(&self) -> bool {
        self.chains.keys().all(|code| self.is_available(code))
    }

    /// Query the chain's daemon and wallet, store the resulting summary, and
    /// publish [`Event::AvailabilityChanged`] if availability differs from
    /// the previous summary. Returns `None` for chains that are not
    /// configured.
    pub async fn refresh_summary(&self, crypto_code: &str) -> Option<ChainSummary> {
        let crypto_code = crypto_code.to_uppercase();
        let Some(clients) = self.chains.get(&crypto_code) else {
            warn!("Cannot refresh summary of {crypto_code}: chain is not configured");
            return None;
        };

        let mut summary = ChainSummary::empty(SystemTime::now());

        match clients.daemon.info().await {
            Ok(info) => {
                summary.current_height = info.height;
                summary.target_height = info
                    .target_height
                    .filter(|height| *height != 0)
                    .unwrap_or(info.height);
                summary.synced = !info.busy_syncing;
                summary.daemon_available = true;
            }
            Err(e) => {
                warn!("{crypto_code} daemon at {} unavailable: {e}", clients.daemon.url());
            }
        }

        match self.wallet_height(&crypto_code, &clients.wallet).await {
            Ok(height) => {
                summary.wallet_height = height;
                summary.wallet_available = true;
            }
            Err(e) => {
                warn!("{crypto_code} wallet at {} unavailable: {e}", clients.wallet.url());
            }
        }

        let changed = {
            let mut summaries = self
                .summaries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            summaries
                .insert(crypto_code.clone(), summary.clone())
                .map_or(true, |previous| {
                    previous.is_available() != summary.is_available()
                })
        };

        if changed {
            info!(
                "{crypto_code} is now {}",
                if summary.is_available() {
                    "available"
                } else {
                    "unavailable"
                }
            );
            self.publisher
                .publish(Event::AvailabilityChanged {
                    crypto_code,
                    summary: summary.clone(),
                })
                .await;
        }

        Some(summary)
    }

    /// Wallet height. In cheat mode a failed call is retried once after
    /// opening (or creating) the default wallet.
    async fn wallet_height(&self, crypto_code: &str, wallet: &W) -> Result<u64, RpcError> {
        let mut attempted = false;
        loop {
            match wallet.height().await {
                Ok(height) => return Ok(height),
                Err(e) if self.cheat_mode && !attempted => {
                    attempted = true;
                    warn!("{crypto_code} wallet did not answer ({e}), opening default wallet");
                    open_or_create_wallet(crypto_code, wallet).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refresh `crypto_code` until shutdown, waiting longer between refreshes
    /// while the chain is available.
    pub async fn run(
        self: Arc<Self>,
        crypto_code: String,
        intervals: RefreshIntervals,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Starting availability monitor for {crypto_code}");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let monitor = self.clone();
            let code = crypto_code.clone();
            let delay =
                match tokio::spawn(async move { monitor.refresh_summary(&code).await }).await {
                    Ok(Some(summary)) if summary.is_available() => intervals.available,
                    Ok(_) => intervals.unavailable,
                    Err(e) => {
                        error!("Availability refresh of {crypto_code} failed: {e}");
                        intervals.unavailable
                    }
                };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Availability monitor for {crypto_code} stopped");
    }
}

async fn open_or_create_wallet<W: Wallet>(crypto_code: &str, wallet: &W) {
    if let Err(e) = wallet
        .open_wallet(CHEAT_WALLET_FILENAME, CHEAT_WALLET_PASSWORD)
        .await
    {
        debug!("Failed to open {crypto_code} wallet ({e}), creating it instead");
        if let Err(e) = wallet
            .create_wallet(
                CHEAT_WALLET_FILENAME,
                CHEAT_WALLET_PASSWORD,
                CHEAT_WALLET_LANGUAGE,
            )
            .await
        {
            warn!("Failed to create {crypto_code} wallet: {e}");
        }
    }
}
