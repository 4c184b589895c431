//! Notices new blocks without relying on daemon notifications.

use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, info, trace, warn};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    monitor::AvailabilityMonitor,
    pubsub::{Event, Publisher},
    rpc::{Daemon, RpcClient, Wallet},
};

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How a freshly observed daemon height relates to the last known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightChange {
    /// First observation, now used as the baseline.
    Initialized,
    /// The chain grew.
    Advanced {
        /// Previous height.
        from: u64,
        /// New height.
        to: u64,
    },
    /// Same height as before.
    Unchanged,
    /// The daemon reports a lower height than before. The baseline is reset.
    Regressed {
        /// Previous height.
        from: u64,
        /// New height.
        to: u64,
    },
}

pub(crate) struct BlockPoller<D: Daemon = RpcClient, W: Wallet = RpcClient> {
    monitor: Arc<AvailabilityMonitor<D, W>>,
    publisher: Arc<Publisher>,
    last_heights: HashMap<String, u64>,
}

impl<D: Daemon, W: Wallet> BlockPoller<D, W> {
    pub fn new(monitor: Arc<AvailabilityMonitor<D, W>>, publisher: Arc<Publisher>) -> Self {
        BlockPoller {
            monitor,
            publisher,
            last_heights: HashMap::new(),
        }
    }

    /// Record `height` as the latest height of `crypto_code`.
    pub fn observe(&mut self, crypto_code: &str, height: u64) -> HeightChange {
        match self.last_heights.insert(crypto_code.to_string(), height) {
            None => HeightChange::Initialized,
            Some(last) if height > last => HeightChange::Advanced {
                from: last,
                to: height,
            },
            Some(last) if height == last => HeightChange::Unchanged,
            Some(last) => HeightChange::Regressed {
                from: last,
                to: height,
            },
        }
    }

    /// Check every available chain once, publishing [`Event::BlockSeen`] for
    /// each chain whose height advanced.
    pub async fn poll(&mut self) {
        for crypto_code in self.monitor.crypto_codes() {
            if !self.monitor.is_available(&crypto_code) {
                trace!("Skipping height poll of unavailable chain {crypto_code}");
                continue;
            }
            let Some(daemon) = self.monitor.daemon(&crypto_code) else {
                continue;
            };
            let height = match daemon.info().await {
                Ok(info) => info.height,
                Err(e) => {
                    warn!("Failed to poll {crypto_code} daemon height: {e}");
                    continue;
                }
            };

            match self.observe(&crypto_code, height) {
                HeightChange::Initialized => {
                    debug!("{crypto_code} height baseline set to {height}");
                }
                HeightChange::Advanced { from, to } => {
                    info!("{crypto_code} advanced from height {from} to {to}");
                    self.publisher
                        .publish(Event::BlockSeen {
                            crypto_code,
                            block_hash: None,
                        })
                        .await;
                }
                HeightChange::Unchanged => {}
                HeightChange::Regressed { from, to } => {
                    warn!("{crypto_code} height decreased from {from} to {to}, resetting baseline");
                }
            }
        }
    }

    /// Poll every `interval` until shutdown.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Starting block poller with interval {interval:?}");
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Block poller stopped");
    }
}
