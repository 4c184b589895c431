use std::{
    collections::BTreeMap,
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use hyper::Uri;
use log::{debug, info, warn};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    listener::PaymentListener,
    monitor::{AvailabilityMonitor, ChainSummary, RefreshIntervals},
    poller::{BlockPoller, DEFAULT_POLL_INTERVAL},
    pubsub::{Event, Publisher, Subscriber},
    rpc::{
        Daemon, RpcClient, Wallet, DEFAULT_RPC_CONNECTION_TIMEOUT, DEFAULT_RPC_TOTAL_TIMEOUT,
    },
    storage::{Client, Storage},
    Invoice, InvoiceId, ListenerError,
};

/// The `PaymentGateway` watches every configured chain, reconciles incoming
/// transfers against the invoices in its store, and publishes the resulting
/// [`Event`]s.
pub struct PaymentGateway<S: Storage, D: Daemon = RpcClient, W: Wallet = RpcClient>(
    pub(crate) Arc<PaymentGatewayInner<S, D, W>>,
);

#[doc(hidden)]
pub struct PaymentGatewayInner<S: Storage, D: Daemon, W: Wallet> {
    monitor: Arc<AvailabilityMonitor<D, W>>,
    store: Client<S>,
    publisher: Arc<Publisher>,
    refresh_intervals: RefreshIntervals,
    poll_interval: Duration,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: Storage, D: Daemon, W: Wallet> Clone for PaymentGateway<S, D, W> {
    fn clone(&self) -> Self {
        PaymentGateway(self.0.clone())
    }
}

impl<S: Storage, D: Daemon, W: Wallet> Deref for PaymentGateway<S, D, W> {
    type Target = PaymentGatewayInner<S, D, W>;

    fn deref(&self) -> &PaymentGatewayInner<S, D, W> {
        &self.0
    }
}

impl<S: Storage> PaymentGateway<S> {
    /// Returns a builder used to create a new payment gateway.
    #[must_use]
    pub fn builder(store: S) -> PaymentGatewayBuilder<S> {
        PaymentGatewayBuilder::new(store)
    }
}

impl<S: Storage, D: Daemon, W: Wallet> PaymentGateway<S, D, W> {
    pub(crate) fn from_clients(
        chains: Vec<(String, D, W)>,
        store: S,
        cheat_mode: bool,
        refresh_intervals: RefreshIntervals,
        poll_interval: Duration,
    ) -> Self {
        let publisher = Arc::new(Publisher::new());
        let monitor = Arc::new(AvailabilityMonitor::new(
            chains,
            cheat_mode,
            publisher.clone(),
        ));
        let (shutdown, _) = watch::channel(false);

        PaymentGateway(Arc::new(PaymentGatewayInner {
            monitor,
            store: Client::new(store),
            publisher,
            refresh_intervals,
            poll_interval,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }))
    }

    /// Runs the payment gateway. This spawns one availability monitor per
    /// chain, the block poller, and the reconciliation task. Must be called
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an [`ListenerError::AlreadyRunning`] error if the payment
    /// gateway is already running.
    pub fn run(&self) -> Result<(), ListenerError> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles.iter().any(|handle| !handle.is_finished()) {
            return Err(ListenerError::AlreadyRunning);
        }
        handles.clear();
        self.shutdown.send_replace(false);

        // Subscribe before anything can publish, so no early event is lost.
        let chain_events = self.publisher.subscribe(Event::is_chain_event);

        for crypto_code in self.monitor.crypto_codes() {
            debug!("Spawning availability monitor for {crypto_code}");
            handles.push(tokio::spawn(self.monitor.clone().run(
                crypto_code,
                self.refresh_intervals,
                self.shutdown.subscribe(),
            )));
        }

        let poller = BlockPoller::new(self.monitor.clone(), self.publisher.clone());
        handles.push(tokio::spawn(
            poller.run(self.poll_interval, self.shutdown.subscribe()),
        ));

        let listener = PaymentListener::new(
            self.monitor.clone(),
            self.store.clone(),
            self.publisher.clone(),
        );
        handles.push(tokio::spawn(
            listener.run(chain_events, self.shutdown.subscribe()),
        ));

        info!(
            "Payment gateway started for chains: {:?}",
            self.monitor.crypto_codes()
        );
        Ok(())
    }

    /// Returns the enum [`PaymentGatewayStatus`] describing whether the payment
    /// gateway is running.
    #[must_use]
    pub fn status(&self) -> PaymentGatewayStatus {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles.iter().any(|handle| !handle.is_finished()) {
            PaymentGatewayStatus::Running
        } else {
            PaymentGatewayStatus::NotRunning
        }
    }

    /// Signals every background task to stop and waits for them to finish.
    /// If the payment gateway is not running, this method does nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError::Join`] error if a background task panicked.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        self.shutdown.send_replace(true);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            return Ok(());
        }
        info!("Stopping payment gateway");
        for handle in handles {
            handle.await?;
        }
        debug!("Payment gateway stopped");
        Ok(())
    }

    /// Whether a daemon and wallet are configured for `crypto_code`.
    #[must_use]
    pub fn is_configured(&self, crypto_code: &str) -> bool {
        self.monitor.is_configured(&crypto_code.to_uppercase())
    }

    /// Whether the last summary of `crypto_code` found it synced with a
    /// reachable wallet.
    #[must_use]
    pub fn is_available(&self, crypto_code: &str) -> bool {
        self.monitor.is_available(&crypto_code.to_uppercase())
    }

    /// Whether every configured chain is available.
    #[must_use]
    pub fn all_available(&self) -> bool {
        self.monitor.all_available()
    }

    /// The last summary of `crypto_code`, or `None` if it was never observed.
    #[must_use]
    pub fn summary(&self, crypto_code: &str) -> Option<ChainSummary> {
        self.monitor.summary(&crypto_code.to_uppercase())
    }

    /// The last summary of every observed chain, keyed by crypto code.
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, ChainSummary> {
        self.monitor.summaries()
    }

    /// Refresh the summary of `crypto_code` now instead of waiting for its
    /// monitor. Returns `None` if the chain is not configured.
    pub async fn refresh_summary(&self, crypto_code: &str) -> Option<ChainSummary> {
        self.monitor.refresh_summary(crypto_code).await
    }

    /// Tell the gateway a block was found on `crypto_code`, e.g. from a daemon
    /// block notification. Duplicate notifications are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NotConfigured`] if the chain is unknown.
    pub async fn notify_block(
        &self,
        crypto_code: &str,
        block_hash: Option<String>,
    ) -> Result<(), ListenerError> {
        let crypto_code = self.configured_code(crypto_code)?;
        self.publisher
            .publish(Event::BlockSeen {
                crypto_code,
                block_hash,
            })
            .await;
        Ok(())
    }

    /// Tell the gateway the wallet of `crypto_code` saw a transaction.
    /// Duplicate notifications are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NotConfigured`] if the chain is unknown.
    pub async fn notify_transaction(
        &self,
        crypto_code: &str,
        tx_hash: String,
    ) -> Result<(), ListenerError> {
        let crypto_code = self.configured_code(crypto_code)?;
        self.publisher
            .publish(Event::TxSeen {
                crypto_code,
                tx_hash,
            })
            .await;
        Ok(())
    }

    fn configured_code(&self, crypto_code: &str) -> Result<String, ListenerError> {
        let crypto_code = crypto_code.to_uppercase();
        if self.monitor.is_configured(&crypto_code) {
            Ok(crypto_code)
        } else {
            warn!("Received notification for unconfigured chain {crypto_code}");
            Err(ListenerError::NotConfigured(crypto_code))
        }
    }

    /// Returns a `Subscriber` for every event the gateway publishes.
    #[must_use]
    pub fn subscribe_all(&self) -> Subscriber {
        self.publisher.subscribe_all()
    }

    /// Returns a `Subscriber` for the events matching `filter`.
    #[must_use]
    pub fn subscribe<F>(&self, filter: F) -> Subscriber
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.publisher.subscribe(filter)
    }

    /// Get the up-to-date invoice associated with the given [`InvoiceId`], if
    /// it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if there are any underlying issues retrieving data from
    /// the storage layer.
    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, ListenerError> {
        Ok(self.store.get_invoice(invoice_id).await?)
    }

    /// Hand an invoice to the gateway's store.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoice already exists or could not be stored.
    pub async fn insert_invoice(&self, invoice: Invoice) -> Result<(), ListenerError> {
        debug!("Now tracking invoice {}", invoice.id());
        Ok(self.store.insert_invoice(invoice).await?)
    }
}

/// Where to reach the daemon and wallet of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRpcConfig {
    daemon_url: String,
    wallet_url: String,
    login: Option<(String, String)>,
}

impl ChainRpcConfig {
    /// Daemon and wallet JSON-RPC base URLs, without authentication.
    #[must_use]
    pub fn new(daemon_url: impl Into<String>, wallet_url: impl Into<String>) -> ChainRpcConfig {
        ChainRpcConfig {
            daemon_url: daemon_url.into(),
            wallet_url: wallet_url.into(),
            login: None,
        }
    }

    /// Basic auth credentials, sent to both daemon and wallet.
    #[must_use]
    pub fn login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some((username.into(), password.into()));
        self
    }
}

/// A builder for the payment gateway. Used to configure chains, polling and
/// refresh intervals, RPC timeouts, etc.
///
/// # Examples
///
/// ```
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use cryptonote_listener::{storage::stores::InMemory, ChainRpcConfig, PaymentGatewayBuilder};
/// use std::time::Duration;
///
/// let payment_gateway = PaymentGatewayBuilder::new(InMemory::new())
///     .chain(
///         "zano",
///         ChainRpcConfig::new("http://127.0.0.1:11211", "http://127.0.0.1:11212")
///             .login("user", "pass"),
///     )
///     .poll_interval(Duration::from_millis(500))
///     .build()?;
///
/// assert!(payment_gateway.is_configured("ZANO"));
/// #   Ok(())
/// # }
/// ```
pub struct PaymentGatewayBuilder<S> {
    store: S,
    chains: BTreeMap<String, ChainRpcConfig>,
    cheat_mode: bool,
    poll_interval: Duration,
    refresh_intervals: RefreshIntervals,
    rpc_timeout: Duration,
    rpc_connection_timeout: Duration,
}

impl<S: Storage> PaymentGatewayBuilder<S> {
    /// Create a new payment gateway builder.
    #[must_use]
    pub fn new(store: S) -> PaymentGatewayBuilder<S> {
        PaymentGatewayBuilder {
            store,
            chains: BTreeMap::new(),
            cheat_mode: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_intervals: RefreshIntervals::default(),
            rpc_timeout: DEFAULT_RPC_TOTAL_TIMEOUT,
            rpc_connection_timeout: DEFAULT_RPC_CONNECTION_TIMEOUT,
        }
    }

    /// Watch a chain. The crypto code is case-insensitive; configuring the
    /// same chain twice keeps the last configuration.
    #[must_use]
    pub fn chain(mut self, crypto_code: &str, config: ChainRpcConfig) -> PaymentGatewayBuilder<S> {
        self.chains.insert(crypto_code.to_uppercase(), config);
        self
    }

    /// Open, or create, a default wallet when a wallet does not answer. Meant
    /// for test and demo setups only. Defaults to `false`.
    #[must_use]
    pub fn cheat_mode(mut self, enabled: bool) -> PaymentGatewayBuilder<S> {
        self.cheat_mode = enabled;
        self
    }

    /// Time between daemon height polls. Defaults to 3 seconds.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> PaymentGatewayBuilder<S> {
        if interval.is_zero() {
            warn!("Poll interval must be non-zero, keeping {:?}", self.poll_interval);
        } else {
            self.poll_interval = interval;
        }
        self
    }

    /// Time between summary refreshes of an available chain. Defaults to 60
    /// seconds.
    #[must_use]
    pub fn available_refresh_interval(mut self, interval: Duration) -> PaymentGatewayBuilder<S> {
        if interval.is_zero() {
            warn!("Refresh interval must be non-zero, ignoring");
        } else {
            self.refresh_intervals.available = interval;
        }
        self
    }

    /// Time between summary refreshes of an unavailable chain. Defaults to 10
    /// seconds.
    #[must_use]
    pub fn unavailable_refresh_interval(mut self, interval: Duration) -> PaymentGatewayBuilder<S> {
        if interval.is_zero() {
            warn!("Refresh interval must be non-zero, ignoring");
        } else {
            self.refresh_intervals.unavailable = interval;
        }
        self
    }

    /// Total time allowed for one RPC call. Defaults to 10 seconds.
    #[must_use]
    pub fn rpc_timeout(mut self, timeout: Duration) -> PaymentGatewayBuilder<S> {
        self.rpc_timeout = timeout;
        self
    }

    /// Time allowed to connect to a daemon or wallet. Defaults to 5 seconds.
    #[must_use]
    pub fn rpc_connection_timeout(mut self, timeout: Duration) -> PaymentGatewayBuilder<S> {
        self.rpc_connection_timeout = timeout;
        self
    }

    /// Build the payment gateway. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a daemon or wallet URL cannot be parsed.
    pub fn build(self) -> Result<PaymentGateway<S>, ListenerError> {
        if self.chains.is_empty() {
            warn!("No chains configured. The payment gateway will not detect any payments.");
        }

        let mut clients = Vec::with_capacity(self.chains.len());
        for (crypto_code, config) in self.chains {
            let daemon = RpcClient::new(
                parse_uri(&config.daemon_url)?,
                self.rpc_timeout,
                self.rpc_connection_timeout,
                config.login.clone(),
            );
            let wallet = RpcClient::new(
                parse_uri(&config.wallet_url)?,
                self.rpc_timeout,
                self.rpc_connection_timeout,
                config.login,
            );
            debug!(
                "Configured {crypto_code} with daemon {} and wallet {}",
                daemon.url(),
                wallet.url()
            );
            clients.push((crypto_code, daemon, wallet));
        }

        Ok(PaymentGateway::from_clients(
            clients,
            self.store,
            self.cheat_mode,
            self.refresh_intervals,
            self.poll_interval,
        ))
    }
}

fn parse_uri(url: &str) -> Result<Uri, ListenerError> {
    url.parse::<Uri>().map_err(|e| ListenerError::Parse {
        datatype: "Uri",
        input: url.to_string(),
        error: e.to_string(),
    })
}

/// Enumeration of possible payment gateway states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentGatewayStatus {
    /// The payment gateway is watching for incoming payments.
    Running,
    /// The payment gateway is not watching for incoming payments.
    NotRunning,
}
