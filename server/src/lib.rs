//! # `cryptonote_listener_server`: A standalone payment listener.
//! `cryptonote_listener_server` wraps the `cryptonote-listener` library in an
//! HTTP server that accepts daemon and wallet notifications, serves chain
//! summaries, and tracks invoices.
//!
//! This library is intended for use by the listener server binary, and is not
//! intended to be used on its own.

mod config;
pub mod logging;
mod server;

use std::{future::Future, io::Error as IoError, net::SocketAddr, path::PathBuf};

use cryptonote_listener::{storage::stores::InMemory, PaymentGateway, PaymentGatewayBuilder};
use log::{debug, error, info, warn};
use server::{new_server, Server};

use crate::logging::{init_logger, set_verbosity};
pub use crate::{
    config::Config,
    server::api::{ApiError, InvoiceIdPayload},
};

/// Start a standalone payment listener, serving until interrupted.
pub async fn entrypoint() {
    init_logger();

    let config_path = Config::get_path();
    let config = load_config(&config_path);
    set_verbosity(config.logging);

    let payment_gateway = build_gateway(&config);
    info!("Payment gateway created.");

    spawn_gateway(&payment_gateway);

    let server = build_server(&config, payment_gateway.clone()).await;
    debug!("Built listener server");
    run_server(server, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
        info!("Shutting down");
    })
    .await;

    if let Err(e) = payment_gateway.stop().await {
        error!("Payment gateway did not stop cleanly: {e}");
    }
}

/// Loads config.
///
/// # Panics
///
/// Panics if the config could not be read or validated.
#[must_use]
pub fn load_config(path: &PathBuf) -> Config {
    let config = Config::read(path).expect("failed to read config");
    config.validate();

    config
}

/// Build a payment gateway watching every fully configured chain.
///
/// # Panics
///
/// Panics if the payment gateway could not be built, e.g. because a URL is
/// invalid.
#[must_use]
pub fn build_gateway(config: &Config) -> PaymentGateway<InMemory> {
    let listener = &config.listener;
    let mut builder = PaymentGatewayBuilder::new(InMemory::new())
        .cheat_mode(listener.cheat_mode)
        .poll_interval(listener.poll_interval)
        .available_refresh_interval(listener.available_refresh_interval)
        .unavailable_refresh_interval(listener.unavailable_refresh_interval)
        .rpc_timeout(listener.rpc_timeout)
        .rpc_connection_timeout(listener.connection_timeout);

    let chains = config.enabled_chains();
    if chains.is_empty() {
        warn!("No chain has both a daemon and a wallet configured. Nothing will be watched.");
    }
    for (crypto_code, rpc_config) in chains {
        info!("Watching {crypto_code}");
        builder = builder.chain(&crypto_code, rpc_config);
    }

    builder.build().expect("failed to build payment gateway")
}

/// Run the payment gateway and spawn a task logging what it publishes.
///
/// # Panics
///
/// Panics if the payment gateway could not be run.
pub fn spawn_gateway(payment_gateway: &PaymentGateway<InMemory>) {
    payment_gateway
        .run()
        .expect("failed to run payment gateway");
    info!("Payment gateway running.");

    let mut subscriber = payment_gateway.subscribe(|event| !event.is_chain_event());
    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            info!("{event}");
        }
        debug!("Event log closed");
    });
}

/// Bind the HTTP API.
///
/// # Panics
///
/// Panics if the API server could not be created (for example, if the
/// specified port could not be bound).
pub async fn build_server(
    config: &Config,
    payment_gateway: PaymentGateway<InMemory>,
) -> ListenerServer {
    let server = new_server(&config.server, payment_gateway)
        .await
        .expect("failed to start API server");
    debug!("Built API server");

    ListenerServer { server }
}

/// A bound, not yet serving, instance of the listener server.
pub struct ListenerServer {
    server: Server,
}

impl ListenerServer {
    /// Return the ipv4 address of the API server.
    ///
    /// # Errors
    ///
    /// Returns an IO error if there was an issue getting the address.
    pub fn ipv4_address(&self) -> Result<SocketAddr, IoError> {
        self.server.ipv4_address()
    }
}

/// Serve the HTTP API until `shutdown` resolves.
pub async fn run_server<F>(server: ListenerServer, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = server.server.serve(shutdown).await {
        error!("API server failed: {e}");
    }
}
