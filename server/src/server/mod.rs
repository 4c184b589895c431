pub(crate) mod api;
mod state;

use std::{
    future::Future,
    io::Error as IoError,
    net::{SocketAddr, SocketAddrV4},
};

use axum::Router;
use cryptonote_listener::{storage::Storage, PaymentGateway};
use log::{debug, info};
pub(crate) use state::State;
use tokio::net::TcpListener;

use super::config::ServerConfig;

/// Bind the API to the configured address.
pub(crate) async fn new_server<S: Storage + 'static>(
    server_config: &ServerConfig,
    payment_gateway: PaymentGateway<S>,
) -> std::io::Result<Server> {
    let router = api::router(State::new(payment_gateway));

    debug!("Binding to {}:{}", server_config.ipv4, server_config.port);
    let listener = TcpListener::bind(SocketAddrV4::new(server_config.ipv4, server_config.port))
        .await?;
    if let Ok(v4_addr) = listener.local_addr() {
        info!("Bound to: {v4_addr:?}");
    }

    Ok(Server { listener, router })
}

pub(crate) struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Serve requests until `shutdown` resolves.
    pub(crate) async fn serve<F>(self, shutdown: F) -> Result<(), IoError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }

    pub(crate) fn ipv4_address(&self) -> Result<SocketAddr, IoError> {
        self.listener.local_addr()
    }
}
