//! # `cryptonote-listener-server`: A standalone payment listener.
//! Watches CryptoNote-style chains through their daemon and wallet RPC and
//! records incoming payments against invoices.
//!
//! If your application requires more flexibility, please see the
//! [`cryptonote-listener`](../library/) library instead.

#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

use cryptonote_listener_server::entrypoint;

#[tokio::main]
async fn main() {
    entrypoint().await;
}
