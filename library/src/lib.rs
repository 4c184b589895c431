//! # `cryptonote-listener`: Payment Detection for CryptoNote Wallets
//!
//! This library watches CryptoNote-style chains (Zano, Monero and relatives)
//! through the JSON-RPC interfaces of a daemon and a wallet, and turns the
//! wallet's incoming transfers into confirmation-aware payment records
//! attached to your invoices.
//!
//! The [`PaymentGateway`] owns one daemon/wallet client pair per configured
//! chain. For each chain it:
//! * Periodically refreshes a [`ChainSummary`] describing whether the daemon
//!   is synced and the wallet reachable, and publishes an event whenever
//!   availability changes.
//! * Polls the daemon height every few seconds as a fallback for missed block
//!   notifications.
//! * Reconciles the wallet's recent transfers against invoices awaiting
//!   payment whenever a block, transaction, or availability event arrives.
//!
//! Payment records are created at most once per invoice and transaction, and
//! updated in place as confirmations accumulate. Settlement follows the
//! invoice's [`SpeedPolicy`], see [`confirmations_required`].
//!
//! ## Usage
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cryptonote_listener::{
//!     storage::stores::InMemory, ChainRpcConfig, PaymentGatewayBuilder,
//! };
//! use std::time::Duration;
//!
//! let payment_gateway = PaymentGatewayBuilder::new(InMemory::new())
//!     .chain(
//!         "zano",
//!         ChainRpcConfig::new("http://127.0.0.1:11211", "http://127.0.0.1:11212"),
//!     )
//!     .poll_interval(Duration::from_secs(3))
//!     .build()?;
//!
//! payment_gateway.run()?;
//!
//! let mut subscriber = payment_gateway.subscribe_all();
//! while let Some(event) = subscriber.recv().await {
//!     println!("{event}");
//! }
//! #   Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! ### `in-memory`
//!
//! The `in-memory` feature enables the [`InMemory`](storage::stores::InMemory)
//! storage implementation.

#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(clippy::cargo)]
#![warn(clippy::panic)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]

mod invoice;
mod listener;
mod monitor;
mod payment_gateway;
mod policy;
mod poller;
mod pubsub;
pub mod rpc;
pub mod storage;

pub use invoice::{
    Invoice, InvoiceId, PaymentDetails, PaymentMethodId, PaymentPrompt, PaymentRecord,
    PaymentRecordId, PaymentStatus, PromptDetails,
};
pub use monitor::{ChainSummary, RefreshIntervals};
pub use payment_gateway::{
    ChainRpcConfig, PaymentGateway, PaymentGatewayBuilder, PaymentGatewayStatus,
};
pub use policy::{confirmations_required, is_settled, SpeedPolicy};
pub use poller::HeightChange;
pub use pubsub::{Event, Subscriber, SubscriberError};
use rpc::RpcError;
use storage::StorageError;
use thiserror::Error;

/// Library's custom error type.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// An error originating from a daemon or wallet RPC call.
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    /// An error storing/retrieving [`Invoice`]s or payments.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// [`Subscriber`] failed to retrieve an event.
    #[error("subscriber failed to receive event: {0}")]
    Subscriber(#[from] SubscriberError),
    /// Failure to parse a configuration value.
    #[error("failed to parse {datatype} from \"{input}\": {error}")]
    Parse {
        /// Type to parse.
        datatype: &'static str,
        /// Input to parse.
        input: String,
        /// Error encountered.
        error: String,
    },
    /// The requested chain has no daemon/wallet configured.
    #[error("chain {0} is not configured")]
    NotConfigured(String),
    /// Payment gateway is already running.
    #[error("payment gateway is already running")]
    AlreadyRunning,
    /// A background task exited with a panic or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
