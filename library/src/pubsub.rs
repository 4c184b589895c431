//! Events flowing between the monitor, the poller, the reconciliation engine
//! and library consumers.

/// Max size of subscriber backlog.
const SUBSCRIPTION_BUFFER_LEN: usize = 2048;

use std::{
    fmt::{self, Debug, Display},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use indexmap::IndexMap;
use log::trace;
use thiserror::Error;
use tokio::{
    sync::mpsc::{channel, error::TryRecvError, Receiver, Sender},
    time::error::Elapsed,
};

use crate::{ChainSummary, InvoiceId, PaymentRecord};

/// Something that happened on a chain or to an invoice.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A block was announced by the daemon, or a height increase was noticed
    /// by the poller (in which case there is no hash).
    BlockSeen {
        /// Upper-case chain code.
        crypto_code: String,
        /// Hash of the block, if known.
        block_hash: Option<String>,
    },
    /// A transaction was announced by the wallet.
    TxSeen {
        /// Upper-case chain code.
        crypto_code: String,
        /// Hash of the transaction.
        tx_hash: String,
    },
    /// A chain became available or unavailable.
    AvailabilityChanged {
        /// Upper-case chain code.
        crypto_code: String,
        /// The freshly refreshed summary.
        summary: ChainSummary,
    },
    /// A payment was recorded for the first time.
    PaymentReceived {
        /// Invoice the payment belongs to.
        invoice_id: InvoiceId,
        /// The new payment.
        payment: PaymentRecord,
    },
    /// Payments of this invoice changed and its state should be recomputed.
    InvoiceNeedsUpdate {
        /// The affected invoice.
        invoice_id: InvoiceId,
    },
    /// A new block finished processing for this chain.
    NewBlock {
        /// Upper-case chain code.
        crypto_code: String,
    },
}

impl Event {
    /// Whether this is an event the reconciliation engine reacts to.
    #[must_use]
    pub fn is_chain_event(&self) -> bool {
        matches!(
            self,
            Event::BlockSeen { .. } | Event::TxSeen { .. } | Event::AvailabilityChanged { .. }
        )
    }

    /// Chain this event concerns, if any.
    #[must_use]
    pub fn crypto_code(&self) -> Option<&str> {
        match self {
            Event::BlockSeen { crypto_code, .. }
            | Event::TxSeen { crypto_code, .. }
            | Event::AvailabilityChanged { crypto_code, .. }
            | Event::NewBlock { crypto_code } => Some(crypto_code),
            Event::PaymentReceived { .. } | Event::InvoiceNeedsUpdate { .. } => None,
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::BlockSeen {
                crypto_code,
                block_hash,
            } => write!(
                f,
                "{crypto_code}: New Block ({})",
                block_hash.as_deref().unwrap_or_default()
            ),
            Event::TxSeen {
                crypto_code,
                tx_hash,
            } => write!(f, "{crypto_code}: Tx Update ({tx_hash})"),
            Event::AvailabilityChanged {
                crypto_code,
                summary,
            } => {
                let state = if summary.is_available() {
                    "available"
                } else {
                    "unavailable"
                };
                write!(f, "{crypto_code}: Availability Changed ({state})")
            }
            Event::PaymentReceived {
                invoice_id,
                payment,
            } => write!(f, "{invoice_id}: Payment Received ({})", payment.id),
            Event::InvoiceNeedsUpdate { invoice_id } => {
                write!(f, "{invoice_id}: Invoice Needs Update")
            }
            Event::NewBlock { crypto_code } => write!(f, "{crypto_code}: New Block Processed"),
        }
    }
}

/// A means of receiving [`Event`]s. Subscribers are returned by
/// [`PaymentGateways`](crate::PaymentGateway) when subscribing.
pub struct Subscriber(Receiver<Event>);

impl Subscriber {
    pub(crate) fn new(receiver: Receiver<Event>) -> Subscriber {
        Subscriber(receiver)
    }

    /// Waits for an event from this subscriber.
    ///
    /// Returns `None` if the channel is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv().await
    }

    /// Blocks while waiting for an event from this subscriber.
    ///
    /// Returns `None` if the channel is closed.
    ///
    /// # Panics
    ///
    /// This function panics if called within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        self.0.blocking_recv()
    }

    /// Attempts to receive an event without blocking. Returns immediately if
    /// no event is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or if there is no event.
    pub fn try_recv(&mut self) -> Result<Event, SubscriberError> {
        Ok(self.0.try_recv()?)
    }

    /// Attempts to wait for an event, returning an error if none arrives
    /// within the provided `Duration`. Returns `None` if the channel is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns an error if no event is received in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Event>, SubscriberError> {
        Ok(tokio::time::timeout(timeout, self.0.recv()).await?)
    }
}

impl Future for Subscriber {
    type Output = Option<Event>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_recv(cx)
    }
}

type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

pub(crate) struct Publisher {
    subs: Mutex<IndexMap<SenderId, (Filter, Sender<Event>)>>,
}

impl Publisher {
    pub fn new() -> Publisher {
        Publisher {
            subs: Mutex::new(IndexMap::new()),
        }
    }

    /// Subscribe to the events accepted by `filter`.
    pub fn subscribe<F>(&self, filter: F) -> Subscriber
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = channel(SUBSCRIPTION_BUFFER_LEN);
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(SenderId::new(), (Arc::new(filter), tx));
        Subscriber::new(rx)
    }

    pub fn subscribe_all(&self) -> Subscriber {
        self.subscribe(|_| true)
    }

    /// Deliver `event` to every interested subscriber, in subscription order.
    pub async fn publish(&self, event: Event) {
        trace!("Publishing event: {event}");
        let mut index = 0;
        while let Some((sender_id, filter, sender)) = self.get_sender_by_index(index) {
            if !filter(&event) {
                index += 1;
                continue;
            }
            if sender.send(event.clone()).await.is_err() {
                self.remove_sender(sender_id);
            } else {
                index += 1;
            }
        }
    }

    fn get_sender_by_index(&self, index: usize) -> Option<(SenderId, Filter, Sender<Event>)> {
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_index(index)
            .map(|(id, (filter, sender))| (*id, filter.clone(), sender.clone()))
    }

    /// Only call from `publish`. Removal shifts later senders down one index,
    /// which `publish` accounts for by not advancing.
    fn remove_sender(&self, sender_id: SenderId) {
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&sender_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
struct SenderId(u128);

impl SenderId {
    fn new() -> SenderId {
        SenderId(rand::random())
    }
}

/// An error occurring while receiving events.
#[derive(Error, Debug)]
pub enum SubscriberError {
    /// Timed out before receiving an event.
    #[error("subscriber recv timeout: {0}")]
    RecvTimeout(#[from] Elapsed),
    /// Subscriber is empty or disconnected.
    #[error("subscriber try recv failed: {0}")]
    TryRecv(#[from] TryRecvError),
}
