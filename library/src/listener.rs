//! The reconciliation engine: turns wallet transfers into payment records.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, error, info, trace, warn};
use tokio::sync::watch;

use crate::{
    is_settled,
    monitor::AvailabilityMonitor,
    pubsub::{Event, Publisher, Subscriber},
    rpc::{Daemon, RpcClient, TransferById, Wallet},
    storage::{Client, Storage},
    Invoice, InvoiceId, ListenerError, PaymentDetails, PaymentMethodId, PaymentRecord,
    PaymentRecordId, PaymentStatus,
};

/// Transfers with this many confirmations or fewer are not recorded yet.
pub(crate) const MIN_CONFIRMATIONS_TO_RECORD: u64 = 2;
/// Size of the recent transfer page fetched on each pass.
const RECENT_TRANSFERS_COUNT: u64 = 100;

/// A transfer to one destination, as seen by either lookup path.
struct Observation {
    tx_hash: String,
    destination: String,
    amount: u64,
    confirmations: u64,
    observed_height: u64,
    lock_time: u64,
}

/// Changes collected during one pass and committed together.
#[derive(Default)]
struct Batch {
    updates: Vec<PaymentRecord>,
    touched: IndexSet<InvoiceId>,
}

pub(crate) struct PaymentListener<S: Storage, D: Daemon = RpcClient, W: Wallet = RpcClient> {
    monitor: Arc<AvailabilityMonitor<D, W>>,
    store: Client<S>,
    publisher: Arc<Publisher>,
}

impl<S: Storage, D: Daemon, W: Wallet> PaymentListener<S, D, W> {
    pub fn new(
        monitor: Arc<AvailabilityMonitor<D, W>>,
        store: Client<S>,
        publisher: Arc<Publisher>,
    ) -> Self {
        PaymentListener {
            monitor,
            store,
            publisher,
        }
    }

    /// Handle chain events one at a time until shutdown or until the
    /// subscription closes.
    pub async fn run(self, mut subscriber: Subscriber, mut shutdown: watch::Receiver<bool>) {
        info!("Starting payment listener");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                event = subscriber.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Payment listener stopped");
    }

    pub async fn handle_event(&self, event: Event) {
        let Some(crypto_code) = event.crypto_code().map(str::to_uppercase) else {
            return;
        };
        if !self.monitor.is_configured(&crypto_code) {
            debug!("Ignoring event for unconfigured chain: {event}");
            return;
        }

        let result = match &event {
            Event::BlockSeen { .. } if self.monitor.is_available(&crypto_code) => {
                self.on_new_block(&crypto_code).await
            }
            Event::TxSeen { tx_hash, .. } if self.monitor.is_available(&crypto_code) => {
                self.on_transaction(&crypto_code, tx_hash).await
            }
            Event::AvailabilityChanged { summary, .. } if summary.is_available() => {
                self.update_pending_payments(&crypto_code).await
            }
            Event::BlockSeen { .. } | Event::TxSeen { .. } => {
                debug!("Ignoring event for unavailable chain: {event}");
                Ok(())
            }
            Event::AvailabilityChanged { .. }
            | Event::PaymentReceived { .. }
            | Event::InvoiceNeedsUpdate { .. }
            | Event::NewBlock { .. } => Ok(()),
        };

        if let Err(e) = result {
            error!("Payment listener failed to process {crypto_code} event: {e}");
        }
    }

    async fn on_new_block(&self, crypto_code: &str) -> Result<(), ListenerError> {
        info!("Processing new block for {crypto_code}");
        self.update_pending_payments(crypto_code).await?;
        self.publisher
            .publish(Event::NewBlock {
                crypto_code: crypto_code.to_string(),
            })
            .await;
        Ok(())
    }

    fn wallet(&self, crypto_code: &str) -> Result<&W, ListenerError> {
        self.monitor
            .wallet(crypto_code)
            .ok_or_else(|| ListenerError::NotConfigured(crypto_code.to_string()))
    }

    /// Match the wallet's recent transfers against every monitored invoice
    /// with an activated prompt for this chain.
    pub async fn update_pending_payments(&self, crypto_code: &str) -> Result<(), ListenerError> {
        let payment_method_id = PaymentMethodId::chain(crypto_code);
        let invoices: Vec<Invoice> = self
            .store
            .monitored_invoices(payment_method_id.clone())
            .await?
            .into_iter()
            .filter(|invoice| {
                invoice
                    .prompt(&payment_method_id)
                    .is_some_and(|prompt| prompt.activated)
            })
            .collect();
        if invoices.is_empty() {
            trace!("No {payment_method_id} invoices awaiting payment");
            return Ok(());
        }

        let recent = self
            .wallet(crypto_code)?
            .recent_transfers(RECENT_TRANSFERS_COUNT)
            .await?;
        let current_height = recent.pi.current_height;
        debug!(
            "Matching {} recent {crypto_code} transfers against {} invoices at height {current_height}",
            recent.transfers.len(),
            invoices.len()
        );

        let mut batch = Batch::default();
        for transfer in &recent.transfers {
            let Some(destination) = transfer.destination() else {
                continue;
            };

            let existing = invoices.iter().find(|invoice| {
                invoice.payments_for(&payment_method_id).any(|payment| {
                    payment.destination == destination
                        && payment.details.transaction_id == transfer.tx_hash
                })
            });
            let Some(invoice) =
                existing.or_else(|| invoices.iter().find(|i| i.reserves_address(destination)))
            else {
                continue;
            };

            let confirmations = current_height.saturating_sub(transfer.height);
            if confirmations <= MIN_CONFIRMATIONS_TO_RECORD {
                debug!(
                    "Deferring {crypto_code} transfer {} to invoice {}: {confirmations} confirmations",
                    transfer.tx_hash,
                    invoice.id()
                );
                continue;
            }
            let Some(amount) = transfer.amount() else {
                warn!("{crypto_code} transfer {} has no amount", transfer.tx_hash);
                continue;
            };

            let observation = Observation {
                tx_hash: transfer.tx_hash.clone(),
                destination: destination.to_string(),
                amount,
                confirmations,
                observed_height: current_height,
                lock_time: transfer.unlock_time,
            };
            if let Err(e) = self
                .handle_payment(invoice, &payment_method_id, observation, &mut batch)
                .await
            {
                error!(
                    "Failed to record {crypto_code} transfer {} to invoice {}: {e}",
                    transfer.tx_hash,
                    invoice.id()
                );
            }
        }

        self.commit(batch).await
    }

    /// Look up one announced transaction and record it against the invoices
    /// owning its destinations.
    pub async fn on_transaction(&self, crypto_code: &str, tx_hash: &str) -> Result<(), ListenerError> {
        let payment_method_id = PaymentMethodId::chain(crypto_code);
        let Some(found) = self.transfer_by_txid(crypto_code, tx_hash).await? else {
            debug!("{crypto_code} transaction {tx_hash} does not belong to the wallet");
            return Ok(());
        };

        let mut destinations: IndexMap<&str, Vec<_>> = IndexMap::new();
        for entry in &found.transfers {
            destinations.entry(entry.address.as_str()).or_default().push(entry);
        }

        let mut batch = Batch::default();
        for (address, entries) in destinations {
            let invoice = match self
                .store
                .invoice_from_address(payment_method_id.clone(), address.to_string())
                .await
            {
                Ok(Some(invoice)) => invoice,
                Ok(None) => {
                    trace!("No invoice reserved {address}");
                    continue;
                }
                Err(e) => {
                    error!(
                        "Failed to find the invoice of {crypto_code} transaction {tx_hash} to {address}: {e}"
                    );
                    continue;
                }
            };

            let confirmations = found.transfer.confirmations;
            if confirmations <= MIN_CONFIRMATIONS_TO_RECORD {
                debug!(
                    "Deferring {crypto_code} transaction {tx_hash} to invoice {}: {confirmations} confirmations",
                    invoice.id()
                );
                continue;
            }

            let observation = Observation {
                tx_hash: found.transfer.txid.clone(),
                destination: address.to_string(),
                amount: entries
                    .iter()
                    .fold(0u64, |sum, entry| sum.saturating_add(entry.amount)),
                confirmations,
                observed_height: found.transfer.height.saturating_add(confirmations),
                lock_time: found.transfer.unlock_time,
            };
            if let Err(e) = self
                .handle_payment(&invoice, &payment_method_id, observation, &mut batch)
                .await
            {
                error!(
                    "Failed to record {crypto_code} transaction {tx_hash} to invoice {}: {e}",
                    invoice.id()
                );
            }
        }

        self.commit(batch).await
    }

    /// Ask each wallet account for the transaction, first hit wins. A lookup
    /// rejected by the wallet means the transaction is not in that account.
    async fn transfer_by_txid(
        &self,
        crypto_code: &str,
        tx_hash: &str,
    ) -> Result<Option<TransferById>, ListenerError> {
        let wallet = self.wallet(crypto_code)?;
        let accounts: Vec<Option<u32>> = match wallet.accounts().await {
            Ok(accounts) if !accounts.is_empty() => accounts.into_iter().map(Some).collect(),
            Ok(_) => vec![None],
            Err(e) => {
                debug!("Failed to list {crypto_code} wallet accounts, searching all: {e}");
                vec![None]
            }
        };

        for account_index in accounts {
            match wallet.transfer_by_txid(tx_hash, account_index).await {
                Ok(found) => return Ok(Some(found)),
                Err(e) if e.is_api() => {
                    trace!("{tx_hash} not found in {crypto_code} account {account_index:?}: {e}");
                }
                Err(e) => {
                    warn!("Failed to look up {crypto_code} transaction {tx_hash}: {e}");
                }
            }
        }
        Ok(None)
    }

    async fn handle_payment(
        &self,
        invoice: &Invoice,
        payment_method_id: &PaymentMethodId,
        observation: Observation,
        batch: &mut Batch,
    ) -> Result<(), ListenerError> {
        let threshold = invoice
            .prompt(payment_method_id)
            .and_then(|prompt| prompt.details.settled_confirmation_threshold);
        let details = PaymentDetails {
            transaction_id: observation.tx_hash.clone(),
            confirmation_count: observation.confirmations,
            block_height: observation.observed_height,
            lock_time: observation.lock_time,
            settled_confirmation_threshold: threshold,
        };
        let status = if is_settled(&details, invoice.speed_policy()) {
            PaymentStatus::Settled
        } else {
            PaymentStatus::Processing
        };
        let id = PaymentRecordId::derive(&observation.tx_hash, invoice.id());

        // Known payments get new status and details only.
        if let Some(existing) = invoice
            .payments_for(payment_method_id)
            .find(|existing| existing.id == id)
        {
            trace!(
                "Updating payment {id} of invoice {}: {} confirmations, {status}",
                invoice.id(),
                details.confirmation_count
            );
            let mut updated = existing.clone();
            updated.status = status;
            updated.details = details;
            batch.updates.push(updated);
            batch.touched.insert(invoice.id().clone());
            return Ok(());
        }

        let payment = PaymentRecord {
            id,
            invoice_id: invoice.id().clone(),
            payment_method_id: payment_method_id.clone(),
            destination: observation.destination,
            amount: observation.amount,
            status,
            details,
        };
        let added = self
            .store
            .add_payment(payment.clone(), vec![observation.tx_hash])
            .await?;
        batch.touched.insert(invoice.id().clone());
        match added {
            Some(added) => self.received_payment(payment_method_id, added).await,
            // Recorded since the invoice was read. The store merges status
            // and details only.
            None => batch.updates.push(payment),
        }
        Ok(())
    }

    async fn received_payment(&self, payment_method_id: &PaymentMethodId, payment: PaymentRecord) {
        info!(
            "Invoice {} received payment {} of {} {}",
            payment.invoice_id,
            payment.id,
            payment.amount,
            payment_method_id.crypto_code()
        );

        if let Err(e) = self
            .activate_if_due(&payment.invoice_id, payment_method_id)
            .await
        {
            error!(
                "Failed to activate {payment_method_id} on invoice {}: {e}",
                payment.invoice_id
            );
        }

        self.publisher
            .publish(Event::PaymentReceived {
                invoice_id: payment.invoice_id.clone(),
                payment,
            })
            .await;
    }

    async fn activate_if_due(
        &self,
        invoice_id: &InvoiceId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<(), ListenerError> {
        let Some(invoice) = self.store.get_invoice(invoice_id.clone()).await? else {
            return Ok(());
        };
        let activated = invoice
            .prompt(payment_method_id)
            .is_some_and(|prompt| prompt.activated);
        if !activated && invoice.amount_due(payment_method_id) > 0 {
            debug!("Activating {payment_method_id} on invoice {invoice_id}");
            self.store
                .activate_payment_method(invoice_id.clone(), payment_method_id.clone())
                .await?;
        }
        Ok(())
    }

    async fn commit(&self, batch: Batch) -> Result<(), ListenerError> {
        if !batch.updates.is_empty() {
            self.store.update_payments(batch.updates).await?;
        }
        for invoice_id in batch.touched {
            self.publisher
                .publish(Event::InvoiceNeedsUpdate { invoice_id })
                .await;
        }
        self.store.flush().await?;
        Ok(())
    }
}
