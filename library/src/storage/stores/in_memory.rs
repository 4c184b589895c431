use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
    storage::{InvoiceStorage, PaymentStorage, Storage},
    Invoice, InvoiceId, PaymentMethodId, PaymentRecord,
};

/// In-memory store. Note that invoices and payments stored in memory will not
/// be recoverable on power loss.
pub struct InMemory {
    invoices: BTreeMap<InvoiceId, Invoice>,
    tracked_ids: BTreeMap<String, BTreeSet<InvoiceId>>,
}

impl InMemory {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> InMemory {
        InMemory {
            invoices: BTreeMap::new(),
            tracked_ids: BTreeMap::new(),
        }
    }

    /// Invoices with a payment indexed under `tracked_id`.
    #[must_use]
    pub fn invoices_tracking(&self, tracked_id: &str) -> Vec<InvoiceId> {
        self.tracked_ids
            .get(tracked_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceStorage for InMemory {
    type Error = InMemoryStorageError;

    fn insert(&mut self, invoice: Invoice) -> Result<(), Self::Error> {
        if self.invoices.contains_key(invoice.id()) {
            return Err(InMemoryStorageError::DuplicateInvoice);
        }
        self.invoices.insert(invoice.id().clone(), invoice);
        Ok(())
    }

    fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, Self::Error> {
        Ok(self.invoices.get(invoice_id).cloned())
    }

    fn monitored_invoices(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<Vec<Invoice>, Self::Error> {
        Ok(self
            .invoices
            .values()
            .filter(|invoice| invoice.is_monitored(payment_method_id))
            .cloned()
            .collect())
    }

    fn invoice_from_address(
        &self,
        payment_method_id: &PaymentMethodId,
        address: &str,
    ) -> Result<Option<Invoice>, Self::Error> {
        Ok(self
            .invoices
            .values()
            .find(|invoice| {
                invoice.prompt(payment_method_id).is_some() && invoice.reserves_address(address)
            })
            .cloned())
    }

    fn activate_payment_method(
        &mut self,
        invoice_id: &InvoiceId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<bool, Self::Error> {
        Ok(self
            .invoices
            .get_mut(invoice_id)
            .is_some_and(|invoice| invoice.activate(payment_method_id)))
    }
}

impl PaymentStorage for InMemory {
    type Error = InMemoryStorageError;

    fn add_payment(
        &mut self,
        payment: PaymentRecord,
        tracked_ids: Vec<String>,
    ) -> Result<Option<PaymentRecord>, Self::Error> {
        let invoice = self
            .invoices
            .get_mut(&payment.invoice_id)
            .ok_or_else(|| InMemoryStorageError::MissingInvoice(payment.invoice_id.clone()))?;
        if !invoice.attach_payment(payment.clone()) {
            return Ok(None);
        }
        for tracked_id in tracked_ids {
            self.tracked_ids
                .entry(tracked_id)
                .or_default()
                .insert(payment.invoice_id.clone());
        }
        Ok(Some(payment))
    }

    fn update_payments(&mut self, payments: Vec<PaymentRecord>) -> Result<(), Self::Error> {
        for payment in payments {
            if let Some(invoice) = self.invoices.get_mut(&payment.invoice_id) {
                invoice.update_payment(&payment);
            }
        }
        Ok(())
    }
}

impl Storage for InMemory {
    type Error = InMemoryStorageError;
}

/// An error occurring while storing or retrieving values in memory.
#[derive(Error, Debug)]
#[error("in-memory invoice storage error")]
pub enum InMemoryStorageError {
    /// Attempted to insert an invoice which already exists
    #[error("attempted to insert an invoice which already exists")]
    DuplicateInvoice,
    /// Attempted to attach a payment to an invoice which does not exist
    #[error("attempted to attach a payment to missing invoice {0}")]
    MissingInvoice(InvoiceId),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::InMemory;
    use crate::{
        storage::{InvoiceStorage, PaymentStorage},
        Invoice, InvoiceId, PaymentDetails, PaymentMethodId, PaymentPrompt, PaymentRecord,
        PaymentRecordId, PaymentStatus, PromptDetails, SpeedPolicy,
    };

    fn invoice(id: &str, destination: &str, activated: bool) -> Invoice {
        Invoice::new(InvoiceId::new(id), SpeedPolicy::LowSpeed).with_prompt(PaymentPrompt {
            payment_method_id: PaymentMethodId::chain("ZANO"),
            destination: destination.to_string(),
            activated,
            amount_requested: 50,
            details: PromptDetails::default(),
        })
    }

    fn payment(invoice_id: &str, tx_hash: &str, status: PaymentStatus) -> PaymentRecord {
        let invoice_id = InvoiceId::new(invoice_id);
        PaymentRecord {
            id: PaymentRecordId::derive(tx_hash, &invoice_id),
            invoice_id,
            payment_method_id: PaymentMethodId::chain("ZANO"),
            destination: "pid-1".to_string(),
            amount: 50,
            status,
            details: PaymentDetails {
                transaction_id: tx_hash.to_string(),
                confirmation_count: 3,
                block_height: 10,
                lock_time: 0,
                settled_confirmation_threshold: None,
            },
        }
    }

    #[test]
    fn add_payment_once() {
        let mut store = InMemory::new();
        InvoiceStorage::insert(&mut store, invoice("inv-1", "pid-1", true)).unwrap();

        let first = store
            .add_payment(
                payment("inv-1", "tx1", PaymentStatus::Processing),
                vec!["tx1".to_string()],
            )
            .unwrap();
        assert!(first.is_some());
        let second = store
            .add_payment(
                payment("inv-1", "tx1", PaymentStatus::Settled),
                vec!["tx1".to_string()],
            )
            .unwrap();
        assert!(second.is_none());

        let stored = InvoiceStorage::get(&store, &InvoiceId::new("inv-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.payments().len(), 1);
        assert_eq!(stored.payments()[0].status, PaymentStatus::Processing);
        assert_eq!(store.invoices_tracking("tx1"), vec![InvoiceId::new("inv-1")]);
    }

    #[test]
    fn add_payment_to_missing_invoice() {
        let mut store = InMemory::new();
        assert!(store
            .add_payment(payment("nope", "tx1", PaymentStatus::Processing), vec![])
            .is_err());
    }

    #[test]
    fn update_and_stop_monitoring() {
        let mut store = InMemory::new();
        let pmi = PaymentMethodId::chain("ZANO");
        InvoiceStorage::insert(&mut store, invoice("inv-1", "pid-1", true)).unwrap();
        store
            .add_payment(payment("inv-1", "tx1", PaymentStatus::Processing), vec![])
            .unwrap();
        assert_eq!(store.monitored_invoices(&pmi).unwrap().len(), 1);

        store
            .update_payments(vec![payment("inv-1", "tx1", PaymentStatus::Settled)])
            .unwrap();
        assert!(store.monitored_invoices(&pmi).unwrap().is_empty());
    }

    #[test]
    fn update_only_touches_status_and_details() {
        let mut store = InMemory::new();
        InvoiceStorage::insert(&mut store, invoice("inv-1", "pid-1", true)).unwrap();
        store
            .add_payment(payment("inv-1", "tx1", PaymentStatus::Processing), vec![])
            .unwrap();

        let mut update = payment("inv-1", "tx1", PaymentStatus::Settled);
        update.amount = 5;
        update.details.confirmation_count = 9;
        store.update_payments(vec![update]).unwrap();

        let stored = InvoiceStorage::get(&store, &InvoiceId::new("inv-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.payments()[0].amount, 50);
        assert_eq!(stored.payments()[0].status, PaymentStatus::Settled);
        assert_eq!(stored.payments()[0].details.confirmation_count, 9);
    }

    #[test]
    fn lookup_and_activate() {
        let mut store = InMemory::new();
        let pmi = PaymentMethodId::chain("ZANO");
        InvoiceStorage::insert(&mut store, invoice("inv-1", "pid-1", false)).unwrap();

        assert!(store.invoice_from_address(&pmi, "pid-2").unwrap().is_none());
        assert!(store
            .invoice_from_address(&PaymentMethodId::chain("XMR"), "pid-1")
            .unwrap()
            .is_none());
        assert!(store.invoice_from_address(&pmi, "pid-1").unwrap().is_some());

        assert!(store
            .activate_payment_method(&InvoiceId::new("inv-1"), &pmi)
            .unwrap());
        assert!(!store
            .activate_payment_method(&InvoiceId::new("inv-2"), &pmi)
            .unwrap());
        let stored = InvoiceStorage::get(&store, &InvoiceId::new("inv-1"))
            .unwrap()
            .unwrap();
        assert!(stored.prompt(&pmi).unwrap().activated);
    }
}
