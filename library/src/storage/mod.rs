//! The listener reads invoices from, and writes payments to, a storage layer
//! of your choosing. Consumers of this library can use the existing storage
//! layer found in [`stores`], or can implement the [`Storage`] trait
//! themselves to plug in their invoicing system.

mod invoice_storage;
mod payment_storage;
pub mod stores;

pub use invoice_storage::InvoiceStorage;
use log::error;
pub use payment_storage::PaymentStorage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::{Invoice, InvoiceId, PaymentMethodId, PaymentRecord};

/// A supertrait of all necessary storage traits.
pub trait Storage: InvoiceStorage + PaymentStorage + 'static {
    /// Error type for the storage layer.
    type Error: std::error::Error + Send + 'static;

    /// Flush all changes to disk. This method should be manually implemented
    /// for any storage layer that does not automatically flush on write. The
    /// default implementation does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if flush does not succeed.
    fn flush(&self) -> Result<(), <Self as Storage>::Error> {
        Ok(())
    }
}

/// The storage manager takes messages from a channel and runs the corresponding
/// storage method. This keeps blocking IO off the reconciliation task.
struct Manager<S: Storage> {
    store: S,
    receiver: mpsc::Receiver<Method<S>>,
}

impl<S: Storage> Manager<S> {
    fn handle(&mut self, message: Method<S>) {
        match message {
            Method::InsertInvoice { invoice, response } => {
                let id = invoice.id().clone();
                let result = InvoiceStorage::insert(&mut self.store, invoice);
                if response.send(result).is_err() {
                    error!(
                        "Failed to send InsertInvoice response to storage client. Invoice ID: {id}"
                    );
                };
            }
            Method::GetInvoice { id, response } => {
                let invoice = InvoiceStorage::get(&self.store, &id);
                if response.send(invoice).is_err() {
                    error!(
                        "Failed to send GetInvoice response to storage client. Invoice ID: {id}"
                    );
                };
            }
            Method::MonitoredInvoices {
                payment_method_id,
                response,
            } => {
                let invoices = self.store.monitored_invoices(&payment_method_id);
                if response.send(invoices).is_err() {
                    error!("Failed to send MonitoredInvoices response to storage client. Payment method: {payment_method_id}");
                };
            }
            Method::InvoiceFromAddress {
                payment_method_id,
                address,
                response,
            } => {
                let invoice = self
                    .store
                    .invoice_from_address(&payment_method_id, &address);
                if response.send(invoice).is_err() {
                    error!("Failed to send InvoiceFromAddress response to storage client. Address: {address}");
                };
            }
            Method::ActivatePaymentMethod {
                id,
                payment_method_id,
                response,
            } => {
                let result = self.store.activate_payment_method(&id, &payment_method_id);
                if response.send(result).is_err() {
                    error!("Failed to send ActivatePaymentMethod response to storage client. Invoice ID: {id}");
                };
            }

            Method::AddPayment {
                payment,
                tracked_ids,
                response,
            } => {
                let id = payment.id.clone();
                let result = self.store.add_payment(payment, tracked_ids);
                if response.send(result).is_err() {
                    error!(
                        "Failed to send AddPayment response to storage client. Payment ID: {id}"
                    );
                };
            }
            Method::UpdatePayments { payments, response } => {
                let result = self.store.update_payments(payments);
                if response.send(result).is_err() {
                    error!("Failed to send UpdatePayments response to storage client.");
                };
            }

            Method::Flush(response) => {
                if response.send(self.store.flush()).is_err() {
                    error!("Failed to send Flush response to storage client.");
                };
            }
        }
    }
}

type InvoiceResponse<S, T> = oneshot::Sender<Result<T, <S as InvoiceStorage>::Error>>;
type PaymentResponse<S, T> = oneshot::Sender<Result<T, <S as PaymentStorage>::Error>>;

enum Method<S: Storage> {
    InsertInvoice {
        invoice: Invoice,
        response: InvoiceResponse<S, ()>,
    },
    GetInvoice {
        id: InvoiceId,
        response: InvoiceResponse<S, Option<Invoice>>,
    },
    MonitoredInvoices {
        payment_method_id: PaymentMethodId,
        response: InvoiceResponse<S, Vec<Invoice>>,
    },
    InvoiceFromAddress {
        payment_method_id: PaymentMethodId,
        address: String,
        response: InvoiceResponse<S, Option<Invoice>>,
    },
    ActivatePaymentMethod {
        id: InvoiceId,
        payment_method_id: PaymentMethodId,
        response: InvoiceResponse<S, bool>,
    },
    AddPayment {
        payment: PaymentRecord,
        tracked_ids: Vec<String>,
        response: PaymentResponse<S, Option<PaymentRecord>>,
    },
    UpdatePayments {
        payments: Vec<PaymentRecord>,
        response: PaymentResponse<S, ()>,
    },
    Flush(oneshot::Sender<Result<(), <S as Storage>::Error>>),
}

pub(crate) struct Client<S: Storage>(mpsc::Sender<Method<S>>);

impl<S: Storage> Client<S> {
    /// Move `store` onto a dedicated task. Must be called within a tokio
    /// runtime.
    pub(crate) fn new(store: S) -> Self {
        let (sender, receiver) = mpsc::channel(64);
        let mut manager = Manager { store, receiver };

        tokio::spawn(async move {
            while let Some(message) = manager.receiver.recv().await {
                manager.handle(message);
            }
        });

        Self(sender)
    }

    async fn call<T, E>(
        &self,
        method: impl FnOnce(oneshot::Sender<Result<T, E>>) -> Method<S>,
    ) -> Result<T, StorageError>
    where
        E: std::error::Error + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.0
            .send(method(sender))
            .await
            .map_err(|e| StorageError::Send(Box::new(e)))?;
        let response = receiver.await.map_err(|_| StorageError::Receive)?;
        response.map_err(|e| StorageError::Internal(Box::new(e)))
    }

    pub(crate) async fn insert_invoice(&self, invoice: Invoice) -> Result<(), StorageError> {
        self.call(|response| Method::InsertInvoice { invoice, response })
            .await
    }

    pub(crate) async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StorageError> {
        self.call(|response| Method::GetInvoice { id, response })
            .await
    }

    pub(crate) async fn monitored_invoices(
        &self,
        payment_method_id: PaymentMethodId,
    ) -> Result<Vec<Invoice>, StorageError> {
        self.call(|response| Method::MonitoredInvoices {
            payment_method_id,
            response,
        })
        .await
    }

    pub(crate) async fn invoice_from_address(
        &self,
        payment_method_id: PaymentMethodId,
        address: String,
    ) -> Result<Option<Invoice>, StorageError> {
        self.call(|response| Method::InvoiceFromAddress {
            payment_method_id,
            address,
            response,
        })
        .await
    }

    pub(crate) async fn activate_payment_method(
        &self,
        id: InvoiceId,
        payment_method_id: PaymentMethodId,
    ) -> Result<bool, StorageError> {
        self.call(|response| Method::ActivatePaymentMethod {
            id,
            payment_method_id,
            response,
        })
        .await
    }

    pub(crate) async fn add_payment(
        &self,
        payment: PaymentRecord,
        tracked_ids: Vec<String>,
    ) -> Result<Option<PaymentRecord>, StorageError> {
        self.call(|response| Method::AddPayment {
            payment,
            tracked_ids,
            response,
        })
        .await
    }

    pub(crate) async fn update_payments(
        &self,
        payments: Vec<PaymentRecord>,
    ) -> Result<(), StorageError> {
        self.call(|response| Method::UpdatePayments { payments, response })
            .await
    }

    pub(crate) async fn flush(&self) -> Result<(), StorageError> {
        self.call(Method::Flush).await
    }
}

impl<S: Storage> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// An error occurring while storing or retrieving values from a database.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to send message to the storage manager.
    #[error("failed to send message to the storage manager: {0}")]
    Send(Box<dyn std::error::Error + Send>),
    /// Failed to receive result from the storage manager.
    #[error("failed to receive result from the storage manager")]
    Receive,
    /// An error caused by the database, or some interaction with it.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send>),
}
