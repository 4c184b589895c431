use crate::{Invoice, InvoiceId, PaymentMethodId};

/// The [`InvoiceStorage`] trait describes the invoice side of the storage
/// layer. Invoices are created by the invoicing system; the listener only
/// reads them and flips prompt activation.
pub trait InvoiceStorage: Send + Sync {
    /// Error type for the storage layer.
    type Error: std::error::Error + Send + 'static;

    /// Insert an invoice.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoice could not be inserted, or if it already
    /// exists.
    fn insert(&mut self, invoice: Invoice) -> Result<(), Self::Error>;

    /// Retrieve an invoice, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoice could not be read.
    fn get(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, Self::Error>;

    /// All invoices still awaiting payment (or settlement of a payment)
    /// through `payment_method_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoices could not be read.
    fn monitored_invoices(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<Vec<Invoice>, Self::Error>;

    /// The invoice that reserved `address` for `payment_method_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoices could not be read.
    fn invoice_from_address(
        &self,
        payment_method_id: &PaymentMethodId,
        address: &str,
    ) -> Result<Option<Invoice>, Self::Error>;

    /// Mark the prompt of `payment_method_id` on an invoice as activated.
    /// Returns `false` if the invoice or prompt does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the invoice could not be updated.
    fn activate_payment_method(
        &mut self,
        invoice_id: &InvoiceId,
        payment_method_id: &PaymentMethodId,
    ) -> Result<bool, Self::Error>;
}
