use crate::PaymentRecord;

/// The [`PaymentStorage`] trait describes the payment side of the storage
/// layer. Payments belong to the invoice named by
/// [`PaymentRecord::invoice_id`].
pub trait PaymentStorage: Send + Sync {
    /// Error type for the storage layer.
    type Error: std::error::Error + Send + 'static;

    /// Attach a new payment to its invoice, indexing it under
    /// `tracked_ids` (typically the transaction hash).
    ///
    /// Returns the stored payment, or `None` if a payment with the same id
    /// already exists. Existing payments are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment could not be stored, for example
    /// because its invoice does not exist.
    fn add_payment(
        &mut self,
        payment: PaymentRecord,
        tracked_ids: Vec<String>,
    ) -> Result<Option<PaymentRecord>, Self::Error>;

    /// Update status and details of existing payments in place. Amount and
    /// destination stay as first recorded. Payments that do not exist are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the payments could not be stored.
    fn update_payments(&mut self, payments: Vec<PaymentRecord>) -> Result<(), Self::Error>;
}
