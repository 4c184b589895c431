use cryptonote_listener::{
    Invoice, InvoiceId, PaymentMethodId, PaymentPrompt, PaymentRecord, PaymentStatus,
    PromptDetails, SpeedPolicy,
};

/// An invoice with one prompt for `crypto_code`, paid to `destination`.
#[must_use]
pub fn invoice_with_prompt(
    id: &str,
    crypto_code: &str,
    destination: &str,
    amount_requested: u64,
    activated: bool,
) -> Invoice {
    Invoice::new(InvoiceId::new(id), SpeedPolicy::MediumSpeed).with_prompt(PaymentPrompt {
        payment_method_id: PaymentMethodId::chain(crypto_code),
        destination: destination.to_string(),
        activated,
        amount_requested,
        details: PromptDetails::default(),
    })
}

/// Expected state of a payment record.
#[derive(Clone)]
pub struct MockPayment {
    pub tx_hash: String,
    pub destination: String,
    pub amount: u64,
    pub confirmations: u64,
    pub status: PaymentStatus,
}

impl MockPayment {
    #[must_use]
    pub fn new(tx_hash: &str, destination: &str, amount: u64, confirmations: u64) -> MockPayment {
        MockPayment {
            tx_hash: tx_hash.to_string(),
            destination: destination.to_string(),
            amount,
            confirmations,
            status: PaymentStatus::Settled,
        }
    }

    #[must_use]
    pub fn processing(mut self) -> MockPayment {
        self.status = PaymentStatus::Processing;
        self
    }

    pub fn assert_eq(&self, payment: &PaymentRecord) {
        assert_eq!(payment.details.transaction_id, self.tx_hash);
        assert_eq!(payment.destination, self.destination);
        assert_eq!(payment.amount, self.amount);
        assert_eq!(payment.details.confirmation_count, self.confirmations);
        assert_eq!(payment.status, self.status);
        assert!(payment.id.as_str().starts_with(&self.tx_hash));
    }
}
