use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

use crate::{ListenerError, SpeedPolicy};

const CHAIN_SUFFIX: &str = "-CHAIN";

/// Identifier of an [`Invoice`], assigned by the invoicing system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    /// Wrap an invoice id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> InvoiceId {
        InvoiceId(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain payment method of one chain, written `<CODE>-CHAIN`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentMethodId {
    crypto_code: String,
}

impl PaymentMethodId {
    /// The on-chain payment method of `crypto_code`.
    #[must_use]
    pub fn chain(crypto_code: &str) -> PaymentMethodId {
        PaymentMethodId {
            crypto_code: crypto_code.to_uppercase(),
        }
    }

    /// Upper-case chain code.
    #[must_use]
    pub fn crypto_code(&self) -> &str {
        &self.crypto_code
    }
}

impl Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CHAIN_SUFFIX}", self.crypto_code)
    }
}

impl FromStr for PaymentMethodId {
    type Err = ListenerError;

    /// Accepts `ZANO-CHAIN` as well as a bare `zano`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let code = upper.strip_suffix(CHAIN_SUFFIX).unwrap_or(&upper);
        if code.is_empty() || code.contains('-') {
            return Err(ListenerError::Parse {
                datatype: "PaymentMethodId",
                input: s.to_string(),
                error: "expected <CODE>-CHAIN".to_string(),
            });
        }
        Ok(PaymentMethodId::chain(code))
    }
}

impl TryFrom<String> for PaymentMethodId {
    type Error = ListenerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PaymentMethodId> for String {
    fn from(value: PaymentMethodId) -> Self {
        value.to_string()
    }
}

/// Settlement state of a [`PaymentRecord`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
pub enum PaymentStatus {
    /// Seen on chain, not yet confirmed enough.
    Processing,
    /// Confirmed enough for the invoice's speed policy.
    Settled,
}

/// Chain specific details of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Transaction hash.
    pub transaction_id: String,
    /// Confirmations when last observed.
    pub confirmation_count: u64,
    /// Wallet height when last observed.
    pub block_height: u64,
    /// Unlock time of the transaction, in blocks.
    pub lock_time: u64,
    /// Confirmations required by the merchant, overriding the speed policy.
    pub settled_confirmation_threshold: Option<u64>,
}

/// Deterministic identifier of a [`PaymentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRecordId(String);

impl PaymentRecordId {
    /// The id of the payment of transaction `tx_hash` to `invoice_id`. The
    /// same pair always yields the same id.
    #[must_use]
    pub fn derive(tx_hash: &str, invoice_id: &InvoiceId) -> PaymentRecordId {
        let digest = blake3::hash(invoice_id.as_str().as_bytes());
        PaymentRecordId(format!(
            "{tx_hash}-{}",
            hex::encode(&digest.as_bytes()[..8])
        ))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payment attached to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Deterministic id, see [`PaymentRecordId::derive`].
    pub id: PaymentRecordId,
    /// Invoice paid.
    pub invoice_id: InvoiceId,
    /// Payment method used.
    pub payment_method_id: PaymentMethodId,
    /// Address or payment id the funds were sent to.
    pub destination: String,
    /// Atomic units received.
    pub amount: u64,
    /// Settlement state.
    pub status: PaymentStatus,
    /// Chain specific details.
    pub details: PaymentDetails,
}

/// Extra settings of a [`PaymentPrompt`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDetails {
    /// Wallet account receiving the payment.
    pub account_index: Option<u32>,
    /// Confirmations required by the merchant, overriding the speed policy.
    pub settled_confirmation_threshold: Option<u64>,
}

/// What an invoice asks to be paid through one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPrompt {
    /// Payment method of this prompt.
    pub payment_method_id: PaymentMethodId,
    /// Address or payment id shown to the payer.
    pub destination: String,
    /// Whether the prompt has been activated, i.e. shown to or used by the
    /// payer.
    pub activated: bool,
    /// Atomic units requested.
    pub amount_requested: u64,
    /// Extra settings.
    pub details: PromptDetails,
}

/// An invoice, as far as payment detection is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    speed_policy: SpeedPolicy,
    prompts: Vec<PaymentPrompt>,
    addresses: BTreeSet<String>,
    payments: Vec<PaymentRecord>,
}

impl Invoice {
    /// A new invoice without prompts or payments.
    #[must_use]
    pub fn new(id: InvoiceId, speed_policy: SpeedPolicy) -> Invoice {
        Invoice {
            id,
            speed_policy,
            prompts: Vec::new(),
            addresses: BTreeSet::new(),
            payments: Vec::new(),
        }
    }

    /// Add a payment prompt, reserving its destination for this invoice.
    #[must_use]
    pub fn with_prompt(mut self, prompt: PaymentPrompt) -> Invoice {
        self.addresses.insert(prompt.destination.clone());
        self.prompts
            .retain(|p| p.payment_method_id != prompt.payment_method_id);
        self.prompts.push(prompt);
        self
    }

    /// Reserve an additional destination for this invoice.
    pub fn reserve_address(&mut self, address: impl Into<String>) {
        self.addresses.insert(address.into());
    }

    /// The invoice id.
    #[must_use]
    pub fn id(&self) -> &InvoiceId {
        &self.id
    }

    /// How fast payments to this invoice settle.
    #[must_use]
    pub fn speed_policy(&self) -> SpeedPolicy {
        self.speed_policy
    }

    /// All payment prompts.
    #[must_use]
    pub fn prompts(&self) -> &[PaymentPrompt] {
        &self.prompts
    }

    /// The prompt of one payment method.
    #[must_use]
    pub fn prompt(&self, payment_method_id: &PaymentMethodId) -> Option<&PaymentPrompt> {
        self.prompts
            .iter()
            .find(|p| &p.payment_method_id == payment_method_id)
    }

    /// Destinations reserved for this invoice.
    #[must_use]
    pub fn addresses(&self) -> &BTreeSet<String> {
        &self.addresses
    }

    /// Whether `address` is reserved for this invoice.
    #[must_use]
    pub fn reserves_address(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// All payments attached to this invoice.
    #[must_use]
    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    /// Payments made through one payment method.
    pub fn payments_for<'a>(
        &'a self,
        payment_method_id: &'a PaymentMethodId,
    ) -> impl Iterator<Item = &'a PaymentRecord> + 'a {
        self.payments
            .iter()
            .filter(move |p| &p.payment_method_id == payment_method_id)
    }

    /// Sum of payments through one payment method, settled or not.
    #[must_use]
    pub fn amount_paid(&self, payment_method_id: &PaymentMethodId) -> u64 {
        self.payments_for(payment_method_id)
            .fold(0u64, |sum, p| sum.saturating_add(p.amount))
    }

    /// Amount still to be paid through one payment method.
    #[must_use]
    pub fn amount_due(&self, payment_method_id: &PaymentMethodId) -> u64 {
        self.prompt(payment_method_id)
            .map_or(0, |prompt| {
                prompt
                    .amount_requested
                    .saturating_sub(self.amount_paid(payment_method_id))
            })
    }

    /// Whether payments to this invoice through `payment_method_id` should
    /// still be watched: something is due, or a payment is still
    /// processing.
    #[must_use]
    pub fn is_monitored(&self, payment_method_id: &PaymentMethodId) -> bool {
        self.prompt(payment_method_id).is_some()
            && (self.amount_due(payment_method_id) > 0
                || self
                    .payments_for(payment_method_id)
                    .any(|p| p.status == PaymentStatus::Processing))
    }

    /// Attach a new payment. Returns `false` if a payment with the same id is
    /// already attached.
    pub fn attach_payment(&mut self, payment: PaymentRecord) -> bool {
        if self.payments.iter().any(|p| p.id == payment.id) {
            return false;
        }
        self.payments.push(payment);
        true
    }

    /// Copy status and details onto the attached payment with the same id.
    /// Amount and destination keep their recorded values. Returns `false` if
    /// there is no such payment.
    pub fn update_payment(&mut self, payment: &PaymentRecord) -> bool {
        match self.payments.iter_mut().find(|p| p.id == payment.id) {
            Some(existing) => {
                existing.status = payment.status;
                existing.details = payment.details.clone();
                true
            }
            None => false,
        }
    }

    /// Mark a prompt as activated. Returns `false` if there is no such
    /// prompt.
    pub fn activate(&mut self, payment_method_id: &PaymentMethodId) -> bool {
        match self
            .prompts
            .iter_mut()
            .find(|p| &p.payment_method_id == payment_method_id)
        {
            Some(prompt) => {
                prompt.activated = true;
                true
            }
            None => false,
        }
    }
}
