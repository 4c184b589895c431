//! Confirmation policy: how many confirmations a payment needs to settle.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::PaymentDetails;

/// How fast an invoice wants its payments to settle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum SpeedPolicy {
    /// Settle on the first sighting.
    HighSpeed,
    /// Settle after one confirmation.
    #[default]
    MediumSpeed,
    /// Settle after two confirmations.
    LowMediumSpeed,
    /// Settle after six confirmations.
    LowSpeed,
    /// A policy this listener does not know, stored by a newer invoicing
    /// system. Settles after six confirmations.
    #[serde(other)]
    Unknown,
}

impl SpeedPolicy {
    /// Confirmations required when neither a lock time nor a merchant
    /// threshold applies.
    #[must_use]
    pub fn default_confirmations(self) -> u64 {
        match self {
            SpeedPolicy::HighSpeed => 0,
            SpeedPolicy::MediumSpeed => 1,
            SpeedPolicy::LowMediumSpeed => 2,
            SpeedPolicy::LowSpeed | SpeedPolicy::Unknown => 6,
        }
    }
}

/// Number of confirmations a payment needs before it settles.
///
/// A lock time still in the future takes precedence: the remaining blocks
/// until unlock are required. Otherwise a merchant threshold wins over the
/// speed policy's default.
#[must_use]
pub fn confirmations_required(
    confirmation_count: u64,
    lock_time: u64,
    settled_confirmation_threshold: Option<u64>,
    speed_policy: SpeedPolicy,
) -> u64 {
    if confirmation_count < lock_time {
        return lock_time - confirmation_count;
    }
    settled_confirmation_threshold.unwrap_or_else(|| speed_policy.default_confirmations())
}

/// Whether a payment with these details is settled under `speed_policy`.
#[must_use]
pub fn is_settled(details: &PaymentDetails, speed_policy: SpeedPolicy) -> bool {
    details.confirmation_count
        >= confirmations_required(
            details.confirmation_count,
            details.lock_time,
            details.settled_confirmation_threshold,
            speed_policy,
        )
}
