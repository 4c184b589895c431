use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

/// Polling, refresh and RPC timing of the payment listener.
#[serde_as]
#[derive(Deserialize, PartialEq, Eq, Debug, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ListenerConfig {
    /// Milliseconds between daemon height polls.
    #[serde_as(as = "DurationMilliSeconds")]
    pub poll_interval: Duration,
    /// Seconds between availability checks of an available chain.
    #[serde_as(as = "DurationSeconds")]
    pub available_refresh_interval: Duration,
    /// Seconds between availability checks of an unavailable chain.
    #[serde_as(as = "DurationSeconds")]
    pub unavailable_refresh_interval: Duration,
    /// Timeout in seconds for RPC calls.
    #[serde_as(as = "DurationSeconds")]
    pub rpc_timeout: Duration,
    /// Timeout in seconds for making an RPC connection.
    #[serde_as(as = "DurationSeconds")]
    pub connection_timeout: Duration,
    /// Open, or create, a default wallet when a wallet does not answer. Only
    /// for test and demo setups.
    pub cheat_mode: bool,
}

impl ListenerConfig {
    pub(super) fn validate(&self) {
        assert!(
            !self.poll_interval.is_zero(),
            "poll interval must be greater than zero"
        );
        assert!(
            !self.available_refresh_interval.is_zero()
                && !self.unavailable_refresh_interval.is_zero(),
            "refresh intervals must be greater than zero"
        );
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            available_refresh_interval: Duration::from_secs(60),
            unavailable_refresh_interval: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            cheat_mode: false,
        }
    }
}
