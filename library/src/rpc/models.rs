use serde::{Deserialize, Serialize};

/// Daemon state as reported by `getinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DaemonInfo {
    /// Current chain height.
    pub height: u64,
    /// Whether the daemon is still catching up with the network.
    #[serde(default)]
    pub busy_syncing: bool,
    /// Daemon status string, usually `"OK"`.
    #[serde(default)]
    pub status: String,
    /// Height of the network the daemon is syncing towards, if known.
    #[serde(default)]
    pub target_height: Option<u64>,
}

/// Parameters of `get_recent_txs_and_info2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentTransfersRequest {
    /// Maximum number of transfers to return.
    pub count: u64,
    /// Include coinbase transfers.
    pub exclude_mining_txs: bool,
    /// Skip transfers that are still in the mempool.
    pub exclude_unconfirmed: bool,
    /// Number of transfers to skip.
    pub offset: u64,
    /// Ordering of the returned list.
    pub order: TransferOrder,
    /// Ask the wallet to refresh its balance/height summary.
    pub update_provision_info: bool,
}

impl RecentTransfersRequest {
    /// The newest `count` confirmed transfers, mining transfers included.
    #[must_use]
    pub fn newest_confirmed(count: u64) -> Self {
        RecentTransfersRequest {
            count,
            exclude_mining_txs: false,
            exclude_unconfirmed: true,
            offset: 0,
            order: TransferOrder::FromEndToBegin,
            update_provision_info: true,
        }
    }
}

/// Order of a transfer listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferOrder {
    /// Newest first.
    FromEndToBegin,
    /// Oldest first.
    FromBeginToEnd,
}

/// Result of `get_recent_txs_and_info2`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecentTransfers {
    /// Index of the last returned item.
    #[serde(default)]
    pub last_item_index: u64,
    /// Wallet summary at the time of the call.
    pub pi: WalletProvisionInfo,
    /// Total number of transfers known to the wallet.
    #[serde(default)]
    pub total_transfers: u64,
    /// The transfers themselves. Absent when the wallet has none.
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

/// Wallet summary returned alongside a transfer listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalletProvisionInfo {
    /// Total balance.
    #[serde(default)]
    pub balance: u64,
    /// Unlocked balance.
    #[serde(default)]
    pub unlocked_balance: u64,
    /// The wallet's view of the chain height. Zano spells the key
    /// `curent_height`.
    #[serde(rename = "curent_height", alias = "current_height")]
    pub current_height: u64,
}

/// A single wallet transfer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transfer {
    /// Transaction hash.
    pub tx_hash: String,
    /// Payment id or integrated destination the transfer was sent to.
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Height of the block containing the transaction.
    pub height: u64,
    /// Unlock time of the transaction, in blocks.
    #[serde(default)]
    pub unlock_time: u64,
    /// Per-asset movements. The first entry carries the native amount.
    #[serde(default)]
    pub subtransfers: Vec<Subtransfer>,
    /// Addresses on the other side of the transfer.
    #[serde(default)]
    pub remote_addresses: Vec<String>,
    /// Unix timestamp of the transfer.
    #[serde(default)]
    pub timestamp: u64,
}

impl Transfer {
    /// The destination this transfer can be matched on, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.payment_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Amount of the first subtransfer.
    #[must_use]
    pub fn amount(&self) -> Option<u64> {
        self.subtransfers.first().map(|s| s.amount)
    }
}

/// Movement of one asset inside a [`Transfer`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subtransfer {
    /// Atomic units moved.
    pub amount: u64,
    /// Asset moved.
    #[serde(default)]
    pub asset_id: String,
    /// Whether the wallet received this amount.
    #[serde(default)]
    pub is_income: bool,
}

/// Result of `get_transfer_by_txid`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferById {
    /// Summary of the transfer.
    pub transfer: TransferEntry,
    /// One entry per destination of the transaction owned by the wallet.
    #[serde(default)]
    pub transfers: Vec<TransferEntry>,
}

/// One destination of a transaction looked up by id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferEntry {
    /// Receiving address.
    pub address: String,
    /// Atomic units received.
    pub amount: u64,
    /// Confirmations so far.
    #[serde(default)]
    pub confirmations: u64,
    /// Height of the block containing the transaction, 0 if unconfirmed.
    #[serde(default)]
    pub height: u64,
    /// Transaction hash.
    pub txid: String,
    /// Unlock time of the transaction, in blocks.
    #[serde(default)]
    pub unlock_time: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Accounts {
    #[serde(default)]
    pub subaddress_accounts: Vec<AccountIndex>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountIndex {
    pub account_index: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeightResponse {
    pub height: u64,
}

#[derive(Serialize)]
pub(crate) struct TransferByTxidRequest<'a> {
    pub txid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
}

#[derive(Serialize)]
pub(crate) struct OpenWalletRequest<'a> {
    pub filename: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct CreateWalletRequest<'a> {
    pub filename: &'a str,
    pub password: &'a str,
    pub language: &'a str,
}

#[derive(Serialize)]
pub(crate) struct NoParams {}
