//! Scriptable daemon and wallet clients for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use hyper::StatusCode;

use super::{
    Daemon, DaemonInfo, RecentTransfers, RpcError, Transfer, TransferById, Wallet,
    WalletProvisionInfo,
};

fn unreachable() -> RpcError {
    RpcError::Status(StatusCode::SERVICE_UNAVAILABLE)
}

fn not_found() -> RpcError {
    RpcError::Api {
        code: -14,
        message: "transaction not found".to_string(),
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockDaemon(Arc<Mutex<Option<DaemonInfo>>>);

impl MockDaemon {
    pub fn at_height(height: u64) -> MockDaemon {
        let daemon = MockDaemon::default();
        daemon.set_height(height);
        daemon
    }

    pub fn set_height(&self, height: u64) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(DaemonInfo {
            height,
            busy_syncing: false,
            status: "OK".to_string(),
            target_height: Some(0),
        });
    }

    pub fn set_info(&self, info: Option<DaemonInfo>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }
}

impl Daemon for MockDaemon {
    async fn info(&self) -> Result<DaemonInfo, RpcError> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(unreachable)
    }

    fn url(&self) -> String {
        "http://daemon.example.com".to_string()
    }
}

#[derive(Default)]
pub(crate) struct WalletState {
    pub reachable: bool,
    pub wallet_open: bool,
    pub wallet_exists: bool,
    pub height: u64,
    pub transfers: Vec<Transfer>,
    pub by_txid: HashMap<(String, Option<u32>), TransferById>,
    pub accounts: Option<Vec<u32>>,
    pub open_calls: usize,
    pub create_calls: usize,
    pub recent_calls: usize,
    pub lookups: Vec<Option<u32>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockWallet(pub Arc<Mutex<WalletState>>);

impl MockWallet {
    pub fn at_height(height: u64) -> MockWallet {
        let wallet = MockWallet::default();
        wallet.update(|state| {
            state.reachable = true;
            state.wallet_open = true;
            state.wallet_exists = true;
            state.height = height;
            state.accounts = Some(vec![]);
        });
        wallet
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut WalletState) -> T) -> T {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Wallet for MockWallet {
    async fn height(&self) -> Result<u64, RpcError> {
        self.update(|state| {
            if state.reachable && state.wallet_open {
                Ok(state.height)
            } else {
                Err(unreachable())
            }
        })
    }

    async fn recent_transfers(&self, count: u64) -> Result<RecentTransfers, RpcError> {
        self.update(|state| {
            state.recent_calls += 1;
            if !state.reachable {
                return Err(unreachable());
            }
            let transfers: Vec<Transfer> = state
                .transfers
                .iter()
                .take(usize::try_from(count).unwrap_or(usize::MAX))
                .cloned()
                .collect();
            Ok(RecentTransfers {
                last_item_index: 0,
                pi: WalletProvisionInfo {
                    balance: 0,
                    unlocked_balance: 0,
                    current_height: state.height,
                },
                total_transfers: transfers.len() as u64,
                transfers,
            })
        })
    }

    async fn transfer_by_txid(
        &self,
        txid: &str,
        account_index: Option<u32>,
    ) -> Result<TransferById, RpcError> {
        self.update(|state| {
            state.lookups.push(account_index);
            state
                .by_txid
                .get(&(txid.to_string(), account_index))
                .cloned()
                .ok_or_else(not_found)
        })
    }

    async fn accounts(&self) -> Result<Vec<u32>, RpcError> {
        self.update(|state| state.accounts.clone().ok_or_else(not_found))
    }

    async fn open_wallet(&self, _filename: &str, _password: &str) -> Result<(), RpcError> {
        self.update(|state| {
            state.open_calls += 1;
            if state.wallet_exists {
                state.wallet_open = true;
                Ok(())
            } else {
                Err(RpcError::Api {
                    code: -1,
                    message: "wallet not found".to_string(),
                })
            }
        })
    }

    async fn create_wallet(
        &self,
        _filename: &str,
        _password: &str,
        _language: &str,
    ) -> Result<(), RpcError> {
        self.update(|state| {
            state.create_calls += 1;
            state.wallet_exists = true;
            state.wallet_open = true;
            Ok(())
        })
    }

    fn url(&self) -> String {
        "http://wallet.example.com".to_string()
    }
}
