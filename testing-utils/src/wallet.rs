use std::{collections::HashMap, ops::Deref, sync::Mutex};

use httpmock::{Method::POST, Mock, MockServer};
use serde_json::{json, Value};

/// A transfer as listed by `get_recent_txs_and_info2`.
#[derive(Clone)]
pub struct MockTransfer {
    pub tx_hash: String,
    pub payment_id: String,
    pub height: u64,
    pub amount: u64,
    pub unlock_time: u64,
}

impl MockTransfer {
    #[must_use]
    pub fn new(tx_hash: &str, payment_id: &str, height: u64, amount: u64) -> MockTransfer {
        MockTransfer {
            tx_hash: tx_hash.to_string(),
            payment_id: payment_id.to_string(),
            height,
            amount,
            unlock_time: 0,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "tx_hash": self.tx_hash,
            "payment_id": self.payment_id,
            "height": self.height,
            "unlock_time": self.unlock_time,
            "timestamp": 1_700_000_000,
            "remote_addresses": [],
            "subtransfers": [{
                "amount": self.amount,
                "asset_id": "d6329b5b1f7c0805b5c345f4957554002a2f557845f64d7645dae0e051a6498a",
                "is_income": true
            }]
        })
    }
}

pub struct MockWallet {
    server: MockServer,
    height_id: Mutex<Option<usize>>,
    transfers_id: Mutex<Option<usize>>,
    accounts_id: Mutex<Option<usize>>,
    lookup_ids: Mutex<HashMap<String, usize>>,
}

impl Deref for MockWallet {
    type Target = MockServer;

    fn deref(&self) -> &MockServer {
        &self.server
    }
}

fn replace<'a>(id: &Mutex<Option<usize>>, server: &'a MockServer, mock: Mock<'a>) -> Mock<'a> {
    let mut id = id.lock().expect("PoisonError when accessing wallet mock ID");
    if let Some(old) = id.replace(mock.id) {
        Mock::new(old, server).delete();
    }
    mock
}

fn ok(result: &Value) -> Value {
    json!({
        "id": "0",
        "jsonrpc": "2.0",
        "result": result
    })
}

impl MockWallet {
    pub async fn new_mock_wallet() -> MockWallet {
        let mock_wallet = MockWallet {
            server: MockServer::start_async().await,
            height_id: Mutex::new(None),
            transfers_id: Mutex::new(None),
            accounts_id: Mutex::new(None),
            lookup_ids: Mutex::new(HashMap::new()),
        };
        mock_wallet.mock_height(2_477_657);
        mock_wallet.mock_transfers(2_477_657, &[]);
        mock_wallet.mock_accounts(&[]);
        mock_wallet
    }

    fn method_mock(&self, method: &str, response: Value) -> Mock {
        let method = format!(r#""method":"{method}""#);
        self.mock(|when, then| {
            when.method(POST).path("/json_rpc").body_contains(method);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(response);
        })
    }

    pub fn mock_height(&self, height: u64) -> Mock {
        let mock = self.method_mock("get_height", ok(&json!({ "height": height })));
        replace(&self.height_id, self, mock)
    }

    /// Answer `get_height` the way a wallet server without an open wallet
    /// does.
    pub fn mock_no_wallet(&self) -> Mock {
        let mock = self.method_mock(
            "get_height",
            json!({
                "id": "0",
                "jsonrpc": "2.0",
                "error": { "code": -13, "message": "No wallet file" }
            }),
        );
        replace(&self.height_id, self, mock)
    }

    /// Newest first, as the wallet returns them.
    pub fn mock_transfers(&self, current_height: u64, transfers: &[MockTransfer]) -> Mock {
        let transfers: Vec<Value> = transfers.iter().map(MockTransfer::to_json).collect();
        let mock = self.method_mock(
            "get_recent_txs_and_info2",
            ok(&json!({
                "last_item_index": transfers.len(),
                "pi": {
                    "balance": 0,
                    "unlocked_balance": 0,
                    "curent_height": current_height
                },
                "total_transfers": transfers.len(),
                "transfers": transfers
            })),
        );
        replace(&self.transfers_id, self, mock)
    }

    pub fn mock_accounts(&self, accounts: &[u32]) -> Mock {
        let accounts: Vec<Value> = accounts
            .iter()
            .map(|index| json!({ "account_index": index, "label": "" }))
            .collect();
        let mock = self.method_mock(
            "get_accounts",
            ok(&json!({ "subaddress_accounts": accounts })),
        );
        replace(&self.accounts_id, self, mock)
    }

    fn lookup_mock(&self, txid: &str, response: Value) -> Mock {
        if let Some(id) = self
            .lookup_ids
            .lock()
            .expect("PoisonError when reading lookup mock ID")
            .remove(txid)
        {
            Mock::new(id, self).delete();
        }
        let mock = self.mock(|when, then| {
            when.method(POST)
                .path("/json_rpc")
                .body_contains(r#""method":"get_transfer_by_txid""#)
                .body_contains(txid);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(response);
        });
        self.lookup_ids
            .lock()
            .expect("PoisonError when writing lookup mock ID")
            .insert(txid.to_string(), mock.id);
        mock
    }

    /// Answer a lookup of `txid` with one entry per `(address, amount)`.
    pub fn mock_transfer_by_txid(
        &self,
        txid: &str,
        height: u64,
        confirmations: u64,
        destinations: &[(&str, u64)],
    ) -> Mock {
        let entry = |address: &str, amount: u64| {
            json!({
                "address": address,
                "amount": amount,
                "confirmations": confirmations,
                "height": height,
                "txid": txid,
                "unlock_time": 0
            })
        };
        let total: u64 = destinations.iter().map(|(_, amount)| amount).sum();
        let first = destinations.first().map_or("", |(address, _)| *address);
        let entries: Vec<Value> = destinations
            .iter()
            .map(|(address, amount)| entry(address, *amount))
            .collect();
        self.lookup_mock(
            txid,
            ok(&json!({
                "transfer": entry(first, total),
                "transfers": entries
            })),
        )
    }

    pub fn mock_transfer_not_found(&self, txid: &str) -> Mock {
        self.lookup_mock(
            txid,
            json!({
                "id": "0",
                "jsonrpc": "2.0",
                "error": { "code": -8, "message": "Transaction not found" }
            }),
        )
    }
}
