use std::time::Duration;

use cryptonote_listener::rpc::{Daemon, RpcClient, RpcError, Wallet};
use httpmock::Method::POST;
use hyper::Uri;
use serde_json::json;
use testing_utils::{init_logger, MockDaemon, MockTransfer, MockWallet};

fn client(url: &str, login: Option<(&str, &str)>) -> RpcClient {
    RpcClient::new(
        url.parse::<Uri>().expect("invalid mock server URL"),
        Duration::from_secs(5),
        Duration::from_secs(5),
        login.map(|(user, pass)| (user.to_string(), pass.to_string())),
    )
}

#[tokio::test]
async fn daemon_info() {
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock = mock_daemon.mock_info(1_234, true);

    let info = client(&mock_daemon.url(""), None)
        .info()
        .await
        .expect("failed to get daemon info");

    assert_eq!(info.height, 1_234);
    assert!(info.busy_syncing);
    assert_eq!(info.target_height, Some(0));
    mock.assert_async().await;
}

#[tokio::test]
async fn wallet_recent_transfers() {
    init_logger();
    let mock_wallet = MockWallet::new_mock_wallet().await;
    mock_wallet.mock_transfers(
        120,
        &[
            MockTransfer::new("tx2", "pid-2", 115, 200),
            MockTransfer::new("tx1", "pid-1", 100, 100),
        ],
    );
    let wallet = client(&mock_wallet.url(""), None);

    let recent = wallet
        .recent_transfers(100)
        .await
        .expect("failed to get recent transfers");

    assert_eq!(recent.pi.current_height, 120);
    assert_eq!(recent.transfers.len(), 2);
    assert_eq!(recent.transfers[0].tx_hash, "tx2");
    assert_eq!(recent.transfers[0].destination(), Some("pid-2"));
    assert_eq!(recent.transfers[1].amount(), Some(100));
    assert_eq!(wallet.height().await.expect("failed to get height"), 2_477_657);
}

#[tokio::test]
async fn request_shape() {
    init_logger();
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let mock = mock_wallet.mock(|when, then| {
        when.method(POST)
            .path("/json_rpc")
            .header("content-type", "application/json")
            .json_body(json!({
                "jsonrpc": "2.0",
                "id": "0",
                "method": "get_recent_txs_and_info2",
                "params": {
                    "count": 100,
                    "exclude_mining_txs": false,
                    "exclude_unconfirmed": true,
                    "offset": 0,
                    "order": "FROM_END_TO_BEGIN",
                    "update_provision_info": true
                }
            }));
        then.status(200).json_body(json!({
            "id": "0",
            "jsonrpc": "2.0",
            "result": { "pi": { "curent_height": 7 } }
        }));
    });

    let recent = client(&mock_wallet.url(""), None)
        .recent_transfers(100)
        .await
        .expect("failed to get recent transfers");

    assert_eq!(recent.pi.current_height, 7);
    assert!(recent.transfers.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn basic_auth() {
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock = mock_daemon.mock(|when, then| {
        when.method(POST)
            .path("/json_rpc")
            .header("authorization", "Basic dXNlcjpwYXNz")
            .body_contains(r#""method":"get_height""#);
        then.status(200).json_body(json!({
            "id": "0",
            "jsonrpc": "2.0",
            "result": { "height": 9 }
        }));
    });

    let height = client(&mock_daemon.url(""), Some(("user", "pass")))
        .height()
        .await
        .expect("failed to get height with basic auth");

    assert_eq!(height, 9);
    mock.assert_async().await;
}

#[tokio::test]
async fn api_errors_are_not_transport_errors() {
    init_logger();
    let mock_wallet = MockWallet::new_mock_wallet().await;
    mock_wallet.mock_transfer_not_found("deadbeef");
    let wallet = client(&mock_wallet.url(""), None);

    let error = wallet
        .transfer_by_txid("deadbeef", None)
        .await
        .expect_err("lookup of unknown transaction succeeded");

    assert!(error.is_api());
    assert!(!error.is_transport());
    assert!(matches!(error, RpcError::Api { code: -8, .. }));
}

#[tokio::test]
async fn http_errors_are_transport_errors() {
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    mock_daemon.mock_unavailable();

    let error = client(&mock_daemon.url(""), None)
        .info()
        .await
        .expect_err("unavailable daemon answered");

    assert!(error.is_transport());
    assert!(matches!(error, RpcError::Status(status) if status.as_u16() == 503));
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    init_logger();
    let error = RpcClient::new(
        Uri::from_static("http://127.0.0.1:1"),
        Duration::from_secs(2),
        Duration::from_secs(1),
        None,
    )
    .info()
    .await
    .expect_err("closed port answered");

    assert!(error.is_transport());
}

#[tokio::test]
async fn transfer_lookup_by_account() {
    init_logger();
    let mock_wallet = MockWallet::new_mock_wallet().await;
    mock_wallet.mock_accounts(&[0, 3]);
    mock_wallet.mock_transfer_by_txid("cafe", 90, 6, &[("addr-1", 40), ("addr-2", 60)]);
    let wallet = client(&mock_wallet.url(""), None);

    assert_eq!(
        wallet.accounts().await.expect("failed to list accounts"),
        vec![0, 3]
    );
    let found = wallet
        .transfer_by_txid("cafe", Some(3))
        .await
        .expect("failed to look up transaction");

    assert_eq!(found.transfer.amount, 100);
    assert_eq!(found.transfer.confirmations, 6);
    assert_eq!(found.transfers.len(), 2);
    assert_eq!(found.transfers[1].address, "addr-2");
}
