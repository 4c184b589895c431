use std::time::Duration;

use cryptonote_listener::{
    storage::stores::InMemory, Event, Invoice, InvoiceId, PaymentGateway, Subscriber,
};
use cryptonote_listener_server::{
    build_gateway, build_server, run_server, spawn_gateway, Config, InvoiceIdPayload,
};
use http_body_util::{BodyExt, Full};
use hyper::{body::Bytes, header::CONTENT_TYPE, Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use testing_utils::{
    init_logger, invoice_with_prompt, MockDaemon, MockPayment, MockTransfer, MockWallet,
};
use tokio::{sync::oneshot, task::JoinHandle};

struct TestServer {
    url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn request(&self, method: Method, path: &str, body: Option<String>) -> (StatusCode, String) {
        let mut request = Request::builder()
            .method(method)
            .uri(format!("{}{path}", self.url));
        if body.is_some() {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        let request = request
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .expect("failed to build request");
        let response = self
            .client
            .request(request)
            .await
            .expect("request failed");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    async fn stop(self) {
        self.shutdown.send(()).expect("server already stopped");
        self.handle.await.expect("server task panicked");
    }
}

fn config(mock_daemon: &MockDaemon, mock_wallet: &MockWallet) -> Config {
    let yaml = format!(
        "server:
  port: 0
  ipv4: 127.0.0.1
chains:
  zano:
    daemon-uri: {}
    wallet-uri: {}
  xmr:
    daemon-uri: http://127.0.0.1:18081
listener:
  poll-interval: 100
  available-refresh-interval: 1
  unavailable-refresh-interval: 1
  rpc-timeout: 5
  connection-timeout: 1
  cheat-mode: false
logging:
  verbosity: debug
",
        mock_daemon.url(""),
        mock_wallet.url("")
    );
    let config: Config = serde_yaml::from_str(&yaml).expect("invalid test config");
    config.validate();
    config
}

async fn start(config: &Config) -> (PaymentGateway<InMemory>, Subscriber, TestServer) {
    let payment_gateway = build_gateway(config);
    let subscriber = payment_gateway.subscribe_all();
    spawn_gateway(&payment_gateway);
    let server = build_server(config, payment_gateway.clone()).await;
    let address = server.ipv4_address().expect("server is not bound");

    let (shutdown, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(run_server(server, async {
        let _ = shutdown_rx.await;
    }));

    let test_server = TestServer {
        url: format!("http://{address}"),
        client: Client::builder(TokioExecutor::new()).build_http(),
        shutdown,
        handle,
    };
    (payment_gateway, subscriber, test_server)
}

async fn wait_for(subscriber: &mut Subscriber, predicate: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = subscriber
            .recv_timeout(Duration::from_secs(30))
            .await
            .expect("timeout waiting for event")
            .expect("subscription channel is closed");
        if predicate(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn block_callback_records_payment() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let config = config(&mock_daemon, &mock_wallet);
    let (payment_gateway, mut subscriber, server) = start(&config).await;

    // The incomplete XMR chain is not watched.
    assert!(payment_gateway.is_configured("ZANO"));
    assert!(!payment_gateway.is_configured("XMR"));

    // Submit an invoice.
    let invoice = invoice_with_prompt("inv-1", "ZANO", "pid-1", 1_000, true);
    let (status, body) = server
        .request(
            Method::POST,
            "/invoice",
            Some(serde_json::to_string(&invoice).unwrap()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let payload: InvoiceIdPayload = serde_json::from_str(&body).unwrap();
    assert_eq!(payload.invoice_id, InvoiceId::new("inv-1"));

    wait_for(&mut subscriber, |event| {
        matches!(event, Event::AvailabilityChanged { summary, .. } if summary.is_available())
    })
    .await;
    let (status, body) = server.request(Method::GET, "/summary/zano", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["synced"], true);
    assert_eq!(summary["wallet_available"], true);

    // A payment appears in the wallet, and the daemon announces a block.
    let tip = 2_477_700;
    mock_wallet.mock_transfers(tip, &[MockTransfer::new("tx1", "pid-1", tip - 5, 1_000)]);
    let (status, _) = server
        .request(
            Method::POST,
            "/daemon-callback/block?cryptoCode=ZANO&hash=b10c",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let Event::PaymentReceived { payment, .. } = wait_for(&mut subscriber, |event| {
        matches!(event, Event::PaymentReceived { .. })
    })
    .await
    else {
        unreachable!()
    };
    MockPayment::new("tx1", "pid-1", 1_000, 5).assert_eq(&payment);

    // The stored invoice carries the payment.
    let (status, body) = server.request(Method::GET, "/invoice/inv-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Invoice = serde_json::from_str(&body).unwrap();
    assert_eq!(stored.payments().len(), 1);
    MockPayment::new("tx1", "pid-1", 1_000, 5).assert_eq(&stored.payments()[0]);

    // Cleanup.
    server.stop().await;
    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}

#[tokio::test]
async fn rejected_requests() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let config = config(&mock_daemon, &mock_wallet);
    let (payment_gateway, _, server) = start(&config).await;

    let (status, _) = server
        .request(Method::POST, "/daemon-callback/tx?cryptoCode=ZANO", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .request(Method::POST, "/daemon-callback/block?cryptoCode=XMR", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.request(Method::GET, "/summary/XMR", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.request(Method::GET, "/invoice/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Cleanup.
    server.stop().await;
    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}
