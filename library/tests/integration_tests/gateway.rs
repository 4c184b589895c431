use std::time::Duration;

use cryptonote_listener::{
    storage::stores::InMemory, ChainRpcConfig, Event, InvoiceId, PaymentGateway,
    PaymentGatewayBuilder, PaymentGatewayStatus, PaymentMethodId, Subscriber,
};
use test_case::test_case;
use testing_utils::{
    init_logger, invoice_with_prompt, MockDaemon, MockPayment, MockTransfer, MockWallet,
    CRYPTO_CODE,
};

fn build(mock_daemon: &MockDaemon, mock_wallet: &MockWallet) -> PaymentGateway<InMemory> {
    PaymentGatewayBuilder::new(InMemory::new())
        .chain(
            &CRYPTO_CODE.to_lowercase(),
            ChainRpcConfig::new(mock_daemon.url(""), mock_wallet.url("")),
        )
        // Faster intervals so updates are received sooner.
        .poll_interval(Duration::from_millis(100))
        .available_refresh_interval(Duration::from_millis(500))
        .unavailable_refresh_interval(Duration::from_millis(100))
        .build()
        .expect("failed to build payment gateway")
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

async fn wait_until_available(subscriber: &mut Subscriber) {
    wait_for(subscriber, |event| {
        matches!(event, Event::AvailabilityChanged { summary, .. } if summary.is_available())
    })
    .await;
}

fn is_new_block(event: &Event) -> bool {
    matches!(event, Event::NewBlock { .. })
}

#[test_case(2, 3 ; "recorded once past the floor")]
#[test_case(0, 3 ; "deep transfer")]
#[tokio::test]
async fn block_notification_records_payment(extra_blocks: u64, confirmations: u64) {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let payment_gateway = build(&mock_daemon, &mock_wallet);
    payment_gateway
        .insert_invoice(invoice_with_prompt("inv-1", CRYPTO_CODE, "pid-1", 1_000, true))
        .await
        .expect("failed to insert invoice");
    let mut subscriber = payment_gateway.subscribe_all();

    // Transfer at the tip, or already confirmed.
    let transfer_height = 200;
    let tip = transfer_height + confirmations - extra_blocks;
    mock_wallet.mock_transfers(tip, &[MockTransfer::new("tx1", "pid-1", transfer_height, 400)]);

    payment_gateway.run().expect("failed to run payment gateway");
    wait_until_available(&mut subscriber).await;

    if extra_blocks > 0 {
        // Not deep enough yet.
        payment_gateway
            .notify_block(CRYPTO_CODE, Some("block-a".to_string()))
            .await
            .expect("failed to notify block");
        wait_for(&mut subscriber, is_new_block).await;
        let invoice = payment_gateway
            .get_invoice(InvoiceId::new("inv-1"))
            .await
            .expect("failed to read invoice")
            .expect("invoice is missing");
        assert!(invoice.payments().is_empty());

        mock_wallet.mock_transfers(
            transfer_height + confirmations,
            &[MockTransfer::new("tx1", "pid-1", transfer_height, 400)],
        );
        payment_gateway
            .notify_block("zano", Some("block-b".to_string()))
            .await
            .expect("failed to notify block");
    }

    let Event::PaymentReceived { invoice_id, payment } = wait_for(&mut subscriber, |event| {
        matches!(event, Event::PaymentReceived { .. })
    })
    .await
    else {
        unreachable!()
    };
    assert_eq!(invoice_id, InvoiceId::new("inv-1"));
    MockPayment::new("tx1", "pid-1", 400, confirmations).assert_eq(&payment);

    let Event::InvoiceNeedsUpdate { invoice_id } = wait_for(&mut subscriber, |event| {
        matches!(event, Event::InvoiceNeedsUpdate { .. })
    })
    .await
    else {
        unreachable!()
    };
    assert_eq!(invoice_id, InvoiceId::new("inv-1"));

    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
    assert_eq!(payment_gateway.status(), PaymentGatewayStatus::NotRunning);
}

#[tokio::test]
async fn poller_detects_new_block() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let payment_gateway = build(&mock_daemon, &mock_wallet);
    let mut subscriber = payment_gateway.subscribe_all();

    payment_gateway.run().expect("failed to run payment gateway");
    wait_until_available(&mut subscriber).await;
    // Let the poller record its baseline.
    tokio::time::sleep(Duration::from_millis(500)).await;

    mock_daemon.mock_info(2_477_658, false);
    let event = wait_for(&mut subscriber, |event| {
        matches!(event, Event::BlockSeen { .. })
    })
    .await;
    assert_eq!(
        event,
        Event::BlockSeen {
            crypto_code: CRYPTO_CODE.to_string(),
            block_hash: None
        }
    );
    wait_for(&mut subscriber, is_new_block).await;

    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}

#[tokio::test]
async fn transaction_notification_activates_prompt() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let payment_gateway = build(&mock_daemon, &mock_wallet);
    payment_gateway
        .insert_invoice(invoice_with_prompt("inv-2", CRYPTO_CODE, "addr-2", 1_000, false))
        .await
        .expect("failed to insert invoice");
    mock_wallet.mock_transfer_by_txid("tx9", 90, 5, &[("addr-2", 250), ("addr-other", 5)]);
    let mut subscriber = payment_gateway.subscribe_all();

    payment_gateway.run().expect("failed to run payment gateway");
    wait_until_available(&mut subscriber).await;

    payment_gateway
        .notify_transaction("Zano", "tx9".to_string())
        .await
        .expect("failed to notify transaction");

    let Event::PaymentReceived { payment, .. } = wait_for(&mut subscriber, |event| {
        matches!(event, Event::PaymentReceived { .. })
    })
    .await
    else {
        unreachable!()
    };
    MockPayment::new("tx9", "addr-2", 250, 5).assert_eq(&payment);
    assert_eq!(payment.details.block_height, 95);
    wait_for(&mut subscriber, |event| {
        matches!(event, Event::InvoiceNeedsUpdate { .. })
    })
    .await;

    let invoice = payment_gateway
        .get_invoice(InvoiceId::new("inv-2"))
        .await
        .expect("failed to read invoice")
        .expect("invoice is missing");
    let method = PaymentMethodId::chain(CRYPTO_CODE);
    assert!(invoice.prompt(&method).expect("prompt is missing").activated);
    assert_eq!(invoice.amount_due(&method), 750);

    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}

#[tokio::test]
async fn unknown_transaction_is_ignored() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    let payment_gateway = build(&mock_daemon, &mock_wallet);
    payment_gateway
        .insert_invoice(invoice_with_prompt("inv-3", CRYPTO_CODE, "addr-3", 1_000, true))
        .await
        .expect("failed to insert invoice");
    let lookup = mock_wallet.mock_transfer_not_found("feed");
    let mut subscriber = payment_gateway.subscribe_all();

    payment_gateway.run().expect("failed to run payment gateway");
    wait_until_available(&mut subscriber).await;

    payment_gateway
        .notify_transaction(CRYPTO_CODE, "feed".to_string())
        .await
        .expect("failed to notify transaction");
    // Events are handled in order, so the block pass finishes after the lookup.
    payment_gateway
        .notify_block(CRYPTO_CODE, None)
        .await
        .expect("failed to notify block");
    wait_for(&mut subscriber, is_new_block).await;

    lookup.assert_async().await;
    while let Ok(event) = subscriber.try_recv() {
        assert!(
            !matches!(event, Event::PaymentReceived { .. } | Event::InvoiceNeedsUpdate { .. }),
            "unexpected event: {event}"
        );
    }

    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}

#[tokio::test]
async fn unavailable_chain() {
    // Setup.
    init_logger();
    let mock_daemon = MockDaemon::new_mock_daemon().await;
    let mock_wallet = MockWallet::new_mock_wallet().await;
    mock_daemon.mock_unavailable();
    let payment_gateway = build(&mock_daemon, &mock_wallet);
    let mut subscriber = payment_gateway.subscribe_all();

    payment_gateway.run().expect("failed to run payment gateway");
    let Event::AvailabilityChanged { summary, .. } = wait_for(&mut subscriber, |event| {
        matches!(event, Event::AvailabilityChanged { .. })
    })
    .await
    else {
        unreachable!()
    };
    assert!(!summary.is_available());
    assert!(!summary.daemon_available);
    assert!(summary.wallet_available);
    assert!(!payment_gateway.is_available(CRYPTO_CODE));
    assert!(!payment_gateway.all_available());

    // Recovers on a later refresh.
    mock_daemon.mock_info(2_477_657, false);
    wait_until_available(&mut subscriber).await;
    assert!(payment_gateway.is_available(CRYPTO_CODE));
    assert!(payment_gateway.summary("zano").is_some());

    payment_gateway
        .stop()
        .await
        .expect("failed to stop payment gateway");
}
