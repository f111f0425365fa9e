//! Integration Tests - Pipelines, Repricing and Dispatch Against Mock Ports
//!
//! Exercises the use cases through their ports. Uses mockall for trait
//! mocking, tokio::test for async tests and tokio-test for manual polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use mockall::mock;
use tokio::sync::{broadcast, watch};
use tokio_test::{assert_pending, assert_ready_eq};

use price_hub::adapters::cache::{PriceCache, RouteStatusCache};
use price_hub::adapters::feeds::EquityBatchFeed;
use price_hub::domain::market::{DataReadyFlag, MarketEvent, MarketState};
use price_hub::domain::price::{PriceRecord, PriceUpdate};
use price_hub::domain::route::{AdjustmentStrategy, RouteStatus};
use price_hub::ports::feed::FeedError;
use price_hub::ports::queue::{
    Acknowledger, Delivery, DeliveryStream, QueueBinding, QueueError, QueueSession, QueueTransport,
};
use price_hub::ports::session::SessionHooks;
use price_hub::ports::validation::PriceValidator;
use price_hub::usecases::{
    Dispatcher, FeedPipeline, MarketStateController, MarketStateError, OrderPriceAdjuster,
    PipelineState, PriceFilter, RetryPolicy,
};

// ---- Mock Definitions ----

mock! {
    pub Transport {}

    #[async_trait]
    impl QueueTransport for Transport {
        async fn connect(&self, feed: &str) -> Result<Box<dyn QueueSession>, QueueError>;
    }
}

mock! {
    pub Session {}

    #[async_trait]
    impl QueueSession for Session {
        async fn consume(&self, binding: &QueueBinding) -> Result<DeliveryStream, QueueError>;
        async fn close(&self) -> Result<(), QueueError>;
    }
}

mock! {
    pub Validator {}

    impl PriceValidator for Validator {
        fn validate(&self, route: &mut RouteStatus, security: &PriceRecord);
    }
}

mock! {
    pub Hooks {}

    #[async_trait]
    impl SessionHooks for Hooks {
        async fn on_tick(&self, seq: u64);
        async fn reload_defaults(&self) -> anyhow::Result<()>;
    }
}

// ---- Helpers ----

/// Records which delivery tags were acknowledged.
struct RecordingAcker {
    tag: u64,
    acked: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(self.tag);
        Ok(())
    }
}

fn delivery(tag: u64, body: &str, acked: &Arc<Mutex<Vec<u64>>>) -> Result<Delivery, QueueError> {
    Ok(Delivery::new(
        tag,
        body.as_bytes().to_vec(),
        Box::new(RecordingAcker {
            tag,
            acked: Arc::clone(acked),
        }),
    ))
}

fn binding() -> QueueBinding {
    QueueBinding {
        queue: "equity.prices".into(),
        prefetch: 20,
        consumer_tag: "it".into(),
    }
}

fn equity_pipeline(cache: &Arc<PriceCache>, transport: MockTransport) -> FeedPipeline {
    let handler = Arc::new(EquityBatchFeed::new("equity", "EQ", false, cache.clone()));
    FeedPipeline::new(handler, Arc::new(transport), binding())
        .with_retry(RetryPolicy::new(3, Duration::ZERO))
}

/// Session whose consumer yields `deliveries` and then, if `hold_open`,
/// stays open forever.
fn session_with(deliveries: Vec<Result<Delivery, QueueError>>, hold_open: bool) -> MockSession {
    let mut session = MockSession::new();
    session.expect_consume().return_once(move |_| {
        let head = stream::iter(deliveries);
        if hold_open {
            Ok(head.chain(stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    });
    session.expect_close().returning(|| Ok(()));
    session
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ---- Ingestion ----

#[tokio::test]
async fn test_three_failures_leave_pipeline_disconnected_then_manual_connect_succeeds() {
    let mut transport = MockTransport::new();
    transport
        .expect_connect()
        .times(3)
        .returning(|_| Err(QueueError::Connect("connection refused".into())));
    transport
        .expect_connect()
        .times(1)
        .returning(|_| Ok(Box::new(session_with(Vec::new(), true))));

    let cache = Arc::new(PriceCache::new());
    let pipeline = equity_pipeline(&cache, transport);

    let err = pipeline.connect().await.unwrap_err();
    match err {
        FeedError::ConnectionFailure { attempts, ref feed, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(feed, "equity");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Disconnected);

    pipeline.connect().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Connected);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_applied_messages_are_acked_and_bad_ones_are_not() {
    let acked = Arc::new(Mutex::new(Vec::new()));
    let deliveries = vec![
        delivery(1, r#"[{"ticker":"AAPL","lastPrice":190.0,"priorClose":185.0}]"#, &acked),
        delivery(2, "not json", &acked),
        delivery(3, r#"[{"ticker":"AAPL","bidPrice":189.9}]"#, &acked),
    ];
    let session = session_with(deliveries, true);

    let mut transport = MockTransport::new();
    transport
        .expect_connect()
        .return_once(move |_| Ok(Box::new(session)));

    let cache = Arc::new(PriceCache::new());
    let pipeline = Arc::new(equity_pipeline(&cache, transport));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(shutdown_rx).await })
    };

    wait_until(|| acked.lock().unwrap().len() == 2).await;
    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(*acked.lock().unwrap(), vec![1, 3]);
    let record = cache.get("AAPL").unwrap();
    assert_eq!(record.last_price, Some(190.0));
    assert_eq!(record.bid_price, Some(189.9));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn test_dropped_session_recovers_with_fresh_budget() {
    let acked = Arc::new(Mutex::new(Vec::new()));
    let first = session_with(
        vec![delivery(1, r#"[{"ticker":"MSFT","lastPrice":410.0}]"#, &acked)],
        false,
    );
    let second = session_with(
        vec![delivery(1, r#"[{"ticker":"MSFT","lastPrice":411.0}]"#, &acked)],
        true,
    );

    let mut transport = MockTransport::new();
    transport
        .expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(first)));
    transport
        .expect_connect()
        .times(1)
        .return_once(move |_| Ok(Box::new(second)));

    let cache = Arc::new(PriceCache::new());
    let pipeline = Arc::new(equity_pipeline(&cache, transport).with_recovery(Duration::from_millis(10)));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(shutdown_rx).await })
    };

    wait_until(|| cache.get("MSFT").and_then(|r| r.last_price) == Some(411.0)).await;
    assert_eq!(pipeline.state(), PipelineState::Consuming);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
}

// ---- Order price adjustment ----

#[test]
fn test_adjuster_hands_target_to_validator_with_security_quote() {
    let prices = Arc::new(PriceCache::new());
    prices.upsert(
        "XYZ",
        &PriceUpdate {
            bid_price: Some(49.9),
            ask_price: Some(50.1),
            ..Default::default()
        },
    );

    let routes = Arc::new(RouteStatusCache::new());
    routes.register(
        RouteStatus::new("r-1", "XYZ", "SPY", AdjustmentStrategy::Beta)
            .with_coefficient(2.0)
            .with_shifts(1, 0)
            .with_reference(100.0)
            .with_target(50.0),
    );

    let mut validator = MockValidator::new();
    validator
        .expect_validate()
        .withf(|route, security| route.route_id == "r-1" && security.ticker == "XYZ")
        .times(1)
        .returning(|route, security| {
            let target = route.target_price.unwrap_or_default();
            let ask = security.ask_price.unwrap_or(f64::MAX);
            route.order_price = Some(target.min(ask));
        });

    let adjuster = OrderPriceAdjuster::new(prices, Arc::clone(&routes), Arc::new(validator));

    // Down-move with an up-only beta shift: unscaled.
    let summary = adjuster.on_reference_tick("SPY", 99.0);
    assert_eq!(summary.adjusted, 1);

    let route = routes.get("r-1").unwrap();
    assert!((route.target_price.unwrap() - 49.5).abs() < 1e-9);
    assert_eq!(route.order_price, route.target_price);
}

#[test]
fn test_adjuster_skips_validation_when_adjustment_is_invalid() {
    let routes = Arc::new(RouteStatusCache::new());
    routes.register(
        RouteStatus::new("r-2", "XYZ", "SPY", AdjustmentStrategy::Beta)
            .with_reference(0.0)
            .with_target(50.0),
    );

    let mut validator = MockValidator::new();
    validator.expect_validate().never();

    let adjuster = OrderPriceAdjuster::new(
        Arc::new(PriceCache::new()),
        Arc::clone(&routes),
        Arc::new(validator),
    );
    let summary = adjuster.on_reference_tick("SPY", 101.0);

    assert_eq!(summary.suppressed, 1);
    assert_eq!(routes.get("r-2").unwrap().target_price, Some(50.0));
}

#[tokio::test]
async fn test_adjuster_run_follows_cache_ticks() {
    let prices = Arc::new(PriceCache::with_notifications(64));
    let routes = Arc::new(RouteStatusCache::new());
    routes.register(
        RouteStatus::new("r-3", "XYZ", "SPY", AdjustmentStrategy::Absolute)
            .with_coefficient(-2.0)
            .with_target(10.0),
    );

    let mut validator = MockValidator::new();
    validator.expect_validate().returning(|_, _| ());

    let adjuster = Arc::new(OrderPriceAdjuster::new(
        prices.clone(),
        Arc::clone(&routes),
        Arc::new(validator),
    ));
    let ticks = prices.subscribe().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = {
        let adjuster = Arc::clone(&adjuster);
        tokio::spawn(async move { adjuster.run(ticks, shutdown_rx).await })
    };

    // Security quote so validation runs, then two reference ticks.
    prices.upsert("XYZ", &PriceUpdate { last_price: Some(9.0), ..Default::default() });
    prices.upsert("SPY", &PriceUpdate { last_price: Some(400.0), ..Default::default() });
    prices.upsert("SPY", &PriceUpdate { last_price: Some(404.0), ..Default::default() });

    wait_until(|| routes.get("r-3").and_then(|r| r.target_price) == Some(402.0)).await;
    assert_eq!(routes.get("r-3").unwrap().last_ref_price, Some(404.0));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

// ---- Market state ----

#[tokio::test]
async fn test_reset_reloads_defaults_only_while_closed() {
    let mut hooks = MockHooks::new();
    hooks.expect_reload_defaults().times(1).returning(|| Ok(()));
    hooks.expect_on_tick().returning(|_| ());

    let market = MarketStateController::new(Arc::new(hooks), None);
    let mut events = market.subscribe();

    market.close_market().await.unwrap();
    market.reset().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Reset);

    market.open_market().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Opened);
    assert!(matches!(
        market.reset().await,
        Err(MarketStateError::IllegalTransition { from: MarketState::Open, .. })
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_reload_is_reported() {
    let mut hooks = MockHooks::new();
    hooks
        .expect_reload_defaults()
        .returning(|| Err(anyhow::anyhow!("defaults table unavailable")));

    let market = MarketStateController::new(Arc::new(hooks), None);
    let err = market.reset().await.unwrap_err();
    assert!(matches!(err, MarketStateError::Reload(ref msg) if msg.contains("defaults table")));
}

#[tokio::test]
async fn test_concurrent_transitions_serialize() {
    let mut hooks = MockHooks::new();
    hooks.expect_on_tick().returning(|_| ());
    let market = Arc::new(MarketStateController::new(Arc::new(hooks), None));
    let mut events = market.subscribe();

    let opens: Vec<_> = (0..8)
        .map(|_| {
            let market = Arc::clone(&market);
            tokio::spawn(async move { market.open_market().await })
        })
        .collect();
    for open in opens {
        open.await.unwrap().unwrap();
    }

    assert_eq!(events.recv().await.unwrap(), MarketEvent::Opened);
    assert!(events.try_recv().is_err());
}

// ---- Dispatch ----

#[tokio::test]
async fn test_cancelled_subscription_yields_nothing_more() {
    let cache = Arc::new(PriceCache::new());
    cache.upsert("IBM", &PriceUpdate { last_price: Some(180.0), ..Default::default() });

    let data_ready = Arc::new(DataReadyFlag::new(false));
    let (_market_tx, market_rx) = watch::channel(MarketState::Closed);
    let dispatcher = Dispatcher::new(Arc::clone(&data_ready), market_rx);
    let (cancel_tx, cancel_rx) = broadcast::channel(1);

    let records = dispatcher.subscribe(cache, Duration::from_millis(5), PriceFilter::All, cancel_rx);
    tokio::pin!(records);

    let mut next = tokio_test::task::spawn(records.next());
    assert_pending!(next.poll());

    cancel_tx.send(()).unwrap();
    assert!(next.is_woken());
    assert_ready_eq!(next.poll(), None);
    drop(next);

    data_ready.set(true);
    assert!(records.next().await.is_none());
}
