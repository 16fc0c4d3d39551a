//! End-to-end driver tests against mock graph servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use graph_rpc_driver::config::AcquireTimeoutAction;
use graph_rpc_driver::net::MAX_FRAME_SIZE;
use graph_rpc_driver::protocol::Response;
use graph_rpc_driver::{Driver, DriverError, JsonDecoder, RawDecoder, Request};

mod common;
use common::Reply;

#[tokio::test]
async fn test_round_trip_and_connection_reuse() {
    let server = common::start_echo_server().await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let first = driver
        .send(&Request::with_id("r1", "g.V().count()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"g.V().count()"));

    let second = driver
        .send_default(&Request::new("g.E().count()"), RawDecoder)
        .await
        .unwrap();
    assert_eq!(second, Bytes::from_static(b"g.E().count()"));

    let stats = driver.stats();
    assert_eq!(stats.total_created_connections, 1);
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.alive_connections, 1);

    driver.close().await;
}

#[tokio::test]
async fn test_timeout_then_success_on_replaced_connection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = common::start_graph_server(move |request| {
        let response = Response::ok(request.request_id, request.body);
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Reply::Delayed(Duration::from_millis(300), response)
        } else {
            Reply::Respond(response)
        }
    })
    .await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let err = driver
        .send(&Request::with_id("slow", "g.V()"), RawDecoder, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Timeout { timeout_ms: 50, .. }));
    assert!(err.is_retryable());
    assert_eq!(driver.stats().active_connections, 0);

    let body = driver
        .send(&Request::with_id("fast", "g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(body, Bytes::from_static(b"g.V()"));
    assert_eq!(driver.stats().total_created_connections, 2);

    driver.close().await;
}

#[tokio::test]
async fn test_all_servers_down_still_selects_and_reports_connect_error() {
    let servers = vec![common::closed_port().await, common::closed_port().await];
    let driver = Driver::new(common::test_config(&servers)).unwrap();

    let all_down = common::wait_for(
        || driver.server_health().iter().all(|(_, available)| !available),
        Duration::from_secs(2),
    )
    .await;
    assert!(all_down);

    let selected = driver.select_server().unwrap();
    assert!(servers.contains(&selected));

    let err = driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Connect { .. }), "unexpected error: {}", err);

    driver.close().await;
}

#[tokio::test]
async fn test_mismatched_response_id_fails_the_call() {
    let server = common::start_graph_server(|request| {
        Reply::Respond(Response::ok("someone-else", request.body))
    })
    .await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let err = driver
        .send(&Request::with_id("r1", "g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    match err {
        DriverError::Mismatch { expected, actual, .. } => {
            assert_eq!(expected, "r1");
            assert_eq!(actual, "someone-else");
        }
        other => panic!("expected mismatch, got {:?}", other),
    }

    assert!(common::wait_for(|| driver.stats().alive_connections == 0, Duration::from_secs(1)).await);
    driver.close().await;
}

#[tokio::test]
async fn test_status_error_keeps_connection() {
    let server = common::start_graph_server(|request| {
        Reply::Respond(Response::error(request.request_id, 597, "script evaluation failed"))
    })
    .await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    for _ in 0..2 {
        let err = driver
            .send(&Request::with_id("r1", "g.bad()"), RawDecoder, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            DriverError::Status { code, message, request_id, .. } => {
                assert_eq!(code, 597);
                assert_eq!(message, "script evaluation failed");
                assert_eq!(request_id, "r1");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
    assert_eq!(driver.stats().total_created_connections, 1);

    driver.close().await;
}

#[tokio::test]
async fn test_undecodable_response_discards_connection() {
    let server = common::start_graph_server(|_| Reply::Raw(Bytes::from_static(b"\x09not-a-response"))).await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let err = driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Decode { .. }));

    let _ = driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await;
    assert_eq!(driver.stats().total_created_connections, 2);

    driver.close().await;
}

#[tokio::test]
async fn test_json_body_decoding() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Count {
        count: u64,
    }

    let server = common::start_graph_server(|request| {
        Reply::Respond(Response::ok(request.request_id, r#"{"count": 3}"#))
    })
    .await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let count = driver
        .send(&Request::new("g.V().count()"), JsonDecoder::<Count>::new(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(count, Count { count: 3 });

    driver.close().await;
}

#[tokio::test]
async fn test_server_closing_mid_call() {
    let server = common::start_graph_server(|_| Reply::Close).await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    let err = driver
        .send(&Request::with_id("r1", "g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::ConnectionClosed { ref request_id, .. } if request_id == "r1"));
    assert_eq!(driver.stats().active_connections, 0);

    driver.close().await;
}

#[tokio::test]
async fn test_concurrent_calls_respect_pool_bound() {
    let server = common::start_graph_server(|request| {
        Reply::Delayed(
            Duration::from_millis(20),
            Response::ok(request.request_id, request.body),
        )
    })
    .await;
    let mut config = common::test_config(&[server]);
    config.pool.max_connections = 2;
    config.pool.acquire_timeout_ms = 5_000;
    let driver = Arc::new(Driver::new(config).unwrap());

    let calls: Vec<_> = (0..10)
        .map(|i| {
            let driver = driver.clone();
            tokio::spawn(async move {
                let body = format!("q{}", i);
                let result = driver
                    .send(&Request::new(body.clone()), RawDecoder, Duration::from_secs(2))
                    .await;
                (body, result)
            })
        })
        .collect();

    for call in calls {
        let (body, result) = call.await.unwrap();
        assert_eq!(result.unwrap(), Bytes::from(body));
    }

    let stats = driver.stats();
    assert!(stats.total_created_connections <= 2);
    assert_eq!(stats.active_connections, 0);

    driver.close().await;
}

#[tokio::test]
async fn test_pool_exhaustion_fails_fast() {
    let server = common::start_graph_server(|_| Reply::Silent).await;
    let mut config = common::test_config(&[server]);
    config.pool.max_connections = 1;
    config.pool.acquire_timeout_ms = 50;
    config.pool.acquire_timeout_action = AcquireTimeoutAction::Fail;
    let driver = Arc::new(Driver::new(config).unwrap());

    let in_flight = {
        let driver = driver.clone();
        tokio::spawn(async move {
            driver
                .send(&Request::new("g.V()"), RawDecoder, Duration::from_millis(500))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = driver
        .send(&Request::new("g.E()"), RawDecoder, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::PoolExhausted { .. }));
    assert!(err.is_retryable());

    assert!(matches!(in_flight.await.unwrap(), Err(DriverError::Timeout { .. })));
    driver.close().await;
}

#[tokio::test]
async fn test_timeout_covers_write_to_stalled_server() {
    let server = common::start_stalled_server().await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();
    let request = Request::with_id("big", vec![b'x'; 32 * 1024 * 1024]);

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        driver.send(&request, RawDecoder, Duration::from_millis(100)),
    )
    .await
    .expect("call outlived its timeout");
    assert!(
        matches!(result, Err(DriverError::Timeout { timeout_ms: 100, .. })),
        "unexpected result: {:?}",
        result
    );
    assert_eq!(driver.stats().active_connections, 0);
    assert!(common::wait_for(|| driver.stats().alive_connections == 0, Duration::from_secs(1)).await);

    driver.close().await;
}

#[tokio::test]
async fn test_dropped_send_frees_the_connection() {
    let server = common::start_graph_server(|_| Reply::Silent).await;
    let mut config = common::test_config(&[server]);
    config.pool.max_connections = 1;
    config.pool.acquire_timeout_ms = 50;
    config.pool.acquire_timeout_action = AcquireTimeoutAction::Fail;
    let driver = Driver::new(config).unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        driver.send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(driver.stats().active_connections, 0);

    let err = driver
        .send(&Request::new("g.E()"), RawDecoder, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Timeout { .. }), "unexpected error: {}", err);
    assert_eq!(driver.stats().active_connections, 0);

    driver.close().await;
}

#[tokio::test]
async fn test_oversize_request_rejected_before_borrowing_a_connection() {
    let server = common::start_echo_server().await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();

    driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap();

    let err = driver
        .send(&Request::new(vec![0u8; MAX_FRAME_SIZE]), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Encode(_)), "unexpected error: {}", err);
    assert!(!err.is_retryable());

    let body = driver
        .send(&Request::new("g.E()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(body, Bytes::from_static(b"g.E()"));

    let stats = driver.stats();
    assert_eq!(stats.total_created_connections, 1);
    assert_eq!(stats.alive_connections, 1);

    driver.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = common::start_echo_server().await;
    let driver = Driver::new(common::test_config(&[server])).unwrap();
    driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap();

    driver.close().await;
    driver.close().await;
    assert!(driver.is_closed());

    let err = driver
        .send(&Request::new("g.V()"), RawDecoder, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::DriverClosed));
    assert!(common::wait_for(|| driver.stats().alive_connections == 0, Duration::from_secs(1)).await);
}
