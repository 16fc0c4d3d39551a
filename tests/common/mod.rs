//! Shared utilities for integration testing: scripted mock graph servers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use graph_rpc_driver::net::FrameCodec;
use graph_rpc_driver::protocol::{RequestEnvelope, Response};
use graph_rpc_driver::{DriverConfig, ServerAddress};

/// What the mock server does with one request.
#[allow(dead_code)]
pub enum Reply {
    /// Send this response right away.
    Respond(Response),
    /// Send this response after a delay.
    Delayed(Duration, Response),
    /// Send an arbitrary payload inside a valid frame.
    Raw(Bytes),
    /// Never answer.
    Silent,
    /// Drop the connection.
    Close,
}

/// Start a mock graph server on an ephemeral port. `script` is called once
/// per decoded request.
pub async fn start_graph_server<F>(script: F) -> ServerAddress
where
    F: Fn(RequestEnvelope) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().into();
    let script = Arc::new(script);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let script = script.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(socket, FrameCodec::new());
                while let Some(Ok(payload)) = framed.next().await {
                    let Ok(request) = RequestEnvelope::decode(payload) else {
                        break;
                    };
                    let sent = match script(request) {
                        Reply::Respond(response) => framed.send(response.encode().unwrap()).await,
                        Reply::Delayed(delay, response) => {
                            tokio::time::sleep(delay).await;
                            framed.send(response.encode().unwrap()).await
                        }
                        Reply::Raw(payload) => framed.send(payload).await,
                        Reply::Silent => Ok(()),
                        Reply::Close => break,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
            });
        }
    });

    address
}

/// Echoes the request ID and body with status 200.
#[allow(dead_code)]
pub async fn start_echo_server() -> ServerAddress {
    start_graph_server(|request| Reply::Respond(Response::ok(request.request_id, request.body))).await
}

/// Accepts connections and never reads from them.
#[allow(dead_code)]
pub async fn start_stalled_server() -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().into();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    address
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn closed_port() -> ServerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().into();
    drop(listener);
    address
}

/// Driver config for `servers` with fast probing and no idle reaping.
#[allow(dead_code)]
pub fn test_config(servers: &[ServerAddress]) -> DriverConfig {
    let mut config = DriverConfig::with_servers(servers.iter().cloned());
    config.health_check.interval_ms = 20;
    config.health_check.connection_timeout_ms = 200;
    config.health_check.shutdown_grace_ms = 200;
    config.idle.enabled = false;
    config.pool.acquire_timeout_ms = 1_000;
    config.pool.connect_timeout_ms = 500;
    config
}

/// Poll `condition` until it holds or `deadline` passes.
#[allow(dead_code)]
pub async fn wait_for<F: Fn() -> bool>(condition: F, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
