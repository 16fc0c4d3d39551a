//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define driver metrics (connections, acquires, calls, server health)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `driver_connections_created_total` (counter): connections opened
//! - `driver_connections_alive` (gauge): open connections, idle or on loan
//! - `driver_connections_active` (gauge): connections on loan
//! - `driver_acquire_total` (counter): acquires by server and outcome
//! - `driver_calls_total` (counter): calls by server and outcome
//! - `driver_call_duration_seconds` (histogram): call latency
//! - `driver_server_available` (gauge): 1=available, 0=unavailable
//! - `driver_idle_reaped_total` (counter): connections closed for idleness
//!
//! Without an installed recorder every update is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use crate::load_balancer::ServerAddress;
use crate::pool::PoolStats;

pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    ::metrics::describe_counter!("driver_connections_created_total", "Total connections opened");
    ::metrics::describe_gauge!("driver_connections_alive", "Open connections, idle or on loan");
    ::metrics::describe_gauge!("driver_connections_active", "Connections currently on loan");
    ::metrics::describe_counter!("driver_acquire_total", "Connection acquires by outcome");
    ::metrics::describe_counter!("driver_calls_total", "Calls by outcome");
    ::metrics::describe_histogram!("driver_call_duration_seconds", "Call latency in seconds");
    ::metrics::describe_gauge!("driver_server_available", "Server availability (1=available)");
    ::metrics::describe_counter!("driver_idle_reaped_total", "Connections closed for idleness");

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_server_health(address: &ServerAddress, available: bool) {
    ::metrics::gauge!("driver_server_available", "address" => address.to_string())
        .set(if available { 1.0 } else { 0.0 });
}

pub fn record_idle_reaped(address: &ServerAddress) {
    ::metrics::counter!("driver_idle_reaped_total", "address" => address.to_string()).increment(1);
}

pub fn record_connection_created(address: &ServerAddress) {
    ::metrics::counter!("driver_connections_created_total", "address" => address.to_string())
        .increment(1);
}

pub fn record_acquire(address: &ServerAddress, outcome: &'static str) {
    ::metrics::counter!(
        "driver_acquire_total",
        "address" => address.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_call(address: &ServerAddress, outcome: &'static str, start: Instant) {
    let address = address.to_string();
    ::metrics::counter!(
        "driver_calls_total",
        "address" => address.clone(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!("driver_call_duration_seconds", "address" => address)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_pool_counters(stats: &PoolStats) {
    ::metrics::gauge!("driver_connections_alive").set(stats.alive_connections as f64);
    ::metrics::gauge!("driver_connections_active").set(stats.active_connections as f64);
}
