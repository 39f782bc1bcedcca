//! Prometheus 指标：连接数、接纳/拒绝计数与实测接纳速率
//!
//! 通过 `init()` 安装全局 Recorder；`metrics_port > 0` 时由 exporter 自带的
//! HTTP 监听器在该端口暴露抓取端点。

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

/// 指标名称
const GAUGE_CONNECTIONS: &str = "conngate_connections_current";
const GAUGE_ACCEPT_RATE: &str = "conngate_accept_rate";
const COUNTER_ADMITTED: &str = "conngate_admitted_total";
const COUNTER_REJECTED: &str = "conngate_rejected_total";
const COUNTER_HANDLER_FAILURES: &str = "conngate_handler_failures_total";

/// 初始化 Prometheus 指标（安装全局 Recorder 并启动抓取端点）。
///
/// 仅需在进程内调用一次，且要求在 Tokio 运行时内。`port` 为 0 时不安装
/// Recorder，之后所有 `record_*` 调用自动成为 no-op。
pub fn init(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        return Ok(());
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装 Prometheus Recorder 失败")?;
    Ok(())
}

/// 更新当前连接数（Gauge）。接纳/释放后调用。
pub fn record_connection_count(count: u64) {
    metrics::gauge!(GAUGE_CONNECTIONS).set(count as f64);
}

/// 更新实测接纳速率（Gauge）。由监控任务周期调用。
pub fn record_accept_rate(rate: f64) {
    metrics::gauge!(GAUGE_ACCEPT_RATE).set(rate);
}

/// 记录一次成功接纳（Counter）。
pub fn record_admitted() {
    metrics::counter!(COUNTER_ADMITTED).increment(1);
}

/// 记录一次拒绝（Counter，按原因打标签）。
pub fn record_rejected(reason: &'static str) {
    metrics::counter!(COUNTER_REJECTED, "reason" => reason).increment(1);
}

/// 记录一次处理器失败（含 panic）（Counter）。
pub fn record_handler_failure() {
    metrics::counter!(COUNTER_HANDLER_FAILURES).increment(1);
}
