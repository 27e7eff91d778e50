//! Prometheus 指标
//!
//! 业务代码只调用下面的 `record_*` 函数；未启用导出时 metrics 门面没有 recorder，调用是空操作。

use std::net::SocketAddr;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

const HTTP_REQUESTS: &str = "http_requests_total";
const HTTP_DURATION: &str = "http_request_duration_seconds";
const DISPATCH_TOTAL: &str = "alert_push_dispatch_total";
const PUSH_SEND_TOTAL: &str = "alert_push_send_total";
const PUSH_SEND_DURATION: &str = "alert_push_send_duration_seconds";

/// 指标端口的后台任务，drop 时停止监听
pub struct MetricsServer {
    task: JoinHandle<()>,
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 安装全局 recorder，并在 `metrics_port` 上暴露 `/metrics`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsServer> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Metrics endpoint listening");

    let app = exporter_router(handle);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标端口异常退出");
        }
    });

    Ok(MetricsServer { task })
}

fn exporter_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
}

fn describe() {
    metrics::describe_counter!(HTTP_REQUESTS, "HTTP requests by route and status");
    metrics::describe_histogram!(HTTP_DURATION, "HTTP request latency in seconds");
    metrics::describe_counter!(
        DISPATCH_TOTAL,
        "Alert events handled, by dispatch mode and outcome"
    );
    metrics::describe_counter!(PUSH_SEND_TOTAL, "FCM send attempts, by target kind and status");
    metrics::describe_histogram!(PUSH_SEND_DURATION, "FCM send latency in seconds");
}

/// 记录一次 HTTP 请求；route 取路由模板，避免按原始路径产生高基数标签
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!(HTTP_REQUESTS, &labels).increment(1);
    metrics::histogram!(HTTP_DURATION, &labels).record(duration_secs);
}

/// 记录一次告警事件的处理结果（sent / skipped_* / failed）
pub fn record_dispatch(mode: &str, outcome: &str) {
    metrics::counter!(
        DISPATCH_TOTAL,
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录一次推送发送（status 为 ok / error）
pub fn record_push_send(target_kind: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        PUSH_SEND_TOTAL,
        "target_kind" => target_kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(PUSH_SEND_DURATION, "target_kind" => target_kind.to_string())
        .record(duration_secs);
}
