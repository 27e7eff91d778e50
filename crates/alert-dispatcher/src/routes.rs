//! 路由配置模块

use std::time::Duration;

use alert_shared::observability::middleware as obs_middleware;
use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, state::AppState};

/// 构建完整路由
///
/// 事件路由默认投递到根路径，同时保留一个语义化路径便于手动调用
pub fn app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", post(handlers::handle_alert_event))
        .route("/events/alerts", post(handlers::handle_alert_event))
        .route("/health", get(handlers::health_check))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(obs_middleware::observe_request))
        .with_state(state)
}
