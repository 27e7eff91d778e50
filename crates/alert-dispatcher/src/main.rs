//! 告警推送服务
//!
//! 作为事件路由的 HTTP 目标运行，每个文档创建事件触发一次推送。

use std::sync::Arc;
use std::time::Duration;

use alert_dispatcher::{
    dispatcher::AlertDispatcher, routes, sender::FcmSender, state::AppState,
    user_store::FirestoreUserStore,
};
use alert_shared::{auth, config::AppConfig, http, observability};
use tokio::net::TcpListener;
use tracing::{info, warn};

const SERVICE_NAME: &str = "alert-dispatcher";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 本地开发时从 .env 注入环境变量，文件不存在不影响启动
    let _ = dotenvy::dotenv();

    let config = AppConfig::load(SERVICE_NAME)?;

    let obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        mode = config.dispatch.mode.as_str(),
        project_id = %config.google.project_id,
        validate_only = config.google.validate_only,
        "Starting alert-dispatcher..."
    );

    // 进程级共享的 HTTP 客户端与令牌来源，所有请求复用
    let client = http::shared_client(Duration::from_secs(
        config.google.request_timeout_seconds,
    ))?
    .clone();
    let token_source = auth::token_source_from_config(&config.google, client.clone());

    let sender = FcmSender::new(client.clone(), token_source.clone(), &config.google)?;
    let users = FirestoreUserStore::new(client, token_source, &config.google);
    let dispatcher = AlertDispatcher::new(&config.dispatch, Arc::new(sender), Arc::new(users))?;

    let app = routes::app(
        AppState::new(Arc::new(dispatcher)),
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 容器平台通过 SIGTERM 通知实例停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
