//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单个事件处理的超时时间（秒），超时后返回 408 交由平台重投
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 60,
        }
    }
}

/// Google API 访问配置（Firestore + FCM）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub project_id: String,
    /// Firestore 数据库 ID，默认库为 "(default)"
    pub database_id: String,
    pub firestore_base_url: String,
    pub fcm_base_url: String,
    /// 存放用户推送 token 的集合名
    pub users_collection: String,
    /// 静态 access token，仅用于模拟器或本地调试；为空时走元数据服务器
    pub access_token: Option<String>,
    pub metadata_token_url: String,
    pub request_timeout_seconds: u64,
    /// 为 true 时 FCM 只校验消息不实际投递
    pub validate_only: bool,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_id: "(default)".to_string(),
            firestore_base_url: "https://firestore.googleapis.com".to_string(),
            fcm_base_url: "https://fcm.googleapis.com".to_string(),
            users_collection: "users".to_string(),
            access_token: None,
            metadata_token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
            request_timeout_seconds: 30,
            validate_only: false,
        }
    }
}

/// 推送分发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 广播到固定 topic
    #[default]
    Broadcast,
    /// 按 user_id 查找设备 token 单播
    Targeted,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Targeted => "targeted",
        }
    }
}

/// 分发配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    pub topic: String,
    pub android_channel_id: String,
    pub android_priority: String,
    /// 单播模式下是否也附带 Android 投递提示
    pub targeted_android_hints: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Broadcast,
            topic: "alerts_all".to_string(),
            android_channel_id: "alerts_channel".to_string(),
            android_priority: "high".to_string(),
            targeted_android_hints: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub google: GoogleConfig,
    pub dispatch: DispatchConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和进程环境变量加载配置
    ///
    /// 配置目录取 `CONFIG_DIR`，默认 `config`。
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let config_dir = vars
            .get("CONFIG_DIR")
            .cloned()
            .unwrap_or_else(|| "config".to_string());
        Self::load_from(service_name, Path::new(&config_dir), &vars)
    }

    /// 从指定目录与给定的环境变量集合加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. {config_dir}/default.toml（默认配置）
    /// 2. {config_dir}/{ALERT_ENV}.toml（环境特定配置，ALERT_ENV 默认 development）
    /// 3. {config_dir}/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（ALERT_ 前缀，双下划线表示嵌套，如 ALERT_GOOGLE__PROJECT_ID -> google.project_id）
    /// 5. PORT（Cloud Run 注入的监听端口）
    /// 6. google.project_id 仍为空时回退到 GOOGLE_CLOUD_PROJECT / GCLOUD_PROJECT / GCP_PROJECT
    pub fn load_from(
        service_name: &str,
        config_dir: &Path,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let env = vars
            .get("ALERT_ENV")
            .cloned()
            .unwrap_or_else(|| "development".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{env}.toml"))).required(false))
            .add_source(File::from(config_dir.join(format!("{service_name}.toml"))).required(false))
            .add_source(
                Environment::with_prefix("ALERT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone().into_iter().collect())),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = vars.get("PORT").and_then(|v| v.parse().ok()) {
            config.server.port = port;
        }

        if config.google.project_id.is_empty() {
            if let Some(project) = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "GCP_PROJECT"]
                .iter()
                .find_map(|key| vars.get(*key).filter(|v| !v.is_empty()))
            {
                config.google.project_id = project.clone();
            }
        }

        Ok(config)
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
