use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub refresh: RefreshConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 发票后台与 PAC 地址
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_base: String,
    pub pac_base: String,
    pub timeout_secs: u64,
}

/// 取消结果轮询: 间隔 / 总时长 / 最大次数, 先到者为准
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub budget_ms: u64,
    pub max_attempts: u32,
}

/// 列表自动刷新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub interval_ms: u64,
    pub budget_ms: u64,
    pub max_cycles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub batch_concurrency: usize,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            budget_ms: 30_000,
            max_attempts: 6,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            budget_ms: 30_000,
            max_cycles: 6,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            backend: BackendConfig {
                api_base: "http://localhost:8081/api".to_string(),
                pac_base: "http://localhost:8082/pac".to_string(),
                timeout_secs: 30,
            },
            polling: PollingConfig::default(),
            refresh: RefreshConfig::default(),
            retrieval: RetrievalConfig { batch_concurrency: 4 },
        }
    }
}

impl AppConfig {
    /// 默认值 + 环境变量 (CFDI__SERVER__PORT, CFDI__BACKEND__API_BASE ...)
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = AppConfig::default();
        config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(
                config::Environment::with_prefix("CFDI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<AppConfig>()
            .and_then(AppConfig::validated)
    }

    /// 循环间隔与次数必须为正
    pub fn validated(self) -> Result<Self, config::ConfigError> {
        let checks = [
            ("polling.interval_ms", self.polling.interval_ms),
            ("polling.max_attempts", u64::from(self.polling.max_attempts)),
            ("refresh.interval_ms", self.refresh.interval_ms),
            ("refresh.max_cycles", u64::from(self.refresh.max_cycles)),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(config::ConfigError::Message(format!("{} must be greater than 0", key)));
        }
        Ok(self)
    }
}
