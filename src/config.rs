use std::env;
use std::fs;
use std::net::ToSocketAddrs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 默认配置文件名（工作目录下）
const DEFAULT_CONFIG_FILE: &str = "conngate.toml";

/// 接纳限速配置。
///
/// 令牌桶容量 `burst`，每 `interval_ms` 毫秒均匀补充 `permits` 个令牌；
/// `interval_ms = 0` 表示不限速。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 令牌桶容量
    pub burst: u32,
    /// 每个补充周期发放的令牌数
    pub permits: u32,
    /// 补充周期（毫秒，0 = 不限速）
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 100,
            permits: 100,
            interval_ms: 1000,
        }
    }
}

/// 日志配置（对应配置文件的 [logging] 段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: Option<String>,
    /// 日志格式: pretty, json, compact
    pub format: Option<String>,
    /// 日志输出文件路径
    pub file: Option<String>,
}

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// 监听地址（"host:port"）
    pub listen_addr: String,
    /// 全局最大并发连接数（0 = 不限制）
    pub max_connections: u32,
    /// 单 IP 最大并发连接数（0 = 不限制）
    pub max_connections_per_ip: u32,
    /// Prometheus 抓取端口（0 = 关闭）
    pub metrics_port: u16,
    /// 接纳限速
    pub rate_limit: RateLimitConfig,
    /// 日志
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:31337".to_string(),
            max_connections: 10000,
            max_connections_per_ip: 32,
            metrics_port: 0,
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;

        let config: Self = toml::from_str(&content).context("配置文件格式错误")?;
        Ok(config)
    }

    /// 从环境变量合并配置（CONNGATE_ 前缀）
    pub fn merge_from_env(&mut self) {
        if let Ok(addr) = env::var("CONNGATE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(max_conn) = env::var("CONNGATE_MAX_CONNECTIONS") {
            self.max_connections = max_conn.parse().unwrap_or(self.max_connections);
        }
        if let Ok(max_per_ip) = env::var("CONNGATE_MAX_CONNECTIONS_PER_IP") {
            self.max_connections_per_ip = max_per_ip.parse().unwrap_or(self.max_connections_per_ip);
        }
        if let Ok(port) = env::var("CONNGATE_METRICS_PORT") {
            self.metrics_port = port.parse().unwrap_or(self.metrics_port);
        }
        if let Ok(burst) = env::var("CONNGATE_RATE_BURST") {
            self.rate_limit.burst = burst.parse().unwrap_or(self.rate_limit.burst);
        }
        if let Ok(permits) = env::var("CONNGATE_RATE_PERMITS") {
            self.rate_limit.permits = permits.parse().unwrap_or(self.rate_limit.permits);
        }
        if let Ok(interval) = env::var("CONNGATE_RATE_INTERVAL_MS") {
            self.rate_limit.interval_ms = interval.parse().unwrap_or(self.rate_limit.interval_ms);
        }
        if let Ok(level) = env::var("CONNGATE_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(listen) = &cli.listen_addr {
            self.listen_addr = listen.clone();
        }
        if let Some(max_conn) = cli.max_connections {
            self.max_connections = max_conn;
        }
        if let Some(max_per_ip) = cli.max_connections_per_ip {
            self.max_connections_per_ip = max_per_ip;
        }
        if let Some(burst) = cli.rate_burst {
            self.rate_limit.burst = burst;
        }
        if let Some(permits) = cli.rate_permits {
            self.rate_limit.permits = permits;
        }
        if let Some(interval) = cli.rate_interval_ms {
            self.rate_limit.interval_ms = interval;
        }
        if let Some(port) = cli.metrics_port {
            self.metrics_port = port;
        }
        if let Some(level) = cli.get_log_level() {
            self.logging.level = Some(level);
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 配置文件（显式指定，或工作目录下的 conngate.toml）
        let mut config = if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            } else {
                warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::default()
            }
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            info!("📄 从默认配置文件加载: {}", DEFAULT_CONFIG_FILE);
            Self::from_toml_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };

        // 2. 环境变量（优先级高于配置文件）
        config.merge_from_env();

        // 3. 命令行参数（最高优先级）
        config.merge_from_cli(cli);

        config.validate()?;
        Ok(config)
    }

    /// 配置合法性检查
    pub fn validate(&self) -> Result<()> {
        self.listen_addr
            .to_socket_addrs()
            .with_context(|| format!("监听地址无法解析: {}", self.listen_addr))?;

        if self.rate_limit.interval_ms > 0 && self.rate_limit.permits == 0 {
            anyhow::bail!("限速已启用但 permits 为 0，服务将永远无法接受连接");
        }
        Ok(())
    }
}

/// 配置文件 [logging] 段的快速读取结果
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 快速读取配置文件的 [logging] 段（不做完整加载，任何失败都静默回退默认）。
/// 供 main 在完整配置加载之前初始化日志。
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };
    let Ok(config) = toml::from_str::<ServiceConfig>(&content) else {
        return EarlyLoggingConfig::default();
    };

    EarlyLoggingConfig {
        level: config.logging.level,
        format: config.logging.format,
        file: config.logging.file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:31337");
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9000"

[rate_limit]
burst = 5
permits = 10
interval_ms = 500
"#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.rate_limit.interval_ms, 500);
        // 未给出的字段退回默认值
        assert_eq!(
            config.max_connections,
            ServiceConfig::default().max_connections
        );
    }

    #[test]
    fn test_validate_rejects_zero_permits_with_pacing_enabled() {
        let mut config = ServiceConfig::default();
        config.rate_limit.permits = 0;
        assert!(config.validate().is_err());

        // 限速关闭后 permits 不再有意义
        config.rate_limit.interval_ms = 0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let mut config = ServiceConfig::default();
        config.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
