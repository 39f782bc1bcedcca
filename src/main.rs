use std::fs;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use conngate::{
    cli::{Cli, Commands},
    config::{self, ServiceConfig},
    logging, metrics,
    net::Connection,
    Service,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            Commands::GenerateConfig { path } => {
                return generate_config(path);
            }
            Commands::ValidateConfig { path } => {
                return validate_config(path);
            }
            Commands::ShowConfig => {
                return show_config(&cli);
            }
        }
    }

    // 快速读取 conngate.toml 的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > conngate.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);

    let _log_guard = logging::init_logging(
        &log_level,
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    tracing::info!("🚀 Conngate starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = ServiceConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    // 显示配置信息
    tracing::info!("📊 Service Configuration:");
    tracing::info!("  - Listen: {}", config.listen_addr);
    tracing::info!("  - Max Connections: {}", config.max_connections);
    tracing::info!(
        "  - Max Connections Per IP: {}",
        config.max_connections_per_ip
    );
    tracing::info!(
        "  - Rate Limit: burst={}, {} permits / {}ms",
        config.rate_limit.burst,
        config.rate_limit.permits,
        config.rate_limit.interval_ms
    );
    tracing::info!("  - Metrics Port: {}", config.metrics_port);
    tracing::info!("  - Log Level: {}", log_level);
    tracing::info!(
        "  - Log Format: {:?}",
        log_format.as_deref().unwrap_or("compact")
    );
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    // 初始化监控指标
    if let Err(e) = metrics::init(config.metrics_port) {
        tracing::error!("❌ 监控指标初始化失败: {}", e);
        process::exit(1);
    }

    // 绑定监听器
    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ 监听地址绑定失败 {}: {}", config.listen_addr, e);
            tracing::error!("💡 请检查端口占用与权限后重试");
            process::exit(1);
        }
    };

    // 接纳通过后的处理：回显客户端自己的地址并原样回传数据
    let service = Arc::new(Service::new(&config, listener, echo_handler));

    // 周期性输出运行状态并刷新指标
    start_stats_monitor(Arc::clone(&service));

    // Ctrl-C 触发停机
    let shutdown_service = Arc::clone(&service);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 收到 Ctrl-C，开始停机");
            shutdown_service.shutdown();
        }
    });

    // 运行服务
    if let Err(e) = service.run().await {
        tracing::error!("❌ 服务运行失败: {}", e);
        process::exit(1);
    }

    tracing::info!("✅ 服务已停止");
    Ok(())
}

/// 默认处理器：先回显对端地址，然后把收到的数据原样回传，直到对端断开
async fn echo_handler(mut conn: TcpStream) -> anyhow::Result<()> {
    let peer = conn.remote_addr()?;
    AsyncWriteExt::write_all(&mut conn, format!("hello {}\n", peer).as_bytes()).await?;

    let mut buf = [0u8; 4096];
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        AsyncWriteExt::write_all(&mut conn, &buf[..n]).await?;
    }
}

/// 启动状态监控任务：每 10 秒输出一次连接数与实测速率，并刷新 Gauge
fn start_stats_monitor(service: Arc<Service<TcpListener>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await; // 跳过立即触发的第一轮
        loop {
            ticker.tick().await;
            let count = service.connection_count();
            let rate = service.measured_rate();
            metrics::record_accept_rate(rate);
            tracing::info!("📊 当前连接数: {}，实测接纳速率: {:.2}/s", count, rate);
        }
    });
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# Conngate 配置文件
# 此文件由 conngate generate-config 生成

# 监听地址
listen_addr = "0.0.0.0:31337"

# 全局最大并发连接数（0 = 不限制）
max_connections = 10000

# 单 IP 最大并发连接数（0 = 不限制）
max_connections_per_ip = 32

# Prometheus 抓取端口（0 = 关闭）
metrics_port = 0

[rate_limit]
# 令牌桶容量
burst = 100
# 每个补充周期发放的令牌数
permits = 100
# 补充周期（毫秒，0 = 不限速）
interval_ms = 1000

[logging]
level = "info"
format = "compact"
# file = "./logs/conngate.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = ServiceConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Listen: {}", config.listen_addr);
    println!("  - Max Connections: {}", config.max_connections);
    println!("  - Max Connections Per IP: {}", config.max_connections_per_ip);
    println!(
        "  - Rate Limit: burst={}, {} permits / {}ms",
        config.rate_limit.burst, config.rate_limit.permits, config.rate_limit.interval_ms
    );

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    // 初始化基本日志（用于显示配置）
    logging::init_logging("info", None, None, false)?;

    let config = ServiceConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
