use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::Layer as _, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// 初始化日志系统。
///
/// 指定了日志文件时切换为按天滚动的非阻塞写入，返回的 guard 必须由调用方
/// 持有到进程结束，否则退出前的尾部日志会被吞掉。
pub fn init_logging(
    log_level: &str,
    log_format: Option<&str>,
    log_file: Option<&str>,
    quiet: bool,
) -> Result<Option<WorkerGuard>> {
    // 静默模式只输出错误
    let level = if quiet { "error" } else { log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("conngate.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    // 根据格式选择输出方式；文件输出统一关掉 ANSI 着色
    let fmt_layer = match (log_format, file_writer) {
        // JSON 格式（适合生产环境）
        (Some("json"), Some(writer)) => fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
        (Some("json"), None) => fmt::layer().json().boxed(),
        // Pretty 格式（适合开发环境）
        (Some("pretty") | Some("dev"), Some(writer)) => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
        (Some("pretty") | Some("dev"), None) => fmt::layer().pretty().boxed(),
        // Compact 格式（默认）
        (_, Some(writer)) => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
        (_, None) => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(guard)
}
