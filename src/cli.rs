use clap::{Parser, Subcommand};

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// Conngate - TCP 连接接纳网关
#[derive(Parser, Debug)]
#[command(name = "conngate")]
#[command(version)]
#[command(about = "带限速与并发上限的连接接纳网关", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 监听地址
    #[arg(long, value_name = "ADDRESS", help = "监听地址（host:port）")]
    pub listen_addr: Option<String>,

    /// 最大连接数
    #[arg(long, value_name = "NUM", help = "全局最大并发连接数（0 = 不限制）")]
    pub max_connections: Option<u32>,

    /// 单 IP 最大连接数
    #[arg(long, value_name = "NUM", help = "单 IP 最大并发连接数（0 = 不限制）")]
    pub max_connections_per_ip: Option<u32>,

    /// 令牌桶容量
    #[arg(long, value_name = "NUM", help = "接纳限速令牌桶容量")]
    pub rate_burst: Option<u32>,

    /// 每周期令牌数
    #[arg(long, value_name = "NUM", help = "每个补充周期发放的令牌数")]
    pub rate_permits: Option<u32>,

    /// 令牌补充周期
    #[arg(long, value_name = "MS", help = "令牌补充周期，毫秒（0 = 不限速）")]
    pub rate_interval_ms: Option<u64>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// 监控端口
    #[arg(long, value_name = "PORT", help = "Prometheus 抓取端口（0 = 关闭）")]
    pub metrics_port: Option<u16>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（不输出日志）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "conngate.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "conngate.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        // 根据 verbose 级别设置
        match self.verbose {
            0 => None, // 使用默认或配置文件
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}
