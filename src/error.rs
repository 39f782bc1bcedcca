//! 错误类型定义
//!
//! 拒绝类错误的 Display 文本会按拒绝协议原样写回被拒绝的连接，
//! 属于对外可见的线上行为，文案保持稳定。

use thiserror::Error;

/// 注册表已关闭。
///
/// 关闭后的读操作（get / len / snapshot）确定性地返回该错误，不挂起也不 panic。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("registry closed")]
pub struct RegistryClosed;

/// 服务统一错误类型
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 全局并发连接数已达上限
    #[error("too many connections")]
    TooManyConnections,

    /// 单个来源 IP 的并发连接数已达上限
    #[error("too many connections from IP address")]
    TooManyConnectionsPerIp,

    /// 无法解析对端地址，按接纳失败处理
    #[error("failed to resolve remote address: {0}")]
    AddressResolution(#[source] std::io::Error),

    /// 释放连接时没有该 IP 的任何簿记记录（admit/release 正确配对时不会出现）
    #[error("no connections from this IP: {0}")]
    UnknownSourceIp(String),

    /// 监听器 accept 失败，接受循环随之终止
    #[error("listener terminated: {0}")]
    ListenerTerminated(#[source] std::io::Error),

    /// 簿记操作命中了已关闭的注册表（只可能出现在停机边缘）
    #[error("registry error: {0}")]
    Registry(#[from] RegistryClosed),
}

/// 统一 Result 类型
pub type Result<T> = std::result::Result<T, ServiceError>;
