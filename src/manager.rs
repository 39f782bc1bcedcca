//! 连接簿记：全局与单 IP 并发上限的判定、跟踪与释放

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::registry::Registry;

/// 已接纳连接的簿记记录。
///
/// 注册表持有的是它的克隆；连接本体归处理器任务所有，不经过这里。
#[derive(Debug, Clone)]
pub struct ClientRecord {
    /// 对端地址
    pub addr: SocketAddr,
    /// 接纳时刻（毫秒时间戳）
    pub connected_at: i64,
}

impl ClientRecord {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connected_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 连接簿记管理器。
///
/// 两级注册表：外层按来源 IP 组织，内层按 `"ip:port"` 端点串组织，
/// 两层都是 [`Registry`] 的实例。接纳判定顺序固定：先查全局上限，
/// 再解析来源 IP、查该 IP 的上限，任一超限即拒绝。全局计数是原子量，
/// 增与减两个方向都用原子操作维护。
pub struct ConnectionManager {
    /// 全局并发连接上限（0 = 不限制）
    max_connections: u32,
    /// 单 IP 并发连接上限（0 = 不限制）
    max_connections_per_ip: u32,
    /// 外层表：来源 IP -> 该 IP 的连接表
    connections: Registry<Registry<ClientRecord>>,
    /// 当前已接纳的连接数
    count: AtomicI64,
}

impl ConnectionManager {
    pub fn new(max_connections: u32, max_connections_per_ip: u32) -> Self {
        Self {
            max_connections,
            max_connections_per_ip,
            connections: Registry::new(),
            count: AtomicI64::new(0),
        }
    }

    /// 接纳判定。
    ///
    /// 通过后该连接计入两级注册表与全局计数并返回簿记记录；拒绝时不留
    /// 任何痕迹。为新 IP 创建的内层表要等第一条记录装入后才发布到外层表，
    /// 因此单 IP 拒绝永远不会在外层表留下空壳条目。
    pub async fn admit(&self, remote: SocketAddr) -> Result<ClientRecord> {
        if self.max_connections > 0
            && self.count.load(Ordering::Relaxed) >= i64::from(self.max_connections)
        {
            return Err(ServiceError::TooManyConnections);
        }

        let ip = remote.ip().to_string();
        let endpoint = remote.to_string();

        let (per_ip, fresh) = match self.connections.get(&ip).await? {
            Some(existing) => (existing, false),
            None => (Registry::new(), true),
        };

        if !fresh
            && self.max_connections_per_ip > 0
            && per_ip.len().await? >= self.max_connections_per_ip as usize
        {
            return Err(ServiceError::TooManyConnectionsPerIp);
        }

        let record = ClientRecord::new(remote);
        per_ip.insert(endpoint, record.clone());
        if fresh {
            self.connections.insert(ip, per_ip);
        }

        let live = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_connection_count(live.max(0) as u64);
        debug!("🔗 接纳连接 {}（当前 {} 条）", record.addr, live);
        Ok(record)
    }

    /// 释放一次接纳。
    ///
    /// 与 [`admit`](ConnectionManager::admit) 严格一一配对。该 IP 的最后一条
    /// 连接释放后，整个 IP 条目从外层表移除而不是留空；内层表的所有者任务
    /// 随最后一个句柄析构而退出。配对之外的调用得到 `UnknownSourceIp`，
    /// 计数不受影响，调用方记日志即可。
    pub async fn release(&self, remote: SocketAddr) -> Result<()> {
        let ip = remote.ip().to_string();
        let endpoint = remote.to_string();

        let Some(per_ip) = self.connections.get(&ip).await? else {
            return Err(ServiceError::UnknownSourceIp(ip));
        };

        per_ip.remove(&endpoint);
        if per_ip.len().await? == 0 {
            self.connections.remove(&ip);
        }

        let live = self.count.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::record_connection_count(live.max(0) as u64);
        debug!("🔌 释放连接 {}（当前 {} 条）", remote, live);
        Ok(())
    }

    /// 当前已接纳的连接数
    pub fn connection_count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// 当前有连接在跟踪中的来源 IP 列表
    pub async fn tracked_sources(&self) -> Result<Vec<String>> {
        let snapshot = self.connections.snapshot().await?;
        Ok(snapshot.into_keys().collect())
    }

    /// 指定 IP 当前的连接数；没有任何连接时为 0
    pub async fn connections_from(&self, ip: &str) -> Result<usize> {
        match self.connections.get(ip).await? {
            Some(per_ip) => Ok(per_ip.len().await?),
            None => Ok(0),
        }
    }
}
