use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::manager::{ClientRecord, ConnectionManager};
use crate::metrics;
use crate::net::{Connection, Listener};
use crate::pacer::AcceptPacer;

/// 每连接处理器。
///
/// 接纳通过后在独立任务上收到连接的所有权；返回错误只影响这一条连接，
/// 以 `client failed` 记入日志。普通的 async 闭包可以直接作为处理器。
#[async_trait]
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    async fn handle(&self, conn: C) -> anyhow::Result<()>;
}

#[async_trait]
impl<C, F, Fut> ConnectionHandler<C> for F
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, conn: C) -> anyhow::Result<()> {
        (self)(conn).await
    }
}

/// 连接接纳服务。
///
/// 运行一个限速的接受循环：每条入站连接先过 [`ConnectionManager`] 的接纳
/// 判定，通过的交给处理器任务，超限的按拒绝协议写回错误文案后关闭，处理器
/// 完全不会被调用。接受循环是唯一做接纳判定的任务，判定因此天然串行。
pub struct Service<L: Listener> {
    listener: L,
    handler: Arc<dyn ConnectionHandler<L::Conn>>,
    manager: Arc<ConnectionManager>,
    pacer: Arc<AcceptPacer>,
    shutdown: watch::Sender<bool>,
}

impl<L: Listener> Service<L> {
    /// 创建服务。节拍器与簿记管理器在此就绪，监控口径从创建起即有效。
    pub fn new<H>(config: &ServiceConfig, listener: L, handler: H) -> Self
    where
        H: ConnectionHandler<L::Conn>,
    {
        let (shutdown, _) = watch::channel(false);
        Self {
            listener,
            handler: Arc::new(handler),
            manager: Arc::new(ConnectionManager::new(
                config.max_connections,
                config.max_connections_per_ip,
            )),
            pacer: Arc::new(AcceptPacer::new(&config.rate_limit)),
            shutdown,
        }
    }

    /// 运行服务，直到收到停机信号（`Ok`）或监听器失效（`Err`）。
    ///
    /// 每轮循环：等待接纳令牌 -> accept -> 判定分发。accept 出错视为监听器
    /// 已终止，是唯一的失败退出路径。停机信号在令牌等待与 accept 两个挂起
    /// 点上都会被立即观察到；在途的处理器任务不受影响，自行排空。
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("✅ 接纳服务开始运行");

        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("🛑 收到停机信号，接受循环退出");
                    return Ok(());
                }
                _ = self.pacer.wait() => {}
            }

            let conn = tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("🛑 收到停机信号，接受循环退出");
                    return Ok(());
                }
                accepted = self.listener.accept_next() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("❌ 监听器已终止: {}", e);
                        return Err(ServiceError::ListenerTerminated(e));
                    }
                }
            };

            self.dispatch(conn).await;
        }
    }

    /// 单条连接的接纳分发，在接受循环内完成判定
    async fn dispatch(&self, conn: L::Conn) {
        let remote = match conn.remote_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("🚫 无法解析对端地址，按拒绝处理: {}", e);
                metrics::record_rejected("address_resolution");
                self.reject(conn, ServiceError::AddressResolution(e));
                return;
            }
        };

        match self.manager.admit(remote).await {
            Ok(record) => {
                metrics::record_admitted();
                self.spawn_handler(conn, record);
            }
            Err(e) => {
                warn!("🚫 拒绝来自 {} 的连接: {}", remote, e);
                metrics::record_rejected(rejection_reason(&e));
                self.reject(conn, e);
            }
        }
    }

    /// 拒绝协议：错误文案原样写回后关闭连接。
    /// 写回放在独立任务上，慢速对端拖不住接受循环。
    fn reject(&self, conn: L::Conn, err: ServiceError) {
        tokio::spawn(async move {
            let mut conn = conn;
            let notice = err.to_string();
            if let Err(write_err) = conn.write_all(notice.as_bytes()).await {
                debug!("拒绝文案写回失败: {}", write_err);
            }
            let _ = conn.shutdown().await;
        });
    }

    /// 为已接纳的连接启动处理器任务。
    ///
    /// 处理器在嵌套的子任务上运行，panic 由 JoinError 兜住；无论处理器正常
    /// 返回、报错还是 panic，随后都恰好释放一次簿记。连接在处理器任务结束、
    /// 所有权析构时关闭。
    fn spawn_handler(&self, conn: L::Conn, record: ClientRecord) {
        let handler = Arc::clone(&self.handler);
        let manager = Arc::clone(&self.manager);

        tokio::spawn(async move {
            let peer = record.addr;
            let outcome = tokio::spawn(async move { handler.handle(conn).await }).await;

            match outcome {
                Ok(Ok(())) => debug!("连接 {} 正常结束", peer),
                Ok(Err(e)) => {
                    metrics::record_handler_failure();
                    warn!("⚠️ client failed: {} - {}", peer, e);
                }
                Err(join_err) if join_err.is_panic() => {
                    metrics::record_handler_failure();
                    error!("❌ 处理器 panic: {}", peer);
                }
                Err(_) => warn!("⚠️ 处理器任务被取消: {}", peer),
            }

            if let Err(e) = manager.release(peer).await {
                warn!("⚠️ 释放簿记失败: {}", e);
            }
        });
    }

    /// 当前已接纳的连接数（可与 `run` 并发调用）
    pub fn connection_count(&self) -> i64 {
        self.manager.connection_count()
    }

    /// 最近窗口内的实测接纳速率（次/秒）
    pub fn measured_rate(&self) -> f64 {
        self.pacer.measured_rate()
    }

    /// 簿记管理器句柄，用于更细的查询（如按 IP 的连接数）
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// 发出停机信号：接受循环在下一个挂起点退出，在途连接自行排空
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// 拒绝原因的指标标签
fn rejection_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::TooManyConnections => "max_connections",
        ServiceError::TooManyConnectionsPerIp => "max_connections_per_ip",
        ServiceError::AddressResolution(_) => "address_resolution",
        _ => "other",
    }
}
