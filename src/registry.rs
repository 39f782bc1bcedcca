use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::RegistryClosed;

/// 注册表命令。所有操作都经由同一条命令队列，由唯一的所有者任务顺序执行。
enum Command<V> {
    Insert(String, V),
    Remove(String),
    Get(String, oneshot::Sender<Option<V>>),
    Len(oneshot::Sender<usize>),
    Snapshot(oneshot::Sender<HashMap<String, V>>),
    Close,
}

/// 并发注册表：字符串键的泛型 KV 表。
///
/// 背后的 `HashMap` 由一个独占的 tokio 任务持有，外部只能通过命令队列访问，
/// 因此全部读写天然串行化，不需要任何锁。句柄可克隆、可嵌套，
/// 本服务即以 `Registry<Registry<ClientRecord>>` 作为外层连接表。
///
/// 关闭语义：[`close`](Registry::close) 与普通操作走同一条队列，先入队的操作
/// 全部执行完毕后所有者任务才退出；之后的读操作返回 [`RegistryClosed`]，
/// 写操作静默丢弃。所有句柄被丢弃时所有者任务同样会退出，无需显式关闭。
pub struct Registry<V> {
    tx: mpsc::UnboundedSender<Command<V>>,
}

impl<V> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<V> Registry<V>
where
    V: Clone + Send + 'static,
{
    /// 创建注册表并启动所有者任务（需在 Tokio 运行时内调用）
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<V>>();

        tokio::spawn(async move {
            let mut entries: HashMap<String, V> = HashMap::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Insert(key, value) => {
                        entries.insert(key, value);
                    }
                    Command::Remove(key) => {
                        entries.remove(&key);
                    }
                    Command::Get(key, reply) => {
                        let _ = reply.send(entries.get(&key).cloned());
                    }
                    Command::Len(reply) => {
                        let _ = reply.send(entries.len());
                    }
                    Command::Snapshot(reply) => {
                        let _ = reply.send(entries.clone());
                    }
                    Command::Close => break,
                }
            }
            // 队列中排在 Close 之后的命令随接收端一起析构，
            // 对应的 oneshot 发送端被丢弃，等待方即得到 RegistryClosed。
        });

        Self { tx }
    }

    /// 写入一个键值对（upsert）。注册表已关闭时为无副作用的 no-op。
    pub fn insert(&self, key: String, value: V) {
        if self.tx.send(Command::Insert(key, value)).is_err() {
            debug!("注册表已关闭，丢弃 insert");
        }
    }

    /// 删除指定键。键不存在或注册表已关闭时均为 no-op。
    pub fn remove(&self, key: &str) {
        if self.tx.send(Command::Remove(key.to_string())).is_err() {
            debug!("注册表已关闭，丢弃 remove");
        }
    }

    /// 读取指定键的值
    pub async fn get(&self, key: &str) -> Result<Option<V>, RegistryClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Get(key.to_string(), reply_tx))
            .map_err(|_| RegistryClosed)?;
        reply_rx.await.map_err(|_| RegistryClosed)
    }

    /// 当前条目数
    pub async fn len(&self) -> Result<usize, RegistryClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Len(reply_tx))
            .map_err(|_| RegistryClosed)?;
        reply_rx.await.map_err(|_| RegistryClosed)
    }

    /// 全表时点快照（逐值克隆）
    pub async fn snapshot(&self) -> Result<HashMap<String, V>, RegistryClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply_tx))
            .map_err(|_| RegistryClosed)?;
        reply_rx.await.map_err(|_| RegistryClosed)
    }

    /// 关闭注册表。与普通操作同队列，先入队的操作先完成；重复关闭为 no-op。
    pub fn close(&self) {
        if self.tx.send(Command::Close).is_err() {
            debug!("注册表已关闭，忽略重复 close");
        }
    }

    /// 所有者任务是否已退出
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
