//! 传输层接缝：监听器与连接的最小抽象

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// 接纳层对连接的全部要求。
///
/// 处理器拿到的是具体连接类型的所有权，在其上自行做协议读写；
/// 这里只抽象接纳层自己需要的三件事：对端地址、拒绝文案写回、关闭写端。
/// 连接的真正关闭发生在持有者丢弃它的时候。
#[async_trait]
pub trait Connection: Send + 'static {
    /// 对端地址
    fn remote_addr(&self) -> io::Result<SocketAddr>;

    /// 写入全部字节
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// 关闭写端并冲刷
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// 接受循环的连接来源
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    type Conn: Connection;

    /// 等待下一条入站连接
    async fn accept_next(&self) -> io::Result<Self::Conn>;
}

#[async_trait]
impl Connection for TcpStream {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.peer_addr()
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, data).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpStream;

    async fn accept_next(&self) -> io::Result<TcpStream> {
        self.accept().await.map(|(stream, _)| stream)
    }
}
