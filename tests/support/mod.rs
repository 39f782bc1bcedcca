//! 测试用的内存传输替身：把 [`Listener`] / [`Connection`] 接到一对
//! duplex 流上，对端地址可以任意注入，不占用真实端口。
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use conngate::net::{Connection, Listener};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, Mutex};

/// 内存连接（服务端侧）。对端地址是注入的，可以模拟解析失败。
pub struct MemoryConn {
    peer: Option<SocketAddr>,
    stream: DuplexStream,
}

#[async_trait]
impl Connection for MemoryConn {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.peer.ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "peer address unavailable")
        })
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.stream, data).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(&mut self.stream).await
    }
}

// 处理器可以在 MemoryConn 上直接做协议读写
impl AsyncRead for MemoryConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// 内存监听器。拨号端全部析构后 `accept_next` 返回错误，
/// 对应真实监听器被关闭的语义。
pub struct MemoryListener {
    incoming: Mutex<mpsc::UnboundedReceiver<MemoryConn>>,
}

#[async_trait]
impl Listener for MemoryListener {
    type Conn = MemoryConn;

    async fn accept_next(&self) -> io::Result<MemoryConn> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "listener closed"))
    }
}

/// 拨号端：向配对的 [`MemoryListener`] 注入新连接，返回客户端侧的流。
#[derive(Clone)]
pub struct MemoryDialer {
    tx: mpsc::UnboundedSender<MemoryConn>,
}

impl MemoryDialer {
    /// 以指定对端地址建立一条连接
    pub fn dial(&self, peer: &str) -> DuplexStream {
        self.dial_inner(Some(peer.parse().expect("invalid peer addr")))
    }

    /// 建立一条对端地址解析会失败的连接
    pub fn dial_unresolvable(&self) -> DuplexStream {
        self.dial_inner(None)
    }

    fn dial_inner(&self, peer: Option<SocketAddr>) -> DuplexStream {
        let (client, server) = tokio::io::duplex(4096);
        self.tx
            .send(MemoryConn {
                peer,
                stream: server,
            })
            .expect("listener side dropped");
        client
    }
}

/// 创建一对内存传输端点
pub fn memory_transport() -> (MemoryListener, MemoryDialer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryListener {
            incoming: Mutex::new(rx),
        },
        MemoryDialer { tx },
    )
}
