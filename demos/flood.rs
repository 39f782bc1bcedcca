//! 压测示例：向同一个地址同时发起大量连接，打印每条连接的接纳结果。
//!
//! 用来手工验证全局与单 IP 上限：被拒绝的连接会在第一行收到拒绝文案
//! （如 `too many connections from IP address`），被接纳的收到问候。
//!
//! ```bash
//! cargo run --example basic          # 先起服务端
//! cargo run --example flood -- 127.0.0.1:31337 50
//! ```

use std::env;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let target = args.next().unwrap_or_else(|| "127.0.0.1:31337".to_string());
    let count: usize = args.next().as_deref().unwrap_or("50").parse()?;

    println!("🌊 向 {} 发起 {} 条并发连接", target, count);

    let mut tasks = Vec::with_capacity(count);
    for i in 0..count {
        let target = target.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = probe(&target).await;
            match outcome {
                Ok(first_line) => println!("  #{:03} -> {}", i, first_line.trim_end()),
                Err(e) => println!("  #{:03} -> 连接失败: {}", i, e),
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// 建立一条连接并读取服务端写回的第一行（问候或拒绝文案）
async fn probe(target: &str) -> anyhow::Result<String> {
    let mut conn = TcpStream::connect(target).await?;

    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(5), conn.read(&mut buf)).await??;
    if n == 0 {
        return Ok("（服务端直接关闭）".to_string());
    }
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}
