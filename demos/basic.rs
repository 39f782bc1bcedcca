//! 基础示例：问候每个客户端，然后随机挂住几秒再断开。
//!
//! 旁边跑一个监控循环，每秒打印一次实测接纳速率与当前连接数。
//!
//! ```bash
//! cargo run --example basic
//! # 另开终端：
//! nc 127.0.0.1 31337
//! ```

use std::sync::Arc;
use std::time::Duration;

use conngate::{config::ServiceConfig, net::Connection, Service};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

async fn greet_and_hold(mut conn: TcpStream) -> anyhow::Result<()> {
    let peer = conn.remote_addr()?;
    println!("🔗 连接来自 {}", peer);

    AsyncWriteExt::write_all(&mut conn, format!("{}\n", peer).as_bytes()).await?;

    // 随机挂住 0-4 秒，模拟一个有生命周期的会话
    let hold = rand::thread_rng().gen_range(0..5);
    tokio::time::sleep(Duration::from_secs(hold)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = ServiceConfig::default();
    config.listen_addr = "0.0.0.0:31337".to_string();
    config.max_connections = 100;
    config.max_connections_per_ip = 10;
    // burst 10，每秒 10 个令牌
    config.rate_limit.burst = 10;
    config.rate_limit.permits = 10;
    config.rate_limit.interval_ms = 1000;

    let listener = TcpListener::bind(&config.listen_addr).await?;
    println!("🚀 监听 {}", listener.local_addr()?);

    let service = Arc::new(Service::new(&config, listener, greet_and_hold));

    // 监控循环：每秒打印实测速率与连接数
    let monitor = Arc::clone(&service);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!(
                "📊 实测速率 {:.2}/s，当前连接数 {}",
                monitor.measured_rate(),
                monitor.connection_count()
            );
        }
    });

    service.run().await?;
    Ok(())
}
