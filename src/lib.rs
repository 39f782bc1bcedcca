//! Conngate：连接接纳层。
//!
//! 坐在监听套接字前面：按令牌桶节奏接受入站连接，执行全局与单 IP 并发
//! 上限，通过的连接交给调用方提供的处理器在独立任务上运行，超限的按拒绝
//! 协议写回错误文案后关闭。对外暴露连接数与实测接纳速率两个监控口径。
//!
//! ```no_run
//! use conngate::{config::ServiceConfig, Service};
//! use tokio::net::{TcpListener, TcpStream};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = ServiceConfig::default();
//! let listener = TcpListener::bind(&config.listen_addr).await?;
//! let service = Service::new(&config, listener, |_conn: TcpStream| async { Ok(()) });
//! service.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod net;
pub mod pacer;
pub mod registry;
pub mod service;

pub use config::{RateLimitConfig, ServiceConfig};
pub use error::{RegistryClosed, Result, ServiceError};
pub use manager::{ClientRecord, ConnectionManager};
pub use net::{Connection, Listener};
pub use pacer::AcceptPacer;
pub use registry::Registry;
pub use service::{ConnectionHandler, Service};
