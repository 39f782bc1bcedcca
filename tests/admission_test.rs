//! 接纳簿记的集成测试：全局/单 IP 上限、无幽灵条目与计数守恒。

use std::net::SocketAddr;

use conngate::{ConnectionManager, ServiceError};

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// 全局上限：第 N+1 条被拒，释放一条后下一条恢复接纳
#[tokio::test]
async fn test_global_cap_boundary() {
    let manager = ConnectionManager::new(50, 0);

    for i in 0..50u16 {
        manager.admit(addr(&format!("10.0.{}.1:4000", i))).await.unwrap();
    }
    assert_eq!(manager.connection_count(), 50);

    let err = manager.admit(addr("10.1.0.1:4000")).await.unwrap_err();
    assert!(matches!(err, ServiceError::TooManyConnections));
    assert_eq!(err.to_string(), "too many connections");
    assert_eq!(manager.connection_count(), 50);

    manager.release(addr("10.0.0.1:4000")).await.unwrap();
    manager.admit(addr("10.1.0.1:4000")).await.unwrap();
    assert_eq!(manager.connection_count(), 50);
}

/// 单 IP 上限：同一 IP 的不同端口共享配额，另一个 IP 不受影响
#[tokio::test]
async fn test_per_ip_cap_groups_by_ip_not_endpoint() {
    let manager = ConnectionManager::new(0, 3);

    manager.admit(addr("10.0.0.1:1000")).await.unwrap();
    manager.admit(addr("10.0.0.1:1001")).await.unwrap();
    manager.admit(addr("10.0.0.1:1002")).await.unwrap();

    let err = manager.admit(addr("10.0.0.1:1003")).await.unwrap_err();
    assert!(matches!(err, ServiceError::TooManyConnectionsPerIp));
    assert_eq!(err.to_string(), "too many connections from IP address");
    assert_eq!(manager.connections_from("10.0.0.1").await.unwrap(), 3);

    // 全局还有余量，另一个 IP 正常接纳
    manager.admit(addr("10.0.0.2:1000")).await.unwrap();
    assert_eq!(manager.connection_count(), 4);
}

/// 被拒绝的连接不在注册表里留下任何痕迹
#[tokio::test]
async fn test_rejection_leaves_no_ghost_entry() {
    let manager = ConnectionManager::new(1, 0);
    manager.admit(addr("10.0.0.1:1000")).await.unwrap();

    // 新 IP 撞上全局上限：外层表不应出现它的条目
    manager.admit(addr("10.0.0.9:1000")).await.unwrap_err();

    let sources = manager.tracked_sources().await.unwrap();
    assert_eq!(sources, vec!["10.0.0.1".to_string()]);
    assert_eq!(manager.connections_from("10.0.0.9").await.unwrap(), 0);
}

/// 最后一条连接释放后整个 IP 条目移除，重新接纳从零计数
#[tokio::test]
async fn test_last_release_removes_ip_entry() {
    let manager = ConnectionManager::new(0, 2);

    manager.admit(addr("10.0.0.1:1000")).await.unwrap();
    manager.admit(addr("10.0.0.1:1001")).await.unwrap();
    manager.admit(addr("10.0.0.2:1000")).await.unwrap();

    manager.release(addr("10.0.0.1:1000")).await.unwrap();
    manager.release(addr("10.0.0.1:1001")).await.unwrap();

    // 10.0.0.1 的条目整体消失，不是留一张空表
    let sources = manager.tracked_sources().await.unwrap();
    assert_eq!(sources, vec!["10.0.0.2".to_string()]);

    // 重新接纳从零开始计，上限判定不受旧状态污染
    manager.admit(addr("10.0.0.1:2000")).await.unwrap();
    manager.admit(addr("10.0.0.1:2001")).await.unwrap();
    assert_eq!(manager.connections_from("10.0.0.1").await.unwrap(), 2);
}

/// 计数守恒：任意接纳/释放序列结束后计数等于在场连接数；
/// 配对之外的释放报错且不动计数
#[tokio::test]
async fn test_count_matches_live_connections() {
    let manager = ConnectionManager::new(0, 0);

    manager.admit(addr("10.0.0.1:1000")).await.unwrap();
    manager.admit(addr("10.0.0.1:1001")).await.unwrap();
    manager.admit(addr("10.0.0.2:1000")).await.unwrap();
    manager.release(addr("10.0.0.1:1000")).await.unwrap();
    manager.admit(addr("10.0.0.3:1000")).await.unwrap();
    manager.release(addr("10.0.0.3:1000")).await.unwrap();

    // 4 次接纳 - 2 次释放
    assert_eq!(manager.connection_count(), 2);

    let err = manager.release(addr("10.9.9.9:1")).await.unwrap_err();
    assert!(matches!(err, ServiceError::UnknownSourceIp(_)));
    assert_eq!(manager.connection_count(), 2);
}

/// 并发释放：每条在场连接各自的任务同时释放，计数精确归零
#[tokio::test]
async fn test_concurrent_releases_settle_to_zero() {
    let manager = std::sync::Arc::new(ConnectionManager::new(0, 0));

    let mut peers = Vec::new();
    for i in 0..20u16 {
        let peer = addr(&format!("10.0.0.{}:5000", i + 1));
        manager.admit(peer).await.unwrap();
        peers.push(peer);
    }
    assert_eq!(manager.connection_count(), 20);

    let mut tasks = Vec::new();
    for peer in peers {
        let manager = std::sync::Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            manager.release(peer).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(manager.connection_count(), 0);
    assert!(manager.tracked_sources().await.unwrap().is_empty());
}
