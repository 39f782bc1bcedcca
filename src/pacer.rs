//! 接纳节拍器：accept 前的限速等待 + 实测接纳速率

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::RateLimitConfig;

/// 实测速率的滑动窗口长度
const METER_WINDOW: Duration = Duration::from_secs(10);

/// 滑动窗口速率表。只负责测量，不做任何限流。
struct RateMeter {
    window: Duration,
    samples: Mutex<VecDeque<Instant>>,
}

impl RateMeter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// 记录一次事件
    fn record(&self) {
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, self.window);
        samples.push_back(Instant::now());
    }

    /// 窗口内的平均速率（次/秒）
    fn rate(&self) -> f64 {
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, self.window);
        samples.len() as f64 / self.window.as_secs_f64()
    }

    fn prune(samples: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while let Some(front) = samples.front() {
            if now.duration_since(*front) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// 接纳节拍器。
///
/// 令牌桶由 governor 提供：容量 `burst`，每 `interval_ms` 均匀补充 `permits`
/// 个令牌；`interval_ms = 0` 表示完全不限速。桶本身之外还挂了一个滑动窗口
/// 速率表，[`measured_rate`](AcceptPacer::measured_rate) 返回最近窗口内实际
/// 放行的接纳速率，可与 `wait` 并发调用。
pub struct AcceptPacer {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    meter: RateMeter,
}

impl AcceptPacer {
    pub fn new(config: &RateLimitConfig) -> Self {
        let limiter = Self::build_limiter(config);
        match &limiter {
            Some(_) => info!(
                "⏱️ 接纳限速已启用: burst={}, {} permits / {}ms",
                config.burst, config.permits, config.interval_ms
            ),
            None => info!("⏱️ 接纳限速未启用"),
        }

        Self {
            limiter,
            meter: RateMeter::new(METER_WINDOW),
        }
    }

    fn build_limiter(
        config: &RateLimitConfig,
    ) -> Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>> {
        if config.interval_ms == 0 {
            return None;
        }

        let permits = config.permits.max(1);
        let period = Duration::from_millis(config.interval_ms) / permits;
        let Some(quota) = Quota::with_period(period) else {
            // interval 小到除出 0ns 周期，等同于不限速
            warn!(
                "⚠️ 限速周期过小（{}ms / {} permits），限速退化为关闭",
                config.interval_ms, permits
            );
            return None;
        };

        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        Some(RateLimiter::direct(quota.allow_burst(burst)))
    }

    /// 等待下一个接纳令牌；未启用限速时立即返回。每次放行都会计入实测速率。
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        self.meter.record();
    }

    /// 最近窗口内的实测接纳速率（次/秒），未产生流量时为 0.0
    pub fn measured_rate(&self) -> f64 {
        self.meter.rate()
    }

    /// 是否启用了限速
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}
