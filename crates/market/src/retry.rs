use kaipan_core::config::MarketConfig;
use kaipan_core::market::error::MarketError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 上游请求的指数退避重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    // 总尝试次数 (含首次)
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MarketConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
        }
    }

    /// 第 `attempt` 次失败后的等待时长：base * 2^(attempt-1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&MarketConfig::default())
    }
}

/// # Summary
/// 以指数退避方式执行上游请求。
///
/// # Logic
/// 1. 执行 `op`，成功立即返回。
/// 2. 瞬时错误 (网络/未知) 在未达到次数上限时等待后重试。
/// 3. 非瞬时错误 (无数据/解析/参数) 直接返回。
///
/// # Returns
/// 最后一次尝试的结果。
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, MarketError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt);
                warn!(label, attempt, ?delay, error = %e, "upstream request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
