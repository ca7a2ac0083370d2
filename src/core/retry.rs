//! 限流重试：指数退避
//!
//! 只对 RateLimited 重试；其他错误立即返回；次数耗尽时返回最后一次的错误。
//! 三个远程阶段各自持有一份 RetryPolicy。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::llm::LlmError;

/// 重试策略：max_attempts 为总调用次数（含首次）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    /// 单次等待上限；None 表示不封顶
    pub max_delay_ms: Option<u64>,
    /// 是否叠加 0-30% 抖动
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,
            multiplier: 2.0,
            max_delay_ms: None,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(max_delay.as_millis() as u64);
        self
    }

    /// 第 attempt 次失败（从 0 起）后的基础等待：initial × multiplier^attempt，封顶后不含抖动
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = match self.max_delay_ms {
            Some(max) => exp.min(max as f64),
            None => exp,
        };
        Duration::from_millis(capped.round() as u64)
    }

    fn next_delay(&self, attempt: u32, err: &LlmError) -> Duration {
        let base = self.base_delay(attempt);
        let delay = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.0..=0.3);
            base + base.mul_f64(factor)
        } else {
            base
        };
        match err.retry_after() {
            Some(hint) if hint > delay => hint,
            _ => delay,
        }
    }
}

/// 三个远程阶段各自的重试预算（对应配置中的 [retry.*] 段）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhasePolicies {
    pub reasoning: RetryPolicy,
    pub manifestation: RetryPolicy,
    pub translation: RetryPolicy,
}

impl PhasePolicies {
    /// 三阶段共用同一策略
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            reasoning: policy.clone(),
            manifestation: policy.clone(),
            translation: policy,
        }
    }
}

/// 执行 op，限流时按策略退避重试
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !err.is_rate_limited() || attempt >= max_attempts {
                    if err.is_rate_limited() {
                        tracing::warn!(%label, attempt, "Rate limit retries exhausted");
                    }
                    return Err(err);
                }
                let delay = policy.next_delay(attempt - 1, &err);
                tracing::info!(
                    %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
