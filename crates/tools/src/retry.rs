//! 网络错误自动重试，指数退避。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use finsage_core::{Error, Result};

use crate::safe_truncate;

/// 判定为瞬态网络错误的关键词（不区分大小写）。
const NETWORK_ERROR_KEYWORDS: [&str; 8] = [
    "connection",
    "remote",
    "timeout",
    "timed out",
    "disconnect",
    "network",
    "unreachable",
    "refused",
];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// 静默模式下不输出每次重试的日志。
    pub silent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            silent: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            silent: false,
        }
    }

    pub fn silent(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            silent: true,
        }
    }
}

/// 瞬态错误才值得重试；参数错误等直接失败。
/// reqwest 的超时/断连错误信息都会带上这些关键词。
pub fn is_transient(err: &Error) -> bool {
    let msg = err.to_string().to_lowercase();
    NETWORK_ERROR_KEYWORDS.iter().any(|kw| msg.contains(kw))
}

/// 执行 `f`，瞬态失败时按 `base_delay * 2^(attempt-1)` 退避重试。
/// 非瞬态错误或重试耗尽后返回最后一个错误。
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
            if !policy.silent {
                info!(
                    "重试 {} (尝试 {}/{})，等待 {:.1}s...",
                    op_name,
                    attempt + 1,
                    policy.max_retries,
                    delay.as_secs_f64()
                );
            }
            tokio::time::sleep(delay).await;
        }
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_retries || !is_transient(&e) {
                    return Err(e);
                }
                if !policy.silent {
                    warn!("网络错误: {}，准备重试...", safe_truncate(&e.to_string(), 100));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transient_classification() {
        assert!(is_transient(&Error::data_fetch(
            "东方财富",
            "Connection refused"
        )));
        assert!(is_transient(&Error::Tool("request Timed Out after 8s".into())));
        assert!(is_transient(&Error::Tool("RemoteDisconnected".into())));
        assert!(!is_transient(&Error::InvalidParams("symbol 不能为空".into())));
        assert!(!is_transient(&Error::Tool("数据格式异常".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            RetryPolicy::silent(3, Duration::from_millis(100)),
            "fetch_quote",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Tool("connection reset".into()))
                    } else {
                        Ok("行情数据".to_string())
                    }
                }
            },
        )
        .await;
        assert_eq!(result.ok().as_deref(), Some("行情数据"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            RetryPolicy::silent(3, Duration::from_millis(100)),
            "fetch_quote",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::InvalidParams("bad symbol".into())) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            RetryPolicy::silent(3, Duration::from_millis(50)),
            "fetch_quote",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(Error::Tool(format!("network unreachable #{}", n))) }
            },
        )
        .await;
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("#2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
