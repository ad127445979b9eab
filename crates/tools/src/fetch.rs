//! 多数据源降级：串行按优先级尝试，或并行竞速取第一个非空结果。
//!
//! 失败与空结果同等对待，整条链路永不报错，全部失败时返回
//! `T::default()`，由调用方决定如何向用户交代。

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use finsage_core::Result;

/// 并行竞速时同时在跑的数据源上限。
const MAX_PARALLEL_SOURCES: usize = 6;

/// 数据源返回值的"空"判定。空结果视同失败，继续尝试下一个源。
pub trait FetchValue: Default {
    fn is_empty_result(&self) -> bool;
}

impl FetchValue for String {
    fn is_empty_result(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> FetchValue for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

/// 一个具名的延迟数据源。`call` 直到真正轮到它才会构造请求。
pub struct Source<T> {
    pub name: &'static str,
    call: Box<dyn FnOnce() -> BoxFuture<'static, Result<T>> + Send>,
}

impl<T> Source<T> {
    pub fn new<F>(name: &'static str, call: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        Self {
            name,
            call: Box::new(call),
        }
    }

    fn invoke(self) -> BoxFuture<'static, Result<T>> {
        (self.call)()
    }
}

/// 串行尝试：按优先级逐个调用，源之间等待 `delay`（首个之前不等），
/// 第一个非空结果胜出。
pub async fn try_sources<T: FetchValue>(sources: Vec<Source<T>>, delay: Duration) -> T {
    for (i, source) in sources.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let name = source.name;
        match source.invoke().await {
            Ok(value) if !value.is_empty_result() => {
                debug!(source = name, "数据源命中");
                return value;
            }
            Ok(_) => debug!(source = name, "数据源返回空，尝试下一个"),
            Err(e) => debug!(source = name, error = %e, "数据源失败，尝试下一个"),
        }
    }
    T::default()
}

/// 并行竞速：最多 `min(n, 6)` 个源同时跑，单源受 `timeout_per_source`
/// 限制，整体不超过 `timeout_per_source × n`。第一个非空结果胜出，
/// 其余未完成的任务直接放弃（不等待收尾）。
pub async fn try_sources_parallel<T>(sources: Vec<Source<T>>, timeout_per_source: Duration) -> T
where
    T: FetchValue + Send + 'static,
{
    if sources.is_empty() {
        return T::default();
    }
    let n = sources.len();
    let deadline = Instant::now() + timeout_per_source * n as u32;
    let permits = Arc::new(Semaphore::new(n.min(MAX_PARALLEL_SOURCES)));

    let mut workers: JoinSet<Option<T>> = JoinSet::new();
    for source in sources {
        let permits = Arc::clone(&permits);
        let name = source.name;
        let fut = source.invoke();
        workers.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            match tokio::time::timeout(timeout_per_source, fut).await {
                Ok(Ok(value)) if !value.is_empty_result() => {
                    debug!(source = name, "数据源命中（并行）");
                    Some(value)
                }
                Ok(Ok(_)) => {
                    debug!(source = name, "数据源返回空（并行）");
                    None
                }
                Ok(Err(e)) => {
                    debug!(source = name, error = %e, "数据源失败（并行）");
                    None
                }
                Err(_) => {
                    debug!(source = name, "数据源单次超时（并行）");
                    None
                }
            }
        });
    }

    loop {
        match tokio::time::timeout_at(deadline, workers.join_next()).await {
            Ok(Some(Ok(Some(value)))) => {
                workers.detach_all();
                return value;
            }
            // 空结果、源失败或 worker panic：继续等其余源
            Ok(Some(_)) => continue,
            Ok(None) => return T::default(),
            Err(_) => {
                debug!("并行数据源整体超时");
                workers.detach_all();
                return T::default();
            }
        }
    }
}
