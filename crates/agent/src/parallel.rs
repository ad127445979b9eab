//! 工具调用的并行执行。
//!
//! 一个批次内的多个只读调用通过 [`JoinSet`] 并发执行，
//! [`Semaphore`] 限制并发度，整批共用一个截止时间。
//! 结果始终按入参顺序返回，且不因个别调用失败而中断整批。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{error, warn};

use finsage_core::types::ToolCallRequest;
use finsage_core::Result;
use finsage_tools::{Tool, ToolRegistry};

/// 单次调用的执行结果。失败时 `result` 为空、`error` 给出原因。
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub result: String,
    pub error: Option<String>,
}

impl ToolOutcome {
    fn ok(result: String) -> Self {
        Self {
            result,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            result: String::new(),
            error: Some(error),
        }
    }
}

/// 校验后执行，跳过注册表查找。
pub(crate) async fn invoke_tool(tool: &dyn Tool, args: Value) -> Result<String> {
    tool.validate(&args)?;
    tool.execute(args).await
}

/// 判断一批调用能否并行执行。
///
/// 要求至少两个调用，且每个工具都已注册、声明为只读且耐并发
/// （部分上游接口在并发请求下会限流甚至封禁，对应工具标记
/// `thread_safe: false`）。
pub fn can_parallelize(calls: &[ToolCallRequest], registry: &ToolRegistry) -> bool {
    if calls.len() < 2 {
        return false;
    }
    calls.iter().all(|call| match registry.get(&call.name) {
        Some(tool) => {
            let spec = tool.spec();
            spec.read_only && spec.thread_safe
        }
        None => false,
    })
}

/// 并行执行一批工具调用，返回与入参同序的结果列表。
///
/// 单个调用直接内联执行；多个调用经 `max_workers` 限流并发，
/// 整批超过 `timeout` 后放弃未完成的任务并标记为超时。
/// 永远不返回 `Err`：所有失败都体现在对应的 [`ToolOutcome`] 上。
pub async fn execute_tools_parallel(
    calls: &[ToolCallRequest],
    registry: &ToolRegistry,
    max_workers: usize,
    timeout: Duration,
) -> Vec<ToolOutcome> {
    if calls.is_empty() {
        return Vec::new();
    }

    // 单个调用不值得开并发
    if calls.len() == 1 {
        let call = &calls[0];
        let outcome = match registry.get(&call.name) {
            None => ToolOutcome::failed(format!("未找到工具: {}", call.name)),
            Some(tool) => match invoke_tool(tool.as_ref(), call.arguments.clone()).await {
                Ok(result) => ToolOutcome::ok(result),
                Err(e) => ToolOutcome::failed(e.to_string()),
            },
        };
        return vec![outcome];
    }

    // 先解析出全部工具，spawn 之后不再依赖注册表的生命周期
    let resolved: Vec<Option<Arc<dyn Tool>>> =
        calls.iter().map(|call| registry.get(&call.name)).collect();

    let mut outcomes: Vec<Option<ToolOutcome>> = vec![None; calls.len()];
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks: JoinSet<(usize, ToolOutcome)> = JoinSet::new();

    for (idx, (call, tool)) in calls.iter().zip(resolved).enumerate() {
        let Some(tool) = tool else {
            outcomes[idx] = Some(ToolOutcome::failed(format!("未找到工具: {}", call.name)));
            continue;
        };
        let name = call.name.clone();
        let args = call.arguments.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = match invoke_tool(tool.as_ref(), args).await {
                Ok(result) => ToolOutcome::ok(result),
                Err(e) => {
                    error!(tool = %name, error = %e, "并行工具执行失败");
                    ToolOutcome::failed(e.to_string())
                }
            };
            (idx, outcome)
        });
    }

    let deadline = Instant::now() + timeout;
    while !tasks.is_empty() {
        match timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((idx, outcome)))) => outcomes[idx] = Some(outcome),
            Ok(Some(Err(e))) => {
                // 任务 panic 等 join 失败，对应槽位走末尾的兜底标记
                error!(error = %e, "并行工具任务异常退出");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "并行工具执行超时");
                for slot in outcomes.iter_mut() {
                    if slot.is_none() {
                        *slot =
                            Some(ToolOutcome::failed(format!("执行超时 ({}s)", timeout.as_secs())));
                    }
                }
                // 超时任务留在后台自生自灭，不再等待
                tasks.detach_all();
                break;
            }
        }
    }

    outcomes
        .into_iter()
        .map(|o| o.unwrap_or_else(|| ToolOutcome::failed("未知错误".to_string())))
        .collect()
}
