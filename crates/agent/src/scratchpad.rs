//! 单次研究会话的工具调用台账。
//!
//! 记录每次调用的入参与结果，用于：
//! - 软限流（单工具次数上限、相同参数去重）
//! - 无进展循环检测（最近窗口内失败密度）
//! - 会话结束后持久化为 JSONL（见 finsage-storage）

use serde_json::Value;

use finsage_core::ToolCallRecord;

#[derive(Debug)]
pub struct Scratchpad {
    query: String,
    calls: Vec<ToolCallRecord>,
    max_calls_per_tool: usize,
}

impl Scratchpad {
    pub fn new(query: &str, max_calls_per_tool: usize) -> Self {
        Self {
            query: query.to_string(),
            calls: Vec::new(),
            max_calls_per_tool,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.calls
    }

    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn add_success(&mut self, tool_name: &str, args: Value, result: String) {
        self.calls.push(ToolCallRecord::ok(tool_name, args, result));
    }

    pub fn add_failure(&mut self, tool_name: &str, args: Value, error: String) {
        self.calls.push(ToolCallRecord::failed(tool_name, args, error));
    }

    pub fn tool_call_count(&self, tool_name: &str) -> usize {
        self.calls.iter().filter(|c| c.tool_name == tool_name).count()
    }

    /// 软限流检查，拒绝时返回给模型看的警告文案。
    ///
    /// 相同参数去重只对非空参数生效：无参工具（如宏观数据）允许
    /// 重复调用，仅受次数上限约束。
    pub fn can_call_tool(&self, tool_name: &str, args: &Value) -> Result<(), String> {
        if self.tool_call_count(tool_name) >= self.max_calls_per_tool {
            return Err(format!(
                "已达到工具 {} 的调用上限 ({} 次)",
                tool_name, self.max_calls_per_tool
            ));
        }

        let has_args = args.as_object().is_some_and(|o| !o.is_empty());
        if has_args {
            for call in &self.calls {
                if call.tool_name == tool_name && &call.args == args {
                    return Err(format!("工具 {} 已使用相同参数调用过", tool_name));
                }
            }
        }

        Ok(())
    }

    /// 最近 `window` 次调用中的失败次数。
    ///
    /// 失败以记录上的显式错误标记为准，结果为空白也算失败；
    /// 不对结果文本做关键词嗅探，带提示语的正常返回不计入。
    pub fn recent_failures_count(&self, window: usize) -> usize {
        let start = self.calls.len().saturating_sub(window);
        self.calls[start..]
            .iter()
            .filter(|c| c.error.is_some() || c.result.trim().is_empty())
            .count()
    }

    /// 疑似无进展循环：最近 `window` 次调用中至少 `failure_threshold` 次失败。
    pub fn is_loop_no_progress(&self, window: usize, failure_threshold: usize) -> bool {
        if self.calls.len() < failure_threshold {
            return false;
        }
        self.recent_failures_count(window) >= failure_threshold
    }

    /// 本次会话的调用统计摘要。
    pub fn summary(&self) -> String {
        if self.calls.is_empty() {
            return "尚未调用任何工具".to_string();
        }

        let mut parts = vec![
            format!("原始查询: {}", self.query),
            format!("工具调用次数: {}", self.calls.len()),
            String::new(),
            "工具使用统计:".to_string(),
        ];

        // 按首次出现顺序统计
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for call in &self.calls {
            match counts.iter_mut().find(|(name, _)| *name == call.tool_name) {
                Some((_, n)) => *n += 1,
                None => counts.push((call.tool_name.as_str(), 1)),
            }
        }
        for (tool, count) in counts {
            parts.push(format!("  - {}: {} 次", tool, count));
        }

        parts.join("\n")
    }
}
