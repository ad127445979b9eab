//! 金融数据工具集。
//!
//! 每个工具实现 [`Tool`] trait，通过 [`registry::ToolRegistry`] 注册后供
//! agent 以 OpenAI function-call 格式调用。数据拉取共用 [`market::MarketData`]，
//! 多数据源降级、重试、缓存分别在 [`fetch`]、[`retry`]、[`cache`] 中。

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::Result;

pub mod boards;
pub mod cache;
pub mod fetch;
pub mod fund;
pub mod futures;
pub mod hk;
pub mod index;
pub mod macro_econ;
pub mod market;
pub mod registry;
pub mod retry;
pub mod stock;

pub use crate::cache::TtlCache;
pub use crate::fetch::{try_sources, try_sources_parallel, FetchValue, Source};
pub use crate::market::MarketData;
pub use crate::registry::ToolRegistry;
pub use crate::retry::{is_transient, with_retry, RetryPolicy};

/// 工具元数据。`read_only` 与 `thread_safe` 供并行执行器判断
/// 一批调用能否并发（部分上游接口不耐并发，标记 `thread_safe: false`）。
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
    pub read_only: bool,
    pub thread_safe: bool,
}

impl ToolSpec {
    /// OpenAI function-call 格式的 schema。
    pub fn to_openai_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// 工具统一接口。失败一律返回 `Err`，不要把错误文案藏在 `Ok` 字符串里，
/// scratchpad 依赖这一约定判断调用是否成功。
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// 参数校验，在 `execute` 之前调用。
    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<String>;
}

/// 按字符数截断，避免切在多字节字符中间。
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 将表格数据渲染为文本，超出 `max_rows` 行时附截断说明。
pub fn format_table(headers: &[&str], rows: &[Vec<String>], max_rows: usize) -> String {
    if rows.is_empty() {
        return "(无数据)".to_string();
    }
    let shown = rows.len().min(max_rows);
    let mut out = String::new();
    out.push_str(&headers.join("  "));
    for row in &rows[..shown] {
        out.push('\n');
        out.push_str(&row.join("  "));
    }
    if rows.len() > max_rows {
        out.push_str(&format!(
            "\n\n... (显示前 {} 条，共 {} 条)",
            max_rows,
            rows.len()
        ));
    }
    out
}

pub(crate) fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => {
            if (x - x.round()).abs() < f64::EPSILON && x.abs() < 1e15 {
                format!("{}", x as i64)
            } else {
                format!("{:.2}", x)
            }
        }
        None => "N/A".to_string(),
    }
}

pub(crate) fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{:.2}%", x),
        None => "N/A".to_string(),
    }
}

/// 金额人性化：超过万/亿/万亿时换算单位。
pub(crate) fn fmt_amount(v: Option<f64>) -> String {
    let x = match v {
        Some(x) => x,
        None => return "N/A".to_string(),
    };
    let abs = x.abs();
    if abs >= 1e12 {
        format!("{:.2}万亿", x / 1e12)
    } else if abs >= 1e8 {
        format!("{:.2}亿", x / 1e8)
    } else if abs >= 1e4 {
        format!("{:.2}万", x / 1e4)
    } else {
        fmt_opt(Some(x))
    }
}

/// 取必填字符串参数，缺失或空白时报参数错误。
pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params[key].as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(finsage_core::Error::InvalidParams(format!(
            "缺少参数: {}",
            key
        ))),
    }
}

/// 取可选字符串参数，缺失时返回空串。
pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> &'a str {
    params[key].as_str().map(str::trim).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate("贵州茅台600519", 4), "贵州茅台");
        assert_eq!(safe_truncate("abc", 10), "abc");
        assert_eq!(safe_truncate("", 3), "");
    }

    #[test]
    fn format_table_truncates_long_output() {
        let rows: Vec<Vec<String>> = (0..40)
            .map(|i| vec![format!("{:06}", i), format!("股票{}", i)])
            .collect();
        let out = format_table(&["代码", "名称"], &rows, 30);
        assert!(out.starts_with("代码  名称"));
        assert!(out.contains("... (显示前 30 条，共 40 条)"));
        assert!(!out.contains("000031"));
    }

    #[test]
    fn format_table_empty() {
        let out = format_table(&["代码"], &[], 30);
        assert_eq!(out, "(无数据)");
    }

    #[test]
    fn tool_spec_openai_schema_shape() {
        let spec = ToolSpec {
            name: "get_stock_realtime",
            description: "获取A股实时行情数据",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: true,
        };
        let schema = spec.to_openai_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "get_stock_realtime");
        assert!(schema["function"]["parameters"].is_object());
    }

    #[test]
    fn fmt_amount_units() {
        assert_eq!(fmt_amount(Some(2_157_900_000_000.0)), "2.16万亿");
        assert_eq!(fmt_amount(Some(509_360_000.0)), "5.09亿");
        assert_eq!(fmt_amount(Some(29_729.0)), "2.97万");
        assert_eq!(fmt_amount(Some(123.0)), "123");
        assert_eq!(fmt_amount(None), "N/A");
    }
}
