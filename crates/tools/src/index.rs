//! 指数工具：主要指数实时快照与历史 K 线。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{validate_date, MarketData, QuoteSnapshot};
use crate::stock::render_kline_table;
use crate::{fmt_amount, fmt_opt, fmt_pct, optional_str, safe_truncate, Tool, ToolSpec};

/// 实时快照默认展示的三大指数。
const MAJOR_INDICES: [(&str, &str); 3] =
    [("000001", "上证指数"), ("399001", "深证成指"), ("399006", "创业板指")];

pub(crate) fn index_name(symbol: &str) -> String {
    match symbol {
        "000001" => "上证指数".to_string(),
        "399001" => "深证成指".to_string(),
        "399006" => "创业板指".to_string(),
        "000688" => "科创50".to_string(),
        "000300" => "沪深300".to_string(),
        "000905" => "中证500".to_string(),
        "000852" => "中证1000".to_string(),
        other => format!("指数{}", other),
    }
}

fn index_fallback_help() -> String {
    let mut out = String::from("❌ 无法获取指数行情数据\n\n");
    out.push_str("📊 主要指数代码参考：\n");
    out.push_str("  • 上证指数: 000001\n");
    out.push_str("  • 深证成指: 399001\n");
    out.push_str("  • 创业板指: 399006\n");
    out.push_str("  • 科创50: 000688\n");
    out.push_str("  • 沪深300: 000300\n\n");
    out.push_str("💡 建议：使用 get_index_history 查询具体指数\n");
    out.push_str("⏰ 交易时间：工作日 9:30-15:00");
    out
}

pub(crate) fn render_index_block(code: &str, name: &str, q: &QuoteSnapshot) -> String {
    format!(
        "【{}】({})\n  最新: {}\n  涨跌幅: {}\n  最高/最低: {} / {}\n  成交量: {}\n",
        name,
        code,
        fmt_opt(q.price),
        fmt_pct(q.change_percent),
        fmt_opt(q.high),
        fmt_opt(q.low),
        fmt_amount(q.volume),
    )
}

pub struct IndexRealtimeTool {
    market: Arc<MarketData>,
}

impl IndexRealtimeTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }

    /// 实时接口全挂时退回上证指数日线的最新一根。
    async fn last_resort_sh(&self) -> Option<String> {
        let start = (Local::now() - ChronoDuration::days(15)).format("%Y%m%d").to_string();
        let series = self
            .market
            .index_kline("000001", "daily", &start, "")
            .await
            .ok()?;
        let latest = series.rows.last()?;
        let mut out = String::from("主要指数行情（上证指数，最新交易日）:\n\n");
        out.push_str("【上证指数】(000001)\n");
        out.push_str(&format!("  日期: {}\n", latest.date));
        out.push_str(&format!("  收盘: {}\n", fmt_opt(latest.close)));
        out.push_str(&format!("  涨跌幅: {}\n", fmt_pct(latest.change_percent)));
        out.push_str(&format!(
            "  最高/最低: {} / {}\n",
            fmt_opt(latest.high),
            fmt_opt(latest.low)
        ));
        out.push_str(&format!("  成交量: {}\n\n", fmt_amount(latest.volume)));
        out.push_str("💡 仅获取到上证指数，其他指数请用 get_index_history 查询\n");
        out.push_str("⏰ 交易时间: 工作日 9:30-15:00");
        Some(out)
    }
}

#[async_trait]
impl Tool for IndexRealtimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_index_realtime",
            description: "获取主要指数（上证指数、深证成指、创业板指）实时行情",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: false,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        // 串行逐只拉取，单只失败不影响其他
        let mut blocks = Vec::new();
        for (code, name) in MAJOR_INDICES {
            match self.market.index_quote(code).await {
                Ok(q) if q.price.is_some() => blocks.push(render_index_block(code, name, &q)),
                _ => continue,
            }
        }
        if !blocks.is_empty() {
            let mut out = String::from("主要指数行情:\n\n");
            out.push_str(&blocks.join("\n"));
            out.push_str("\n⏰ 交易时间: 工作日 9:30-15:00");
            return Ok(out);
        }
        if let Some(out) = self.last_resort_sh().await {
            return Ok(out);
        }
        Err(Error::Tool(index_fallback_help()))
    }
}

pub struct IndexHistoryTool {
    market: Arc<MarketData>,
}

impl IndexHistoryTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for IndexHistoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_index_history",
            description: "获取指数历史K线行情",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "指数代码，如 \"000001\"(上证指数)、\"399001\"(深证成指)、\"399006\"(创业板指)，默认 000001"},
                    "start_date": {"type": "string", "description": "开始日期，格式 YYYYMMDD"},
                    "end_date": {"type": "string", "description": "结束日期，格式 YYYYMMDD"},
                    "period": {"type": "string", "enum": ["daily", "weekly", "monthly"], "description": "K线周期，默认 daily"}
                }
            }),
            read_only: true,
            thread_safe: false,
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        for key in ["start_date", "end_date"] {
            let date = optional_str(params, key).replace('-', "");
            if !date.is_empty() {
                validate_date(&date)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let symbol = {
            let raw = optional_str(&params, "symbol");
            if raw.is_empty() {
                "000001".to_string()
            } else {
                raw.to_string()
            }
        };
        let period = {
            let raw = optional_str(&params, "period");
            if raw.is_empty() {
                "daily".to_string()
            } else {
                raw.to_string()
            }
        };
        let start_date = optional_str(&params, "start_date").replace('-', "");
        let end_date = optional_str(&params, "end_date").replace('-', "");

        let series = self
            .market
            .index_kline(&symbol, &period, &start_date, &end_date)
            .await
            .map_err(|e| {
                Error::Tool(format!(
                    "获取指数历史数据失败: {}",
                    safe_truncate(&e.to_string(), 200)
                ))
            })?;
        if series.rows.is_empty() {
            return Err(Error::NotFound(format!("未找到指数 {} 的历史数据", symbol)));
        }
        Ok(format!(
            "指数 {} 历史行情 ({}):\n\n{}",
            symbol,
            period,
            render_kline_table(&series.rows)
        ))
    }
}
