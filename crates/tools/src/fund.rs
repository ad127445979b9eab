//! ETF 基金工具。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{normalize_stock_code, validate_date, ListedQuote, MarketData};
use crate::stock::render_kline_table;
use crate::{
    fmt_amount, fmt_opt, fmt_pct, format_table, optional_str, require_str, safe_truncate, Tool,
    ToolSpec,
};

fn render_etf_table(rows: &[&ListedQuote]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|q| {
            vec![
                q.code.clone(),
                q.name.clone(),
                fmt_opt(q.price),
                fmt_pct(q.change_percent),
                fmt_amount(q.amount),
            ]
        })
        .collect();
    format_table(&["代码", "名称", "最新价", "涨跌幅", "成交额"], &table, 20)
}

pub struct EtfRealtimeTool {
    market: Arc<MarketData>,
}

impl EtfRealtimeTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for EtfRealtimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_etf_realtime",
            description: "获取ETF实时行情，可按代码筛选，留空返回成交活跃的ETF列表",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "ETF代码，如 \"510300\"，留空则返回全部"}
                }
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let listed = self.market.etf_list().await;
        if listed.is_empty() {
            return Err(Error::Tool("暂无ETF数据".to_string()));
        }
        let symbol = optional_str(&params, "symbol");
        let rows: Vec<&ListedQuote> = if symbol.is_empty() {
            listed.iter().collect()
        } else {
            let filtered: Vec<&ListedQuote> =
                listed.iter().filter(|q| q.code.contains(symbol)).collect();
            if filtered.is_empty() {
                return Err(Error::NotFound(format!("未找到ETF代码 {}", symbol)));
            }
            filtered
        };
        Ok(format!("ETF实时行情:\n\n{}", render_etf_table(&rows)))
    }
}

pub struct EtfHistoryTool {
    market: Arc<MarketData>,
}

impl EtfHistoryTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for EtfHistoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_etf_history",
            description: "获取ETF历史K线行情（前复权日线）",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "ETF代码，如 \"510300\""},
                    "start_date": {"type": "string", "description": "开始日期，格式 YYYYMMDD"},
                    "end_date": {"type": "string", "description": "结束日期，格式 YYYYMMDD"}
                },
                "required": ["symbol"]
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "symbol")?;
        for key in ["start_date", "end_date"] {
            let date = optional_str(params, key).replace('-', "");
            if !date.is_empty() {
                validate_date(&date)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let code = normalize_stock_code(require_str(&params, "symbol")?);
        let start_date = optional_str(&params, "start_date").replace('-', "");
        let end_date = optional_str(&params, "end_date").replace('-', "");

        let series = self
            .market
            .stock_kline(&code, "daily", "qfq", &start_date, &end_date)
            .await
            .map_err(|e| {
                Error::Tool(format!(
                    "获取ETF历史数据失败: {}",
                    safe_truncate(&e.to_string(), 200)
                ))
            })?;
        if series.rows.is_empty() {
            return Err(Error::NotFound(format!("未找到ETF {} 的历史数据", code)));
        }
        Ok(format!(
            "ETF {} 历史行情:\n\n{}",
            code,
            render_kline_table(&series.rows)
        ))
    }
}
