//! 港股工具：搜索与实时行情。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{normalize_hk_code, ListedQuote, MarketData, QuoteSnapshot};
use crate::{fmt_amount, fmt_opt, fmt_pct, format_table, optional_str, require_str, Tool, ToolSpec};

/// 港股全量列表拉取较慢，搜索整体限时。
const HK_SEARCH_TIMEOUT: Duration = Duration::from_secs(6);

const HK_CODE_HINT: &str =
    "提示: 请使用 5 位数港股代码查询，例如:\n  - 腾讯控股: 00700\n  - 阿里巴巴: 09988\n  - 小米集团: 01810";

/// 在港股列表中按代码/名称做包含匹配，内部接口：
/// 未命中与超时都以 Err 返回，便于 search_stock_any 级联到下一市场。
pub(crate) async fn search_hk(market: &MarketData, keyword: &str) -> Result<String> {
    let listed = match tokio::time::timeout(HK_SEARCH_TIMEOUT, market.hk_list()).await {
        Ok(listed) => listed,
        Err(_) => {
            return Err(Error::Timeout(
                "搜索港股超时，数据源响应过慢或网络不稳定。\n\n\
                 建议：\n\
                 - 直接使用 5 位数港股代码查询，例如 00700(腾讯)、09988(阿里)、01810(小米)；\n\
                 - 或稍后重试。"
                    .to_string(),
            ));
        }
    };
    if listed.is_empty() {
        return Err(Error::Tool(format!(
            "无法获取港股列表数据（数据源暂时不可用）。\n\n{}",
            HK_CODE_HINT
        )));
    }

    let kw = keyword.trim();
    let kw_lower = kw.to_lowercase();
    let hits: Vec<&ListedQuote> = listed
        .iter()
        .filter(|q| q.code.contains(kw) || q.name.to_lowercase().contains(&kw_lower))
        .collect();
    if hits.is_empty() {
        return Err(Error::NotFound(format!(
            "未找到与 '{}' 相关的港股。\n\n{}",
            kw, HK_CODE_HINT
        )));
    }

    let rows: Vec<Vec<String>> = hits
        .iter()
        .map(|q| {
            vec![
                q.code.clone(),
                q.name.clone(),
                fmt_opt(q.price),
                fmt_pct(q.change_percent),
            ]
        })
        .collect();
    Ok(format!(
        "搜索 '{}' 的港股结果（前20个）:\n\n{}",
        kw,
        format_table(&["代码", "名称", "最新价", "涨跌幅"], &rows, 20)
    ))
}

fn render_hk_quote(code: &str, q: &QuoteSnapshot) -> String {
    let lines = vec![
        format!("港股 {} 实时行情:", code),
        format!("  股票代码: {}", if q.code.is_empty() { code } else { &q.code }),
        format!("  股票名称: {}", q.name),
        format!("  最新价: {}", fmt_opt(q.price)),
        format!("  涨跌额: {}", fmt_opt(q.change)),
        format!("  涨跌幅(%): {}", fmt_pct(q.change_percent)),
        format!("  今开: {}", fmt_opt(q.open)),
        format!("  最高: {}", fmt_opt(q.high)),
        format!("  最低: {}", fmt_opt(q.low)),
        format!("  昨收: {}", fmt_opt(q.prev_close)),
        format!("  成交量: {}", fmt_amount(q.volume)),
        format!("  成交额: {}", fmt_amount(q.amount)),
    ];
    lines.join("\n")
}

pub struct SearchStockHkTool {
    market: Arc<MarketData>,
}

impl SearchStockHkTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for SearchStockHkTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_stock_hk",
            description: "按名称或代码关键词搜索港股，返回匹配的代码与名称列表",
            parameters: json!({
                "type": "object",
                "properties": {
                    "keyword": {"type": "string", "description": "搜索关键词，如 \"腾讯\"、\"00700\""}
                },
                "required": ["keyword"]
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let keyword = optional_str(&params, "keyword");
        if keyword.is_empty() {
            return Ok(
                "请输入港股搜索关键词，例如公司名称的一部分或 5 位代码，如 00700、腾讯 等。"
                    .to_string(),
            );
        }
        match search_hk(&self.market, keyword).await {
            Ok(msg) => Ok(msg),
            // 未命中与超时文案对模型仍有指导价值，作为正常结果返回
            Err(Error::NotFound(msg)) | Err(Error::Timeout(msg)) => Ok(msg),
            Err(e) => Err(e),
        }
    }
}

pub struct StockHkRealtimeTool {
    market: Arc<MarketData>,
}

impl StockHkRealtimeTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockHkRealtimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_stock_hk_realtime",
            description: "获取港股实时行情，包括最新价、涨跌幅、成交量等",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "5位港股代码，如 \"00700\"（腾讯）、\"09988\"（阿里）"}
                },
                "required": ["symbol"]
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        require_str(params, "symbol").map(|_| ())
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let code = normalize_hk_code(require_str(&params, "symbol")?);
        let quote = self.market.hk_quote(&code).await;
        if !quote.name.is_empty() {
            return Ok(render_hk_quote(&code, &quote));
        }
        // 行情源都失败时退回列表快照，至少给出最新价与涨跌幅
        let listed = self.market.hk_list().await;
        if let Some(item) = listed.iter().find(|q| q.code == code) {
            let snapshot = QuoteSnapshot {
                code: item.code.clone(),
                name: item.name.clone(),
                price: item.price,
                change_percent: item.change_percent,
                amount: item.amount,
                ..QuoteSnapshot::default()
            };
            return Ok(render_hk_quote(&code, &snapshot));
        }
        Err(Error::NotFound(format!(
            "未找到港股代码 {} 的数据\n\n提示：请使用5位数港股代码，如 00700(腾讯)、09988(阿里)",
            code
        )))
    }
}
