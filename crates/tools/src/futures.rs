//! 期货工具：主力合约实时行情（新浪源）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{FuturesQuote, MarketData};
use crate::{fmt_amount, fmt_opt, format_table, optional_str, safe_truncate, Tool, ToolSpec};

/// 留空查询时返回的主要品种（新浪主力连续合约代码）。
const MAJOR_FUTURES: [(&str, &str); 10] = [
    ("RB0", "螺纹钢主力"),
    ("HC0", "热卷主力"),
    ("I0", "铁矿石主力"),
    ("CU0", "沪铜主力"),
    ("AL0", "沪铝主力"),
    ("AU0", "沪金主力"),
    ("AG0", "沪银主力"),
    ("SC0", "原油主力"),
    ("M0", "豆粕主力"),
    ("TA0", "PTA主力"),
];

fn render_futures_table(rows: &[&FuturesQuote]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|q| {
            vec![
                q.code.clone(),
                q.name.clone(),
                fmt_opt(q.price),
                fmt_opt(q.open),
                fmt_opt(q.high),
                fmt_opt(q.low),
                fmt_opt(q.prev_settle),
                fmt_amount(q.volume),
                fmt_amount(q.position),
            ]
        })
        .collect();
    format_table(
        &["代码", "名称", "最新价", "开盘", "最高", "最低", "昨结算", "成交量", "持仓量"],
        &table,
        30,
    )
}

/// 形如 CU0 / RB2501 的新浪合约代码。
fn looks_like_contract_code(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.chars().all(|c| c.is_ascii_alphanumeric())
        && symbol.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

pub struct FuturesRealtimeTool {
    market: Arc<MarketData>,
}

impl FuturesRealtimeTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for FuturesRealtimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_futures_realtime",
            description: "获取国内期货主力合约实时行情，可按品种名称或代码筛选，留空返回主要品种",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "期货品种名称或代码，如 \"螺纹钢\"、\"沪铜\"、\"RB0\"，留空则返回主要品种"}
                }
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let symbol = optional_str(&params, "symbol");
        let quotes = self.market.futures_quotes(&MAJOR_FUTURES).await.map_err(|e| {
            Error::Tool(format!(
                "获取期货行情失败: {}",
                safe_truncate(&e.to_string(), 200)
            ))
        })?;
        let quotes: Vec<FuturesQuote> =
            quotes.into_iter().filter(|q| !q.name.is_empty()).collect();
        if quotes.is_empty() && symbol.is_empty() {
            return Err(Error::Tool("暂无期货行情数据".to_string()));
        }

        if symbol.is_empty() {
            let refs: Vec<&FuturesQuote> = quotes.iter().collect();
            return Ok(format!("期货实时行情:\n\n{}", render_futures_table(&refs)));
        }

        let upper = symbol.to_uppercase();
        let hits: Vec<&FuturesQuote> = quotes
            .iter()
            .filter(|q| q.code.to_uppercase().contains(&upper) || q.name.contains(symbol))
            .collect();
        if !hits.is_empty() {
            return Ok(format!("期货实时行情:\n\n{}", render_futures_table(&hits)));
        }

        // 主要品种未命中但像合约代码时直接查询，例如 NI0、RB2501
        if looks_like_contract_code(&upper) {
            let direct = self
                .market
                .futures_quotes(&[(upper.as_str(), upper.as_str())])
                .await
                .unwrap_or_default();
            let direct: Vec<&FuturesQuote> =
                direct.iter().filter(|q| !q.name.is_empty()).collect();
            if !direct.is_empty() {
                return Ok(format!("期货实时行情:\n\n{}", render_futures_table(&direct)));
            }
        }
        Err(Error::NotFound(format!("未找到期货品种 {}", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(code: &str, name: &str) -> FuturesQuote {
        FuturesQuote {
            code: code.to_string(),
            name: name.to_string(),
            price: Some(3402.0),
            open: Some(3390.0),
            high: Some(3415.0),
            low: Some(3380.0),
            prev_settle: Some(3395.0),
            volume: Some(1.2e6),
            position: Some(2.1e6),
        }
    }

    #[test]
    fn futures_table_rendering() {
        let rows = vec![quote("RB0", "螺纹钢主力")];
        let refs: Vec<&FuturesQuote> = rows.iter().collect();
        let out = render_futures_table(&refs);
        assert!(out.contains("昨结算"));
        assert!(out.contains("螺纹钢主力"));
        assert!(out.contains("120.00万"));
    }

    #[test]
    fn contract_code_detection() {
        assert!(looks_like_contract_code("RB0"));
        assert!(looks_like_contract_code("CU2502"));
        assert!(!looks_like_contract_code("螺纹钢"));
        assert!(!looks_like_contract_code("0RB"));
        assert!(!looks_like_contract_code(""));
    }

    #[test]
    fn major_futures_codes_are_sina_style() {
        for (code, name) in MAJOR_FUTURES {
            assert!(looks_like_contract_code(code), "{} 不是合约代码", code);
            assert!(name.ends_with("主力"));
        }
    }
}
