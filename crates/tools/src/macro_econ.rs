//! 宏观经济工具：CPI、GDP、货币供应量（东方财富数据中心）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{MacroReport, MarketData};
use crate::{fmt_opt, format_table, safe_truncate, Tool, ToolSpec};

fn field(row: &Value, key: &str) -> String {
    fmt_opt(row[key].as_f64())
}

fn time_label(row: &Value) -> String {
    row["TIME"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| row["REPORT_DATE"].as_str().unwrap_or("—").to_string())
}

pub(crate) fn render_cpi_table(rows: &[Value]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                time_label(r),
                field(r, "NATIONAL_SAME"),
                field(r, "NATIONAL_SEQUENTIAL"),
                field(r, "NATIONAL_ACCUMULATE"),
            ]
        })
        .collect();
    format_table(&["月份", "全国同比(%)", "全国环比(%)", "全国累计(%)"], &table, 30)
}

pub(crate) fn render_gdp_table(rows: &[Value]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                time_label(r),
                field(r, "DOMESTICL_PRODUCT_BASE"),
                field(r, "SUM_SAME"),
            ]
        })
        .collect();
    format_table(&["季度", "国内生产总值(亿元)", "同比增长(%)"], &table, 30)
}

pub(crate) fn render_money_table(rows: &[Value]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                time_label(r),
                field(r, "BASIC_CURRENCY"),
                field(r, "BASIC_CURRENCY_SAME"),
                field(r, "CURRENCY"),
                field(r, "CURRENCY_SAME"),
                field(r, "FREE_CASH"),
                field(r, "FREE_CASH_SAME"),
            ]
        })
        .collect();
    format_table(
        &["月份", "M2(亿元)", "M2同比(%)", "M1(亿元)", "M1同比(%)", "M0(亿元)", "M0同比(%)"],
        &table,
        30,
    )
}

/// 三个宏观工具的公共执行逻辑。
async fn run_macro(
    market: &MarketData,
    report: MacroReport,
    title: &str,
    subject: &str,
    render: fn(&[Value]) -> String,
) -> Result<String> {
    let rows = market.macro_rows(report).await.map_err(|e| {
        Error::Tool(format!(
            "获取{}数据失败: {}",
            subject,
            safe_truncate(&e.to_string(), 200)
        ))
    })?;
    if rows.is_empty() {
        return Err(Error::NotFound(format!("暂无{}数据", subject)));
    }
    Ok(format!("{}:\n\n{}", title, render(&rows)))
}

pub struct MacroCpiTool {
    market: Arc<MarketData>,
}

impl MacroCpiTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for MacroCpiTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_macro_cpi",
            description: "获取中国CPI(居民消费价格指数)历史数据，包括同比和环比变化",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        run_macro(&self.market, MacroReport::Cpi, "中国CPI数据", "CPI", render_cpi_table).await
    }
}

pub struct MacroGdpTool {
    market: Arc<MarketData>,
}

impl MacroGdpTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for MacroGdpTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_macro_gdp",
            description: "获取中国季度GDP数据，包括GDP总量和同比增速",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        run_macro(&self.market, MacroReport::Gdp, "中国GDP数据", "GDP", render_gdp_table).await
    }
}

pub struct MoneySupplyTool {
    market: Arc<MarketData>,
}

impl MoneySupplyTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for MoneySupplyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_money_supply",
            description: "获取中国货币供应量数据(M0、M1、M2)及同比增速",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        run_macro(
            &self.market,
            MacroReport::MoneySupply,
            "中国货币供应量数据",
            "货币供应",
            render_money_table,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpi_table_from_datacenter_rows() {
        let rows = vec![
            json!({"TIME": "2024年12月份", "NATIONAL_SAME": 0.1, "NATIONAL_SEQUENTIAL": 0.0, "NATIONAL_ACCUMULATE": 0.2}),
            json!({"TIME": "2024年11月份", "NATIONAL_SAME": 0.2, "NATIONAL_SEQUENTIAL": -0.6, "NATIONAL_ACCUMULATE": 0.3}),
        ];
        let out = render_cpi_table(&rows);
        assert!(out.contains("2024年12月份"));
        assert!(out.contains("全国同比(%)"));
        assert!(out.contains("-0.60"));
    }

    #[test]
    fn gdp_table_from_datacenter_rows() {
        let rows = vec![json!({
            "TIME": "2024年1-4季度",
            "DOMESTICL_PRODUCT_BASE": 1349084.0,
            "SUM_SAME": 4.8
        })];
        let out = render_gdp_table(&rows);
        assert!(out.contains("2024年1-4季度"));
        assert!(out.contains("1349084"));
        assert!(out.contains("4.80"));
    }

    #[test]
    fn money_table_handles_missing_fields() {
        let rows = vec![json!({"TIME": "2025年1月份", "BASIC_CURRENCY": 3185671.0})];
        let out = render_money_table(&rows);
        assert!(out.contains("3185671"));
        assert!(out.contains("N/A"));
    }

    #[test]
    fn time_label_falls_back_to_report_date() {
        let row = json!({"REPORT_DATE": "2024-12-01 00:00:00"});
        assert_eq!(time_label(&row), "2024-12-01 00:00:00");
        assert_eq!(time_label(&json!({})), "—");
    }
}
