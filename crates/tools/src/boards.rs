//! 行业与概念板块工具。
//!
//! 板块列表与成分股接口在盘后/弱网下容易超时或返回空，
//! 这里对成分股查询加整体超时保护，失败文案给出可执行的替代建议。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::market::{BoardRow, ConstituentRow, MarketData};
use crate::{fmt_opt, fmt_pct, format_table, optional_str, safe_truncate, Tool, ToolSpec};

/// 概念成分股查询的整体超时。
const CONCEPT_STOCKS_TOTAL_TIMEOUT: Duration = Duration::from_secs(8);

/// 常见别名，东方财富板块名称多为「XX行业」。
const INDUSTRY_ALIASES: [(&str, &str); 4] = [
    ("白酒", "酿酒"),
    ("锂电", "能源金属"),
    ("光伏", "光伏设备"),
    ("芯片", "半导体"),
];

const AI_CONCEPT_ALIASES: [&str; 4] = ["人工智能", "ChatGPT概念", "AI芯片", "AIGC概念"];

fn boards_unavailable(kind: &str) -> Error {
    Error::Tool(format!(
        "❌ 无法获取{}数据\n\n\
         可能原因：\n\
         1. 当前时段非交易时间\n\
         2. 数据源接口临时不可用\n\
         3. 网络连接问题\n\n\
         💡 建议：\n\
         - 改为查询具体股票\n\
         - 稍后再试",
        kind
    ))
}

fn render_board_table(rows: &[BoardRow], max_rows: usize) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|b| {
            vec![
                b.code.clone(),
                b.name.clone(),
                fmt_opt(b.price),
                fmt_pct(b.change_percent),
                b.leader.clone(),
            ]
        })
        .collect();
    format_table(
        &["板块代码", "板块名称", "最新价", "涨跌幅", "领涨股票"],
        &table,
        max_rows,
    )
}

fn render_constituent_table(rows: &[ConstituentRow], max_rows: usize) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|c| {
            vec![
                c.code.clone(),
                c.name.clone(),
                fmt_opt(c.price),
                fmt_pct(c.change_percent),
                fmt_opt(c.change),
                crate::fmt_amount(c.amount),
            ]
        })
        .collect();
    format_table(
        &["代码", "名称", "最新价", "涨跌幅", "涨跌额", "成交额"],
        &table,
        max_rows,
    )
}

/// 行业名匹配：别名替换后先精确、再包含，最后退回原关键词包含。
pub(crate) fn match_board<'a>(boards: &'a [BoardRow], name: &str) -> Option<&'a BoardRow> {
    let search = INDUSTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name);
    let search_lower = search.to_lowercase();
    boards
        .iter()
        .find(|b| b.name.trim().to_lowercase() == search_lower)
        .or_else(|| boards.iter().find(|b| b.name.contains(search)))
        .or_else(|| boards.iter().find(|b| b.name.contains(name)))
}

/// 成分股平均估值；剔除非正与离谱值（PE < 1e5，PB < 1e4）。
pub(crate) fn average_valuation(rows: &[ConstituentRow]) -> (Option<f64>, Option<f64>) {
    let pe_vals: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.pe)
        .filter(|v| *v > 0.0 && *v < 1e5)
        .collect();
    let pb_vals: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.pb)
        .filter(|v| *v > 0.0 && *v < 1e4)
        .collect();
    let avg = |vals: &[f64]| {
        if vals.is_empty() {
            None
        } else {
            Some(vals.iter().sum::<f64>() / vals.len() as f64)
        }
    };
    (avg(&pe_vals), avg(&pb_vals))
}

fn is_board_code(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.len() > 2 && upper.starts_with("BK") && upper[2..].chars().all(|c| c.is_ascii_digit())
}

/// AI 相关关键词扩展到常见概念板块名。
pub(crate) fn concept_candidates(name: &str) -> Vec<String> {
    let mut out = vec![name.to_string()];
    let upper = name.to_uppercase();
    if upper.contains("AI") || name.contains("人工") {
        for alias in AI_CONCEPT_ALIASES {
            if alias != name {
                out.push(alias.to_string());
            }
        }
    }
    out
}

// ─── 工具 ───

pub struct IndustryBoardsTool {
    market: Arc<MarketData>,
}

impl IndustryBoardsTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for IndustryBoardsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_industry_boards",
            description: "获取行业板块列表及行情，包括涨跌幅和领涨股",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: false,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        let boards = self.market.board_list(false).await;
        if boards.is_empty() {
            return Err(boards_unavailable("行业板块"));
        }
        Ok(format!("行业板块排行:\n\n{}", render_board_table(&boards, 20)))
    }
}

pub struct ConceptBoardsTool {
    market: Arc<MarketData>,
}

impl ConceptBoardsTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for ConceptBoardsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_concept_boards",
            description: "获取概念板块列表及行情，包括涨跌幅和领涨股",
            parameters: json!({"type": "object", "properties": {}}),
            read_only: true,
            thread_safe: false,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        let boards = self.market.board_list(true).await;
        if boards.is_empty() {
            return Err(boards_unavailable("概念板块"));
        }
        // 返回较多条以便「AI概念」等推荐场景能命中相关板块
        Ok(format!("概念板块排行:\n\n{}", render_board_table(&boards, 50)))
    }
}

pub struct IndustryBoardDetailTool {
    market: Arc<MarketData>,
}

impl IndustryBoardDetailTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for IndustryBoardDetailTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_industry_board_detail",
            description: "获取指定行业板块的整体涨跌幅、领涨股及行业平均估值（PE、PB）",
            parameters: json!({
                "type": "object",
                "properties": {
                    "industry_name": {"type": "string", "description": "行业名称或关键词，如 \"白酒\"、\"酿酒\"、\"食品饮料\"、\"新能源\""}
                },
                "required": ["industry_name"]
            }),
            read_only: true,
            thread_safe: false,
        }
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let name = optional_str(&params, "industry_name");
        if name.is_empty() {
            return Ok(
                "请输入行业名称或关键词，例如：白酒、酿酒、食品饮料、新能源、电池。\
                 可先调用 get_industry_boards 查看全部行业板块名称。"
                    .to_string(),
            );
        }
        let boards = self.market.board_list(false).await;
        if boards.is_empty() {
            return Err(Error::Tool(
                "暂时无法获取行业板块列表（数据源连接异常或限流）。\n\n\
                 💡 建议：\n\
                 - 先查询具体股票，如 贵州茅台(600519)、五粮液 等了解个股行情\n\
                 - 稍后重试 get_industry_boards 或 get_industry_board_detail\n\
                 - 白酒相关在列表中多为「酿酒行业」，可恢复后搜「酿酒」"
                    .to_string(),
            ));
        }
        let board = match_board(&boards, name).ok_or_else(|| {
            Error::NotFound(format!(
                "未找到与「{}」匹配的行业板块。\n\n\
                 请先调用 get_industry_boards 查看完整行业列表，或使用更通用的关键词（如 酿酒、食品饮料、电池）。",
                name
            ))
        })?;

        let constituents = self
            .market
            .board_constituents(&board.code)
            .await
            .unwrap_or_default();
        let (avg_pe, avg_pb) = average_valuation(&constituents);

        let mut lines = vec![
            format!("行业板块：{}", board.name),
            format!("板块整体涨跌幅：{}", fmt_pct(board.change_percent)),
            format!("板块最新价：{}", fmt_opt(board.price)),
        ];
        match board.leader_change {
            Some(chg) => lines.push(format!("领涨股票：{} {:.2}%", board.leader, chg)),
            None => lines.push(format!("领涨股票：{}", board.leader)),
        }
        lines.push(format!("成分股数量：{}", constituents.len()));
        if let Some(pe) = avg_pe {
            lines.push(format!("行业平均市盈率（PE）：{}", fmt_opt(Some(pe))));
        }
        if let Some(pb) = avg_pb {
            lines.push(format!("行业平均市净率（PB）：{}", fmt_opt(Some(pb))));
        }
        if avg_pe.is_none() && avg_pb.is_none() {
            if constituents.is_empty() {
                lines.push(
                    "（行业平均估值因网络波动暂时无法获取，请稍后再试或仅参考上方板块涨跌幅与领涨股）"
                        .to_string(),
                );
            } else {
                lines.push("（成分股 PE/PB 暂未统计，部分标的可能无估值数据）".to_string());
            }
        }
        Ok(lines.join("\n"))
    }
}

pub struct ConceptStocksTool {
    market: Arc<MarketData>,
}

impl ConceptStocksTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }

    async fn lookup(&self, concept_name: &str) -> Result<String> {
        // 直接给板块代码（BK 开头）时跳过名称解析
        if is_board_code(concept_name) {
            let code = concept_name.to_uppercase();
            let rows = self.market.board_constituents(&code).await?;
            if !rows.is_empty() {
                return Ok(format!(
                    "概念「{}」成分股（按涨跌幅）:\n\n{}",
                    code,
                    render_constituent_table(&rows, 30)
                ));
            }
        }

        let boards = self.market.board_list(true).await;
        for candidate in concept_candidates(concept_name) {
            let Some(board) = match_board(&boards, &candidate) else {
                continue;
            };
            match self.market.board_constituents(&board.code).await {
                Ok(rows) if !rows.is_empty() => {
                    return Ok(format!(
                        "概念「{}」成分股（按涨跌幅）:\n\n{}",
                        board.name,
                        render_constituent_table(&rows, 30)
                    ));
                }
                _ => continue,
            }
        }
        Err(Error::NotFound(format!(
            "未找到概念「{}」。请先调用 get_concept_boards 查看准确板块名称（如：人工智能、ChatGPT概念）后再试。",
            concept_name
        )))
    }
}

#[async_trait]
impl Tool for ConceptStocksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_concept_stocks",
            description: "获取指定概念板块的成分股列表及行情，可先调用 get_concept_boards 查看板块名称",
            parameters: json!({
                "type": "object",
                "properties": {
                    "concept_name": {"type": "string", "description": "概念板块名称或代码，如 \"人工智能\"、\"ChatGPT概念\"、\"BK0800\""}
                },
                "required": ["concept_name"]
            }),
            read_only: true,
            thread_safe: false,
        }
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let name = optional_str(&params, "concept_name");
        if name.is_empty() {
            return Ok(
                "请传入概念板块名称，如：人工智能、ChatGPT概念。可先调用 get_concept_boards 查看可选板块。"
                    .to_string(),
            );
        }
        match tokio::time::timeout(CONCEPT_STOCKS_TOTAL_TIMEOUT, self.lookup(name)).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(Error::NotFound(msg))) => Err(Error::NotFound(msg)),
            Ok(Err(e)) => Err(Error::Tool(format!(
                "获取概念成分股失败: {}",
                safe_truncate(&e.to_string(), 200)
            ))),
            Err(_) => Err(Error::Timeout(
                "获取概念成分股超时，数据源响应过慢或网络不稳定。\n\n\
                 建议：\n\
                 - 先调用 get_concept_boards 查看板块列表，确认板块代码(BK 开头) 后再查；\n\
                 - 或稍后重试，必要时缩小概念范围，例如改用具体细分概念名称。"
                    .to_string(),
            )),
        }
    }
}
