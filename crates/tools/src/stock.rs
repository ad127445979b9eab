//! A股工具：搜索、实时行情、历史K线、基本信息、财务指标、热门榜。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use finsage_core::{Error, Result};

use crate::fetch::FetchValue;
use crate::market::{normalize_stock_code, validate_date, KlineRow, MarketData, QuoteSnapshot};
use crate::{
    fmt_amount, fmt_opt, fmt_pct, format_table, optional_str, require_str, safe_truncate, Tool,
    ToolSpec,
};

const SEARCH_LIMIT: usize = 20;

// ─── 渲染 ───

pub(crate) fn render_stock_quote(q: &QuoteSnapshot) -> String {
    let name = if q.name.is_empty() { "N/A" } else { q.name.as_str() };
    let mut out = format!("股票 {} 实时行情:\n", q.code);
    out.push_str(&format!("  股票代码: {}\n", q.code));
    out.push_str(&format!("  股票简称: {}\n", name));
    out.push_str(&format!("  最新价: {}\n", fmt_opt(q.price)));
    out.push_str(&format!("  涨跌幅: {}\n", fmt_pct(q.change_percent)));
    out.push_str(&format!("  今开: {}\n", fmt_opt(q.open)));
    out.push_str(&format!("  昨收: {}\n", fmt_opt(q.prev_close)));
    out.push_str(&format!("  最高: {}\n", fmt_opt(q.high)));
    out.push_str(&format!("  最低: {}\n", fmt_opt(q.low)));
    out.push_str(&format!("  成交量: {}\n", fmt_opt(q.volume)));
    out.push_str(&format!("  成交额: {}\n", fmt_amount(q.amount)));
    out.push_str(&format!("  总市值: {}\n", fmt_amount(q.market_cap)));
    out.push_str(&format!("  流通市值: {}\n", fmt_amount(q.float_market_cap)));
    out
}

pub(crate) fn render_kline_table(rows: &[KlineRow]) -> String {
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.date.clone(),
                fmt_opt(r.open),
                fmt_opt(r.close),
                fmt_opt(r.high),
                fmt_opt(r.low),
                fmt_opt(r.volume),
                fmt_amount(r.amount),
                fmt_pct(r.change_percent),
            ]
        })
        .collect();
    format_table(
        &["日期", "开盘", "收盘", "最高", "最低", "成交量", "成交额", "涨跌幅"],
        &table,
        30,
    )
}

// ─── A股搜索（search_stock_any 也复用） ───

/// 代码或名称包含关键词即命中；`Err(NotFound)` 表示无匹配，供跨市场搜索继续。
pub(crate) async fn search_a(market: &MarketData, keyword: &str) -> Result<String> {
    let list = market.stock_list().await;
    if list.is_empty() {
        return Err(Error::Tool(
            "暂时无法获取股票列表/行情数据，请稍后重试。\n\n\
             也可直接使用 6 位代码查询，如: 000001、600519、300750"
                .to_string(),
        ));
    }
    let kw_clean: String = keyword.chars().filter(|c| !c.is_whitespace()).collect();
    let kw_lower = keyword.to_lowercase();
    let rows: Vec<Vec<String>> = list
        .iter()
        .filter(|s| s.code.contains(&kw_clean) || s.name.to_lowercase().contains(&kw_lower))
        .map(|s| vec![s.code.clone(), s.name.clone()])
        .collect();
    if rows.is_empty() {
        return Err(Error::NotFound(format!(
            "未找到与 '{}' 相关的股票。\n\n提示: 请用 6 位数股票代码查询，例如 000001、600519、300750",
            keyword
        )));
    }
    Ok(format!(
        "搜索 '{}' 的结果（前20个）（快速匹配：仅代码与名称；需要实时价格请用 get_stock_realtime）:\n\n{}",
        keyword,
        format_table(&["代码", "名称"], &rows, SEARCH_LIMIT)
    ))
}

/// 跨市场搜索的尝试顺序。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SearchOrder {
    Markets(Vec<MarketKind>),
    UsUnsupported(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MarketKind {
    AShare,
    HongKong,
}

impl MarketKind {
    fn label(self) -> &'static str {
        match self {
            MarketKind::AShare => "A股",
            MarketKind::HongKong => "港股",
        }
    }
}

fn looks_like_us_ticker(upper: &str) -> bool {
    let mut chars = upper.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    upper.chars().count() <= 11
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

/// 根据关键词特征决定先搜哪个市场。
pub(crate) fn market_order(keyword: &str) -> SearchOrder {
    use MarketKind::*;
    let upper = keyword.to_uppercase();
    let is_digits = !keyword.is_empty() && keyword.chars().all(|c| c.is_ascii_digit());
    if is_digits && keyword.len() == 6 {
        return SearchOrder::Markets(vec![AShare, HongKong]);
    }
    if is_digits && keyword.len() == 5 {
        return SearchOrder::Markets(vec![HongKong, AShare]);
    }
    if upper.starts_with("HK") || keyword.contains("港股") || upper.contains("HK:") {
        return SearchOrder::Markets(vec![HongKong, AShare]);
    }
    if ["US:", "NASDAQ", "NYSE"].iter().any(|tag| upper.contains(tag)) {
        return SearchOrder::UsUnsupported(
            "当前版本暂不支持美股数据查询。\n\n\
             请使用 A股或港股代码/名称进行搜索，例如 A股 600519、港股 00700。",
        );
    }
    if looks_like_us_ticker(&upper) {
        return SearchOrder::UsUnsupported(
            "检测到可能为美股代码，但当前版本暂不支持美股数据查询。\n\n\
             请使用 A股或港股代码/名称进行搜索，例如 A股 600519、港股 00700。",
        );
    }
    SearchOrder::Markets(vec![AShare, HongKong])
}

// ─── 工具 ───

pub struct SearchStockTool {
    market: Arc<MarketData>,
}

impl SearchStockTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for SearchStockTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_stock",
            description: "根据关键词搜索A股股票，关键词可以是股票名称或代码的一部分",
            parameters: json!({
                "type": "object",
                "properties": {
                    "keyword": {"type": "string", "description": "搜索关键词，如 \"茅台\" 或 \"600519\""}
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
                "请输入搜索关键词（股票名称或代码的一部分）。\n\n示例: 平安、茅台、600519、000001"
                    .to_string(),
            );
        }
        match search_a(&self.market, keyword).await {
            Ok(msg) => Ok(msg),
            // 无匹配对模型是有效信息，按正常结果返回
            Err(Error::NotFound(msg)) => Ok(msg),
            Err(e) => Err(e),
        }
    }
}

pub struct SearchStockAnyTool {
    market: Arc<MarketData>,
}

impl SearchStockAnyTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for SearchStockAnyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_stock_any",
            description: "智能搜索A股、港股股票。不确定市场时优先使用本工具，会自动判断更可能的市场并依次尝试",
            parameters: json!({
                "type": "object",
                "properties": {
                    "keyword": {"type": "string", "description": "搜索关键词，可以是股票名称或代码的一部分"}
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
                "请输入搜索关键词（股票名称或代码的一部分）。\n\n示例: 平安、茅台、600519、00700、AAPL"
                    .to_string(),
            );
        }
        let markets = match market_order(keyword) {
            SearchOrder::UsUnsupported(msg) => return Ok(msg.to_string()),
            SearchOrder::Markets(markets) => markets,
        };
        let mut last_msg = String::new();
        for kind in markets {
            let attempt = match kind {
                MarketKind::AShare => search_a(&self.market, keyword).await,
                MarketKind::HongKong => crate::hk::search_hk(&self.market, keyword).await,
            };
            match attempt {
                Ok(msg) => {
                    // 命中时标注来源市场（原文未含标注时）
                    if msg.contains("搜索 '") && msg.contains("的结果") && !msg.contains("（来源：")
                    {
                        return Ok(format!("{}\n\n（来源：{}）", msg, kind.label()));
                    }
                    return Ok(msg);
                }
                Err(Error::NotFound(msg)) => {
                    last_msg = msg;
                }
                Err(e) => {
                    last_msg = format!(
                        "{} 搜索失败: {}",
                        kind.label(),
                        safe_truncate(&e.to_string(), 120)
                    );
                }
            }
        }
        if !last_msg.is_empty() {
            return Ok(last_msg);
        }
        Ok(format!(
            "未在 A股、港股中找到与 '{}' 相关的股票。\n\n提示: 也可以直接使用具体代码查询，例如 A股 600519、港股 00700。",
            keyword
        ))
    }
}

pub struct StockRealtimeTool {
    market: Arc<MarketData>,
}

impl StockRealtimeTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockRealtimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_stock_realtime",
            description: "获取A股实时行情数据，包括最新价、涨跌幅、成交量、市值等",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "股票代码，如 \"000001\" (平安银行) 或 \"600519\" (贵州茅台)"}
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
        let code = normalize_stock_code(require_str(&params, "symbol")?);
        let quote = self.market.stock_quote(&code).await;
        if quote.is_empty_result() {
            return Err(Error::NotFound(format!("未找到股票代码 {} 的数据", code)));
        }
        Ok(render_stock_quote(&quote))
    }
}

pub struct StockHistoryTool {
    market: Arc<MarketData>,
}

impl StockHistoryTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockHistoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_stock_history",
            description: "获取A股历史行情数据（K线）",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "股票代码，如 \"000001\""},
                    "start_date": {"type": "string", "description": "开始日期，格式 YYYYMMDD，如 \"20230101\""},
                    "end_date": {"type": "string", "description": "结束日期，格式 YYYYMMDD，如 \"20231231\""},
                    "period": {"type": "string", "enum": ["daily", "weekly", "monthly"], "description": "周期，默认 daily"},
                    "adjust": {"type": "string", "enum": ["qfq", "hfq", ""], "description": "复权类型，qfq(前复权)/hfq(后复权)/空(不复权)，默认 qfq"}
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
            let val = optional_str(params, key);
            if !val.is_empty() {
                validate_date(val)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let code = normalize_stock_code(require_str(&params, "symbol")?);
        let period = match optional_str(&params, "period") {
            "" => "daily",
            p => p,
        };
        let adjust = params["adjust"].as_str().unwrap_or("qfq");
        let start = match optional_str(&params, "start_date") {
            "" => String::new(),
            d => validate_date(d)?,
        };
        let end = match optional_str(&params, "end_date") {
            "" => String::new(),
            d => validate_date(d)?,
        };
        let series = self
            .market
            .stock_kline(&code, period, adjust, &start, &end)
            .await
            .map_err(|e| {
                Error::Tool(format!(
                    "获取历史行情失败: {}",
                    safe_truncate(&e.to_string(), 200)
                ))
            })?;
        if series.is_empty_result() {
            return Err(Error::NotFound(format!("未找到股票 {} 的历史数据", code)));
        }
        Ok(format!(
            "股票 {} 历史行情 ({}):\n\n{}",
            code,
            period,
            render_kline_table(&series.rows)
        ))
    }
}

pub struct StockInfoTool {
    market: Arc<MarketData>,
}

impl StockInfoTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockInfoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_stock_info",
            description: "获取个股基本信息，包括公司名称、行业、上市时间、市值等",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "股票代码，如 \"000001\""}
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
        let code = normalize_stock_code(require_str(&params, "symbol")?);
        let pairs = self.market.stock_info(&code).await.map_err(|e| {
            Error::Tool(format!(
                "获取股票信息失败: {}",
                safe_truncate(&e.to_string(), 200)
            ))
        })?;
        let mut out = format!("股票 {} 基本信息:\n", code);
        for (label, value) in &pairs {
            out.push_str(&format!("  {}: {}\n", label, value));
        }
        Ok(out)
    }
}

pub struct StockFinancialsTool {
    market: Arc<MarketData>,
}

impl StockFinancialsTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockFinancialsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_stock_financials",
            description: "获取A股核心财务指标：市盈率PE、市净率PB、净资产收益率ROE、营收与净利润同比增速",
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "股票代码，如 \"600519\""}
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
        let code = normalize_stock_code(require_str(&params, "symbol")?);
        // 财报指标与行情估值独立获取，财报失败时仍可给出 PE/PB
        let (finance, quote) = tokio::join!(
            self.market.finance_indicators(&code),
            self.market.stock_quote(&code)
        );
        let pe = quote.pe_ratio;
        let pb = quote.pb_ratio;
        match finance {
            Ok(f) => {
                let period_label = f.report_date.as_deref().map(|d| {
                    if d.ends_with("12-31") {
                        format!("{}（年报）", d)
                    } else {
                        format!("{}（报告期）", d)
                    }
                });
                let mut out = format!("股票 {} 核心财务指标", code);
                if let Some(label) = period_label {
                    out.push_str(&format!("（{}）", label));
                }
                out.push_str(":\n");
                out.push_str(&format!("  市盈率 PE: {}\n", fmt_opt(pe)));
                out.push_str(&format!("  市净率 PB: {}\n", fmt_opt(pb)));
                out.push_str(&format!("  净资产收益率 ROE: {}\n", fmt_pct(f.roe)));
                out.push_str(&format!("  营业收入同比增速: {}\n", fmt_pct(f.rev_growth)));
                out.push_str(&format!("  净利润同比增速: {}\n", fmt_pct(f.profit_growth)));
                out.push_str("\n以上指标可用于基本面的估值与成长性分析。");
                Ok(out)
            }
            Err(_) if pe.is_some() || pb.is_some() => {
                let mut out = format!("股票 {} 核心财务指标（估值来自行情）\n", code);
                out.push_str(&format!("  市盈率(动态) PE: {}\n", fmt_opt(pe)));
                out.push_str(&format!("  市净率 PB: {}\n", fmt_opt(pb)));
                out.push_str(
                    "  （财报类指标 ROE/营收与利润增速 当前数据源暂不可用，可稍后再试或结合行情做估值参考。）",
                );
                Ok(out)
            }
            Err(_) => Err(Error::Tool(format!(
                "暂时无法获取股票 {} 的财务分析指标数据（可能尚未披露或数据源不可用）。\n\n\
                 提示：你可以改用市值、市盈率等简单指标进行大致估值，或稍后再试。",
                code
            ))),
        }
    }
}

pub struct HotStocksTool {
    market: Arc<MarketData>,
}

impl HotStocksTool {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for HotStocksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_hot_stocks",
            description: "获取当前热门股票排行（按人气排名）",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
            read_only: true,
            thread_safe: true,
        }
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        let hot = self.market.hot_stocks().await.map_err(|e| {
            Error::Tool(format!(
                "获取热门股票失败: {}",
                safe_truncate(&e.to_string(), 200)
            ))
        })?;
        if hot.is_empty() {
            return Ok("暂无热门股票数据".to_string());
        }
        let rows: Vec<Vec<String>> = hot
            .iter()
            .map(|h| {
                vec![
                    h.rank.to_string(),
                    h.code.clone(),
                    h.name.clone(),
                    fmt_opt(h.price),
                    fmt_pct(h.change_percent),
                ]
            })
            .collect();
        Ok(format!(
            "热门股票排行:\n\n{}",
            format_table(&["排名", "代码", "名称", "最新价", "涨跌幅"], &rows, 20)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_rendering_includes_all_labels() {
        let q = QuoteSnapshot {
            code: "600519".to_string(),
            name: "贵州茅台".to_string(),
            price: Some(1717.99),
            change_percent: Some(0.94),
            open: Some(1700.0),
            prev_close: Some(1702.0),
            high: Some(1727.0),
            low: Some(1695.0),
            volume: Some(29729.0),
            amount: Some(5_093_637_473.0),
            market_cap: Some(2_157_900_000_000.0),
            ..Default::default()
        };
        let text = render_stock_quote(&q);
        assert!(text.starts_with("股票 600519 实时行情:\n"));
        assert!(text.contains("  股票简称: 贵州茅台\n"));
        assert!(text.contains("  最新价: 1717.99\n"));
        assert!(text.contains("  涨跌幅: 0.94%\n"));
        assert!(text.contains("  成交额: 50.94亿\n"));
        assert!(text.contains("  总市值: 2.16万亿\n"));
    }

    #[test]
    fn kline_table_truncates_past_30_rows() {
        let rows: Vec<KlineRow> = (0..40)
            .map(|i| KlineRow {
                date: format!("2025-01-{:02}", i + 1),
                open: Some(10.0),
                close: Some(10.5),
                high: Some(11.0),
                low: Some(9.8),
                volume: Some(1000.0),
                amount: Some(1.0e6),
                change_percent: Some(0.5),
            })
            .collect();
        let text = render_kline_table(&rows);
        assert!(text.contains("日期  开盘  收盘"));
        assert!(text.contains("... (显示前 30 条，共 40 条)"));
    }

    #[test]
    fn market_order_prefers_a_share_for_six_digits() {
        assert_eq!(
            market_order("600519"),
            SearchOrder::Markets(vec![MarketKind::AShare, MarketKind::HongKong])
        );
        assert_eq!(
            market_order("00700"),
            SearchOrder::Markets(vec![MarketKind::HongKong, MarketKind::AShare])
        );
        assert_eq!(
            market_order("港股腾讯"),
            SearchOrder::Markets(vec![MarketKind::HongKong, MarketKind::AShare])
        );
        assert_eq!(
            market_order("茅台"),
            SearchOrder::Markets(vec![MarketKind::AShare, MarketKind::HongKong])
        );
    }

    #[test]
    fn market_order_rejects_us_tickers() {
        assert!(matches!(market_order("AAPL"), SearchOrder::UsUnsupported(_)));
        assert!(matches!(
            market_order("NASDAQ:TSLA"),
            SearchOrder::UsUnsupported(_)
        ));
        assert!(matches!(market_order("BRK.A"), SearchOrder::UsUnsupported(_)));
        // 中文关键词不会被当成美股代码
        assert!(matches!(market_order("贵州茅台"), SearchOrder::Markets(_)));
    }

    #[test]
    fn spec_schemas_are_well_formed() {
        let market = Arc::new(MarketData::new(Default::default()));
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(SearchStockTool::new(market.clone())),
            Box::new(SearchStockAnyTool::new(market.clone())),
            Box::new(StockRealtimeTool::new(market.clone())),
            Box::new(StockHistoryTool::new(market.clone())),
            Box::new(StockInfoTool::new(market.clone())),
            Box::new(StockFinancialsTool::new(market.clone())),
            Box::new(HotStocksTool::new(market)),
        ];
        for tool in &tools {
            let spec = tool.spec();
            assert!(spec.read_only);
            assert!(spec.thread_safe);
            let schema = spec.to_openai_schema();
            assert_eq!(schema["function"]["name"], spec.name);
            assert_eq!(schema["function"]["parameters"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn realtime_requires_symbol() {
        let market = Arc::new(MarketData::new(Default::default()));
        let tool = StockRealtimeTool::new(market);
        let err = tool.validate(&json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        let err = tool.validate(&json!({"symbol": "  "})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        assert!(tool.validate(&json!({"symbol": "600519"})).is_ok());
    }

    #[test]
    fn history_validate_rejects_bad_dates() {
        let market = Arc::new(MarketData::new(Default::default()));
        let tool = StockHistoryTool::new(market);
        assert!(tool
            .validate(&json!({"symbol": "600519", "start_date": "2024-13-01"}))
            .is_err());
        assert!(tool
            .validate(&json!({"symbol": "600519", "start_date": "20240101"}))
            .is_ok());
    }
}
