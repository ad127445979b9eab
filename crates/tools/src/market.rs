//! 行情数据服务：东方财富为主源，新浪、腾讯备用。
//!
//! 全市场列表类拉取（A股代码表、港股行情、ETF 行情、板块列表）结果较大
//! 且变化慢，统一走 TTL 缓存；单票行情每次实时拉取，多数据源竞速。

use std::time::Duration;

use chrono::NaiveDate;
use futures::FutureExt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use finsage_core::{Error, FetchSettings, Result};

use crate::cache::TtlCache;
use crate::fetch::{try_sources, try_sources_parallel, FetchValue, Source};
use crate::retry::{with_retry, RetryPolicy};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const EM_REFERER: &str = "https://quote.eastmoney.com";
const EM_DATA_REFERER: &str = "https://data.eastmoney.com/";
const SINA_REFERER: &str = "https://finance.sina.com.cn";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// A股代码表缓存 6 小时，港股/ETF 行情 10 分钟，板块 5 分钟。
const STOCK_LIST_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const SPOT_LIST_TTL: Duration = Duration::from_secs(600);
const BOARD_TTL: Duration = Duration::from_secs(300);

// ─── 代码规范化 ───

/// 规范化 A 股代码：去掉 SH/SZ/BJ 前后缀与分隔符，补齐 6 位。
pub fn normalize_stock_code(code: &str) -> String {
    let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
    let padded = format!("{:0>6}", digits);
    padded.chars().take(6).collect()
}

/// 规范化港股代码为 5 位数字。
pub fn normalize_hk_code(code: &str) -> String {
    let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 5 {
        format!("{:0>5}", digits)
    } else {
        digits
    }
}

/// 校验并规范化日期为 YYYYMMDD。
pub fn validate_date(date: &str) -> Result<String> {
    let cleaned: String = date.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.len() == 8 && NaiveDate::parse_from_str(&cleaned, "%Y%m%d").is_ok() {
        return Ok(cleaned);
    }
    Err(Error::InvalidParams(format!(
        "日期格式不合法: {}，应为 YYYYMMDD",
        date
    )))
}

/// 东方财富 secid：沪市 `1.`、深市 `0.`、港股 `116.`。
/// 6/9 开头为沪市股票，5 开头为沪市基金，其余深市；5 位代码视为港股。
pub fn to_secid(symbol: &str) -> (String, &'static str, String) {
    let digits: String = symbol.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 5 {
        return (format!("116.{}", digits), "hk", digits);
    }
    let code: String = format!("{:0>6}", digits).chars().take(6).collect();
    if code.starts_with('6') || code.starts_with('9') || code.starts_with('5') {
        (format!("1.{}", code), "sh", code)
    } else {
        (format!("0.{}", code), "sz", code)
    }
}

/// 指数 secid：399/2/1 开头为深市，其余（000001 上证、000300 沪深300）沪市。
pub fn index_secid(symbol: &str) -> (String, String) {
    let code = normalize_stock_code(symbol);
    if code.starts_with("399") || code.starts_with('2') || code.starts_with('1') {
        (format!("0.{}", code), code)
    } else {
        (format!("1.{}", code), code)
    }
}

/// 新浪/腾讯行情代码前缀：600519 -> sh600519, 000001 -> sz000001。
pub fn exchange_prefix(code: &str) -> &'static str {
    if code.starts_with('6') || code.starts_with('9') || code.starts_with('5') {
        "sh"
    } else {
        "sz"
    }
}

// ─── 数据行类型 ───

/// 单票行情快照。`Default` 即"无数据"。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub prev_close: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub float_market_cap: Option<f64>,
    pub source: &'static str,
}

impl FetchValue for QuoteSnapshot {
    fn is_empty_result(&self) -> bool {
        self.price.is_none() && self.name.is_empty()
    }
}

/// A股代码+名称（搜索用）。
#[derive(Debug, Clone, PartialEq)]
pub struct StockBrief {
    pub code: String,
    pub name: String,
}

/// 全市场列表里的一行（港股/ETF）。
#[derive(Debug, Clone)]
pub struct ListedQuote {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BoardRow {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub leader: String,
    pub leader_change: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ConstituentRow {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub change: Option<f64>,
    pub amount: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KlineRow {
    pub date: String,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct KlineSeries {
    pub code: String,
    pub name: String,
    pub rows: Vec<KlineRow>,
}

impl FetchValue for KlineSeries {
    fn is_empty_result(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HotStock {
    pub rank: u64,
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FuturesQuote {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub prev_settle: Option<f64>,
    pub volume: Option<f64>,
    pub position: Option<f64>,
}

/// 东方财富 F10 主要财务指标（均为百分比数值）。
#[derive(Debug, Clone, Default)]
pub struct FinanceIndicators {
    pub report_date: Option<String>,
    pub roe: Option<f64>,
    pub rev_growth: Option<f64>,
    pub profit_growth: Option<f64>,
}

/// 宏观报表类别，对应东方财富数据中心 reportName。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MacroReport {
    Cpi,
    Gdp,
    MoneySupply,
}

impl MacroReport {
    pub fn report_name(self) -> &'static str {
        match self {
            MacroReport::Cpi => "RPT_ECONOMY_CPI",
            MacroReport::Gdp => "RPT_ECONOMY_GDP",
            MacroReport::MoneySupply => "RPT_ECONOMY_CURRENCY_SUPPLY",
        }
    }
}

// ─── 解析辅助 ───

fn opt_f64(v: &Value) -> Option<f64> {
    // 停牌等情况下字段为 "-"，一律当缺失
    v.as_f64()
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// push2 stock/get 的 data 对象转快照。价格字段按市场缩放：
/// A股为分（÷100），港股为厘（÷1000）。
fn parse_em_quote(data: &Value, code: &str, market: &str) -> QuoteSnapshot {
    let divisor = if market == "hk" { 1000.0 } else { 100.0 };
    let price = |field: &str| opt_f64(&data[field]).map(|v| v / divisor);
    let raw = |field: &str| opt_f64(&data[field]);
    QuoteSnapshot {
        code: data["f57"].as_str().unwrap_or(code).to_string(),
        name: data["f58"].as_str().unwrap_or("").to_string(),
        price: price("f43"),
        change: raw("f169").map(|v| v / divisor),
        change_percent: raw("f170").map(|v| v / 100.0),
        open: price("f46"),
        high: price("f44"),
        low: price("f45"),
        prev_close: price("f60"),
        volume: raw("f47"),
        amount: raw("f48"),
        turnover_rate: raw("f168").map(|v| v / 100.0),
        pe_ratio: raw("f162").map(|v| v / 100.0),
        pb_ratio: raw("f167").map(|v| v / 100.0),
        market_cap: raw("f116"),
        float_market_cap: raw("f117"),
        source: "eastmoney",
    }
}

/// 新浪 A 股行情行：`var hq_str_sh600519="贵州茅台,1700.000,...";`
/// 字段顺序：名称,今开,昨收,最新,最高,最低,买一,卖一,成交量(股),成交额(元),...,日期,时间
pub(crate) fn parse_sina_stock_line(body: &str, code: &str) -> Option<QuoteSnapshot> {
    let payload = body.split('"').nth(1)?;
    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 10 {
        return None;
    }
    let price = parse_f64(fields[3])?;
    let prev_close = parse_f64(fields[2]);
    let (change, change_percent) = match prev_close {
        Some(prev) if prev > 0.0 => {
            let chg = price - prev;
            (Some(chg), Some(chg / prev * 100.0))
        }
        _ => (None, None),
    };
    Some(QuoteSnapshot {
        code: code.to_string(),
        name: fields[0].to_string(),
        price: Some(price),
        change,
        change_percent,
        open: parse_f64(fields[1]),
        high: parse_f64(fields[4]),
        low: parse_f64(fields[5]),
        prev_close,
        volume: parse_f64(fields[8]),
        amount: parse_f64(fields[9]),
        source: "sina",
        ..Default::default()
    })
}

/// 腾讯行情行：`v_sh600519="1~贵州茅台~600519~1717.99~...";`，`~` 分隔。
/// 关键位：3 最新价、4 昨收、5 今开、31 涨跌额、32 涨跌幅、33 最高、34 最低、
/// 36 成交量(手)、37 成交额(万元)、38 换手率、39 市盈率、46 市净率。
pub(crate) fn parse_tencent_line(body: &str, code: &str) -> Option<QuoteSnapshot> {
    let payload = body.split('"').nth(1)?;
    let fields: Vec<&str> = payload.split('~').collect();
    if fields.len() < 35 {
        return None;
    }
    let at = |i: usize| fields.get(i).copied().unwrap_or("");
    let price = parse_f64(at(3))?;
    Some(QuoteSnapshot {
        code: code.to_string(),
        name: at(1).to_string(),
        price: Some(price),
        change: parse_f64(at(31)),
        change_percent: parse_f64(at(32)),
        open: parse_f64(at(5)),
        high: parse_f64(at(33)),
        low: parse_f64(at(34)),
        prev_close: parse_f64(at(4)),
        volume: parse_f64(at(36)),
        amount: parse_f64(at(37)).map(|v| v * 1e4),
        turnover_rate: parse_f64(at(38)),
        pe_ratio: parse_f64(at(39)),
        pb_ratio: parse_f64(at(46)),
        market_cap: parse_f64(at(45)).map(|v| v * 1e8),
        float_market_cap: parse_f64(at(44)).map(|v| v * 1e8),
        source: "tencent",
    })
}

/// push2his kline 返回的一行：
/// `日期,开盘,收盘,最高,最低,成交量,成交额,振幅,涨跌幅,涨跌额,换手率`
pub(crate) fn parse_kline_row(line: &str) -> Option<KlineRow> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 9 {
        return None;
    }
    Some(KlineRow {
        date: parts[0].to_string(),
        open: parse_f64(parts[1]),
        close: parse_f64(parts[2]),
        high: parse_f64(parts[3]),
        low: parse_f64(parts[4]),
        volume: parse_f64(parts[5]),
        amount: parse_f64(parts[6]),
        change_percent: parse_f64(parts[8]),
    })
}

/// 新浪期货行情行（nf_ 前缀）。
/// 字段位：0 名称、2 今开、3 最高、4 最低、6 买价、7 卖价、8 最新价、
/// 10 昨结算、13 持仓量、14 成交量。
pub(crate) fn parse_sina_futures_line(line: &str, code: &str) -> Option<FuturesQuote> {
    let payload = line.split('"').nth(1)?;
    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 15 {
        return None;
    }
    let price = parse_f64(fields[8])?;
    Some(FuturesQuote {
        code: code.to_string(),
        name: fields[0].to_string(),
        price: Some(price),
        open: parse_f64(fields[2]),
        high: parse_f64(fields[3]),
        low: parse_f64(fields[4]),
        prev_settle: parse_f64(fields[10]),
        position: parse_f64(fields[13]),
        volume: parse_f64(fields[14]),
    })
}

// ─── 原始请求 ───

async fn em_get_json(client: Client, url: String, referer: &'static str) -> Result<Value> {
    let resp = client
        .get(&url)
        .header("Referer", referer)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::data_fetch("东方财富", format!("request failed: {}", e)))?;
    resp.json()
        .await
        .map_err(|e| Error::data_fetch("东方财富", format!("invalid response: {}", e)))
}

async fn em_quote(client: Client, symbol: String) -> Result<QuoteSnapshot> {
    let (secid, market, code) = to_secid(&symbol);
    let url = format!(
        "https://push2.eastmoney.com/api/qt/stock/get?secid={}&fields=f43,f44,f45,f46,f47,f48,f57,f58,f60,f116,f117,f162,f167,f168,f169,f170",
        secid
    );
    debug!(secid = %secid, "东方财富行情");
    let body = em_get_json(client, url, EM_REFERER).await?;
    let data = &body["data"];
    if data.is_null() {
        return Err(Error::data_fetch(
            "东方财富",
            format!("no data for '{}' (secid={})", code, secid),
        ));
    }
    Ok(parse_em_quote(data, &code, market))
}

async fn em_index_quote(client: Client, secid: String, code: String) -> Result<QuoteSnapshot> {
    let url = format!(
        "https://push2.eastmoney.com/api/qt/stock/get?secid={}&fields=f43,f44,f45,f46,f47,f48,f57,f58,f60,f169,f170",
        secid
    );
    debug!(secid = %secid, "东方财富指数行情");
    let body = em_get_json(client, url, EM_REFERER).await?;
    let data = &body["data"];
    if data.is_null() {
        return Err(Error::data_fetch(
            "东方财富",
            format!("no data for index '{}'", code),
        ));
    }
    Ok(parse_em_quote(data, &code, "sh"))
}

async fn sina_text(client: Client, url: String) -> Result<String> {
    let resp = client
        .get(&url)
        .header("Referer", SINA_REFERER)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::data_fetch("新浪", format!("request failed: {}", e)))?;
    // 新浪行情为 GBK 编码
    resp.text_with_charset("gbk")
        .await
        .map_err(|e| Error::data_fetch("新浪", format!("decode failed: {}", e)))
}

async fn sina_quote(client: Client, code: String) -> Result<QuoteSnapshot> {
    let symbol = format!("{}{}", exchange_prefix(&code), code);
    let url = format!("https://hq.sinajs.cn/list={}", symbol);
    debug!(symbol = %symbol, "新浪行情");
    let body = sina_text(client, url).await?;
    parse_sina_stock_line(&body, &code)
        .ok_or_else(|| Error::data_fetch("新浪", format!("no data for '{}'", code)))
}

async fn tencent_text(client: Client, url: String) -> Result<String> {
    let resp = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::data_fetch("腾讯", format!("request failed: {}", e)))?;
    resp.text_with_charset("gbk")
        .await
        .map_err(|e| Error::data_fetch("腾讯", format!("decode failed: {}", e)))
}

async fn tencent_quote(client: Client, code: String, hk: bool) -> Result<QuoteSnapshot> {
    let symbol = if hk {
        format!("hk{}", code)
    } else {
        format!("{}{}", exchange_prefix(&code), code)
    };
    let url = format!("https://qt.gtimg.cn/q={}", symbol);
    debug!(symbol = %symbol, "腾讯行情");
    let body = tencent_text(client, url).await?;
    parse_tencent_line(&body, &code)
        .ok_or_else(|| Error::data_fetch("腾讯", format!("no data for '{}'", code)))
}

async fn em_kline(
    client: Client,
    secid: String,
    code: String,
    klt: &'static str,
    fqt: &'static str,
    begin: String,
    end: String,
) -> Result<KlineSeries> {
    let url = format!(
        "https://push2his.eastmoney.com/api/qt/stock/kline/get?secid={}&fields1=f1,f2,f3,f4,f5,f6&fields2=f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61&klt={}&fqt={}&beg={}&end={}",
        secid, klt, fqt, begin, end
    );
    debug!(secid = %secid, klt, "东方财富 K线");
    let body = em_get_json(client, url, EM_REFERER).await?;
    let data = &body["data"];
    if data.is_null() {
        return Err(Error::data_fetch(
            "东方财富",
            format!("no kline data for '{}'", code),
        ));
    }
    let name = data["name"].as_str().unwrap_or("").to_string();
    let rows = data["klines"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str())
                .filter_map(parse_kline_row)
                .collect()
        })
        .unwrap_or_default();
    Ok(KlineSeries { code, name, rows })
}

/// clist/get 通用拉取，fltt=2 使价格与涨跌幅为十进制数值。
async fn em_clist(
    client: Client,
    fs: String,
    fields: &'static str,
    fid: &'static str,
    page_size: usize,
) -> Result<Vec<Value>> {
    let url = format!(
        "https://push2.eastmoney.com/api/qt/clist/get?pn=1&pz={}&po=1&np=1&fltt=2&invt=2&fid={}&fs={}&fields={}",
        page_size, fid, fs, fields
    );
    debug!(fs = %fs, "东方财富列表");
    let body = em_get_json(client, url, EM_REFERER).await?;
    let diff = body["data"]["diff"]
        .as_array()
        .cloned()
        .ok_or_else(|| Error::data_fetch("东方财富", "列表返回为空"))?;
    Ok(diff)
}

async fn em_datacenter(
    client: Client,
    base: &'static str,
    report_name: &'static str,
    filter: Option<String>,
    page_size: usize,
) -> Result<Vec<Value>> {
    let mut url = format!(
        "{}?reportName={}&columns=ALL&pageSize={}&pageNumber=1&sortColumns=REPORT_DATE&sortTypes=-1",
        base, report_name, page_size
    );
    if let Some(f) = filter {
        url.push_str("&filter=");
        url.push_str(&urlencoding::encode(&f));
    }
    debug!(report = report_name, "东方财富数据中心");
    let body = em_get_json(client, url, EM_DATA_REFERER).await?;
    let rows = body["result"]["data"]
        .as_array()
        .cloned()
        .ok_or_else(|| Error::data_fetch("东方财富", format!("{} 返回为空", report_name)))?;
    Ok(rows)
}

// ─── 服务 ───

pub struct MarketData {
    http: Client,
    settings: FetchSettings,
    stock_list: TtlCache<Vec<StockBrief>>,
    hk_list: TtlCache<Vec<ListedQuote>>,
    etf_list: TtlCache<Vec<ListedQuote>>,
    boards: TtlCache<Vec<BoardRow>>,
}

impl MarketData {
    pub fn new(settings: FetchSettings) -> Self {
        let http = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("构建 HTTP 客户端失败，退回默认配置: {}", e);
                Client::new()
            }
        };
        Self {
            http,
            settings,
            stock_list: TtlCache::new(STOCK_LIST_TTL),
            hk_list: TtlCache::new(SPOT_LIST_TTL),
            etf_list: TtlCache::new(SPOT_LIST_TTL),
            boards: TtlCache::new(BOARD_TTL),
        }
    }

    async fn run_sources<T>(&self, sources: Vec<Source<T>>) -> T
    where
        T: FetchValue + Send + 'static,
    {
        if self.settings.enable_parallel_sources && sources.len() > 1 {
            try_sources_parallel(
                sources,
                Duration::from_secs(self.settings.source_timeout_secs),
            )
            .await
        } else {
            try_sources(sources, Duration::from_millis(self.settings.source_delay_ms)).await
        }
    }

    /// A股单票行情：东方财富 -> 新浪 -> 腾讯。
    pub async fn stock_quote(&self, code: &str) -> QuoteSnapshot {
        let policy = RetryPolicy::silent(2, Duration::from_millis(800));
        let sources = vec![
            Source::new("东方财富", {
                let client = self.http.clone();
                let code = code.to_string();
                move || {
                    async move {
                        with_retry(policy, "东方财富行情", || {
                            em_quote(client.clone(), code.clone())
                        })
                        .await
                    }
                    .boxed()
                }
            }),
            Source::new("新浪", {
                let client = self.http.clone();
                let code = code.to_string();
                move || {
                    async move {
                        with_retry(policy, "新浪行情", || {
                            sina_quote(client.clone(), code.clone())
                        })
                        .await
                    }
                    .boxed()
                }
            }),
            Source::new("腾讯", {
                let client = self.http.clone();
                let code = code.to_string();
                move || async move { tencent_quote(client, code, false).await }.boxed()
            }),
        ];
        self.run_sources(sources).await
    }

    /// 港股单票行情：东方财富 -> 腾讯。
    pub async fn hk_quote(&self, code: &str) -> QuoteSnapshot {
        let policy = RetryPolicy::silent(2, Duration::from_millis(800));
        let sources = vec![
            Source::new("东方财富", {
                let client = self.http.clone();
                let code = code.to_string();
                move || {
                    async move {
                        with_retry(policy, "东方财富港股行情", || {
                            em_quote(client.clone(), code.clone())
                        })
                        .await
                    }
                    .boxed()
                }
            }),
            Source::new("腾讯", {
                let client = self.http.clone();
                let code = code.to_string();
                move || async move { tencent_quote(client, code, true).await }.boxed()
            }),
        ];
        self.run_sources(sources).await
    }

    /// 指数单票行情（东方财富，静默重试）。
    pub async fn index_quote(&self, symbol: &str) -> Result<QuoteSnapshot> {
        let (secid, code) = index_secid(symbol);
        let client = self.http.clone();
        with_retry(
            RetryPolicy::silent(2, Duration::from_millis(800)),
            "东方财富指数行情",
            || em_index_quote(client.clone(), secid.clone(), code.clone()),
        )
        .await
    }

    /// A股 K 线。`period`: daily/weekly/monthly，`adjust`: qfq/hfq/空。
    pub async fn stock_kline(
        &self,
        code: &str,
        period: &str,
        adjust: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<KlineSeries> {
        let (secid, _, code) = to_secid(code);
        self.kline(secid, code, period, adjust, start_date, end_date)
            .await
    }

    /// 指数 K 线（不复权）。
    pub async fn index_kline(
        &self,
        symbol: &str,
        period: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<KlineSeries> {
        let (secid, code) = index_secid(symbol);
        self.kline(secid, code, period, "", start_date, end_date).await
    }

    async fn kline(
        &self,
        secid: String,
        code: String,
        period: &str,
        adjust: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<KlineSeries> {
        let klt = match period {
            "weekly" => "102",
            "monthly" => "103",
            _ => "101",
        };
        let fqt = match adjust {
            "qfq" => "1",
            "hfq" => "2",
            _ => "0",
        };
        let begin = if start_date.is_empty() {
            "0".to_string()
        } else {
            start_date.to_string()
        };
        let end = if end_date.is_empty() {
            "20500101".to_string()
        } else {
            end_date.to_string()
        };
        let client = self.http.clone();
        with_retry(
            RetryPolicy::new(3, Duration::from_millis(1500)),
            "东方财富K线",
            || {
                em_kline(
                    client.clone(),
                    secid.clone(),
                    code.clone(),
                    klt,
                    fqt,
                    begin.clone(),
                    end.clone(),
                )
            },
        )
        .await
    }

    /// A股代码+名称列表（缓存 6 小时）。
    pub async fn stock_list(&self) -> Vec<StockBrief> {
        if let Some(cached) = self.stock_list.get("a") {
            return cached;
        }
        let client = self.http.clone();
        let sources = vec![Source::new("东方财富", move || {
            async move {
                with_retry(
                    RetryPolicy::silent(2, Duration::from_millis(800)),
                    "A股代码列表",
                    || {
                        em_clist(
                            client.clone(),
                            "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23".to_string(),
                            "f12,f14",
                            "f12",
                            6000,
                        )
                    },
                )
                .await
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            let code = row["f12"].as_str()?;
                            let name = row["f14"].as_str()?;
                            Some(StockBrief {
                                code: normalize_stock_code(code),
                                name: name.to_string(),
                            })
                        })
                        .collect::<Vec<_>>()
                })
            }
            .boxed()
        })];
        let list = self.run_sources(sources).await;
        if !list.is_empty() {
            self.stock_list.set("a", list.clone());
        }
        list
    }

    /// 港股全市场行情（缓存 10 分钟）。
    pub async fn hk_list(&self) -> Vec<ListedQuote> {
        if let Some(cached) = self.hk_list.get("hk") {
            return cached;
        }
        let list = self
            .listed_quotes(
                "m:128+t:3,m:128+t:4,m:128+t:1,m:128+t:2".to_string(),
                "港股行情列表",
            )
            .await;
        if !list.is_empty() {
            self.hk_list.set("hk", list.clone());
        }
        list
    }

    /// ETF 全市场行情（缓存 10 分钟，按成交额排序）。
    pub async fn etf_list(&self) -> Vec<ListedQuote> {
        if let Some(cached) = self.etf_list.get("etf") {
            return cached;
        }
        let list = self
            .listed_quotes(
                "b:MK0021,b:MK0022,b:MK0023,b:MK0024,b:MK0827".to_string(),
                "ETF行情列表",
            )
            .await;
        if !list.is_empty() {
            self.etf_list.set("etf", list.clone());
        }
        list
    }

    async fn listed_quotes(&self, fs: String, op_name: &'static str) -> Vec<ListedQuote> {
        let client = self.http.clone();
        let sources = vec![Source::new("东方财富", move || {
            async move {
                with_retry(
                    RetryPolicy::silent(2, Duration::from_millis(800)),
                    op_name,
                    || em_clist(client.clone(), fs.clone(), "f2,f3,f6,f12,f14", "f6", 6000),
                )
                .await
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            let code = row["f12"].as_str()?.to_string();
                            let name = row["f14"].as_str()?.to_string();
                            Some(ListedQuote {
                                code,
                                name,
                                price: opt_f64(&row["f2"]),
                                change_percent: opt_f64(&row["f3"]),
                                amount: opt_f64(&row["f6"]),
                            })
                        })
                        .collect::<Vec<_>>()
                })
            }
            .boxed()
        })];
        self.run_sources(sources).await
    }

    /// 行业或概念板块列表（缓存 5 分钟，按涨跌幅降序）。
    pub async fn board_list(&self, concept: bool) -> Vec<BoardRow> {
        let key = if concept { "concept" } else { "industry" };
        if let Some(cached) = self.boards.get(key) {
            return cached;
        }
        let fs = if concept {
            "m:90+t:3+f:!50".to_string()
        } else {
            "m:90+t:2+f:!50".to_string()
        };
        let client = self.http.clone();
        let sources = vec![Source::new("东方财富", move || {
            async move {
                with_retry(
                    RetryPolicy::silent(3, Duration::from_millis(1200)),
                    "板块列表",
                    || {
                        em_clist(
                            client.clone(),
                            fs.clone(),
                            "f2,f3,f12,f14,f128,f136",
                            "f3",
                            1000,
                        )
                    },
                )
                .await
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            let code = row["f12"].as_str()?.to_string();
                            let name = row["f14"].as_str()?.to_string();
                            Some(BoardRow {
                                code,
                                name,
                                price: opt_f64(&row["f2"]),
                                change_percent: opt_f64(&row["f3"]),
                                leader: row["f128"].as_str().unwrap_or("N/A").to_string(),
                                leader_change: opt_f64(&row["f136"]),
                            })
                        })
                        .collect::<Vec<_>>()
                })
            }
            .boxed()
        })];
        let list = self.run_sources(sources).await;
        if !list.is_empty() {
            self.boards.set(key, list.clone());
        }
        list
    }

    /// 板块成分股（board_code 形如 BK0477）。
    pub async fn board_constituents(&self, board_code: &str) -> Result<Vec<ConstituentRow>> {
        let fs = format!("b:{}+f:!50", board_code);
        let client = self.http.clone();
        let rows = with_retry(
            RetryPolicy::silent(2, Duration::from_millis(1000)),
            "板块成分股",
            || {
                em_clist(
                    client.clone(),
                    fs.clone(),
                    "f2,f3,f4,f6,f9,f12,f14,f23",
                    "f3",
                    500,
                )
            },
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let code = row["f12"].as_str()?.to_string();
                let name = row["f14"].as_str()?.to_string();
                Some(ConstituentRow {
                    code,
                    name,
                    price: opt_f64(&row["f2"]),
                    change_percent: opt_f64(&row["f3"]),
                    change: opt_f64(&row["f4"]),
                    amount: opt_f64(&row["f6"]),
                    pe: opt_f64(&row["f9"]),
                    pb: opt_f64(&row["f23"]),
                })
            })
            .collect())
    }

    /// 个股基本信息（东方财富 F10 概要字段）。
    pub async fn stock_info(&self, code: &str) -> Result<Vec<(String, String)>> {
        let (secid, _, code) = to_secid(code);
        let url = format!(
            "https://push2.eastmoney.com/api/qt/stock/get?secid={}&fields=f43,f57,f58,f84,f85,f116,f117,f127,f170,f189",
            secid
        );
        let client = self.http.clone();
        let body = with_retry(
            RetryPolicy::silent(2, Duration::from_millis(800)),
            "个股信息",
            || em_get_json(client.clone(), url.clone(), EM_REFERER),
        )
        .await?;
        let data = &body["data"];
        if data.is_null() {
            return Err(Error::data_fetch(
                "东方财富",
                format!("no info for '{}'", code),
            ));
        }
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |label: &str, value: String| {
            if !value.is_empty() && value != "N/A" {
                pairs.push((label.to_string(), value));
            }
        };
        push(
            "股票代码",
            data["f57"].as_str().unwrap_or(&code).to_string(),
        );
        push("股票简称", data["f58"].as_str().unwrap_or("").to_string());
        push("所属行业", data["f127"].as_str().unwrap_or("").to_string());
        if let Some(list_date) = opt_f64(&data["f189"]) {
            let s = format!("{}", list_date as i64);
            if s.len() == 8 {
                push("上市时间", format!("{}-{}-{}", &s[..4], &s[4..6], &s[6..8]));
            }
        }
        push("总股本", crate::fmt_amount(opt_f64(&data["f84"])));
        push("流通股", crate::fmt_amount(opt_f64(&data["f85"])));
        push("总市值", crate::fmt_amount(opt_f64(&data["f116"])));
        push("流通市值", crate::fmt_amount(opt_f64(&data["f117"])));
        push(
            "最新价",
            crate::fmt_opt(opt_f64(&data["f43"]).map(|v| v / 100.0)),
        );
        push(
            "涨跌幅",
            crate::fmt_pct(opt_f64(&data["f170"]).map(|v| v / 100.0)),
        );
        if pairs.len() <= 1 {
            return Err(Error::data_fetch(
                "东方财富",
                format!("no info for '{}'", code),
            ));
        }
        Ok(pairs)
    }

    /// 核心财务指标（东方财富 F10 主要指标，优先年报行）。
    pub async fn finance_indicators(&self, code: &str) -> Result<FinanceIndicators> {
        let code = normalize_stock_code(code);
        let secucode = if exchange_prefix(&code) == "sh" {
            format!("{}.SH", code)
        } else {
            format!("{}.SZ", code)
        };
        let client = self.http.clone();
        let rows = with_retry(
            RetryPolicy::silent(2, Duration::from_millis(1000)),
            "财务指标",
            || {
                em_datacenter(
                    client.clone(),
                    "https://datacenter.eastmoney.com/securities/api/data/v1/get",
                    "RPT_F10_FINANCE_MAINFINADATA",
                    Some(format!("(SECUCODE=\"{}\")", secucode)),
                    12,
                )
            },
        )
        .await?;
        if rows.is_empty() {
            return Err(Error::data_fetch(
                "东方财富",
                format!("no finance data for '{}'", code),
            ));
        }
        // 行已按 REPORT_DATE 降序，优先取最新年报行
        let year_end = rows.iter().find(|row| {
            row["REPORT_DATE"]
                .as_str()
                .map(|d| d.contains("-12-31"))
                .unwrap_or(false)
        });
        let primary = year_end.unwrap_or(&rows[0]);
        let mut out = parse_finance_row(primary);
        // 年报行缺营收/利润增速时用最近一期补
        if (out.rev_growth.is_none() || out.profit_growth.is_none()) && year_end.is_some() {
            let latest = parse_finance_row(&rows[0]);
            if out.rev_growth.is_none() {
                out.rev_growth = latest.rev_growth;
            }
            if out.profit_growth.is_none() {
                out.profit_growth = latest.profit_growth;
            }
        }
        Ok(out)
    }

    /// 热门股票排行（东方财富人气榜 + 批量行情）。
    pub async fn hot_stocks(&self) -> Result<Vec<HotStock>> {
        let client = self.http.clone();
        let ranked = with_retry(
            RetryPolicy::silent(2, Duration::from_millis(1000)),
            "人气榜",
            || em_hot_rank(client.clone()),
        )
        .await?;
        if ranked.is_empty() {
            return Ok(Vec::new());
        }
        let secids: Vec<String> = ranked
            .iter()
            .take(20)
            .filter_map(|(_, sc)| {
                let prefix = match sc.get(..2) {
                    Some("SH") => "1",
                    Some("SZ") => "0",
                    _ => return None,
                };
                Some(format!("{}.{}", prefix, &sc[2..]))
            })
            .collect();
        let url = format!(
            "https://push2.eastmoney.com/api/qt/ulist.np/get?secids={}&fields=f2,f3,f12,f14&fltt=2",
            secids.join(",")
        );
        let body = em_get_json(self.http.clone(), url, EM_REFERER).await?;
        let quotes: Vec<(String, String, Option<f64>, Option<f64>)> = body["data"]["diff"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        Some((
                            row["f12"].as_str()?.to_string(),
                            row["f14"].as_str()?.to_string(),
                            opt_f64(&row["f2"]),
                            opt_f64(&row["f3"]),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mut out = Vec::new();
        for (rank, sc) in ranked.iter().take(20) {
            if sc.len() <= 2 {
                continue;
            }
            let code = &sc[2..];
            let hit = quotes.iter().find(|(c, ..)| c == code);
            out.push(HotStock {
                rank: *rank,
                code: code.to_string(),
                name: hit.map(|(_, n, ..)| n.clone()).unwrap_or_default(),
                price: hit.and_then(|(_, _, p, _)| *p),
                change_percent: hit.and_then(|(_, _, _, c)| *c),
            });
        }
        Ok(out)
    }

    /// 期货实时行情（新浪，nf_ 批量）。
    pub async fn futures_quotes(&self, codes: &[(&str, &str)]) -> Result<Vec<FuturesQuote>> {
        let list = codes
            .iter()
            .map(|(code, _)| format!("nf_{}", code))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("https://hq.sinajs.cn/list={}", list);
        let client = self.http.clone();
        let body = with_retry(
            RetryPolicy::silent(3, Duration::from_millis(1200)),
            "期货行情",
            || sina_text(client.clone(), url.clone()),
        )
        .await?;
        let mut out = Vec::new();
        for (line, (code, _)) in body.lines().zip(codes.iter()) {
            if let Some(quote) = parse_sina_futures_line(line, code) {
                out.push(quote);
            }
        }
        Ok(out)
    }

    /// 宏观经济报表原始行。
    pub async fn macro_rows(&self, report: MacroReport) -> Result<Vec<Value>> {
        let client = self.http.clone();
        let rows = with_retry(
            RetryPolicy::silent(3, Duration::from_millis(1000)),
            "宏观数据",
            || {
                em_datacenter(
                    client.clone(),
                    "https://datacenter-web.eastmoney.com/api/data/v1/get",
                    report.report_name(),
                    None,
                    24,
                )
            },
        )
        .await?;
        Ok(rows)
    }
}

/// 参照东方财富 F10 字段命名取指标，均为百分比数值。
fn parse_finance_row(row: &Value) -> FinanceIndicators {
    let pick = |keys: &[&str]| -> Option<f64> {
        keys.iter().find_map(|k| opt_f64(&row[*k]))
    };
    FinanceIndicators {
        report_date: row["REPORT_DATE"]
            .as_str()
            .map(|d| d.chars().take(10).collect()),
        roe: pick(&["ROEJQ", "ROEKCJQ", "ROE_AVG"]),
        rev_growth: pick(&["TOTALOPERATEREVETZ", "YYSRTB"]),
        profit_growth: pick(&["PARENTNETPROFITTZ", "JLRTB"]),
    }
}

/// 人气榜原始排名：(排名, "SH600519") 列表。
async fn em_hot_rank(client: Client) -> Result<Vec<(u64, String)>> {
    let url = "https://emappdata.eastmoney.com/stockrank/getAllCurrentList";
    let payload = json!({
        "appId": "appId01",
        "globalId": "786e4c21-70dc-435a-93bb-38c0c0a6a18f",
        "marketType": "",
        "pageNo": 1,
        "pageSize": 100,
    });
    let resp = client
        .post(url)
        .header("User-Agent", USER_AGENT)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::data_fetch("东方财富", format!("request failed: {}", e)))?;
    let body: Value = resp
        .json()
        .await
        .map_err(|e| Error::data_fetch("东方财富", format!("invalid response: {}", e)))?;
    Ok(body["data"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let rank = row["rk"].as_u64()?;
                    let sc = row["sc"].as_str()?;
                    Some((rank, sc.to_string()))
                })
                .collect()
        })
        .unwrap_or_default())
}
