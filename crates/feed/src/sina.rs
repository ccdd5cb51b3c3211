use crate::build_client;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use kaipan_core::common::session::from_cn_naive;
use kaipan_core::common::{Exchange, ParsedSymbol};
use kaipan_core::market::entity::Quote;
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::QuoteProvider;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://hq.sinajs.cn";
const REFERER: &str = "https://finance.sina.com.cn";
// 新浪 A 股报价至少包含 32 个逗号分隔字段
const MIN_FIELDS: usize = 32;

/// # Summary
/// 新浪财经实时报价提供者。
///
/// # Invariants
/// - 单次 HTTP 请求批量拉取全部标的。
/// - 成交量规范化为手 (÷100)，成交额规范化为万元 (÷10000)，价格保持为元。
#[derive(Clone)]
pub struct SinaProvider {
    client: Client,
    base_url: String,
}

impl SinaProvider {
    /// # Summary
    /// 创建指向新浪正式接口的提供者。
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// # Summary
    /// 创建指向自定义地址的提供者 (用于测试替身)。
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(5))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// `600519.SH` → `sh600519`
pub fn to_sina_code(symbol: &ParsedSymbol) -> String {
    match symbol.exchange {
        Exchange::SH => format!("sh{}", symbol.code),
        Exchange::SZ => format!("sz{}", symbol.code),
    }
}

/// `sh600519` → `600519.SH`
fn from_sina_code(code: &str) -> Option<String> {
    let (market, digits) = code.split_at_checked(2)?;
    match market {
        "sh" => Some(format!("{}.SH", digits)),
        "sz" => Some(format!("{}.SZ", digits)),
        _ => None,
    }
}

fn dec(field: &str) -> Option<Decimal> {
    Decimal::from_str(field.trim()).ok()
}

/// # Summary
/// 解析新浪报价接口的响应体。
///
/// # Logic
/// 1. 按行切分，每行形如 `var hq_str_sz000001="平安银行,11.20,...";`。
/// 2. 从变量名还原证券代码，从引号内取逗号分隔字段。
/// 3. 空内容 (停牌/无效代码)、字段不足、价格非正的行被跳过。
pub fn parse_sina_response(body: &str) -> Vec<Quote> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (var, rest) = line.split_once('=')?;
            let code = var.trim().rsplit('_').next()?;
            let symbol = from_sina_code(code)?;
            let start = rest.find('"')?;
            let end = rest.rfind('"')?;
            if end <= start {
                return None;
            }
            let raw = &rest[start + 1..end];
            if raw.trim().is_empty() {
                debug!(symbol = %symbol, "empty quote payload, probably suspended");
                return None;
            }
            let fields: Vec<&str> = raw.split(',').collect();
            let quote = parse_sina_fields(&symbol, &fields);
            if quote.is_none() {
                warn!(symbol = %symbol, fields = fields.len(), "malformed sina quote skipped");
            }
            quote
        })
        .collect()
}

/// # Summary
/// 将单只证券的字段数组转换为 `Quote`。
///
/// # Logic
/// 字段下标：0 名称，1 今开，2 昨收，3 现价，4 最高，5 最低，6 买一价，7 卖一价，
/// 8 成交量 (股)，9 成交额 (元)，10 买一量，20 卖一量，30 日期，31 时间。
pub fn parse_sina_fields(symbol: &str, fields: &[&str]) -> Option<Quote> {
    if fields.len() < MIN_FIELDS {
        return None;
    }
    let last = dec(fields[3])?;
    let prev_close = dec(fields[2])?;
    if last <= Decimal::ZERO || prev_close <= Decimal::ZERO {
        return None;
    }

    let volume = dec(fields[8]).map(|v| (v / Decimal::ONE_HUNDRED).floor());
    let amount = dec(fields[9]).map(|v| v / Decimal::new(10_000, 0));
    let quote_time = NaiveDateTime::parse_from_str(
        &format!("{} {}", fields[30].trim(), fields[31].trim()),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()
    .map(from_cn_naive);

    Some(Quote {
        symbol: symbol.to_string(),
        name: Some(fields[0].trim().to_string()).filter(|n| !n.is_empty()),
        last,
        open: dec(fields[1]),
        high: dec(fields[4]),
        low: dec(fields[5]),
        bid1: dec(fields[6]),
        ask1: dec(fields[7]),
        bid1_volume: dec(fields[10]).and_then(|v| v.to_u64()),
        ask1_volume: dec(fields[20]).and_then(|v| v.to_u64()),
        prev_close: Some(prev_close),
        volume,
        amount,
        quote_time,
        source: "sina".to_string(),
    })
}

#[async_trait]
impl QuoteProvider for SinaProvider {
    /// # Summary
    /// 从新浪财经批量抓取实时报价。
    ///
    /// # Logic
    /// 1. 将代码转换为 `sh600519` 形式并以逗号拼接。
    /// 2. 携带 Referer 头发起请求 (缺失时接口返回 403)。
    /// 3. 按响应声明的字符集解码后逐行解析。
    async fn fetch_quotes(&self, symbols: &[ParsedSymbol]) -> Result<Vec<Quote>, MarketError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let list = symbols
            .iter()
            .map(to_sina_code)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/list={}", self.base_url, list);

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MarketError::Network(format!("HTTP {}", resp.status())));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Parse(e.to_string()))?;

        let quotes = parse_sina_response(&body);
        debug!(requested = symbols.len(), parsed = quotes.len(), "sina quotes fetched");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "var hq_str_sz000001=\"平安银行,11.200,11.150,11.230,11.300,11.100,11.220,11.230,123456789,1385000000.000,35000,11.220,2000,11.210,3000,11.200,1000,11.190,500,11.180,42100,11.230,1000,11.240,2000,11.250,3000,11.260,4000,11.270,2025-03-04,10:15:03,00\";\nvar hq_str_sh600000=\"\";\n";

    #[test]
    fn test_parse_full_quote() {
        let quotes = parse_sina_response(SAMPLE);
        assert_eq!(quotes.len(), 1);

        let q = &quotes[0];
        assert_eq!(q.symbol, "000001.SZ");
        assert_eq!(q.name.as_deref(), Some("平安银行"));
        assert_eq!(q.last, dec!(11.230));
        assert_eq!(q.prev_close, Some(dec!(11.150)));
        assert_eq!(q.bid1, Some(dec!(11.220)));
        assert_eq!(q.ask1, Some(dec!(11.230)));
        assert_eq!(q.bid1_volume, Some(35000));
        assert_eq!(q.ask1_volume, Some(42100));
        // 股 → 手，元 → 万元
        assert_eq!(q.volume, Some(dec!(1234567)));
        assert_eq!(q.amount, Some(dec!(138500)));
        // 10:15:03 CST == 02:15:03 UTC
        assert_eq!(
            q.quote_time.map(|t| t.to_rfc3339()),
            Some("2025-03-04T02:15:03+00:00".to_string())
        );
    }

    #[test]
    fn test_rejects_short_or_nonpositive_payloads() {
        assert!(parse_sina_fields("000001.SZ", &["x"; 10]).is_none());

        let mut fields = vec!["1"; 32];
        fields[3] = "0.000";
        assert!(parse_sina_fields("000001.SZ", &fields).is_none());
    }

    #[test]
    fn test_code_conversion() {
        let p = ParsedSymbol::parse("600519.SH").unwrap();
        assert_eq!(to_sina_code(&p), "sh600519");
        assert_eq!(from_sina_code("sz000001").as_deref(), Some("000001.SZ"));
        assert_eq!(from_sina_code("hk00700"), None);
    }
}
