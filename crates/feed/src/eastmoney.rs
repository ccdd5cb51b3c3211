use crate::build_client;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use kaipan_core::common::session::{cn_datetime, from_cn_naive, hm};
use kaipan_core::common::{AdjustMode, Exchange, ParsedSymbol, TimeFrame};
use kaipan_core::market::entity::Candle;
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::CandleProvider;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://push2his.eastmoney.com";
const KLINE_PATH: &str = "/api/qt/stock/kline/get";

/// # Summary
/// 东方财富历史 K 线提供者。
///
/// # Invariants
/// - 分钟 K 线的时间戳是 bar 结束时间 (本地时钟)，日线只有日期，按 15:00 收盘处理。
#[derive(Clone)]
pub struct EastmoneyProvider {
    client: Client,
    base_url: String,
}

impl EastmoneyProvider {
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(10))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize, Debug)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Deserialize, Debug)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

/// 证券代码 → `secid` (沪市 1.，深市 0.)
pub fn secid(symbol: &ParsedSymbol) -> String {
    match symbol.exchange {
        Exchange::SH => format!("1.{}", symbol.code),
        Exchange::SZ => format!("0.{}", symbol.code),
    }
}

/// 周期 → `klt`
pub fn klt(timeframe: TimeFrame) -> &'static str {
    match timeframe {
        TimeFrame::Minute1 => "1",
        TimeFrame::Minute5 => "5",
        TimeFrame::Minute15 => "15",
        TimeFrame::Minute30 => "30",
        TimeFrame::Minute60 => "60",
        TimeFrame::Day1 => "101",
    }
}

/// 复权方式 → `fqt`
pub fn fqt(adjust: AdjustMode) -> &'static str {
    match adjust {
        AdjustMode::None => "0",
        AdjustMode::Front => "1",
        AdjustMode::Back => "2",
    }
}

fn num(field: Option<&&str>, name: &str, line: &str) -> Result<f64, MarketError> {
    field
        .and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or_else(|| MarketError::Parse(format!("bad {} in kline '{}'", name, line)))
}

/// # Summary
/// 解析单行 K 线。
///
/// # Logic
/// 字段顺序为 `时间,开,收,高,低,成交量,成交额`；日线时间只有日期。
pub fn parse_kline(line: &str) -> Result<Candle, MarketError> {
    let fields: Vec<&str> = line.split(',').collect();
    let stamp = fields
        .first()
        .map(|s| s.trim())
        .ok_or_else(|| MarketError::Parse(format!("empty kline '{}'", line)))?;

    let time = if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M") {
        from_cn_naive(dt)
    } else if let Ok(date) = NaiveDate::parse_from_str(stamp, "%Y-%m-%d") {
        cn_datetime(date, hm(15, 0))
    } else {
        return Err(MarketError::Parse(format!("bad time in kline '{}'", line)));
    };

    Ok(Candle {
        time,
        open: num(fields.get(1), "open", line)?,
        close: num(fields.get(2), "close", line)?,
        high: num(fields.get(3), "high", line)?,
        low: num(fields.get(4), "low", line)?,
        volume: num(fields.get(5), "volume", line)?,
        amount: fields.get(6).and_then(|v| v.trim().parse::<f64>().ok()),
    })
}

/// # Summary
/// 解析 K 线接口的 JSON 响应体。
///
/// # Returns
/// `data` 为空或没有任何 K 线时返回 `NoData`；个别坏行被跳过。
pub fn parse_kline_body(body: &str, symbol: &str) -> Result<Vec<Candle>, MarketError> {
    let resp: KlineResponse =
        serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))?;
    let klines = resp.data.map(|d| d.klines).unwrap_or_default();
    if klines.is_empty() {
        return Err(MarketError::NoData(symbol.to_string()));
    }

    let mut candles = Vec::with_capacity(klines.len());
    for line in &klines {
        match parse_kline(line) {
            Ok(c) => candles.push(c),
            Err(e) => warn!(symbol, error = %e, "skipping malformed kline"),
        }
    }
    if candles.is_empty() {
        return Err(MarketError::Parse(format!("no parsable kline for {}", symbol)));
    }
    Ok(candles)
}

#[async_trait]
impl CandleProvider for EastmoneyProvider {
    /// # Summary
    /// 从东方财富抓取最近 `limit` 根 K 线。
    ///
    /// # Logic
    /// 1. 映射 secid / klt / fqt 参数，`end=20500101` 配合 `lmt` 取最新区间。
    /// 2. 请求并解析 JSON，`data.klines` 为逗号分隔的字符串数组。
    async fn fetch_candles(
        &self,
        symbol: &ParsedSymbol,
        timeframe: TimeFrame,
        adjust: AdjustMode,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let url = format!("{}{}", self.base_url, KLINE_PATH);
        let secid = secid(symbol);
        let lmt = limit.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("secid", secid.as_str()),
                ("klt", klt(timeframe)),
                ("fqt", fqt(adjust)),
                ("lmt", lmt.as_str()),
                ("end", "20500101"),
                ("fields1", "f1,f2,f3,f4,f5,f6"),
                ("fields2", "f51,f52,f53,f54,f55,f56,f57"),
            ])
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

        let candles = parse_kline_body(&body, &symbol.symbol())?;
        debug!(symbol = %symbol.symbol(), %timeframe, count = candles.len(), "eastmoney klines fetched");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intraday_kline_keeps_bar_end() {
        let c = parse_kline("2025-03-04 10:30,11.20,11.25,11.30,11.18,123456,138000000.00").unwrap();
        assert_eq!(c.time.to_rfc3339(), "2025-03-04T02:30:00+00:00");
        assert_eq!(c.open, 11.20);
        assert_eq!(c.close, 11.25);
        assert_eq!(c.high, 11.30);
        assert_eq!(c.low, 11.18);
        assert_eq!(c.volume, 123456.0);
        assert_eq!(c.amount, Some(138000000.0));
    }

    #[test]
    fn test_parse_daily_kline_closes_at_three() {
        let c = parse_kline("2025-03-04,11.20,11.25,11.30,11.18,123456,138000000.00").unwrap();
        assert_eq!(c.time.to_rfc3339(), "2025-03-04T07:00:00+00:00");
    }

    #[test]
    fn test_body_without_data_is_no_data() {
        let err = parse_kline_body(r#"{"rc":0,"data":null}"#, "000001.SZ").unwrap_err();
        assert_eq!(err, MarketError::NoData("000001.SZ".to_string()));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let body = r#"{"data":{"klines":["garbage","2025-03-04 10:30,1,2,3,0.5,10,20"]}}"#;
        let candles = parse_kline_body(body, "000001.SZ").unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn test_parameter_mapping() {
        let p = ParsedSymbol::parse("600519.SH").unwrap();
        assert_eq!(secid(&p), "1.600519");
        assert_eq!(klt(TimeFrame::Day1), "101");
        assert_eq!(fqt(AdjustMode::Front), "1");
    }
}
