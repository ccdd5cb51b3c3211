use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::TimeFrame;

/// # Summary
/// 单根 K 线数据实体。
///
/// # Invariants
/// - `time` 是 bar 的结束时间 (UTC)，而不是开始时间。
/// - `high` 必须大于或等于 `low`, `open`, `close`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // K 线结束时间
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量 (股)
    pub volume: f64,
    // 成交额 (元)，部分数据源缺失
    pub amount: Option<f64>,
}

impl Candle {
    /// 价格字段是否全部为有限值
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// # Summary
/// K 线查询结果，附带最近一个已完成 bar 的结束时间。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub candles: Vec<Candle>,
    pub last_complete_time: DateTime<Utc>,
}

/// # Summary
/// 实时盘口快照。
///
/// # Invariants
/// - 所有价格均为 `Decimal`，不参与浮点运算。
/// - `volume` 以手 (100 股) 计，`amount` 以万元计。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    // 最新价
    pub last: Decimal,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    // 买一价
    pub bid1: Option<Decimal>,
    // 卖一价
    pub ask1: Option<Decimal>,
    pub bid1_volume: Option<u64>,
    pub ask1_volume: Option<u64>,
    // 昨收
    pub prev_close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub amount: Option<Decimal>,
    // 行情源给出的报价时间
    pub quote_time: Option<DateTime<Utc>>,
    pub source: String,
}

impl Quote {
    /// 买一价；缺失或非正时回落到最新价
    pub fn bid(&self) -> Decimal {
        self.bid1.filter(|p| *p > Decimal::ZERO).unwrap_or(self.last)
    }

    /// 卖一价；缺失或非正时回落到最新价
    pub fn ask(&self) -> Decimal {
        self.ask1.filter(|p| *p > Decimal::ZERO).unwrap_or(self.last)
    }

    pub fn mid(&self) -> Decimal {
        (self.bid() + self.ask()) / Decimal::TWO
    }
}

/// # Summary
/// 日线趋势分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Down => "DOWN",
            Trend::Flat => "FLAT",
        }
    }
}

/// # Summary
/// 基于前复权日线收盘价计算的均线趋势结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub symbol: String,
    pub trend: Trend,
    // 均线周期
    pub ma: usize,
    // 斜率回看 bar 数
    pub lookback: usize,
    pub ma_last: f64,
    pub close_last: f64,
    pub slope: f64,
    // 计算所用最后一根日线的结束时间
    pub asof: DateTime<Utc>,
}

/// # Summary
/// 最近一个交易日的分时数据与成交量加权均价。
///
/// # Invariants
/// - `bars` 全部属于 `date` 这一交易日 (北京时间)，按时间递增，可包含未走完的 bar。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradaySeries {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub date: NaiveDate,
    pub bars: Vec<Candle>,
    // 分时均价 (VWAP)
    pub avg_price: f64,
}

/// # Summary
/// 单根 K 线对应的 KDJ 三线数值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdjPoint {
    pub time: DateTime<Utc>,
    pub k: f64,
    pub d: f64,
    pub j: f64,
}
