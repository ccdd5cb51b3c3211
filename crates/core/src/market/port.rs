use crate::common::{AdjustMode, ParsedSymbol, TimeFrame};
use crate::market::entity::{Candle, CandleSeries, DailyTrend, IntradaySeries, Quote};
use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// K 线查询参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleQuery {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub adjust: AdjustMode,
    // 返回最近的 bar 数量上限
    pub limit: usize,
    // 是否包含尚未走完的 bar
    pub include_incomplete: bool,
}

/// # Summary
/// 实时报价数据源接口 (原始数据源)。
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// # Summary
    /// 批量拉取实时报价。
    ///
    /// # Logic
    /// 1. 将证券代码转换为数据源格式，单次请求拉取全部标的。
    /// 2. 解析响应，无法识别的标的直接跳过。
    ///
    /// # Arguments
    /// * `symbols`: 已校验的证券代码列表。
    ///
    /// # Returns
    /// 成功返回解析出的报价 (可能少于请求数量)。
    async fn fetch_quotes(&self, symbols: &[ParsedSymbol]) -> Result<Vec<Quote>, MarketError>;
}

/// # Summary
/// 历史 K 线数据源接口 (原始数据源)。
///
/// # Invariants
/// - 返回的 `Candle::time` 已经是 bar 结束时间。
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// # Summary
    /// 拉取特定证券最近的 K 线。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `timeframe`: K 线周期。
    /// * `adjust`: 复权方式。
    /// * `limit`: 请求的 bar 数量。
    ///
    /// # Returns
    /// 成功返回原始 K 线 (未排序、未去重)。
    async fn fetch_candles(
        &self,
        symbol: &ParsedSymbol,
        timeframe: TimeFrame,
        adjust: AdjustMode,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketError>;
}

/// # Summary
/// Market 领域服务契约，是交易层与展示层读取行情的唯一入口。
///
/// # Invariants
/// - 只读；实现可以在内部缓存，但不得持有交易账本锁。
#[async_trait]
pub trait Market: Send + Sync {
    /// # Summary
    /// 获取规范化后的 K 线序列。
    ///
    /// # Returns
    /// 区间内无数据时返回 `MarketError::NoData`，不会返回空的成功结果。
    async fn get_candles(&self, query: &CandleQuery) -> Result<CandleSeries, MarketError>;

    /// # Summary
    /// 批量获取实时报价 (带短期缓存)。
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketError>;

    /// # Summary
    /// 计算日线均线趋势 (带缓存)。
    ///
    /// # Arguments
    /// * `ma`: 均线周期。
    /// * `lookback`: 斜率回看 bar 数。
    async fn daily_trend(
        &self,
        symbol: &str,
        ma: usize,
        lookback: usize,
    ) -> Result<DailyTrend, MarketError>;

    /// # Summary
    /// 获取最近一个交易日的分时 bar 与分时均价 (带缓存)。
    ///
    /// # Arguments
    /// * `timeframe`: 分钟周期，日线会被拒绝。
    ///
    /// # Returns
    /// 无分钟数据时返回 `MarketError::NoData`。
    async fn intraday(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<IntradaySeries, MarketError>;
}

/// # Summary
/// `Market` 的便捷扩展。
#[async_trait]
pub trait MarketExt: Market {
    /// 获取单只证券的报价，数据源未返回该标的时为 `None`
    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketError> {
        let quotes = self.get_quotes(&[symbol.to_string()]).await?;
        Ok(quotes.into_iter().find(|q| q.symbol == symbol))
    }
}

impl<T: Market + ?Sized> MarketExt for T {}
