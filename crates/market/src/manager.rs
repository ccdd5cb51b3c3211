use crate::candle::CandleStore;
use crate::intraday::IntradayService;
use crate::quote::QuoteService;
use crate::retry::RetryPolicy;
use crate::trend::TrendService;
use async_trait::async_trait;
use kaipan_cache::mem::MemCache;
use kaipan_core::common::time::TimeProvider;
use kaipan_core::config::MarketConfig;
use kaipan_core::common::TimeFrame;
use kaipan_core::market::entity::{CandleSeries, DailyTrend, IntradaySeries, Quote};
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::{CandleProvider, CandleQuery, Market, QuoteProvider};
use kaipan_indicator::trend::TrendBands;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// # Summary
/// Market 领域服务的具体实现类，组合 K 线仓库、报价服务、趋势服务与分时服务。
///
/// # Invariants
/// - 每个子服务独占自己的 TTL 缓存，互不共享，也不触碰交易账本。
pub struct MarketImpl {
    candles: Arc<CandleStore>,
    quotes: QuoteService,
    trend: TrendService,
    intraday: IntradayService,
}

impl MarketImpl {
    /// # Summary
    /// 初始化 Market 领域服务。
    ///
    /// # Logic
    /// 1. 按配置为 K 线、报价、趋势、分时各建一个有界 TTL 缓存。
    /// 2. 组装子服务，趋势与分时服务复用 K 线仓库。
    ///
    /// # Arguments
    /// * `candle_provider`: 历史 K 线数据源。
    /// * `quote_provider`: 实时报价数据源。
    /// * `clock`: 时间供给器，决定 bar 完成性。
    /// * `config`: 行情配置。
    pub fn new(
        candle_provider: Arc<dyn CandleProvider>,
        quote_provider: Arc<dyn QuoteProvider>,
        clock: Arc<dyn TimeProvider>,
        config: &MarketConfig,
    ) -> Arc<Self> {
        let retry = RetryPolicy::from_config(config);
        let cache = |secs: u64| Arc::new(MemCache::new(Duration::from_secs(secs), config.cache_capacity));

        let candles = Arc::new(CandleStore::new(
            candle_provider,
            cache(config.candle_cache_seconds),
            clock,
            retry,
        ));
        let quotes = QuoteService::new(quote_provider, cache(config.quote_cache_seconds), retry);
        let trend = TrendService::new(
            candles.clone(),
            cache(config.trend_cache_seconds),
            TrendBands {
                eps_down: config.trend_eps_down,
                eps_up: config.trend_eps_up,
            },
        );
        let intraday = IntradayService::new(candles.clone(), cache(config.intraday_cache_seconds));
        info!(
            quote_ttl = config.quote_cache_seconds,
            candle_ttl = config.candle_cache_seconds,
            "market service initialized"
        );

        Arc::new(Self {
            candles,
            quotes,
            trend,
            intraday,
        })
    }

    /// 丢弃某证券的报价与 K 线缓存
    pub async fn invalidate(&self, symbol: &str) -> Result<(), MarketError> {
        self.quotes.invalidate(symbol).await?;
        self.candles.invalidate(symbol).await
    }
}

#[async_trait]
impl Market for MarketImpl {
    async fn get_candles(&self, query: &CandleQuery) -> Result<CandleSeries, MarketError> {
        self.candles.get_candles(query).await
    }

    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketError> {
        self.quotes.get_quotes(symbols).await
    }

    async fn daily_trend(
        &self,
        symbol: &str,
        ma: usize,
        lookback: usize,
    ) -> Result<DailyTrend, MarketError> {
        self.trend.daily_trend(symbol, ma, lookback).await
    }

    async fn intraday(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<IntradaySeries, MarketError> {
        self.intraday.intraday(symbol, timeframe).await
    }
}
