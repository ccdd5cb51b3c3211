use crate::retry::{RetryPolicy, with_backoff};
use chrono::{DateTime, Utc};
use kaipan_core::cache::port::{Cache, CacheExt};
use kaipan_core::common::session::last_complete_bar_end;
use kaipan_core::common::time::TimeProvider;
use kaipan_core::common::{AdjustMode, ParsedSymbol, TimeFrame};
use kaipan_core::market::entity::{Candle, CandleSeries};
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::{CandleProvider, CandleQuery};
use std::sync::Arc;
use tracing::{debug, warn};

/// 单次请求可返回的最大 bar 数
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_LIMIT: usize = 400;
// 上游按最大窗口拉取并缓存，不同 limit 的请求共享同一份原始数据
const FETCH_BARS: usize = MAX_LIMIT + 16;

/// # Summary
/// K 线仓库：拉取、缓存并规范化上游 K 线。
///
/// # Invariants
/// - 输出严格按 `time` 递增，无重复 bar，`time` 为 bar 结束时间。
/// - 默认只输出已走完的 bar。
/// - 上游故障在重试耗尽后以 `NoData` 形式暴露。
pub struct CandleStore {
    provider: Arc<dyn CandleProvider>,
    // 原始 bar 缓存，Key 为 symbol/timeframe/adjust
    cache: Arc<dyn Cache>,
    clock: Arc<dyn TimeProvider>,
    retry: RetryPolicy,
}

fn cache_key(symbol: &str, timeframe: TimeFrame, adjust: AdjustMode) -> String {
    format!("candles:{}:{}:{}", symbol, timeframe, adjust)
}

impl CandleStore {
    pub fn new(
        provider: Arc<dyn CandleProvider>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn TimeProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            clock,
            retry,
        }
    }

    /// # Summary
    /// 获取规范化后的 K 线序列。
    ///
    /// # Logic
    /// 1. 校验 `limit` 与证券代码。
    /// 2. 读取原始 bar (缓存优先，未命中则带退避重试地请求上游)。
    /// 3. 按当前时钟计算最近完成的 bar 结束时间并规范化。
    pub async fn get_candles(&self, query: &CandleQuery) -> Result<CandleSeries, MarketError> {
        if query.limit == 0 || query.limit > MAX_LIMIT {
            return Err(MarketError::InvalidRequest(format!(
                "limit must be within 1..={}, got {}",
                MAX_LIMIT, query.limit
            )));
        }
        let symbol = ParsedSymbol::parse(&query.symbol)
            .map_err(|e| MarketError::InvalidRequest(e.to_string()))?;

        let raw = self.raw_bars(&symbol, query.timeframe, query.adjust).await?;
        let last_complete = last_complete_bar_end(self.clock.now(), query.timeframe);
        let candles = normalize(raw, last_complete, query.include_incomplete, query.limit);

        if candles.is_empty() {
            return Err(MarketError::NoData(format!(
                "{} {} has no bars up to {}",
                query.symbol, query.timeframe, last_complete
            )));
        }
        Ok(CandleSeries {
            candles,
            last_complete_time: last_complete,
        })
    }

    /// 丢弃某证券全部周期的缓存
    pub async fn invalidate(&self, symbol: &str) -> Result<(), MarketError> {
        for timeframe in [
            TimeFrame::Minute1,
            TimeFrame::Minute5,
            TimeFrame::Minute15,
            TimeFrame::Minute30,
            TimeFrame::Minute60,
            TimeFrame::Day1,
        ] {
            for adjust in [AdjustMode::Front, AdjustMode::Back, AdjustMode::None] {
                self.cache
                    .del(&cache_key(symbol, timeframe, adjust))
                    .await
                    .map_err(|e| MarketError::Unknown(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn raw_bars(
        &self,
        symbol: &ParsedSymbol,
        timeframe: TimeFrame,
        adjust: AdjustMode,
    ) -> Result<Vec<Candle>, MarketError> {
        let name = symbol.symbol();
        let key = cache_key(&name, timeframe, adjust);

        match self.cache.get::<Vec<Candle>>(&key).await {
            Ok(Some(bars)) => {
                debug!(key = %key, "candle cache hit");
                return Ok(bars);
            }
            Ok(None) => debug!(key = %key, "candle cache miss"),
            Err(e) => warn!(key = %key, error = %e, "candle cache read failed"),
        }

        let bars = with_backoff(self.retry, "candles", || {
            self.provider
                .fetch_candles(symbol, timeframe, adjust, FETCH_BARS)
        })
        .await
        .map_err(|e| match e {
            MarketError::InvalidRequest(_) | MarketError::NoData(_) => e,
            other => {
                warn!(symbol = %name, %timeframe, error = %other, "candle upstream exhausted");
                MarketError::NoData(format!("{}: upstream unavailable ({})", name, other))
            }
        })?;

        if let Err(e) = self.cache.set(&key, &bars).await {
            warn!(key = %key, error = %e, "candle cache write failed");
        }
        Ok(bars)
    }
}

/// # Summary
/// 将原始 bar 规范化为对外输出的序列。
///
/// # Logic
/// 1. 丢弃价格非有限值的 bar。
/// 2. 按时间稳定排序；同一 bar 出现多次时保留后出现的记录。
/// 3. 除非显式要求，过滤掉结束时间晚于 `last_complete` 的 bar。
/// 4. 保留最近的 `limit` 根。
pub fn normalize(
    raw: Vec<Candle>,
    last_complete: DateTime<Utc>,
    include_incomplete: bool,
    limit: usize,
) -> Vec<Candle> {
    let mut bars: Vec<Candle> = raw.into_iter().filter(Candle::is_finite).collect();
    bars.sort_by_key(|c| c.time);

    let mut out: Vec<Candle> = Vec::with_capacity(bars.len());
    for bar in bars {
        if !include_incomplete && bar.time > last_complete {
            continue;
        }
        match out.last_mut() {
            Some(prev) if prev.time == bar.time => *prev = bar,
            _ => out.push(bar),
        }
    }

    if out.len() > limit {
        out.drain(..out.len() - limit);
    }
    out
}
