use crate::candle::{CandleStore, MAX_LIMIT};
use kaipan_core::cache::port::{Cache, CacheExt};
use kaipan_core::common::session::trading_date;
use kaipan_core::common::{AdjustMode, TimeFrame};
use kaipan_core::market::entity::IntradaySeries;
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::CandleQuery;
use kaipan_indicator::vwap::vwap;
use std::sync::Arc;
use tracing::{debug, warn};

/// # Summary
/// 分时服务：最近一个交易日的分钟 bar + 分时均价，按 (symbol, timeframe) 缓存。
pub struct IntradayService {
    candles: Arc<CandleStore>,
    cache: Arc<dyn Cache>,
}

impl IntradayService {
    pub fn new(candles: Arc<CandleStore>, cache: Arc<dyn Cache>) -> Self {
        Self { candles, cache }
    }

    /// # Summary
    /// 获取分时数据。
    ///
    /// # Logic
    /// 1. 命中缓存直接返回。
    /// 2. 拉取不复权分钟线 (含未走完的 bar)。
    /// 3. 只保留最后一根 bar 所在交易日的数据，非交易时段展示上一交易日。
    /// 4. 计算分时均价并写入缓存。
    pub async fn intraday(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<IntradaySeries, MarketError> {
        if timeframe.intraday_minutes().is_none() {
            return Err(MarketError::InvalidRequest(format!(
                "intraday requires a minute timeframe, got {}",
                timeframe
            )));
        }

        let key = format!("intraday:{}:{}", symbol, timeframe);
        match self.cache.get::<IntradaySeries>(&key).await {
            Ok(Some(s)) => {
                debug!(key = %key, "intraday cache hit");
                return Ok(s);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "intraday cache read failed"),
        }

        let series = self
            .candles
            .get_candles(&CandleQuery {
                symbol: symbol.to_string(),
                timeframe,
                adjust: AdjustMode::None,
                limit: MAX_LIMIT,
                include_incomplete: true,
            })
            .await?;

        let date = series
            .candles
            .last()
            .map(|c| trading_date(c.time))
            .ok_or_else(|| MarketError::NoData(format!("{}: no {} bars", symbol, timeframe)))?;
        let bars: Vec<_> = series
            .candles
            .into_iter()
            .filter(|c| trading_date(c.time) == date)
            .collect();
        let avg_price = vwap(&bars)
            .ok_or_else(|| MarketError::NoData(format!("{}: no {} bars", symbol, timeframe)))?;

        let out = IntradaySeries {
            symbol: symbol.to_string(),
            timeframe,
            date,
            bars,
            avg_price,
        };
        debug!(symbol, %date, bars = out.bars.len(), avg_price, "intraday computed");

        if let Err(e) = self.cache.set(&key, &out).await {
            warn!(key = %key, error = %e, "intraday cache write failed");
        }
        Ok(out)
    }
}
