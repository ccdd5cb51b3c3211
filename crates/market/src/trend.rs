use crate::candle::{CandleStore, MAX_LIMIT};
use kaipan_core::cache::port::{Cache, CacheExt};
use kaipan_core::common::{AdjustMode, TimeFrame};
use kaipan_core::market::entity::DailyTrend;
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::CandleQuery;
use kaipan_indicator::IndicatorError;
use kaipan_indicator::trend::{TrendBands, classify_trend};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// # Summary
/// 日线趋势服务：前复权日线 + 均线斜率分类，结果按 (symbol, ma, lookback) 缓存。
pub struct TrendService {
    candles: Arc<CandleStore>,
    cache: Arc<dyn Cache>,
    bands: TrendBands,
}

impl TrendService {
    pub fn new(candles: Arc<CandleStore>, cache: Arc<dyn Cache>, bands: TrendBands) -> Self {
        Self {
            candles,
            cache,
            bands,
        }
    }

    /// # Summary
    /// 计算日线趋势。
    ///
    /// # Logic
    /// 1. 命中缓存直接返回。
    /// 2. 拉取已完成的前复权日线 (至少 `ma + lookback` 根)。
    /// 3. 计算均线斜率并分类，写入缓存。
    ///
    /// # Returns
    /// 日线不足时返回 `NoData`。
    pub async fn daily_trend(
        &self,
        symbol: &str,
        ma: usize,
        lookback: usize,
    ) -> Result<DailyTrend, MarketError> {
        let key = format!("trend:{}:{}:{}", symbol, ma, lookback);
        match self.cache.get::<DailyTrend>(&key).await {
            Ok(Some(t)) => {
                debug!(key = %key, "trend cache hit");
                return Ok(t);
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "trend cache read failed"),
        }

        let need = ma.saturating_add(lookback);
        if ma == 0 || lookback == 0 || need > MAX_LIMIT {
            return Err(MarketError::InvalidRequest(format!(
                "ma and lookback must be positive and ma + lookback <= {}",
                MAX_LIMIT
            )));
        }

        let series = self
            .candles
            .get_candles(&CandleQuery {
                symbol: symbol.to_string(),
                timeframe: TimeFrame::Day1,
                adjust: AdjustMode::Front,
                limit: (need + 10).min(MAX_LIMIT),
                include_incomplete: false,
            })
            .await?;

        let closes: Vec<f64> = series.candles.iter().map(|c| c.close).collect();
        let reading = classify_trend(&closes, ma, lookback, self.bands).map_err(|e| match e {
            IndicatorError::NotEnoughBars { .. } => MarketError::NoData(format!("{}: {}", symbol, e)),
            IndicatorError::InvalidParameter(msg) => MarketError::InvalidRequest(msg),
        })?;

        let asof = series
            .candles
            .last()
            .map(|c| c.time)
            .unwrap_or(series.last_complete_time);
        let trend = DailyTrend {
            symbol: symbol.to_string(),
            trend: reading.trend,
            ma,
            lookback,
            ma_last: reading.ma_last,
            close_last: reading.close_last,
            slope: reading.slope,
            asof,
        };
        info!(
            symbol,
            trend = trend.trend.as_str(),
            slope = trend.slope,
            close = trend.close_last,
            ma = trend.ma_last,
            "daily trend computed"
        );

        if let Err(e) = self.cache.set(&key, &trend).await {
            warn!(key = %key, error = %e, "trend cache write failed");
        }
        Ok(trend)
    }
}
