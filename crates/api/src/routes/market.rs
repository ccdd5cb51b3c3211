//! # 行情路由控制器
//!
//! 报价、K 线、分时与日线趋势。只读，不触碰交易账本。

use axum::Json;
use axum::extract::{Path, Query, State};
use kaipan_core::common::TimeFrame;
use kaipan_core::market::port::CandleQuery;
use serde::Deserialize;
use utoipa::IntoParams;

use super::{default_adjust, default_candle_limit, default_tf, parse_adjust, parse_timeframe};
use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    ApiResponse, CandleResponse, CandlesResponse, IntradayResponse, QuoteResponse, TrendResponse,
};

#[derive(Deserialize, IntoParams)]
pub struct QuotesQuery {
    /// 逗号分隔的证券代码，如 `000001.SZ,600519.SH`
    pub symbols: String,
}

/// 批量获取实时报价 (短期缓存)
#[utoipa::path(
    get,
    path = "/api/v1/quotes",
    tag = "行情 (Market)",
    params(QuotesQuery),
    responses(
        (status = 200, description = "报价列表", body = ApiResponse<Vec<QuoteResponse>>),
        (status = 400, description = "代码格式非法"),
        (status = 404, description = "一个报价都没有 (NO_DATA)")
    )
)]
pub async fn get_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuotesQuery>,
) -> Result<Json<ApiResponse<Vec<QuoteResponse>>>, ApiError> {
    let symbols: Vec<String> = query
        .symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(ApiError::BadRequest("symbols must not be empty".to_string()));
    }

    let quotes = state.market.get_quotes(&symbols).await?;
    Ok(Json(ApiResponse::ok(quotes.into_iter().map(Into::into).collect())))
}

#[derive(Deserialize, IntoParams)]
pub struct CandlesQuery {
    /// 证券代码
    pub symbol: String,
    /// 周期: 1m / 5m / 15m / 30m / 60m / 1d
    #[serde(default = "default_tf")]
    pub tf: String,
    /// 复权: front / back / none
    #[serde(default = "default_adjust")]
    pub adjust: String,
    /// 返回最近的 bar 数 (1..=1000)
    #[serde(default = "default_candle_limit")]
    pub limit: usize,
    /// 是否包含尚未走完的 bar
    #[serde(default)]
    pub include_incomplete: bool,
}

impl CandlesQuery {
    pub(crate) fn to_query(&self) -> Result<CandleQuery, ApiError> {
        Ok(CandleQuery {
            symbol: self.symbol.clone(),
            timeframe: parse_timeframe(&self.tf)?,
            adjust: parse_adjust(&self.adjust)?,
            limit: self.limit,
            include_incomplete: self.include_incomplete,
        })
    }
}

/// 获取 K 线 (bar 结束时间语义)
///
/// `candles[].time` 为 bar 的结束时间；默认只返回已走完的 bar，
/// `last_complete_time` 为最近一根已完成 bar 的结束时间。
#[utoipa::path(
    get,
    path = "/api/v1/candles",
    tag = "行情 (Market)",
    params(CandlesQuery),
    responses(
        (status = 200, description = "K 线序列", body = ApiResponse<CandlesResponse>),
        (status = 400, description = "参数非法"),
        (status = 404, description = "区间内无数据 (NO_DATA)")
    )
)]
pub async fn get_candles(
    State(state): State<AppState>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<ApiResponse<CandlesResponse>>, ApiError> {
    let candle_query = query.to_query()?;
    let series = state.market.get_candles(&candle_query).await?;

    Ok(Json(ApiResponse::ok(CandlesResponse {
        symbol: candle_query.symbol,
        tf: candle_query.timeframe.to_string(),
        adjust: candle_query.adjust.to_string(),
        last_complete_time: series.last_complete_time,
        candles: series.candles.iter().map(CandleResponse::from).collect(),
    })))
}

fn default_period() -> String {
    "1".to_string()
}

#[derive(Deserialize, IntoParams)]
pub struct IntradayQuery {
    /// 分钟周期: 1 / 5 / 15 / 30 / 60 (也接受 `5m` 写法)
    #[serde(default = "default_period")]
    pub period: String,
}

/// 解析分时周期，纯数字按分钟处理，日线不允许
fn parse_period(period: &str) -> Result<TimeFrame, ApiError> {
    let period = period.trim();
    let tf = if !period.is_empty() && period.bytes().all(|b| b.is_ascii_digit()) {
        parse_timeframe(&format!("{}m", period))?
    } else {
        parse_timeframe(period)?
    };
    if tf.intraday_minutes().is_none() {
        return Err(ApiError::BadRequest(format!(
            "period must be a minute timeframe, got {}",
            period
        )));
    }
    Ok(tf)
}

/// 获取最近交易日的分时 bar 与分时均价 (VWAP)
///
/// `avg_price = Σ(close × volume) / Σvolume`，总成交量为 0 时取收盘价均值。
/// 包含尚未走完的 bar，结果按配置缓存 (默认 60 秒)。
#[utoipa::path(
    get,
    path = "/api/v1/intraday/{symbol}",
    tag = "行情 (Market)",
    params(("symbol" = String, Path, description = "证券代码"), IntradayQuery),
    responses(
        (status = 200, description = "分时数据", body = ApiResponse<IntradayResponse>),
        (status = 400, description = "代码或周期非法"),
        (status = 404, description = "无分钟数据 (NO_DATA)")
    )
)]
pub async fn get_intraday(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<IntradayQuery>,
) -> Result<Json<ApiResponse<IntradayResponse>>, ApiError> {
    let timeframe = parse_period(&query.period)?;
    let series = state.market.intraday(&symbol, timeframe).await?;
    Ok(Json(ApiResponse::ok(series.into())))
}

#[derive(Deserialize, IntoParams)]
pub struct TrendQuery {
    pub symbol: String,
    /// 均线周期 (5..=60)，默认取风控配置
    pub ma: Option<usize>,
    /// 斜率回看天数 (1..=20)，默认取风控配置
    pub lookback: Option<usize>,
}

/// 日线均线趋势 (UP / DOWN / FLAT)
///
/// 基于前复权日线，避免除权造成的假突破。
#[utoipa::path(
    get,
    path = "/api/v1/trend/daily",
    tag = "行情 (Market)",
    params(TrendQuery),
    responses(
        (status = 200, description = "趋势分类", body = ApiResponse<TrendResponse>),
        (status = 400, description = "参数非法"),
        (status = 404, description = "日线不足 (NO_DATA)")
    )
)]
pub async fn get_daily_trend(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<ApiResponse<TrendResponse>>, ApiError> {
    let ma = query.ma.unwrap_or(state.risk.trend_ma_period);
    let lookback = query.lookback.unwrap_or(state.risk.trend_lookback);
    if !(5..=60).contains(&ma) || !(1..=20).contains(&lookback) {
        return Err(ApiError::BadRequest(format!(
            "ma must be within 5..=60 and lookback within 1..=20, got ({}, {})",
            ma, lookback
        )));
    }

    let trend = state.market.daily_trend(&query.symbol, ma, lookback).await?;
    Ok(Json(ApiResponse::ok(trend.into())))
}
