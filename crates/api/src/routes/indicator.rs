//! # 指标路由控制器
//!
//! KDJ 与成交落点都在服务端计算一次，展示层直接消费结果，不再自行重算。

use axum::Json;
use axum::extract::{Query, State};
use chrono::Duration;
use kaipan_indicator::kdj::{KdjParams, compute_kdj};
use kaipan_indicator::mapper::map_fill_to_candle;
use serde::Deserialize;
use utoipa::IntoParams;

use super::{default_adjust, default_candle_limit, default_tf};
use crate::error::ApiError;
use crate::routes::market::CandlesQuery;
use crate::server::AppState;
use crate::types::{ApiResponse, CandleFillResponse, KdjPointResponse};

// 成交落点查询拉取的流水上限
const FILL_SCAN_LIMIT: usize = 2000;

#[derive(Deserialize, IntoParams)]
pub struct KdjQuery {
    pub symbol: String,
    #[serde(default = "default_tf")]
    pub tf: String,
    #[serde(default = "default_adjust")]
    pub adjust: String,
    #[serde(default = "default_candle_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_incomplete: bool,
    /// RSV 窗口，默认 9
    pub n: Option<usize>,
    /// K 平滑，默认 3
    pub m1: Option<usize>,
    /// D 平滑，默认 3
    pub m2: Option<usize>,
}

/// 计算 KDJ
#[utoipa::path(
    get,
    path = "/api/v1/indicators/kdj",
    tag = "指标 (Indicator)",
    params(KdjQuery),
    responses(
        (status = 200, description = "与 K 线一一对应的 KDJ 序列", body = ApiResponse<Vec<KdjPointResponse>>),
        (status = 400, description = "参数非法"),
        (status = 404, description = "无 K 线数据 (NO_DATA)")
    )
)]
pub async fn get_kdj(
    State(state): State<AppState>,
    Query(query): Query<KdjQuery>,
) -> Result<Json<ApiResponse<Vec<KdjPointResponse>>>, ApiError> {
    let defaults = KdjParams::default();
    let params = KdjParams {
        n: query.n.unwrap_or(defaults.n),
        m1: query.m1.unwrap_or(defaults.m1),
        m2: query.m2.unwrap_or(defaults.m2),
    };
    params.validate()?;

    let candles_query = CandlesQuery {
        symbol: query.symbol,
        tf: query.tf,
        adjust: query.adjust,
        limit: query.limit,
        include_incomplete: query.include_incomplete,
    };
    let series = state.market.get_candles(&candles_query.to_query()?).await?;
    let points = compute_kdj(&series.candles, params)?;

    Ok(Json(ApiResponse::ok(points.into_iter().map(Into::into).collect())))
}

/// 将该证券的成交映射到 K 线
///
/// 每笔成交归入第一根结束时间不早于成交时间的 bar；
/// 早于首根 bar 开始时间的成交不在返回序列范围内，被跳过。
#[utoipa::path(
    get,
    path = "/api/v1/candles/fills",
    tag = "指标 (Indicator)",
    params(CandlesQuery),
    responses(
        (status = 200, description = "成交落点", body = ApiResponse<Vec<CandleFillResponse>>),
        (status = 400, description = "参数非法"),
        (status = 404, description = "无 K 线数据 (NO_DATA)")
    )
)]
pub async fn get_candle_fills(
    State(state): State<AppState>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<ApiResponse<Vec<CandleFillResponse>>>, ApiError> {
    let candle_query = query.to_query()?;
    let series = state.market.get_candles(&candle_query).await?;
    let Some(first) = series.candles.first() else {
        return Ok(Json(ApiResponse::ok(Vec::new())));
    };
    // 首根 bar 的开始时间 = 结束时间 - 周期长度
    let span = candle_query
        .timeframe
        .intraday_minutes()
        .map(|m| Duration::minutes(i64::from(m)))
        .unwrap_or(Duration::days(1));
    let window_start = first.time - span;

    let mut fills = state
        .trade
        .list_fills(Some(&query.symbol), FILL_SCAN_LIMIT)
        .await?;
    fills.reverse();

    let mapped = fills
        .into_iter()
        .filter(|f| f.trade_time > window_start)
        .filter_map(|f| {
            let idx = map_fill_to_candle(f.trade_time, &series.candles)?;
            let candle = series.candles.get(idx)?;
            Some(CandleFillResponse {
                candle_index: idx,
                candle_time: candle.time,
                fill_id: f.fill_id,
                client_order_id: f.client_order_id,
                direction: f.direction.as_str().to_string(),
                quantity: f.quantity,
                price: f.price.to_string(),
                trade_time: f.trade_time,
            })
        })
        .collect();

    Ok(Json(ApiResponse::ok(mapped)))
}
