//! # 账户资产路由控制器
//!
//! 资金、持仓与盈亏视图；持仓按最新报价盯市。

use axum::Json;
use axum::extract::{Query, State};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    AccountResponse, ApiResponse, DailyPnlResponse, PnlResponse, PositionResponse,
};

/// 获取账户资金快照
///
/// 返回现金、冻结资金、可用资金、持仓市值与总资产。
#[utoipa::path(
    get,
    path = "/api/v1/account",
    tag = "账户 (Account)",
    responses(
        (status = 200, description = "成功获取账户快照", body = ApiResponse<AccountResponse>)
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountResponse>>, ApiError> {
    let snapshot = state.trade.account().await?;
    Ok(Json(ApiResponse::ok(snapshot.into())))
}

/// 获取全部持仓
#[utoipa::path(
    get,
    path = "/api/v1/positions",
    tag = "账户 (Account)",
    responses(
        (status = 200, description = "持仓列表", body = ApiResponse<Vec<PositionResponse>>)
    )
)]
pub async fn get_positions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PositionResponse>>>, ApiError> {
    let positions = state.trade.positions().await?;
    Ok(Json(ApiResponse::ok(positions.into_iter().map(Into::into).collect())))
}

/// 盈亏汇总：今日盈亏、累计盈亏、已实现与浮动盈亏
#[utoipa::path(
    get,
    path = "/api/v1/pnl",
    tag = "账户 (Account)",
    responses(
        (status = 200, description = "盈亏汇总", body = ApiResponse<PnlResponse>)
    )
)]
pub async fn get_pnl(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PnlResponse>>, ApiError> {
    let summary = state.trade.pnl_summary().await?;
    Ok(Json(ApiResponse::ok(summary.into())))
}

#[derive(Deserialize, IntoParams)]
pub struct DailyPnlQuery {
    /// 起始日期 (含)，YYYY-MM-DD
    pub from: Option<NaiveDate>,
    /// 截止日期 (含)，YYYY-MM-DD
    pub to: Option<NaiveDate>,
}

/// 日终盈亏记录 (按日期升序)
#[utoipa::path(
    get,
    path = "/api/v1/pnl/daily",
    tag = "账户 (Account)",
    params(DailyPnlQuery),
    responses(
        (status = 200, description = "日终盈亏", body = ApiResponse<Vec<DailyPnlResponse>>),
        (status = 400, description = "日期格式非法")
    )
)]
pub async fn get_daily_pnl(
    State(state): State<AppState>,
    Query(query): Query<DailyPnlQuery>,
) -> Result<Json<ApiResponse<Vec<DailyPnlResponse>>>, ApiError> {
    let rows = state.trade.daily_pnl(query.from, query.to).await?;
    Ok(Json(ApiResponse::ok(rows.into_iter().map(Into::into).collect())))
}
