use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, KillSwitchRequest, KillSwitchResponse};

/// 查询熔断开关
#[utoipa::path(
    get,
    path = "/api/v1/risk/kill_switch",
    tag = "风控 (Risk)",
    responses(
        (status = 200, description = "当前开关状态", body = ApiResponse<KillSwitchResponse>)
    )
)]
pub async fn get_kill_switch(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<KillSwitchResponse>>, ApiError> {
    let ks = state.trade.kill_switch().await?;
    Ok(Json(ApiResponse::ok(ks.into())))
}

/// 切换熔断开关
///
/// 开启后拒绝所有新订单，并撤销全部挂单。
#[utoipa::path(
    post,
    path = "/api/v1/risk/kill_switch",
    tag = "风控 (Risk)",
    request_body = KillSwitchRequest,
    responses(
        (status = 200, description = "切换后的开关状态", body = ApiResponse<KillSwitchResponse>)
    )
)]
pub async fn set_kill_switch(
    State(state): State<AppState>,
    Json(req): Json<KillSwitchRequest>,
) -> Result<Json<ApiResponse<KillSwitchResponse>>, ApiError> {
    tracing::warn!(enabled = req.enabled, "kill switch change requested");
    let ks = state.trade.set_kill_switch(req.enabled).await?;
    Ok(Json(ApiResponse::ok(ks.into())))
}
