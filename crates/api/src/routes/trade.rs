//! # 订单交易路由控制器
//!
//! 下单、撤单、订单与成交查询、审计事件增量拉取。
//! 风控拒单以 200 + `status = REJECTED` 的订单返回，而不是 HTTP 错误。

use axum::Json;
use axum::extract::{Path, Query, State};
use kaipan_core::trade::entity::{Direction, OrderRequest, OrderStatus, OrderType};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, EventResponse, FillResponse, OrderResponse, PlaceOrderRequest};

fn check_limit(limit: usize, max: usize) -> Result<usize, ApiError> {
    if limit == 0 || limit > max {
        return Err(ApiError::BadRequest(format!(
            "limit must be within 1..={}, got {}",
            max, limit
        )));
    }
    Ok(limit)
}

fn default_order_limit() -> usize {
    200
}

fn default_feed_limit() -> usize {
    500
}

#[derive(Deserialize, IntoParams)]
pub struct OrdersQuery {
    /// 状态过滤，如 `NEW`
    pub status: Option<String>,
    /// 1..=1000
    #[serde(default = "default_order_limit")]
    pub limit: usize,
}

/// 查询订单 (按创建时间倒序)
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "订单交易 (Trade)",
    params(OrdersQuery),
    responses(
        (status = 200, description = "订单列表", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "参数非法")
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ApiError> {
    let limit = check_limit(query.limit, 1000)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let orders = state.trade.list_orders(status, limit).await?;
    Ok(Json(ApiResponse::ok(orders.into_iter().map(Into::into).collect())))
}

/// 提交新订单
///
/// 依次经过事前风控、资源冻结与立即撮合。对价单 (AGGRESSIVE) 按卖一/买一价成交；
/// 限价单未触价时以 NEW 状态挂单，由后台任务继续撮合直至超时。
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "订单交易 (Trade)",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "已受理 (NEW/FILLED) 或被风控拒绝 (REJECTED) 的订单", body = ApiResponse<OrderResponse>),
        (status = 400, description = "请求格式非法")
    )
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let direction: Direction = req.direction.parse().map_err(ApiError::BadRequest)?;
    let order_type: OrderType = req.order_type.parse().map_err(ApiError::BadRequest)?;

    let order = state
        .trade
        .place_order(OrderRequest {
            symbol: req.symbol.trim().to_uppercase(),
            direction,
            quantity: req.quantity,
            order_type,
            limit_price: req.limit_price,
            client_order_id: req.client_order_id,
        })
        .await?;
    Ok(Json(ApiResponse::ok(order.into())))
}

/// 撤销订单
///
/// 订单已是终态 (FILLED/CANCELED/REJECTED) 时原样返回。
#[utoipa::path(
    post,
    path = "/api/v1/orders/{client_order_id}/cancel",
    tag = "订单交易 (Trade)",
    params(
        ("client_order_id" = String, Path, description = "客户端订单 ID")
    ),
    responses(
        (status = 200, description = "撤单后的订单", body = ApiResponse<OrderResponse>),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(client_order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let order = state.trade.cancel_order(&client_order_id).await?;
    Ok(Json(ApiResponse::ok(order.into())))
}

#[derive(Deserialize, IntoParams)]
pub struct FillsQuery {
    /// 只看某只证券
    pub symbol: Option<String>,
    /// 1..=2000
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

/// 成交流水 (倒序)
#[utoipa::path(
    get,
    path = "/api/v1/fills",
    tag = "订单交易 (Trade)",
    params(FillsQuery),
    responses(
        (status = 200, description = "成交列表", body = ApiResponse<Vec<FillResponse>>),
        (status = 400, description = "参数非法")
    )
)]
pub async fn list_fills(
    State(state): State<AppState>,
    Query(query): Query<FillsQuery>,
) -> Result<Json<ApiResponse<Vec<FillResponse>>>, ApiError> {
    let limit = check_limit(query.limit, 2000)?;
    let fills = state.trade.list_fills(query.symbol.as_deref(), limit).await?;
    Ok(Json(ApiResponse::ok(fills.into_iter().map(Into::into).collect())))
}

#[derive(Deserialize, IntoParams)]
pub struct EventsQuery {
    /// 只返回 id 大于该值的事件
    #[serde(default)]
    pub since_id: u64,
    /// 1..=2000
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

/// 审计事件 (按 id 升序，支持增量轮询)
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "订单交易 (Trade)",
    params(EventsQuery),
    responses(
        (status = 200, description = "事件列表", body = ApiResponse<Vec<EventResponse>>),
        (status = 400, description = "参数非法")
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<Vec<EventResponse>>>, ApiError> {
    let limit = check_limit(query.limit, 2000)?;
    let events = state.trade.list_events(query.since_id, limit).await?;
    Ok(Json(ApiResponse::ok(events.into_iter().map(Into::into).collect())))
}
