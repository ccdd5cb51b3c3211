//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。
//! 风控拒单不经过这里：它们是状态为 REJECTED 的正常订单响应。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kaipan_core::market::error::MarketError;
use kaipan_core::trade::port::TradeError;
use kaipan_indicator::IndicatorError;
use thiserror::Error;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举
#[derive(Error, Debug)]
pub enum ApiError {
    /// 资源未找到 (404, `NOT_FOUND`)
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 请求区间内没有数据 (404, `NO_DATA`)，与请求失败区分开
    #[error("无数据: {0}")]
    NoData(String),

    /// 请求参数错误 (400)
    #[error("请求参数错误: {0}")]
    BadRequest(String),

    /// 下层业务错误 (500)
    #[error("内部服务错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::NoData(_) => "NO_DATA",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::NoData(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!("内部服务错误: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "服务器内部错误".to_string())
            }
        };

        (status, Json(ApiErrorResponse::new(code, message))).into_response()
    }
}

/// 从 `MarketError` 转换
impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::NoData(msg) => ApiError::NoData(msg),
            MarketError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// 从 `TradeError` 转换
impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::OrderNotFound(id) => ApiError::NotFound(format!("order {}", id)),
            TradeError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            TradeError::Market(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IndicatorError> for ApiError {
    fn from(err: IndicatorError) -> Self {
        match err {
            IndicatorError::InvalidParameter(msg) => ApiError::BadRequest(msg),
            e @ IndicatorError::NotEnoughBars { .. } => ApiError::NoData(e.to_string()),
        }
    }
}
