//! # 路由控制器
//!
//! 每个模块对应一个 OpenAPI tag，所有路径位于 `/api/v1` 下。

pub mod account;
pub mod indicator;
pub mod market;
pub mod risk;
pub mod trade;

use kaipan_core::common::{AdjustMode, TimeFrame};

use crate::error::ApiError;

/// 解析 K 线周期参数
pub(crate) fn parse_timeframe(tf: &str) -> Result<TimeFrame, ApiError> {
    tf.parse().map_err(ApiError::BadRequest)
}

/// 解析复权方式参数
pub(crate) fn parse_adjust(adjust: &str) -> Result<AdjustMode, ApiError> {
    adjust.parse().map_err(ApiError::BadRequest)
}

pub(crate) fn default_tf() -> String {
    "60m".to_string()
}

pub(crate) fn default_adjust() -> String {
    "front".to_string()
}

pub(crate) fn default_candle_limit() -> usize {
    400
}
