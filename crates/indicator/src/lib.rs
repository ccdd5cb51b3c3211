//! # 技术指标
//!
//! 纯函数实现，无 IO、无共享状态。服务端计算一次，以数据形式提供给展示层。

pub mod kdj;
pub mod mapper;
pub mod trend;
pub mod vwap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("not enough bars: need {need}, got {got}")]
    NotEnoughBars { need: usize, got: usize },
}

/// 将计数转换为浮点数；超出 u32 范围的长度在指标场景中不会出现
pub(crate) fn count_f64(n: usize) -> f64 {
    u32::try_from(n).map(f64::from).unwrap_or(f64::from(u32::MAX))
}
