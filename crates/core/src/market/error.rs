use thiserror::Error;

/// # Summary
/// 市场数据域错误枚举，处理网络、解析及数据缺失等问题。
///
/// # Invariants
/// - 上游的瞬时故障在 K 线层重试耗尽后统一折叠为 `NoData`，不向账本层泄露传输错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // 网络层错误，包含底层 HTTP 客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误，如字段缺失或格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求区间内没有任何数据
    #[error("No data: {0}")]
    NoData(String),
    // 请求参数非法 (代码、周期等)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl MarketError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::Network(_) | MarketError::Unknown(_))
    }
}
