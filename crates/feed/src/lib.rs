//! # 行情数据源适配器
//!
//! - `sina`: 新浪实时报价
//! - `eastmoney`: 东方财富历史 K 线

pub mod eastmoney;
pub mod sina;

use kaipan_core::market::error::MarketError;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// 构建带超时与浏览器 UA 的 HTTP 客户端
pub(crate) fn build_client(timeout: Duration) -> Result<Client, MarketError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| MarketError::Unknown(format!("failed to build HTTP client: {}", e)))
}
