use chrono::{DateTime, Utc};
use kaipan_core::market::entity::Candle;

/// # Summary
/// 将成交映射到其所属的 K 线。
///
/// # Logic
/// K 线的 `time` 是 bar 结束时间，因此取第一根 `time >= trade_time` 的 K 线
/// (边界归属左侧 bar)。成交晚于全部已知 K 线时归入最后一根。
///
/// # Arguments
/// * `trade_time`: 成交时间。
/// * `candles`: 按时间严格递增的 K 线序列。
///
/// # Returns
/// K 线下标；序列为空时返回 `None`。
pub fn map_fill_to_candle(trade_time: DateTime<Utc>, candles: &[Candle]) -> Option<usize> {
    if candles.is_empty() {
        return None;
    }
    let idx = candles.partition_point(|c| c.time < trade_time);
    Some(idx.min(candles.len() - 1))
}
