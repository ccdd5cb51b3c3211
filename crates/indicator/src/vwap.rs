use kaipan_core::market::entity::Candle;

use crate::count_f64;

/// # Summary
/// 成交量加权均价 (分时均价线)。
///
/// # Logic
/// `Σ(close × volume) / Σvolume`；总成交量为 0 时退化为收盘价的算术平均。
///
/// # Returns
/// 序列为空时返回 `None`。
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let (value, volume) = candles
        .iter()
        .fold((0.0, 0.0), |(v, q), c| (v + c.close * c.volume, q + c.volume));
    if volume > 0.0 {
        return Some(value / volume);
    }
    let sum: f64 = candles.iter().map(|c| c.close).sum();
    Some(sum / count_f64(candles.len()))
}
