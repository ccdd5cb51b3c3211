use crate::{IndicatorError, count_f64};
use kaipan_core::market::entity::Trend;

/// 趋势判定阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendBands {
    // 斜率低于该值且收盘价在均线下方判为 DOWN
    pub eps_down: f64,
    // 斜率高于该值且收盘价在均线上方判为 UP
    pub eps_up: f64,
}

impl Default for TrendBands {
    fn default() -> Self {
        Self {
            eps_down: -0.008,
            eps_up: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendReading {
    pub trend: Trend,
    pub ma_last: f64,
    pub close_last: f64,
    pub slope: f64,
}

/// Calculate Simple Moving Average
///
/// 输出长度为 `values.len() - period + 1`，第 0 个值对应第一个完整窗口。
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / count_f64(period))
        .collect()
}

/// 根据均线斜率与收盘价位置分类趋势
///
/// `slope = (ma[-1] - ma[-1-lookback]) / ma[-1-lookback]`
///
/// 需要至少 `ma_period + lookback` 个收盘价。
pub fn classify_trend(
    closes: &[f64],
    ma_period: usize,
    lookback: usize,
    bands: TrendBands,
) -> Result<TrendReading, IndicatorError> {
    if ma_period == 0 || lookback == 0 {
        return Err(IndicatorError::InvalidParameter(format!(
            "ma and lookback must be positive, got ({}, {})",
            ma_period, lookback
        )));
    }
    let need = ma_period + lookback;
    if closes.len() < need {
        return Err(IndicatorError::NotEnoughBars {
            need,
            got: closes.len(),
        });
    }

    let ma = sma(closes, ma_period);
    let (Some(&ma_last), Some(&close_last)) = (ma.last(), closes.last()) else {
        return Err(IndicatorError::NotEnoughBars {
            need,
            got: closes.len(),
        });
    };
    let ma_prev = ma[ma.len() - 1 - lookback];
    let slope = if ma_prev == 0.0 {
        0.0
    } else {
        (ma_last - ma_prev) / ma_prev
    };

    let trend = if slope < bands.eps_down && close_last < ma_last {
        Trend::Down
    } else if slope > bands.eps_up && close_last > ma_last {
        Trend::Up
    } else {
        Trend::Flat
    };

    Ok(TrendReading {
        trend,
        ma_last,
        close_last,
        slope,
    })
}
