use crate::{IndicatorError, count_f64};
use kaipan_core::market::entity::{Candle, KdjPoint};

/// 未满窗口或窗口内最高价等于最低价时的 RSV 取值
const RSV_FALLBACK: f64 = 50.0;

/// KDJ 参数，默认 (9, 3, 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdjParams {
    pub n: usize,
    pub m1: usize,
    pub m2: usize,
}

impl Default for KdjParams {
    fn default() -> Self {
        Self { n: 9, m1: 3, m2: 3 }
    }
}

impl KdjParams {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.n == 0 || self.m1 == 0 || self.m2 == 0 {
            return Err(IndicatorError::InvalidParameter(format!(
                "n, m1, m2 must be positive, got ({}, {}, {})",
                self.n, self.m1, self.m2
            )));
        }
        Ok(())
    }
}

/// Raw Stochastic Value
///
/// `RSV[i] = (close[i] - LLV) / (HHV - LLV) * 100`，窗口为以 i 结尾 (含) 的最近 n 根。
/// 不足 n 根或 HHV == LLV 时固定为 50。
pub fn rsv(candles: &[Candle], n: usize) -> Vec<f64> {
    (0..candles.len())
        .map(|i| {
            if n == 0 || i + 1 < n {
                return RSV_FALLBACK;
            }
            let window = &candles[i + 1 - n..=i];
            let hhv = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let llv = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            if hhv == llv {
                RSV_FALLBACK
            } else {
                (candles[i].close - llv) / (hhv - llv) * 100.0
            }
        })
        .collect()
}

/// 以 `alpha = 1/m` 做指数平滑，首值作为种子
fn smooth(values: &[f64], m: usize) -> Vec<f64> {
    let alpha = 1.0 / count_f64(m);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Calculate KDJ
///
/// 每根输入 K 线输出一个点，顺序一致；第 i 个点只依赖前 i+1 根 K 线。
///
/// - K = EMA(RSV, α = 1/m1)，D = EMA(K, α = 1/m2)，递推指数平滑，`K[0] = RSV[0]`，`D[0] = K[0]`
/// - J = 3K - 2D，不做截断
pub fn compute_kdj(candles: &[Candle], params: KdjParams) -> Result<Vec<KdjPoint>, IndicatorError> {
    params.validate()?;

    let rsv = rsv(candles, params.n);
    let k = smooth(&rsv, params.m1);
    let d = smooth(&k, params.m2);

    Ok(candles
        .iter()
        .zip(k.iter().zip(d.iter()))
        .map(|(candle, (&k, &d))| KdjPoint {
            time: candle.time,
            k,
            d,
            j: 3.0 * k - 2.0 * d,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(bars: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 1, 30, 0).unwrap();
        bars.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                time: start + Duration::minutes(i64::try_from(i).unwrap() * 5),
                open: close,
                high,
                low,
                close,
                volume: 1000.0,
                amount: None,
            })
            .collect()
    }

    #[test]
    fn test_flat_series_stays_at_fifty() {
        let bars = candles(&[(100.0, 100.0, 100.0); 10]);
        let out = compute_kdj(&bars, KdjParams::default()).unwrap();

        assert_eq!(rsv(&bars, 9), vec![50.0; 10]);
        assert_eq!(out.len(), 10);
        for p in &out {
            assert!((p.k - 50.0).abs() < 1e-9);
            assert!((p.d - 50.0).abs() < 1e-9);
            assert!((p.j - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_warmup_uses_fallback_then_real_rsv() {
        let bars = candles(&[(10.0, 8.0, 9.0), (11.0, 9.0, 10.0), (12.0, 10.0, 12.0)]);
        let values = rsv(&bars, 3);
        assert_eq!(values[0], 50.0);
        assert_eq!(values[1], 50.0);
        // HHV=12, LLV=8, close=12
        assert!((values[2] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_recurrence_matches_hand_computation() {
        let bars = candles(&[(10.0, 8.0, 9.0), (12.0, 8.0, 11.0), (12.0, 9.0, 9.0)]);
        let out = compute_kdj(&bars, KdjParams { n: 2, m1: 3, m2: 3 }).unwrap();

        // RSV = [50, 75, 25]
        let k1 = 50.0 / 3.0 * 2.0 + 75.0 / 3.0;
        let d1 = 50.0 / 3.0 * 2.0 + k1 / 3.0;
        assert!((out[1].k - k1).abs() < 1e-9);
        assert!((out[1].d - d1).abs() < 1e-9);

        let k2 = k1 * 2.0 / 3.0 + 25.0 / 3.0;
        let d2 = d1 * 2.0 / 3.0 + k2 / 3.0;
        assert!((out[2].k - k2).abs() < 1e-9);
        assert!((out[2].j - (3.0 * k2 - 2.0 * d2)).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_is_exponential_not_windowed() {
        // 窗口均值在第 4 个点会归零，指数平滑仍保留首值的衰减影响
        let out = smooth(&[90.0, 0.0, 0.0, 0.0], 3);
        let expected = [90.0, 60.0, 40.0, 80.0 / 3.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_prefix_stability() {
        let bars = candles(&[
            (10.0, 9.0, 9.5),
            (10.5, 9.2, 10.1),
            (10.8, 9.9, 10.6),
            (11.0, 10.0, 10.2),
            (10.4, 9.6, 9.8),
        ]);
        let full = compute_kdj(&bars, KdjParams { n: 3, m1: 3, m2: 3 }).unwrap();
        let prefix = compute_kdj(&bars[..3], KdjParams { n: 3, m1: 3, m2: 3 }).unwrap();
        assert_eq!(&full[..3], &prefix[..]);
        assert_eq!(full, compute_kdj(&bars, KdjParams { n: 3, m1: 3, m2: 3 }).unwrap());
    }

    #[test]
    fn test_rejects_zero_parameters() {
        let bars = candles(&[(1.0, 1.0, 1.0)]);
        assert!(compute_kdj(&bars, KdjParams { n: 0, m1: 3, m2: 3 }).is_err());
        assert!(compute_kdj(&[], KdjParams::default()).unwrap().is_empty());
    }
}
