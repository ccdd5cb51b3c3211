pub mod session;
pub mod time;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 证券所属的交易所。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, utoipa::ToSchema)]
pub enum Exchange {
    /// 深圳证券交易所
    SZ,
    /// 上海证券交易所
    SH,
}

/// # Summary
/// 证券所属板块，决定涨跌停幅度。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Board {
    // 主板 (±10%)
    Main,
    // 创业板 (±20%)
    ChiNext,
}

impl Board {
    /// 当日涨跌停比例
    pub fn limit_ratio(&self) -> Decimal {
        match self {
            Board::Main => Decimal::new(10, 2),
            Board::ChiNext => Decimal::new(20, 2),
        }
    }
}

/// # Summary
/// 解析后的证券代码，例如 `000001.SZ`。
///
/// # Invariants
/// - `code` 恒为 6 位数字。
/// - 科创板 (688) 不在支持范围内，解析阶段即被拒绝。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub code: String,
    pub exchange: Exchange,
    pub board: Board,
}

/// 证券代码解析失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol must look like '000001.SZ' or '600519.SH', got '{0}'")]
    Malformed(String),
    #[error("科创板暂不支持: {0}")]
    Unsupported(String),
}

impl ParsedSymbol {
    /// # Summary
    /// 解析标准证券代码。
    ///
    /// # Logic
    /// 1. 校验 `dddddd.SZ|SH` 格式。
    /// 2. 按代码前缀判定板块：300/301 为创业板，688 拒绝，其余为主板。
    pub fn parse(symbol: &str) -> Result<Self, SymbolError> {
        let (code, market) = symbol
            .split_once('.')
            .ok_or_else(|| SymbolError::Malformed(symbol.to_string()))?;

        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SymbolError::Malformed(symbol.to_string()));
        }

        let exchange = match market {
            "SZ" => Exchange::SZ,
            "SH" => Exchange::SH,
            _ => return Err(SymbolError::Malformed(symbol.to_string())),
        };

        let board = if code.starts_with("300") || code.starts_with("301") {
            Board::ChiNext
        } else if code.starts_with("688") {
            return Err(SymbolError::Unsupported(symbol.to_string()));
        } else {
            Board::Main
        };

        Ok(Self {
            code: code.to_string(),
            exchange,
            board,
        })
    }

    pub fn symbol(&self) -> String {
        format!("{}.{:?}", self.code, self.exchange)
    }
}

/// A 股最小价格变动单位为 0.01，按四舍五入对齐。
pub fn tick_round(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// 金额字段统一保留到分。
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// # Summary
/// 交易时间周期枚举，定义 K 线的时间跨度。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, utoipa::ToSchema)]
pub enum TimeFrame {
    // 1分钟
    Minute1,
    // 5分钟
    Minute5,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 60分钟
    Minute60,
    // 1日
    Day1,
}

impl TimeFrame {
    /// 日内周期的分钟数，日线返回 None
    pub fn intraday_minutes(&self) -> Option<u32> {
        match self {
            TimeFrame::Minute1 => Some(1),
            TimeFrame::Minute5 => Some(5),
            TimeFrame::Minute15 => Some(15),
            TimeFrame::Minute30 => Some(30),
            TimeFrame::Minute60 => Some(60),
            TimeFrame::Day1 => None,
        }
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "minute1" => Ok(TimeFrame::Minute1),
            "5m" | "minute5" => Ok(TimeFrame::Minute5),
            "15m" | "minute15" => Ok(TimeFrame::Minute15),
            "30m" | "minute30" => Ok(TimeFrame::Minute30),
            "60m" | "1h" | "minute60" => Ok(TimeFrame::Minute60),
            "1d" | "day1" => Ok(TimeFrame::Day1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Minute1 => write!(f, "1m"),
            TimeFrame::Minute5 => write!(f, "5m"),
            TimeFrame::Minute15 => write!(f, "15m"),
            TimeFrame::Minute30 => write!(f, "30m"),
            TimeFrame::Minute60 => write!(f, "60m"),
            TimeFrame::Day1 => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 复权方式。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, utoipa::ToSchema)]
pub enum AdjustMode {
    /// 前复权
    #[default]
    Front,
    /// 后复权
    Back,
    /// 不复权
    None,
}

impl FromStr for AdjustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "front" | "qfq" => Ok(AdjustMode::Front),
            "back" | "hfq" => Ok(AdjustMode::Back),
            "none" | "" => Ok(AdjustMode::None),
            _ => Err(format!("Unknown AdjustMode: {}", s)),
        }
    }
}

impl std::fmt::Display for AdjustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustMode::Front => write!(f, "front"),
            AdjustMode::Back => write!(f, "back"),
            AdjustMode::None => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_symbol_boards() {
        let p = ParsedSymbol::parse("000001.SZ").unwrap();
        assert_eq!(p.exchange, Exchange::SZ);
        assert_eq!(p.board, Board::Main);
        assert_eq!(p.symbol(), "000001.SZ");

        let p = ParsedSymbol::parse("300750.SZ").unwrap();
        assert_eq!(p.board, Board::ChiNext);

        let p = ParsedSymbol::parse("600519.SH").unwrap();
        assert_eq!(p.exchange, Exchange::SH);
    }

    #[test]
    fn test_parse_symbol_rejects() {
        assert!(matches!(ParsedSymbol::parse("688981.SH"), Err(SymbolError::Unsupported(_))));
        assert!(matches!(ParsedSymbol::parse("00001.SZ"), Err(SymbolError::Malformed(_))));
        assert!(matches!(ParsedSymbol::parse("000001.HK"), Err(SymbolError::Malformed(_))));
        assert!(matches!(ParsedSymbol::parse("000001"), Err(SymbolError::Malformed(_))));
    }

    #[test]
    fn test_tick_round() {
        assert_eq!(tick_round(dec!(10.005)), dec!(10.01));
        assert_eq!(tick_round(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn test_timeframe_round_trip_names() {
        assert_eq!("60m".parse::<TimeFrame>().unwrap(), TimeFrame::Minute60);
        assert_eq!("1h".parse::<TimeFrame>().unwrap(), TimeFrame::Minute60);
        assert_eq!(TimeFrame::Day1.to_string(), "1d");
        assert!("2h".parse::<TimeFrame>().is_err());
        assert_eq!("qfq".parse::<AdjustMode>().unwrap(), AdjustMode::Front);
    }
}
