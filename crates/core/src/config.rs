use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 全局应用配置
///
/// 每个字段都有默认值，配置文件与环境变量只需覆盖需要调整的部分。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub trading: TradingConfig,
    pub fees: FeeConfig,
    pub risk: RiskConfig,
    pub market: MarketConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

/// 撮合与后台任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// 首次建账时注入的初始资金
    pub initial_cash: Decimal,
    /// 后台撮合/日终任务轮询间隔 (秒)
    pub poll_seconds: f64,
    /// 是否允许在连续竞价时段之外报单 (调试用)
    pub allow_out_of_session: bool,
    /// 对价单的挂单超时
    pub aggressive_timeout_seconds: i64,
    /// 限价单的挂单超时
    pub limit_timeout_seconds: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::new(4_000_000, 0),
            poll_seconds: 2.0,
            allow_out_of_session: false,
            aggressive_timeout_seconds: 5,
            limit_timeout_seconds: 180,
        }
    }
}

/// 固定费率表
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// 佣金费率 (双边)
    pub commission_rate: Decimal,
    /// 单笔最低佣金
    pub min_commission: Decimal,
    /// 印花税 (仅卖出)
    pub stamp_tax_rate: Decimal,
    /// 过户费 (仅沪市)
    pub transfer_fee_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(25, 5),
            min_commission: Decimal::new(5, 0),
            stamp_tax_rate: Decimal::new(1, 3),
            transfer_fee_rate: Decimal::new(2, 5),
        }
    }
}

/// 事前风控参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub order_value_limit: Decimal,
    pub daily_trades_warn: u32,
    pub daily_trades_reject: u32,
    pub quote_max_age_seconds: i64,
    /// 买卖价差占中间价的上限
    pub max_spread_ratio: Decimal,
    /// 日线趋势为 DOWN 时是否拦截买单
    pub trend_gate: bool,
    pub trend_ma_period: usize,
    pub trend_lookback: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            order_value_limit: Decimal::new(500_000, 0),
            daily_trades_warn: 10,
            daily_trades_reject: 15,
            quote_max_age_seconds: 5,
            max_spread_ratio: Decimal::new(1, 2),
            trend_gate: true,
            trend_ma_period: 20,
            trend_lookback: 5,
        }
    }
}

/// 行情缓存与上游重试参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub quote_cache_seconds: u64,
    pub candle_cache_seconds: u64,
    pub trend_cache_seconds: u64,
    pub intraday_cache_seconds: u64,
    /// 单个缓存实例的最大条目数
    pub cache_capacity: usize,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    /// 趋势判定的下跌阈值 (斜率)
    pub trend_eps_down: f64,
    /// 趋势判定的上涨阈值 (斜率)
    pub trend_eps_up: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            quote_cache_seconds: 2,
            candle_cache_seconds: 30,
            trend_cache_seconds: 3600,
            intraday_cache_seconds: 60,
            cache_capacity: 1024,
            retry_attempts: 3,
            retry_base_ms: 200,
            trend_eps_down: -0.008,
            trend_eps_up: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
        }
    }
}
