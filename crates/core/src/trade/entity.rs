use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 订单的交易方向定义。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// 买入
    Buy,
    /// 卖出
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// # Summary
/// 委托类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// 对价单：以对手方最优价立即全部成交
    Aggressive,
    /// 限价单：价格穿越限价时才成交
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Aggressive => "AGGRESSIVE",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AGGRESSIVE" => Ok(OrderType::Aggressive),
            "LIMIT" => Ok(OrderType::Limit),
            _ => Err(format!("Unknown order type: {}", s)),
        }
    }
}

/// # Summary
/// 订单的生命周期状态。
///
/// # Invariants
/// - NEW → {FILLED, PARTIALLY_FILLED → FILLED, CANCELED}；风控拒绝的订单直接为 REJECTED。
/// - 终态 (FILLED / CANCELED / REJECTED) 不可再变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// 仍在挂单中，可被撮合或撤销
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// # Summary
/// 风控拒单原因码，按校验顺序排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    KillSwitch,
    SymbolNotSupported,
    OutOfSession,
    InvalidQuantity,
    TrendDown,
    InsufficientSellable,
    DailyTradeLimit,
    QuoteInvalid,
    QuoteStale,
    SpreadTooWide,
    PriceDeviation,
    LimitUpBuyBlocked,
    LimitDownSellBlocked,
    OrderValueLimit,
    InsufficientCash,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::KillSwitch => "KILL_SWITCH",
            RejectCode::SymbolNotSupported => "SYMBOL_NOT_SUPPORTED",
            RejectCode::OutOfSession => "OUT_OF_SESSION",
            RejectCode::InvalidQuantity => "INVALID_QUANTITY",
            RejectCode::TrendDown => "TREND_DOWN",
            RejectCode::InsufficientSellable => "INSUFFICIENT_SELLABLE",
            RejectCode::DailyTradeLimit => "DAILY_TRADE_LIMIT",
            RejectCode::QuoteInvalid => "QUOTE_INVALID",
            RejectCode::QuoteStale => "QUOTE_STALE",
            RejectCode::SpreadTooWide => "SPREAD_TOO_WIDE",
            RejectCode::PriceDeviation => "PRICE_DEVIATION",
            RejectCode::LimitUpBuyBlocked => "LIMIT_UP_BUY_BLOCKED",
            RejectCode::LimitDownSellBlocked => "LIMIT_DOWN_SELL_BLOCKED",
            RejectCode::OrderValueLimit => "ORDER_VALUE_LIMIT",
            RejectCode::InsufficientCash => "INSUFFICIENT_CASH",
        }
    }
}

impl FromStr for RejectCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [RejectCode; 15] = [
            RejectCode::KillSwitch,
            RejectCode::SymbolNotSupported,
            RejectCode::OutOfSession,
            RejectCode::InvalidQuantity,
            RejectCode::TrendDown,
            RejectCode::InsufficientSellable,
            RejectCode::DailyTradeLimit,
            RejectCode::QuoteInvalid,
            RejectCode::QuoteStale,
            RejectCode::SpreadTooWide,
            RejectCode::PriceDeviation,
            RejectCode::LimitUpBuyBlocked,
            RejectCode::LimitDownSellBlocked,
            RejectCode::OrderValueLimit,
            RejectCode::InsufficientCash,
        ];
        ALL.into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown reject code: {}", s))
    }
}

/// # Summary
/// 拒单详情，随 REJECTED 订单一起返回给调用方。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub reason: String,
}

impl Rejection {
    pub fn new(code: RejectCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// # Summary
/// 用户下单意图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    // 委托股数
    pub quantity: u64,
    pub order_type: OrderType,
    // 限价单必填
    pub limit_price: Option<Decimal>,
    // 客户端自带的幂等 ID，缺省时由系统生成
    pub client_order_id: Option<String>,
}

/// # Summary
/// 委托单。
///
/// # Invariants
/// - `filled_quantity <= quantity`。
/// - `reserved_cash` 仅对挂单中的 BUY 非零，是剩余未成交部分冻结的资金。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u64,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    // 风控定价：对价单为对手价，限价单为取整后的限价
    pub submit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub reserved_cash: Decimal,
    pub rejection: Option<Rejection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    /// # Logic
    /// 根据下单意图创建一笔全新的委托，初始状态为 NEW。
    pub fn from_request(client_order_id: String, req: &OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            client_order_id,
            symbol: req.symbol.clone(),
            direction: req.direction,
            quantity: req.quantity,
            order_type: req.order_type,
            limit_price: req.limit_price,
            submit_price: None,
            status: OrderStatus::New,
            filled_quantity: 0,
            reserved_cash: Decimal::ZERO,
            rejection: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    /// 标记为拒单 (终态)
    pub fn reject(&mut self, rejection: Rejection, now: DateTime<Utc>) {
        self.status = OrderStatus::Rejected;
        self.rejection = Some(rejection);
        self.reserved_cash = Decimal::ZERO;
        self.updated_at = now;
    }
}

/// # Summary
/// 单笔成交的费用拆分。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub transfer_fee: Decimal,
}

impl Fees {
    pub fn total(&self) -> Decimal {
        self.commission + self.stamp_tax + self.transfer_fee
    }
}

/// # Summary
/// 成交回报，创建后不可变，只追加。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u64,
    pub price: Decimal,
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub transfer_fee: Decimal,
    pub trade_time: DateTime<Utc>,
}

impl Fill {
    pub fn fees(&self) -> Fees {
        Fees {
            commission: self.commission,
            stamp_tax: self.stamp_tax,
            transfer_fee: self.transfer_fee,
        }
    }

    pub fn total_fees(&self) -> Decimal {
        self.fees().total()
    }

    /// 成交金额 (不含费用)
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// # Summary
/// 指定标的的持仓记录。
///
/// # Invariants
/// - `available_quantity <= total_quantity`。
/// - `total_quantity == 0` 时两个成本均为零。
/// - `avg_cost_gross` 只在买入时更新，卖出不改变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub total_quantity: u64,
    // T+1 可卖数量，扣除挂单中 SELL 已占用的部分
    pub available_quantity: u64,
    // 不含费用的持仓均价
    pub avg_cost_gross: Decimal,
    // 摊入买入费用后的持仓均价
    pub avg_cost_net: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// # Logic
    /// 初始化一个空持仓
    pub fn empty(symbol: String, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            total_quantity: 0,
            available_quantity: 0,
            avg_cost_gross: Decimal::ZERO,
            avg_cost_net: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.total_quantity == 0
    }
}

/// # Summary
/// 持仓的盯市视图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub position: Position,
    // 最新价，无行情时为 None
    pub last_price: Option<Decimal>,
    pub market_value: Decimal,
    // 不含离场费用的浮动盈亏
    pub unrealized_pnl_gross: Decimal,
}

/// # Summary
/// 账户资金状态 (持久化部分)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub cash: Decimal,
    // 挂单冻结资金
    pub frozen_cash: Decimal,
    pub initial_cash: Decimal,
    // 累计已实现盈亏 (已扣费)
    pub realized_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl AccountState {
    pub fn new(initial_cash: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            cash: initial_cash,
            frozen_cash: Decimal::ZERO,
            initial_cash,
            realized_pnl: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn available_cash(&self) -> Decimal {
        self.cash - self.frozen_cash
    }
}

/// # Summary
/// 系统账户的数据快照，包含资金概况及全量持仓明细。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub cash: Decimal,
    pub frozen_cash: Decimal,
    pub available_cash: Decimal,
    pub market_value: Decimal,
    // 现金 + Σ(持仓数量 × 最新价)
    pub total_value: Decimal,
    pub positions: Vec<PositionView>,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 盈亏汇总。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub cash: Decimal,
    pub total_value: Decimal,
    // 开盘快照时的总资产，当日尚未快照时为 None
    pub day_start_value: Option<Decimal>,
    pub today_pnl: Option<Decimal>,
    // total_value - initial_cash
    pub accumulated_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_gross: Decimal,
}

/// # Summary
/// 审计事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderAccepted,
    OrderRejected,
    FillApplied,
    OrderCanceled,
    KillSwitch,
    RiskWarn,
    Tplus1Unfreeze,
    DayStartSnapshot,
    DailyPnl,
    EngineError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderAccepted => "ORDER_ACCEPTED",
            EventType::OrderRejected => "ORDER_REJECTED",
            EventType::FillApplied => "FILL_APPLIED",
            EventType::OrderCanceled => "ORDER_CANCELED",
            EventType::KillSwitch => "KILL_SWITCH",
            EventType::RiskWarn => "RISK_WARN",
            EventType::Tplus1Unfreeze => "TPLUS1_UNFREEZE",
            EventType::DayStartSnapshot => "DAY_START_SNAPSHOT",
            EventType::DailyPnl => "DAILY_PNL",
            EventType::EngineError => "ENGINE_ERROR",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_ACCEPTED" => Ok(EventType::OrderAccepted),
            "ORDER_REJECTED" => Ok(EventType::OrderRejected),
            "FILL_APPLIED" => Ok(EventType::FillApplied),
            "ORDER_CANCELED" => Ok(EventType::OrderCanceled),
            "KILL_SWITCH" => Ok(EventType::KillSwitch),
            "RISK_WARN" => Ok(EventType::RiskWarn),
            "TPLUS1_UNFREEZE" => Ok(EventType::Tplus1Unfreeze),
            "DAY_START_SNAPSHOT" => Ok(EventType::DayStartSnapshot),
            "DAILY_PNL" => Ok(EventType::DailyPnl),
            "ENGINE_ERROR" => Ok(EventType::EngineError),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// # Summary
/// 审计日志条目。
///
/// # Invariants
/// - `id` 严格递增，由账本在锁内分配。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub symbol: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// # Summary
/// 全局熔断开关状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 当日交易统计，在开盘快照时清零。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub date: Option<NaiveDate>,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    // 当日成交笔数
    pub trades: u32,
}

/// # Summary
/// 日终盈亏记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub start_value: Decimal,
    pub end_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub fees: Decimal,
    pub trades: u32,
}
