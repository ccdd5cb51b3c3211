//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。
//! 金额与价格一律以十进制字符串输出，避免客户端浮点误差。

use chrono::{DateTime, NaiveDate, Utc};
use kaipan_core::market::entity::{Candle, DailyTrend, IntradaySeries, KdjPoint, Quote};
use kaipan_core::trade::entity::{
    AccountSnapshot, DailyPnl, Event, Fill, KillSwitchState, Order, PnlSummary, PositionView,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn money(d: Decimal) -> String {
    d.to_string()
}

fn opt_money(d: Option<Decimal>) -> Option<String> {
    d.map(money)
}

// ============================================================
//  行情相关 DTO
// ============================================================

/// 实时报价 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = "平安银行")]
    pub name: Option<String>,
    /// 最新价
    #[schema(example = "10.52")]
    pub last: String,
    /// 买一价 (缺失时为最新价)
    #[schema(example = "10.51")]
    pub bid: String,
    /// 卖一价 (缺失时为最新价)
    #[schema(example = "10.52")]
    pub ask: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub prev_close: Option<String>,
    /// 成交量 (手)
    pub volume: Option<String>,
    /// 成交额 (万元)
    pub amount: Option<String>,
    pub quote_time: Option<DateTime<Utc>>,
    #[schema(example = "sina")]
    pub source: String,
}

impl From<Quote> for QuoteResponse {
    fn from(q: Quote) -> Self {
        Self {
            bid: money(q.bid()),
            ask: money(q.ask()),
            symbol: q.symbol,
            name: q.name,
            last: money(q.last),
            open: opt_money(q.open),
            high: opt_money(q.high),
            low: opt_money(q.low),
            prev_close: opt_money(q.prev_close),
            volume: opt_money(q.volume),
            amount: opt_money(q.amount),
            quote_time: q.quote_time,
            source: q.source,
        }
    }
}

/// K 线数据 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CandleResponse {
    /// bar 结束时间
    #[schema(example = "2024-03-04T02:30:00Z")]
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: Option<f64>,
}

impl From<&Candle> for CandleResponse {
    fn from(c: &Candle) -> Self {
        Self {
            time: c.time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            amount: c.amount,
        }
    }
}

/// K 线序列 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CandlesResponse {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = "60m")]
    pub tf: String,
    #[schema(example = "front")]
    pub adjust: String,
    /// 最近一根已走完 bar 的结束时间
    pub last_complete_time: DateTime<Utc>,
    pub candles: Vec<CandleResponse>,
}

/// 分时 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IntradayResponse {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = "1m")]
    pub tf: String,
    /// 分时所属交易日 (北京时间)
    #[schema(example = "2024-03-04")]
    pub date: NaiveDate,
    pub bars: Vec<CandleResponse>,
    /// 分时均价 (成交量加权)
    pub avg_price: f64,
}

impl From<IntradaySeries> for IntradayResponse {
    fn from(s: IntradaySeries) -> Self {
        Self {
            symbol: s.symbol,
            tf: s.timeframe.to_string(),
            date: s.date,
            bars: s.bars.iter().map(CandleResponse::from).collect(),
            avg_price: s.avg_price,
        }
    }
}

/// 日线趋势 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrendResponse {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    /// UP / DOWN / FLAT
    #[schema(example = "UP")]
    pub trend: String,
    #[schema(example = 20)]
    pub ma: usize,
    #[schema(example = 5)]
    pub lookback: usize,
    /// 趋势始终基于前复权日线
    #[schema(example = "front")]
    pub adjust: String,
    pub ma_last: f64,
    pub close_last: f64,
    pub slope: f64,
    pub asof: DateTime<Utc>,
}

impl From<DailyTrend> for TrendResponse {
    fn from(t: DailyTrend) -> Self {
        Self {
            symbol: t.symbol,
            trend: t.trend.as_str().to_string(),
            ma: t.ma,
            lookback: t.lookback,
            adjust: "front".to_string(),
            ma_last: t.ma_last,
            close_last: t.close_last,
            slope: t.slope,
            asof: t.asof,
        }
    }
}

/// KDJ 数值点 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KdjPointResponse {
    pub time: DateTime<Utc>,
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

impl From<KdjPoint> for KdjPointResponse {
    fn from(p: KdjPoint) -> Self {
        Self {
            time: p.time,
            k: p.k,
            d: p.d,
            j: p.j,
        }
    }
}

/// 成交在 K 线上的落点 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CandleFillResponse {
    pub fill_id: String,
    pub client_order_id: String,
    #[schema(example = "BUY")]
    pub direction: String,
    pub quantity: u64,
    pub price: String,
    pub trade_time: DateTime<Utc>,
    /// 所属 K 线在返回序列中的下标
    pub candle_index: usize,
    /// 所属 K 线的结束时间
    pub candle_time: DateTime<Utc>,
}

// ============================================================
//  账户相关 DTO
// ============================================================

/// 持仓明细 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionResponse {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = 1000)]
    pub total_quantity: u64,
    /// 可卖数量 (T+1)
    #[schema(example = 0)]
    pub available_quantity: u64,
    /// 不含费用的持仓均价
    #[schema(example = "10.00")]
    pub avg_cost_gross: String,
    /// 摊入费用后的持仓均价
    #[schema(example = "10.005")]
    pub avg_cost_net: String,
    pub last_price: Option<String>,
    pub market_value: String,
    /// 按 gross 成本计算的浮动盈亏 (不含卖出费用)
    pub unrealized_pnl_gross: String,
    pub updated_at: DateTime<Utc>,
}

impl From<PositionView> for PositionResponse {
    fn from(v: PositionView) -> Self {
        let p = v.position;
        Self {
            symbol: p.symbol,
            total_quantity: p.total_quantity,
            available_quantity: p.available_quantity,
            avg_cost_gross: money(p.avg_cost_gross),
            avg_cost_net: money(p.avg_cost_net),
            last_price: opt_money(v.last_price),
            market_value: money(v.market_value),
            unrealized_pnl_gross: money(v.unrealized_pnl_gross),
            updated_at: p.updated_at,
        }
    }
}

/// 账户快照 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    #[schema(example = "3990000.00")]
    pub cash: String,
    /// 挂单冻结资金
    #[schema(example = "10005.00")]
    pub frozen_cash: String,
    #[schema(example = "3979995.00")]
    pub available_cash: String,
    pub market_value: String,
    #[schema(example = "4000000.00")]
    pub total_value: String,
    pub positions: Vec<PositionResponse>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountSnapshot> for AccountResponse {
    fn from(a: AccountSnapshot) -> Self {
        Self {
            cash: money(a.cash),
            frozen_cash: money(a.frozen_cash),
            available_cash: money(a.available_cash),
            market_value: money(a.market_value),
            total_value: money(a.total_value),
            positions: a.positions.into_iter().map(Into::into).collect(),
            updated_at: a.updated_at,
        }
    }
}

/// 盈亏汇总 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PnlResponse {
    pub cash: String,
    pub total_value: String,
    /// 今日开盘快照，尚未快照时为 null
    pub day_start_value: Option<String>,
    pub today_pnl: Option<String>,
    /// 总资产相对初始资金
    pub accumulated_pnl: String,
    /// 累计已实现盈亏 (含费用)
    pub realized_pnl: String,
    /// 浮动盈亏，不含卖出费用
    pub unrealized_pnl_gross: String,
}

impl From<PnlSummary> for PnlResponse {
    fn from(p: PnlSummary) -> Self {
        Self {
            cash: money(p.cash),
            total_value: money(p.total_value),
            day_start_value: opt_money(p.day_start_value),
            today_pnl: opt_money(p.today_pnl),
            accumulated_pnl: money(p.accumulated_pnl),
            realized_pnl: money(p.realized_pnl),
            unrealized_pnl_gross: money(p.unrealized_pnl_gross),
        }
    }
}

/// 日终盈亏 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DailyPnlResponse {
    #[schema(example = "2024-03-04")]
    pub date: NaiveDate,
    pub start_value: String,
    pub end_value: String,
    pub realized_pnl: String,
    pub unrealized_pnl: String,
    pub fees: String,
    pub trades: u32,
}

impl From<DailyPnl> for DailyPnlResponse {
    fn from(d: DailyPnl) -> Self {
        Self {
            date: d.date,
            start_value: money(d.start_value),
            end_value: money(d.end_value),
            realized_pnl: money(d.realized_pnl),
            unrealized_pnl: money(d.unrealized_pnl),
            fees: money(d.fees),
            trades: d.trades,
        }
    }
}

// ============================================================
//  订单与成交 DTO
// ============================================================

/// 下单请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    /// BUY / SELL
    #[schema(example = "BUY")]
    pub direction: String,
    /// 委托股数，买入须为 100 的整数倍
    #[schema(example = 100)]
    pub quantity: u64,
    /// AGGRESSIVE (对价) / LIMIT (限价)
    #[serde(default = "default_order_type")]
    #[schema(example = "AGGRESSIVE")]
    pub order_type: String,
    /// 限价单价格
    #[schema(value_type = Option<String>, example = "10.50")]
    pub limit_price: Option<Decimal>,
    /// 客户端幂等键，重复提交返回原订单
    pub client_order_id: Option<String>,
}

fn default_order_type() -> String {
    "AGGRESSIVE".to_string()
}

/// 订单 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    #[schema(example = "3f2a9c1e0b7d4e21a1c2d3e4f5a6b7c8")]
    pub client_order_id: String,
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = "BUY")]
    pub direction: String,
    #[schema(example = 100)]
    pub quantity: u64,
    #[schema(example = "AGGRESSIVE")]
    pub order_type: String,
    pub limit_price: Option<String>,
    /// 风控确定的报单价格
    pub submit_price: Option<String>,
    /// NEW / PARTIALLY_FILLED / FILLED / CANCELED / REJECTED
    #[schema(example = "FILLED")]
    pub status: String,
    pub filled_quantity: u64,
    pub reserved_cash: String,
    #[schema(example = "INSUFFICIENT_CASH")]
    pub reject_code: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        let (reject_code, reject_reason) = match o.rejection {
            Some(r) => (Some(r.code.as_str().to_string()), Some(r.reason)),
            None => (None, None),
        };
        Self {
            client_order_id: o.client_order_id,
            symbol: o.symbol,
            direction: o.direction.as_str().to_string(),
            quantity: o.quantity,
            order_type: o.order_type.as_str().to_string(),
            limit_price: opt_money(o.limit_price),
            submit_price: opt_money(o.submit_price),
            status: o.status.as_str().to_string(),
            filled_quantity: o.filled_quantity,
            reserved_cash: money(o.reserved_cash),
            reject_code,
            reject_reason,
            created_at: o.created_at,
            updated_at: o.updated_at,
            expires_at: o.expires_at,
        }
    }
}

/// 成交流水 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FillResponse {
    pub fill_id: String,
    pub client_order_id: String,
    #[schema(example = "000001.SZ")]
    pub symbol: String,
    #[schema(example = "BUY")]
    pub direction: String,
    pub quantity: u64,
    #[schema(example = "10.00")]
    pub price: String,
    pub commission: String,
    /// 印花税 (仅卖出)
    pub stamp_tax: String,
    /// 过户费 (仅沪市)
    pub transfer_fee: String,
    pub trade_time: DateTime<Utc>,
}

impl From<Fill> for FillResponse {
    fn from(f: Fill) -> Self {
        Self {
            fill_id: f.fill_id,
            client_order_id: f.client_order_id,
            symbol: f.symbol,
            direction: f.direction.as_str().to_string(),
            quantity: f.quantity,
            price: money(f.price),
            commission: money(f.commission),
            stamp_tax: money(f.stamp_tax),
            transfer_fee: money(f.transfer_fee),
            trade_time: f.trade_time,
        }
    }
}

/// 审计事件 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = "FILL_APPLIED")]
    pub event_type: String,
    pub symbol: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            event_type: e.event_type.as_str().to_string(),
            symbol: e.symbol,
            details: e.details,
            timestamp: e.timestamp,
        }
    }
}

// ============================================================
//  风控 DTO
// ============================================================

/// 熔断开关状态
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KillSwitchResponse {
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<KillSwitchState> for KillSwitchResponse {
    fn from(k: KillSwitchState) -> Self {
        Self {
            enabled: k.enabled,
            updated_at: k.updated_at,
        }
    }
}

/// 切换熔断开关请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KillSwitchRequest {
    pub enabled: bool,
}

// ============================================================
//  通用响应 DTO
// ============================================================

/// 统一 API 响应包装器
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    /// 是否成功
    pub success: bool,
    /// 数据载荷 (成功时)
    pub data: Option<T>,
    /// 错误信息 (失败时)
    pub error: Option<String>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    /// 构建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// 失败响应 (不含泛型载荷)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 机器可读的错误类别，如 `NOT_FOUND` / `NO_DATA`
    #[schema(example = "NO_DATA")]
    pub code: String,
    /// 错误描述信息
    pub error: String,
}

impl ApiErrorResponse {
    pub fn new(code: &str, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            error: msg.into(),
        }
    }
}
