use chrono::{DateTime, Utc};
use kaipan_core::common::session::is_order_session;
use kaipan_core::common::{ParsedSymbol, round_money, tick_round};
use kaipan_core::config::RiskConfig;
use kaipan_core::market::entity::{Quote, Trend};
use kaipan_core::trade::entity::{Direction, OrderRequest, OrderType, RejectCode, Rejection};
use rust_decimal::Decimal;

use crate::fees::FeeSchedule;

/// 价格偏离阈值占涨跌停幅度的比例
const DEVIATION_OF_LIMIT: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// # Summary
/// 一次风控校验所需的全部输入，均为锁内读取的一致视图。
#[derive(Debug, Clone)]
pub struct RiskInput<'a> {
    pub request: &'a OrderRequest,
    pub now: DateTime<Utc>,
    pub kill_switch: bool,
    // 日线趋势；获取失败时为 None，不拦截
    pub trend: Option<Trend>,
    // 当前可卖数量 (已扣除挂单中卖单占用)
    pub sellable: u64,
    pub trades_today: u32,
    pub quote: Option<&'a Quote>,
    pub available_cash: Decimal,
}

/// # Summary
/// 风控放行结果。
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub symbol: ParsedSymbol,
    // 对价单为对手价，限价单为取整后的限价
    pub submit_price: Decimal,
    // 按委托价估算的费用
    pub estimated_fees: Decimal,
    // 买单需冻结的资金，卖单为零
    pub reserve_cash: Decimal,
    // 当日成交笔数超过警戒线
    pub warn: bool,
}

/// # Summary
/// 事前风控校验器。
///
/// # Invariants
/// - 纯函数：不读时钟、不做 I/O，只依赖 `RiskInput`。
/// - 规则按固定顺序执行，返回第一条命中的拒单原因。
#[derive(Debug, Clone)]
pub struct RiskValidator {
    config: RiskConfig,
    allow_out_of_session: bool,
    fees: FeeSchedule,
}

impl RiskValidator {
    pub fn new(config: RiskConfig, allow_out_of_session: bool, fees: FeeSchedule) -> Self {
        Self {
            config,
            allow_out_of_session,
            fees,
        }
    }

    /// # Summary
    /// 按顺序执行全部风控规则。
    ///
    /// # Logic
    /// 1. 熔断、代码、交易时段、数量。
    /// 2. 趋势闸门、可卖数量、当日成交笔数。
    /// 3. 报价有效性与时效、价差、价格偏离、涨跌停。
    /// 4. 单笔金额上限、可用资金。
    ///
    /// # Returns
    /// 放行时返回 `Approval`，否则返回首个命中的 `Rejection`。
    pub fn validate(&self, input: &RiskInput<'_>) -> Result<Approval, Rejection> {
        let req = input.request;

        if input.kill_switch {
            return Err(Rejection::new(RejectCode::KillSwitch, "Kill switch enabled"));
        }

        let symbol = ParsedSymbol::parse(&req.symbol)
            .map_err(|e| Rejection::new(RejectCode::SymbolNotSupported, e.to_string()))?;

        if !self.session_open(input.now) {
            return Err(Rejection::new(RejectCode::OutOfSession, "Out of order session"));
        }

        self.check_quantity(req)?;

        if req.direction == Direction::Buy
            && self.config.trend_gate
            && input.trend == Some(Trend::Down)
        {
            return Err(Rejection::new(
                RejectCode::TrendDown,
                "Daily trend is DOWN, buy blocked",
            ));
        }

        if req.direction == Direction::Sell && req.quantity > input.sellable {
            return Err(Rejection::new(
                RejectCode::InsufficientSellable,
                format!(
                    "Insufficient sellable quantity (T+1): {} > {}",
                    req.quantity, input.sellable
                ),
            ));
        }

        if input.trades_today > self.config.daily_trades_reject {
            return Err(Rejection::new(
                RejectCode::DailyTradeLimit,
                format!("Daily trades limit exceeded ({})", input.trades_today),
            ));
        }

        let quote = self.check_quote(input)?;
        let prev_close = quote
            .prev_close
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| Rejection::new(RejectCode::QuoteInvalid, "prev_close missing"))?;
        let (bid, ask) = (quote.bid(), quote.ask());

        let mid = (bid + ask) / Decimal::TWO;
        if mid > Decimal::ZERO {
            let spread = (ask - bid) / mid;
            if spread > self.config.max_spread_ratio {
                return Err(Rejection::new(
                    RejectCode::SpreadTooWide,
                    format!("Spread too wide ({:.2}%)", spread * Decimal::ONE_HUNDRED),
                ));
            }
        }

        let submit_price = match req.order_type {
            OrderType::Aggressive => tick_round(match req.direction {
                Direction::Buy => ask,
                Direction::Sell => bid,
            }),
            OrderType::Limit => tick_round(req.limit_price.unwrap_or(Decimal::ZERO)),
        };

        let ratio = symbol.board.limit_ratio();
        let deviation = (submit_price / prev_close - Decimal::ONE).abs();
        if deviation > ratio * DEVIATION_OF_LIMIT {
            return Err(Rejection::new(
                RejectCode::PriceDeviation,
                format!("Price deviation too high ({:.2}%)", deviation * Decimal::ONE_HUNDRED),
            ));
        }

        let up_limit = tick_round(prev_close * (Decimal::ONE + ratio));
        let down_limit = tick_round(prev_close * (Decimal::ONE - ratio));
        if req.direction == Direction::Buy && (quote.last >= up_limit || ask >= up_limit) {
            return Err(Rejection::new(RejectCode::LimitUpBuyBlocked, "Limit-up, buy blocked"));
        }
        if req.direction == Direction::Sell && (quote.last <= down_limit || bid <= down_limit) {
            return Err(Rejection::new(
                RejectCode::LimitDownSellBlocked,
                "Limit-down, sell blocked",
            ));
        }

        let order_value = submit_price * Decimal::from(req.quantity);
        if order_value > self.config.order_value_limit {
            return Err(Rejection::new(
                RejectCode::OrderValueLimit,
                format!("Order value limit exceeded ({:.2})", order_value),
            ));
        }

        let estimated_fees = self
            .fees
            .compute(order_value, req.direction, symbol.exchange)
            .total();
        let reserve_cash = match req.direction {
            Direction::Buy => {
                let required = round_money(order_value + estimated_fees);
                if required > input.available_cash {
                    return Err(Rejection::new(
                        RejectCode::InsufficientCash,
                        format!(
                            "Insufficient cash: required {:.2}, available {:.2}",
                            required, input.available_cash
                        ),
                    ));
                }
                required
            }
            Direction::Sell => Decimal::ZERO,
        };

        Ok(Approval {
            symbol,
            submit_price,
            estimated_fees,
            reserve_cash,
            warn: input.trades_today > self.config.daily_trades_warn,
        })
    }

    fn check_quantity(&self, req: &OrderRequest) -> Result<(), Rejection> {
        if req.quantity == 0 {
            return Err(Rejection::new(RejectCode::InvalidQuantity, "quantity must be > 0"));
        }
        if req.direction == Direction::Buy && req.quantity % 100 != 0 {
            return Err(Rejection::new(
                RejectCode::InvalidQuantity,
                "BUY quantity must be a multiple of 100 shares",
            ));
        }
        if req.order_type == OrderType::Limit
            && !req.limit_price.is_some_and(|p| p > Decimal::ZERO)
        {
            return Err(Rejection::new(
                RejectCode::InvalidQuantity,
                "limit_price required for LIMIT order",
            ));
        }
        Ok(())
    }

    /// 交易时段内 (或配置允许时段外交易) 才接单与撮合
    pub fn session_open(&self, now: DateTime<Utc>) -> bool {
        self.allow_out_of_session || is_order_session(now)
    }

    /// # Summary
    /// 报价是否足够新，可以用来撮合挂单。
    ///
    /// # Logic
    /// 与下单时的时效规则一致：缺少时间戳或超过 `quote_max_age_seconds` 都不可用。
    pub fn quote_fresh(&self, quote: &Quote, now: DateTime<Utc>) -> bool {
        quote.quote_time.is_some_and(|t| !self.too_old(now - t))
    }

    fn too_old(&self, age: chrono::Duration) -> bool {
        age.num_milliseconds() > self.config.quote_max_age_seconds.saturating_mul(1000)
    }

    fn check_quote<'a>(&self, input: &RiskInput<'a>) -> Result<&'a Quote, Rejection> {
        let quote = input.quote.ok_or_else(|| {
            Rejection::new(
                RejectCode::QuoteInvalid,
                "Quote not available (symbol may be suspended or invalid)",
            )
        })?;
        let quote_time = quote
            .quote_time
            .ok_or_else(|| Rejection::new(RejectCode::QuoteInvalid, "Quote missing timestamp"))?;
        if quote.last <= Decimal::ZERO {
            return Err(Rejection::new(RejectCode::QuoteInvalid, "Quote prices missing"));
        }
        let age = input.now - quote_time;
        if self.too_old(age) {
            return Err(Rejection::new(
                RejectCode::QuoteStale,
                format!("Quote too old ({}s)", age.num_seconds()),
            ));
        }
        Ok(quote)
    }
}
