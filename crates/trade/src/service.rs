use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use kaipan_core::common::ParsedSymbol;
use kaipan_core::common::session::trading_date;
use kaipan_core::common::time::TimeProvider;
use kaipan_core::config::{AppConfig, RiskConfig, TradingConfig};
use kaipan_core::market::entity::{Quote, Trend};
use kaipan_core::market::port::{Market, MarketExt};
use kaipan_core::trade::entity::{
    AccountSnapshot, DailyPnl, Direction, Event, EventType, Fill, KillSwitchState, Order,
    OrderRequest, OrderStatus, OrderType, PnlSummary, PositionView, RejectCode, Rejection,
};
use kaipan_core::trade::port::{TradeError, TradePort};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fees::FeeSchedule;
use crate::ledger::{Ledger, LedgerState, NewOrder};
use crate::matcher::LocalMatchEngine;
use crate::risk::{RiskInput, RiskValidator};

/// # Summary
/// 纸面交易服务，实现 `TradePort`。
///
/// # Invariants
/// - 行情与趋势在账本锁外获取，锁内只使用已取得的值。
/// - 校验、冻结、撮合、入账与事件追加在同一次 `Ledger::transact` 中完成。
pub struct TradeService {
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) market: Arc<dyn Market>,
    pub(crate) clock: Arc<dyn TimeProvider>,
    pub(crate) validator: RiskValidator,
    pub(crate) matcher: LocalMatchEngine,
    pub(crate) fees: FeeSchedule,
    trading: TradingConfig,
    risk: RiskConfig,
}

impl TradeService {
    pub fn new(
        ledger: Arc<Ledger>,
        market: Arc<dyn Market>,
        clock: Arc<dyn TimeProvider>,
        config: &AppConfig,
    ) -> Self {
        let fees = FeeSchedule::new(&config.fees);
        Self {
            validator: RiskValidator::new(
                config.risk.clone(),
                config.trading.allow_out_of_session,
                fees.clone(),
            ),
            matcher: LocalMatchEngine::new(),
            fees,
            trading: config.trading.clone(),
            risk: config.risk.clone(),
            ledger,
            market,
            clock,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// 拉取最新价用于盯市；行情失败时返回空表，持仓按成本估值
    pub(crate) async fn marks(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        if symbols.is_empty() {
            return HashMap::new();
        }
        match self.market.get_quotes(symbols).await {
            Ok(quotes) => quotes.into_iter().map(|q| (q.symbol, q.last)).collect(),
            Err(e) => {
                warn!(error = %e, "mark-to-market quotes unavailable, valuing at cost");
                HashMap::new()
            }
        }
    }

    pub(crate) async fn marks_for(&self, state: &LedgerState) -> HashMap<String, Decimal> {
        let symbols: Vec<String> = state.positions.keys().cloned().collect();
        self.marks(&symbols).await
    }

    fn timeout_for(&self, order_type: OrderType) -> Duration {
        match order_type {
            OrderType::Aggressive => Duration::seconds(self.trading.aggressive_timeout_seconds),
            OrderType::Limit => Duration::seconds(self.trading.limit_timeout_seconds),
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Option<Quote> {
        match self.market.get_quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol, error = %e, "quote unavailable for order validation");
                None
            }
        }
    }

    /// 趋势获取失败时不拦截买单，仅记录告警
    async fn fetch_trend(&self, symbol: &str) -> Option<Trend> {
        match self
            .market
            .daily_trend(symbol, self.risk.trend_ma_period, self.risk.trend_lookback)
            .await
        {
            Ok(t) => Some(t.trend),
            Err(e) => {
                warn!(symbol, error = %e, "daily trend unavailable, trend gate skipped");
                None
            }
        }
    }

    fn new_order_id(req: &OrderRequest) -> String {
        req.client_order_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

#[async_trait]
impl TradePort for TradeService {
    /// # Logic
    /// 1. 幂等：已存在的 `client_order_id` 直接返回原订单 (锁外快速路径，锁内再查一次)。
    /// 2. 熔断开启时立即拒单，不落库、不写事件。
    /// 3. 锁外获取报价与 (买单的) 日线趋势。
    /// 4. 锁内风控；拒单落库并写 ORDER_REJECTED。
    /// 5. 放行后冻结资源写 ORDER_ACCEPTED，并用同一报价尝试立即撮合。
    async fn place_order(&self, req: OrderRequest) -> Result<Order, TradeError> {
        let now = self.clock.now();
        let client_order_id = Self::new_order_id(&req);

        if req.client_order_id.is_some()
            && let Some(existing) = self.ledger.store().get_order(&client_order_id).await?
        {
            debug!(client_order_id = %client_order_id, "duplicate client_order_id, returning existing order");
            return Ok(existing);
        }

        let kill_switch = self.ledger.peek(|s| s.kill_switch_enabled()).await;
        if kill_switch {
            let mut order = Order::from_request(client_order_id, &req, now);
            order.reject(Rejection::new(RejectCode::KillSwitch, "Kill switch enabled"), now);
            info!(symbol = %req.symbol, "order rejected by kill switch");
            return Ok(order);
        }

        let parsed = ParsedSymbol::parse(&req.symbol).ok();
        let quote = match &parsed {
            Some(_) => self.fetch_quote(&req.symbol).await,
            None => None,
        };
        let trend = match (&parsed, req.direction) {
            (Some(_), Direction::Buy) if self.risk.trend_gate => self.fetch_trend(&req.symbol).await,
            _ => None,
        };

        let timeout = self.timeout_for(req.order_type);
        let placed = self
            .ledger
            .transact_new_order(&client_order_id, now, |tx| {
                let state = tx.state();
                let trades_today = state.trades_on(trading_date(now));
                let verdict = self.validator.validate(&RiskInput {
                    request: &req,
                    now,
                    kill_switch: state.kill_switch_enabled(),
                    trend,
                    sellable: state.sellable(&req.symbol),
                    trades_today,
                    quote: quote.as_ref(),
                    available_cash: state.account.available_cash(),
                });
                let mut order = Order::from_request(client_order_id.clone(), &req, now);

                let approval = match verdict {
                    Ok(approval) => approval,
                    Err(rejection) => {
                        // 熔断拒单不落库
                        let persist = rejection.code != RejectCode::KillSwitch;
                        order.reject(rejection, now);
                        if persist {
                            tx.record_rejection(&order);
                        }
                        return Ok(order);
                    }
                };

                if approval.warn {
                    tx.push_event(
                        EventType::RiskWarn,
                        Some(&req.symbol),
                        json!({
                            "client_order_id": client_order_id,
                            "warning": "Daily trades above warning threshold",
                            "daily_trades_count": trades_today,
                            "threshold": self.risk.daily_trades_warn,
                        }),
                    );
                }

                order.submit_price = Some(approval.submit_price);
                order.expires_at = Some(now + timeout);
                let mut order = tx.accept_order(order, approval.reserve_cash)?;

                if let Some(q) = quote.as_ref()
                    && let Some(execution) = self.matcher.execute(&order, q)
                {
                    order = tx.apply_fill(&client_order_id, execution, &self.fees)?.order;
                }
                Ok(order)
            })
            .await?;

        let order = match placed {
            NewOrder::Created(order) => order,
            NewOrder::Existing(existing) => {
                debug!(client_order_id = %existing.client_order_id, "duplicate client_order_id raced, returning existing order");
                return Ok(existing);
            }
        };

        match &order.rejection {
            Some(r) => info!(
                client_order_id = %order.client_order_id,
                symbol = %order.symbol,
                code = r.code.as_str(),
                reason = %r.reason,
                "order rejected"
            ),
            None => info!(
                client_order_id = %order.client_order_id,
                symbol = %order.symbol,
                status = order.status.as_str(),
                "order accepted"
            ),
        }
        Ok(order)
    }

    /// # Logic
    /// 锁内撤单；订单已是终态时原样返回 (空操作)，不存在时报 `OrderNotFound`。
    async fn cancel_order(&self, client_order_id: &str) -> Result<Order, TradeError> {
        let now = self.clock.now();
        let canceled = self
            .ledger
            .transact(now, |tx| Ok(tx.cancel_order(client_order_id, "Manual cancel")))
            .await?;
        if let Some(order) = canceled {
            info!(client_order_id, "order canceled");
            return Ok(order);
        }
        self.ledger
            .store()
            .get_order(client_order_id)
            .await?
            .ok_or_else(|| TradeError::OrderNotFound(client_order_id.to_string()))
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, TradeError> {
        Ok(self.ledger.store().list_orders(status, limit).await?)
    }

    async fn list_fills(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Fill>, TradeError> {
        Ok(self.ledger.store().list_fills(symbol, limit).await?)
    }

    async fn list_events(&self, since_id: u64, limit: usize) -> Result<Vec<Event>, TradeError> {
        Ok(self.ledger.store().list_events(since_id, limit).await?)
    }

    async fn account(&self) -> Result<AccountSnapshot, TradeError> {
        let state = self.ledger.read().await;
        let marks = self.marks_for(&state).await;
        let (positions, market_value) = state.valuation(&marks);
        Ok(AccountSnapshot {
            cash: state.account.cash,
            frozen_cash: state.account.frozen_cash,
            available_cash: state.account.available_cash(),
            market_value,
            total_value: state.account.cash + market_value,
            positions,
            updated_at: state.account.updated_at,
        })
    }

    async fn positions(&self) -> Result<Vec<PositionView>, TradeError> {
        let state = self.ledger.read().await;
        let marks = self.marks_for(&state).await;
        Ok(state.valuation(&marks).0)
    }

    async fn kill_switch(&self) -> Result<KillSwitchState, TradeError> {
        Ok(self
            .ledger
            .peek(|s| {
                s.system.kill_switch.clone().unwrap_or(KillSwitchState {
                    enabled: false,
                    updated_at: s.account.updated_at,
                })
            })
            .await)
    }

    /// # Logic
    /// 开启时在同一事务内撤销所有挂单并释放冻结。
    async fn set_kill_switch(&self, enabled: bool) -> Result<KillSwitchState, TradeError> {
        let now = self.clock.now();
        let state = self
            .ledger
            .transact(now, |tx| Ok(tx.set_kill_switch(enabled)))
            .await?;
        warn!(enabled, "kill switch toggled");
        Ok(state)
    }

    /// # Logic
    /// 今日盈亏 = 当前总资产 − 今日开盘快照；尚无今日快照时为 `None`。
    async fn pnl_summary(&self) -> Result<PnlSummary, TradeError> {
        let now = self.clock.now();
        let state = self.ledger.read().await;
        let marks = self.marks_for(&state).await;
        let (views, market_value) = state.valuation(&marks);
        let total_value = state.account.cash + market_value;

        let today = trading_date(now);
        let day_start_value = state
            .system
            .day_start_value
            .filter(|_| state.system.last_snapshot_date == Some(today));

        Ok(PnlSummary {
            cash: state.account.cash,
            total_value,
            day_start_value,
            today_pnl: day_start_value.map(|start| total_value - start),
            accumulated_pnl: total_value - state.account.initial_cash,
            realized_pnl: state.account.realized_pnl,
            unrealized_pnl_gross: views.iter().map(|v| v.unrealized_pnl_gross).sum(),
        })
    }

    async fn daily_pnl(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyPnl>, TradeError> {
        Ok(self.ledger.store().list_daily_pnl(from, to).await?)
    }
}
