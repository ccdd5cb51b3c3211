use chrono::{DateTime, NaiveDate, Utc};
use kaipan_core::common::session::trading_date;
use kaipan_core::common::{ParsedSymbol, round_money};
use kaipan_core::store::port::{LedgerBatch, LedgerStore, SystemState};
use kaipan_core::trade::entity::{
    AccountState, DailyPnl, Direction, Event, EventType, Fill, KillSwitchState, Order,
    OrderStatus, Position, PositionView, SessionStats,
};
use kaipan_core::trade::port::TradeError;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::fees::FeeSchedule;
use crate::matcher::Execution;

/// # Summary
/// 内存中的账本状态：账户、持仓、挂单与运行状态。
///
/// # Invariants
/// - 只通过 `Ledger::transact` 修改，且仅在持久化成功后替换。
/// - `account.frozen_cash` 等于所有挂单买单 `reserved_cash` 之和。
/// - 持仓 `available_quantity` 已扣除挂单卖单的剩余数量。
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub account: AccountState,
    pub positions: BTreeMap<String, Position>,
    pub open_orders: BTreeMap<String, Order>,
    pub system: SystemState,
    pub last_event_id: u64,
}

impl LedgerState {
    pub fn kill_switch_enabled(&self) -> bool {
        self.system.kill_switch.as_ref().is_some_and(|k| k.enabled)
    }

    pub fn sellable(&self, symbol: &str) -> u64 {
        self.positions
            .get(symbol)
            .map(|p| p.available_quantity)
            .unwrap_or(0)
    }

    /// 指定交易日已成交笔数
    pub fn trades_on(&self, date: NaiveDate) -> u32 {
        if self.system.session.date == Some(date) {
            self.system.session.trades
        } else {
            0
        }
    }

    /// 所有挂单与持仓涉及的标的
    pub fn symbols(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .positions
            .keys()
            .chain(self.open_orders.values().map(|o| &o.symbol))
            .cloned()
            .collect();
        set.into_iter().collect()
    }

    /// # Summary
    /// 按最新价盯市。
    ///
    /// # Logic
    /// 无报价的持仓按 `avg_cost_gross` 估值，浮动盈亏因此为零。
    ///
    /// # Returns
    /// (持仓视图, 持仓总市值)
    pub fn valuation(&self, marks: &HashMap<String, Decimal>) -> (Vec<PositionView>, Decimal) {
        let mut market_value = Decimal::ZERO;
        let views = self
            .positions
            .values()
            .map(|p| {
                let last_price = marks.get(&p.symbol).copied();
                let mark = last_price.unwrap_or(p.avg_cost_gross);
                let qty = Decimal::from(p.total_quantity);
                let value = round_money(mark * qty);
                market_value += value;
                PositionView {
                    position: p.clone(),
                    last_price,
                    market_value: value,
                    unrealized_pnl_gross: round_money((mark - p.avg_cost_gross) * qty),
                }
            })
            .collect();
        (views, market_value)
    }

    pub fn total_value(&self, marks: &HashMap<String, Decimal>) -> Decimal {
        let (_, market_value) = self.valuation(marks);
        self.account.cash + market_value
    }
}

/// # Summary
/// 一次成交入账的结果。
#[derive(Debug, Clone)]
pub struct AppliedFill {
    pub fill: Fill,
    // 入账后的订单
    pub order: Order,
    // 卖出时的已实现盈亏，买入为零
    pub realized_pnl: Decimal,
}

/// # Summary
/// 一次账本操作的工作副本，累积需要原子提交的写入。
pub struct LedgerTxn {
    state: LedgerState,
    batch: LedgerBatch,
    now: DateTime<Utc>,
    account_dirty: bool,
    system_dirty: bool,
    touched: BTreeSet<String>,
}

impl LedgerTxn {
    fn begin(state: LedgerState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            batch: LedgerBatch::default(),
            now,
            account_dirty: false,
            system_dirty: false,
            touched: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// 追加一条事件，id 在锁内连续分配
    pub fn push_event(&mut self, event_type: EventType, symbol: Option<&str>, details: Value) -> u64 {
        self.state.last_event_id += 1;
        let id = self.state.last_event_id;
        self.batch.events.push(Event {
            id,
            event_type,
            symbol: symbol.map(str::to_string),
            details,
            timestamp: self.now,
        });
        id
    }

    fn save_order(&mut self, order: &Order) {
        self.batch
            .orders
            .retain(|o| o.client_order_id != order.client_order_id);
        self.batch.orders.push(order.clone());
    }

    fn touch_account(&mut self) {
        self.state.account.updated_at = self.now;
        self.account_dirty = true;
    }

    fn touch_position(&mut self, symbol: &str) {
        if let Some(p) = self.state.positions.get_mut(symbol) {
            p.updated_at = self.now;
        }
        self.touched.insert(symbol.to_string());
    }

    fn release_cash(&mut self, amount: Decimal) {
        let frozen = self.state.account.frozen_cash;
        if amount > frozen {
            warn!(amount = %amount, frozen = %frozen, "releasing more cash than is frozen");
            self.state.account.frozen_cash = Decimal::ZERO;
        } else {
            self.state.account.frozen_cash = frozen - amount;
        }
        self.touch_account();
    }

    fn roll_session(&mut self, date: NaiveDate) {
        if self.state.system.session.date != Some(date) {
            self.state.system.session = SessionStats {
                date: Some(date),
                ..SessionStats::default()
            };
            self.system_dirty = true;
        }
    }

    /// # Summary
    /// 记录一笔风控拒单 (持久化订单并追加 ORDER_REJECTED)。
    pub fn record_rejection(&mut self, order: &Order) {
        self.save_order(order);
        let (code, reason) = order
            .rejection
            .as_ref()
            .map(|r| (r.code.as_str(), r.reason.clone()))
            .unwrap_or(("", String::new()));
        self.push_event(
            EventType::OrderRejected,
            Some(&order.symbol),
            json!({
                "client_order_id": order.client_order_id,
                "direction": order.direction.as_str(),
                "quantity": order.quantity,
                "reject_code": code,
                "reject_reason": reason,
            }),
        );
    }

    /// # Summary
    /// 接受一笔通过风控的订单并冻结对应资源。
    ///
    /// # Logic
    /// 1. 买单冻结 `reserve_cash`；卖单从可卖数量中扣除委托数量。
    /// 2. 订单进入挂单簿，追加 ORDER_ACCEPTED。
    pub fn accept_order(&mut self, mut order: Order, reserve_cash: Decimal) -> Result<Order, TradeError> {
        match order.direction {
            Direction::Buy => {
                if reserve_cash > self.state.account.available_cash() {
                    return Err(TradeError::Internal(format!(
                        "cannot reserve {} with available cash {}",
                        reserve_cash,
                        self.state.account.available_cash()
                    )));
                }
                order.reserved_cash = reserve_cash;
                self.state.account.frozen_cash += reserve_cash;
                self.touch_account();
            }
            Direction::Sell => {
                let position = self
                    .state
                    .positions
                    .get_mut(&order.symbol)
                    .filter(|p| p.available_quantity >= order.quantity)
                    .ok_or_else(|| {
                        TradeError::Internal(format!("cannot reserve {} shares of {}", order.quantity, order.symbol))
                    })?;
                position.available_quantity -= order.quantity;
                order.reserved_cash = Decimal::ZERO;
                let symbol = order.symbol.clone();
                self.touch_position(&symbol);
            }
        }

        order.status = OrderStatus::New;
        order.updated_at = self.now;
        self.save_order(&order);
        self.push_event(
            EventType::OrderAccepted,
            Some(&order.symbol),
            json!({
                "client_order_id": order.client_order_id,
                "direction": order.direction.as_str(),
                "order_type": order.order_type.as_str(),
                "quantity": order.quantity,
                "submit_price": order.submit_price,
                "reserved_cash": order.reserved_cash,
                "expires_at": order.expires_at,
            }),
        );
        self.state
            .open_orders
            .insert(order.client_order_id.clone(), order.clone());
        Ok(order)
    }

    /// # Summary
    /// 将一次撮合结果记入账本，是持仓与资金的唯一变更入口。
    ///
    /// # Logic
    /// 1. 买入：按加权平均更新 gross/net 成本 (net 摊入费用)，释放对应冻结资金，
    ///    现金减少 `成交额 + 费用`，新增股份当日不可卖。
    /// 2. 卖出：成本不变，已实现盈亏 `(价格 − avg_cost_net) × 数量 − 费用`，
    ///    现金增加 `成交额 − 费用`；清仓时删除持仓。
    /// 3. 更新订单成交数量与状态，累计当日统计，追加 FILL_APPLIED。
    ///
    /// # Returns
    /// 成交记录与更新后的订单。
    pub fn apply_fill(
        &mut self,
        client_order_id: &str,
        execution: Execution,
        fees: &FeeSchedule,
    ) -> Result<AppliedFill, TradeError> {
        let mut order = self
            .state
            .open_orders
            .remove(client_order_id)
            .ok_or_else(|| TradeError::OrderNotFound(client_order_id.to_string()))?;
        let remaining = order.remaining();
        let qty = execution.quantity.min(remaining);
        if qty == 0 || execution.price <= Decimal::ZERO {
            return Err(TradeError::Internal(format!(
                "invalid execution {:?} for order {}",
                execution, client_order_id
            )));
        }
        let symbol = ParsedSymbol::parse(&order.symbol)
            .map_err(|e| TradeError::Internal(e.to_string()))?;

        let q = Decimal::from(qty);
        let notional = execution.price * q;
        let fee = fees.compute(notional, order.direction, symbol.exchange);
        let total_fees = fee.total();
        let date = trading_date(self.now);
        self.roll_session(date);

        let realized = match order.direction {
            Direction::Buy => {
                let position = self
                    .state
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Position::empty(order.symbol.clone(), self.now));
                let held = Decimal::from(position.total_quantity);
                let new_total = position.total_quantity + qty;
                let nt = Decimal::from(new_total);
                position.avg_cost_gross = (held * position.avg_cost_gross + notional) / nt;
                position.avg_cost_net = (held * position.avg_cost_net + notional + total_fees) / nt;
                position.total_quantity = new_total;

                let release = if qty == remaining {
                    order.reserved_cash
                } else {
                    round_money(order.reserved_cash * q / Decimal::from(remaining))
                };
                order.reserved_cash -= release;
                self.release_cash(release);
                self.state.account.cash -= notional + total_fees;
                Decimal::ZERO
            }
            Direction::Sell => {
                let position = self
                    .state
                    .positions
                    .get_mut(&order.symbol)
                    .filter(|p| p.total_quantity >= qty)
                    .ok_or_else(|| {
                        TradeError::Internal(format!("sell fill exceeds holding of {}", order.symbol))
                    })?;
                let realized = round_money((execution.price - position.avg_cost_net) * q - total_fees);
                position.total_quantity -= qty;
                position.available_quantity = position.available_quantity.min(position.total_quantity);
                if position.is_flat() {
                    self.state.positions.remove(&order.symbol);
                }
                self.state.account.cash += notional - total_fees;
                self.state.account.realized_pnl += realized;
                self.state.system.session.realized_pnl += realized;
                realized
            }
        };
        self.touch_account();
        self.touch_position(&order.symbol);

        self.state.system.session.trades += 1;
        self.state.system.session.fees += total_fees;
        self.system_dirty = true;

        order.filled_quantity += qty;
        order.status = if order.remaining() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        order.updated_at = self.now;
        self.save_order(&order);

        let fill = Fill {
            fill_id: uuid::Uuid::new_v4().simple().to_string(),
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            direction: order.direction,
            quantity: qty,
            price: execution.price,
            commission: fee.commission,
            stamp_tax: fee.stamp_tax,
            transfer_fee: fee.transfer_fee,
            trade_time: self.now,
        };
        self.batch.fills.push(fill.clone());
        self.push_event(
            EventType::FillApplied,
            Some(&order.symbol),
            json!({
                "fill_id": fill.fill_id,
                "client_order_id": fill.client_order_id,
                "direction": fill.direction.as_str(),
                "quantity": fill.quantity,
                "price": fill.price,
                "commission": fill.commission,
                "stamp_tax": fill.stamp_tax,
                "transfer_fee": fill.transfer_fee,
                "realized_pnl": realized,
                "cash": self.state.account.cash,
            }),
        );

        if order.status.is_open() {
            self.state
                .open_orders
                .insert(order.client_order_id.clone(), order.clone());
        }
        Ok(AppliedFill {
            fill,
            order,
            realized_pnl: realized,
        })
    }

    /// # Summary
    /// 撤销挂单并释放其剩余冻结。
    ///
    /// # Returns
    /// 订单不在挂单簿中 (已终态或不存在) 时返回 `None`。
    pub fn cancel_order(&mut self, client_order_id: &str, reason: &str) -> Option<Order> {
        let mut order = self.state.open_orders.remove(client_order_id)?;
        match order.direction {
            Direction::Buy => {
                let reserved = order.reserved_cash;
                order.reserved_cash = Decimal::ZERO;
                self.release_cash(reserved);
            }
            Direction::Sell => {
                let remaining = order.remaining();
                if let Some(p) = self.state.positions.get_mut(&order.symbol) {
                    p.available_quantity = (p.available_quantity + remaining).min(p.total_quantity);
                }
                let symbol = order.symbol.clone();
                self.touch_position(&symbol);
            }
        }
        order.status = OrderStatus::Canceled;
        order.updated_at = self.now;
        self.save_order(&order);
        self.push_event(
            EventType::OrderCanceled,
            Some(&order.symbol),
            json!({
                "client_order_id": order.client_order_id,
                "filled_quantity": order.filled_quantity,
                "reason": reason,
            }),
        );
        Some(order)
    }

    /// # Summary
    /// 切换熔断开关；开启时撤销全部挂单。
    pub fn set_kill_switch(&mut self, enabled: bool) -> KillSwitchState {
        let state = KillSwitchState {
            enabled,
            updated_at: self.now,
        };
        self.state.system.kill_switch = Some(state.clone());
        self.system_dirty = true;
        self.push_event(EventType::KillSwitch, None, json!({ "enabled": enabled }));

        if enabled {
            let ids: Vec<String> = self.state.open_orders.keys().cloned().collect();
            for id in ids {
                self.cancel_order(&id, "Kill switch");
            }
        }
        state
    }

    /// # Summary
    /// T+1 解冻：可卖数量恢复为持仓总量减去挂单卖单剩余数量。
    pub fn unfreeze_positions(&mut self, date: NaiveDate) {
        let mut reserved: HashMap<String, u64> = HashMap::new();
        for o in self.state.open_orders.values() {
            if o.direction == Direction::Sell {
                *reserved.entry(o.symbol.clone()).or_default() += o.remaining();
            }
        }
        let symbols: Vec<String> = self.state.positions.keys().cloned().collect();
        for symbol in &symbols {
            if let Some(p) = self.state.positions.get_mut(symbol) {
                let held_by_orders = reserved.get(symbol).copied().unwrap_or(0);
                p.available_quantity = p.total_quantity.saturating_sub(held_by_orders);
            }
            self.touch_position(symbol);
        }
        self.state.system.last_unfreeze_date = Some(date);
        self.system_dirty = true;
        self.push_event(
            EventType::Tplus1Unfreeze,
            None,
            json!({ "date": date, "positions": symbols.len() }),
        );
    }

    /// # Summary
    /// 记录开盘快照并重置当日统计。
    pub fn snapshot_day_start(&mut self, date: NaiveDate, start_value: Decimal) {
        let start_value = round_money(start_value);
        self.state.system.day_start_value = Some(start_value);
        self.state.system.last_snapshot_date = Some(date);
        self.state.system.session = SessionStats {
            date: Some(date),
            ..SessionStats::default()
        };
        self.system_dirty = true;
        self.push_event(
            EventType::DayStartSnapshot,
            None,
            json!({ "date": date, "start_value": start_value }),
        );
    }

    /// # Summary
    /// 写入日终盈亏记录。
    pub fn record_daily_pnl(&mut self, pnl: DailyPnl) {
        self.state.system.last_daily_pnl_date = Some(pnl.date);
        self.system_dirty = true;
        self.push_event(
            EventType::DailyPnl,
            None,
            json!({
                "date": pnl.date,
                "start_value": pnl.start_value,
                "end_value": pnl.end_value,
                "realized_pnl": pnl.realized_pnl,
                "unrealized_pnl": pnl.unrealized_pnl,
                "fees": pnl.fees,
                "trades": pnl.trades,
            }),
        );
        self.batch.daily_pnl = Some(pnl);
    }

    fn finish(mut self) -> (LedgerState, LedgerBatch) {
        if self.account_dirty {
            self.batch.account = Some(self.state.account.clone());
        }
        if self.system_dirty {
            self.batch.system = Some(self.state.system.clone());
        }
        for symbol in &self.touched {
            match self.state.positions.get(symbol) {
                Some(p) => self.batch.positions.push(p.clone()),
                None => self.batch.removed_positions.push(symbol.clone()),
            }
        }
        (self.state, self.batch)
    }
}

/// # Summary
/// 账本：持有唯一的全局互斥锁，串行化所有资金与持仓变更。
///
/// # Invariants
/// - 每次变更先在副本上完成，再以单个事务持久化，成功后才替换内存状态。
/// - 锁内不访问行情等外部服务，只做计算与本地持久化。
pub struct Ledger {
    state: Mutex<LedgerState>,
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    /// # Summary
    /// 从持久化快照恢复账本；首次启动时以 `initial_cash` 建账。
    pub async fn open(
        store: Arc<dyn LedgerStore>,
        initial_cash: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, TradeError> {
        let snapshot = store.load_snapshot().await?;
        let account = match snapshot.account {
            Some(account) => account,
            None => {
                let account = AccountState::new(initial_cash, now);
                store
                    .commit(&LedgerBatch {
                        account: Some(account.clone()),
                        ..Default::default()
                    })
                    .await?;
                info!(initial_cash = %initial_cash, "paper account created");
                account
            }
        };

        let state = LedgerState {
            account,
            positions: snapshot
                .positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect(),
            open_orders: snapshot
                .open_orders
                .into_iter()
                .map(|o| (o.client_order_id.clone(), o))
                .collect(),
            system: snapshot.system,
            last_event_id: snapshot.last_event_id,
        };
        info!(
            positions = state.positions.len(),
            open_orders = state.open_orders.len(),
            last_event_id = state.last_event_id,
            "ledger restored"
        );
        Ok(Self {
            state: Mutex::new(state),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// 当前已提交状态的副本
    pub async fn read(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    /// 在锁内读取部分状态，避免整体复制
    pub async fn peek<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        f(&*self.state.lock().await)
    }

    /// # Summary
    /// 在账本锁内执行一次变更。
    ///
    /// # Logic
    /// 1. 加锁并复制当前状态。
    /// 2. 执行闭包；闭包失败则放弃全部修改。
    /// 3. 批次非空时单事务提交，提交失败同样放弃。
    /// 4. 替换内存状态。
    pub async fn transact<R, F>(&self, now: DateTime<Utc>, f: F) -> Result<R, TradeError>
    where
        F: FnOnce(&mut LedgerTxn) -> Result<R, TradeError> + Send,
        R: Send,
    {
        let mut guard = self.state.lock().await;
        self.run_locked(&mut guard, now, f).await
    }

    /// # Summary
    /// 以 `client_order_id` 为唯一键建单的变更。
    ///
    /// # Logic
    /// 1. 加锁后先查存储：同 ID 订单已存在则不执行闭包，原样返回该订单。
    /// 2. 否则与 `transact` 相同。
    ///
    /// # Invariants
    /// - 查重与写入在同一把锁内，并发的同 ID 请求至多成交一次。
    pub async fn transact_new_order<R, F>(
        &self,
        client_order_id: &str,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<NewOrder<R>, TradeError>
    where
        F: FnOnce(&mut LedgerTxn) -> Result<R, TradeError> + Send,
        R: Send,
    {
        let mut guard = self.state.lock().await;
        if let Some(existing) = self.store.get_order(client_order_id).await? {
            return Ok(NewOrder::Existing(existing));
        }
        self.run_locked(&mut guard, now, f)
            .await
            .map(NewOrder::Created)
    }

    async fn run_locked<R, F>(
        &self,
        guard: &mut MutexGuard<'_, LedgerState>,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<R, TradeError>
    where
        F: FnOnce(&mut LedgerTxn) -> Result<R, TradeError> + Send,
        R: Send,
    {
        let mut txn = LedgerTxn::begin((**guard).clone(), now);
        let out = f(&mut txn)?;
        let (next, batch) = txn.finish();
        if !batch.is_empty() {
            self.store.commit(&batch).await?;
        }
        **guard = next;
        Ok(out)
    }
}

/// 按唯一 ID 建单的结果
#[derive(Debug)]
pub enum NewOrder<R> {
    /// 闭包已执行并提交
    Created(R),
    /// 同 ID 订单已存在，未做任何修改
    Existing(Order),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kaipan_core::trade::entity::{OrderRequest, OrderType};
    use kaipan_store::memory::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap()
    }

    fn order(id: &str, symbol: &str, direction: Direction, qty: u64) -> Order {
        let req = OrderRequest {
            symbol: symbol.to_string(),
            direction,
            quantity: qty,
            order_type: OrderType::Aggressive,
            limit_price: None,
            client_order_id: None,
        };
        Order::from_request(id.to_string(), &req, now())
    }

    async fn ledger() -> Ledger {
        Ledger::open(Arc::new(MemoryLedgerStore::new()), dec!(100000), now())
            .await
            .unwrap()
    }

    async fn fill(
        ledger: &Ledger,
        id: &str,
        direction: Direction,
        qty: u64,
        price: Decimal,
        reserve: Decimal,
    ) -> Fill {
        ledger
            .transact(now(), |tx| {
                tx.accept_order(order(id, "600000.SH", direction, qty), reserve)?;
                tx.apply_fill(id, Execution { price, quantity: qty }, &FeeSchedule::default())
            })
            .await
            .unwrap()
            .fill
    }

    fn make_sellable(state: &mut LedgerState) {
        for p in state.positions.values_mut() {
            p.available_quantity = p.total_quantity;
        }
    }

    #[tokio::test]
    async fn test_buy_updates_costs_and_cash() {
        let ledger = ledger().await;
        let f = fill(&ledger, "b1", Direction::Buy, 1000, dec!(10), dec!(10005.20)).await;
        // 10,000 成交额：佣金 5，过户费 0.2
        assert_eq!(f.total_fees(), dec!(5.20));

        let state = ledger.read().await;
        let p = &state.positions["600000.SH"];
        assert_eq!(p.total_quantity, 1000);
        assert_eq!(p.available_quantity, 0);
        assert_eq!(p.avg_cost_gross, dec!(10));
        assert_eq!(p.avg_cost_net, dec!(10.0052));
        assert_eq!(state.account.cash, dec!(89994.80));
        assert_eq!(state.account.frozen_cash, dec!(0));
        assert!(state.open_orders.is_empty());
        assert_eq!(state.system.session.trades, 1);
    }

    #[tokio::test]
    async fn test_sell_keeps_cost_and_books_realized_pnl() {
        let ledger = ledger().await;
        fill(&ledger, "b1", Direction::Buy, 1000, dec!(10), dec!(10005.20)).await;
        {
            let mut guard = ledger.state.lock().await;
            make_sellable(&mut guard);
        }
        fill(&ledger, "s1", Direction::Sell, 400, dec!(11), dec!(0)).await;

        let state = ledger.read().await;
        let p = &state.positions["600000.SH"];
        assert_eq!(p.total_quantity, 600);
        assert_eq!(p.available_quantity, 600);
        assert_eq!(p.avg_cost_gross, dec!(10));
        assert_eq!(p.avg_cost_net, dec!(10.0052));
        // 4,400 卖出：佣金 5，印花税 4.4，过户费 0.09 (0.088)
        // (11 − 10.0052) × 400 − 9.49 = 388.43
        assert_eq!(state.account.realized_pnl, dec!(388.43));
        assert_eq!(state.account.cash, dec!(89994.80) + dec!(4400) - dec!(9.49));
    }

    #[tokio::test]
    async fn test_round_trip_loses_exactly_the_fees() {
        let ledger = ledger().await;
        let buy = fill(&ledger, "b1", Direction::Buy, 300, dec!(12.34), dec!(3707.07)).await;
        {
            let mut guard = ledger.state.lock().await;
            make_sellable(&mut guard);
        }
        let sell = fill(&ledger, "s1", Direction::Sell, 300, dec!(12.34), dec!(0)).await;

        let state = ledger.read().await;
        assert_eq!(state.account.realized_pnl, -(buy.total_fees() + sell.total_fees()));
        assert!(!state.positions.contains_key("600000.SH"));
    }

    #[tokio::test]
    async fn test_cancel_releases_reservations() {
        let ledger = ledger().await;
        ledger
            .transact(now(), |tx| {
                tx.accept_order(order("b1", "600000.SH", Direction::Buy, 100), dec!(1005.02))
            })
            .await
            .unwrap();
        assert_eq!(ledger.read().await.account.frozen_cash, dec!(1005.02));

        let canceled = ledger
            .transact(now(), |tx| Ok(tx.cancel_order("b1", "Manual cancel")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(canceled.reserved_cash, dec!(0));
        let state = ledger.read().await;
        assert_eq!(state.account.frozen_cash, dec!(0));
        assert_eq!(state.account.cash, dec!(100000));

        // 再次撤单是空操作
        let again = ledger
            .transact(now(), |tx| Ok(tx.cancel_order("b1", "Manual cancel")))
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_failed_closure_leaves_state_untouched() {
        let ledger = ledger().await;
        let before = ledger.read().await.account.clone();
        let result: Result<(), TradeError> = ledger
            .transact(now(), |tx| {
                tx.accept_order(order("b1", "600000.SH", Direction::Buy, 100), dec!(1000))?;
                Err(TradeError::Internal("boom".into()))
            })
            .await;
        assert!(result.is_err());
        let state = ledger.read().await;
        assert_eq!(state.account, before);
        assert!(state.open_orders.is_empty());
        assert_eq!(state.last_event_id, 0);
    }

    #[tokio::test]
    async fn test_unfreeze_respects_open_sells() {
        let ledger = ledger().await;
        fill(&ledger, "b1", Direction::Buy, 1000, dec!(10), dec!(10005.20)).await;
        {
            let mut guard = ledger.state.lock().await;
            make_sellable(&mut guard);
        }
        ledger
            .transact(now(), |tx| {
                tx.accept_order(order("s1", "600000.SH", Direction::Sell, 300), dec!(0))
            })
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        ledger
            .transact(now(), |tx| {
                tx.unfreeze_positions(date);
                Ok(())
            })
            .await
            .unwrap();
        let state = ledger.read().await;
        assert_eq!(state.positions["600000.SH"].available_quantity, 700);
        assert_eq!(state.system.last_unfreeze_date, Some(date));
    }

    #[tokio::test]
    async fn test_event_ids_are_sequential() {
        let ledger = ledger().await;
        fill(&ledger, "b1", Direction::Buy, 100, dec!(10), dec!(1005.02)).await;
        let events = ledger.store().list_events(0, 10).await.unwrap();
        let ids: Vec<u64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(events[0].event_type, EventType::OrderAccepted);
        assert_eq!(events[1].event_type, EventType::FillApplied);
    }
}
