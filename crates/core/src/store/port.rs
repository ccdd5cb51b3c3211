use super::error::StoreError;
use crate::trade::entity::{
    AccountState, DailyPnl, Event, Fill, KillSwitchState, Order, OrderStatus, Position,
    SessionStats,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 账本的非表格化运行状态，持久化在 `system_state` 表中。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub kill_switch: Option<KillSwitchState>,
    // 当日开盘快照的总资产
    pub day_start_value: Option<Decimal>,
    pub session: SessionStats,
    // 各日终任务最近一次执行的交易日，保证每日只跑一次
    pub last_unfreeze_date: Option<NaiveDate>,
    pub last_snapshot_date: Option<NaiveDate>,
    pub last_daily_pnl_date: Option<NaiveDate>,
}

/// # Summary
/// 一次账本操作产生的全部写入，必须在同一事务内提交。
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    pub account: Option<AccountState>,
    // 需要 upsert 的持仓
    pub positions: Vec<Position>,
    // 已清仓、需要删除的持仓
    pub removed_positions: Vec<String>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
    pub events: Vec<Event>,
    pub system: Option<SystemState>,
    pub daily_pnl: Option<DailyPnl>,
}

impl LedgerBatch {
    pub fn is_empty(&self) -> bool {
        self.account.is_none()
            && self.positions.is_empty()
            && self.removed_positions.is_empty()
            && self.orders.is_empty()
            && self.fills.is_empty()
            && self.events.is_empty()
            && self.system.is_none()
            && self.daily_pnl.is_none()
    }
}

/// # Summary
/// 启动时用于恢复内存账本的持久化快照。
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    // 首次启动时为 None
    pub account: Option<AccountState>,
    pub positions: Vec<Position>,
    // 仍处于挂单状态的订单
    pub open_orders: Vec<Order>,
    pub system: SystemState,
    // 已分配的最大事件 id
    pub last_event_id: u64,
}

/// # Summary
/// 交易账本存储接口，负责订单、成交、持仓、资金与事件的持久化。
///
/// # Invariants
/// - `commit` 必须是原子的：批次内的写入要么全部生效，要么全部不生效。
/// - 成交与事件表只追加，不更新。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// # Summary
    /// 读取恢复账本所需的全部状态。
    async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError>;

    /// # Summary
    /// 在单个事务中写入一个批次。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 依次 upsert 账户、持仓、订单、系统状态、日终盈亏，删除清仓持仓。
    /// 3. 追加成交与事件。
    /// 4. 提交；任一步失败则整体回滚。
    async fn commit(&self, batch: &LedgerBatch) -> Result<(), StoreError>;

    async fn get_order(&self, client_order_id: &str) -> Result<Option<Order>, StoreError>;

    /// 按创建时间倒序
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    /// 按成交时间倒序
    async fn list_fills(&self, symbol: Option<&str>, limit: usize)
    -> Result<Vec<Fill>, StoreError>;

    /// id 大于 `since_id` 的事件，按 id 升序
    async fn list_events(&self, since_id: u64, limit: usize) -> Result<Vec<Event>, StoreError>;

    /// 日期闭区间内的日终盈亏，按日期升序
    async fn list_daily_pnl(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyPnl>, StoreError>;
}
