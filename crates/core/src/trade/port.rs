use super::entity::{
    AccountSnapshot, DailyPnl, Event, Fill, KillSwitchState, Order, OrderRequest, OrderStatus,
    PnlSummary, PositionView,
};
use crate::market::error::MarketError;
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// # Summary
/// 交易执行环节中可能发生的错误。
///
/// # Invariants
/// - 风控拒单不是错误，而是状态为 REJECTED 的订单。
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("订单未找到或不存在: {0}")]
    OrderNotFound(String),
    #[error("非法请求: {0}")]
    InvalidRequest(String),
    #[error("行情错误: {0}")]
    Market(#[from] MarketError),
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    #[error("内部系统错误: {0}")]
    Internal(String),
}

/// # Summary
/// 核心交易服务抽象接口。
/// HTTP 层通过此端口下单、撤单并查询账户、订单与审计日志。
///
/// # Invariants
/// - 此接口必须是异步且线程安全的 (`Send + Sync`)。
/// - 所有写操作在同一把账本锁内完成，读操作返回已提交的状态。
#[async_trait]
pub trait TradePort: Send + Sync {
    /// 提交一笔新的委托
    ///
    /// # Returns
    /// * `Ok(Order)` - 被接受 (NEW/FILLED) 或被风控拒绝 (REJECTED) 的订单
    /// * `Err(TradeError)` - 存储失败等系统错误
    async fn place_order(&self, req: OrderRequest) -> Result<Order, TradeError>;

    /// 撤销一笔挂单；已是终态的订单原样返回
    async fn cancel_order(&self, client_order_id: &str) -> Result<Order, TradeError>;

    /// 按状态过滤并按创建时间倒序列出订单
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, TradeError>;

    /// 成交流水 (倒序)
    async fn list_fills(&self, symbol: Option<&str>, limit: usize)
    -> Result<Vec<Fill>, TradeError>;

    /// 增量拉取 id 大于 `since_id` 的事件 (升序)
    async fn list_events(&self, since_id: u64, limit: usize) -> Result<Vec<Event>, TradeError>;

    /// 盯市后的账户快照
    async fn account(&self) -> Result<AccountSnapshot, TradeError>;

    /// 盯市后的持仓列表
    async fn positions(&self) -> Result<Vec<PositionView>, TradeError>;

    async fn kill_switch(&self) -> Result<KillSwitchState, TradeError>;

    /// 切换熔断开关；开启时撤销全部挂单
    async fn set_kill_switch(&self, enabled: bool) -> Result<KillSwitchState, TradeError>;

    async fn pnl_summary(&self) -> Result<PnlSummary, TradeError>;

    async fn daily_pnl(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyPnl>, TradeError>;
}
