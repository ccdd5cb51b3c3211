use async_trait::async_trait;
use chrono::NaiveDate;
use kaipan_core::store::error::StoreError;
use kaipan_core::store::port::{LedgerBatch, LedgerSnapshot, LedgerStore, SystemState};
use kaipan_core::trade::entity::{AccountState, DailyPnl, Event, Fill, Order, OrderStatus, Position};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    account: Option<AccountState>,
    positions: BTreeMap<String, Position>,
    orders: HashMap<String, Order>,
    fills: Vec<Fill>,
    events: BTreeMap<u64, Event>,
    system: SystemState,
    daily_pnl: BTreeMap<NaiveDate, DailyPnl>,
}

/// # Summary
/// 进程内账本存储，语义与 SQLite 实现一致，但重启即丢失。
///
/// # Invariants
/// - 批次在同一把写锁内校验并应用，失败时不留下部分写入。
pub struct MemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let t = self.tables.read().await;
        let mut open_orders: Vec<Order> = t
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .cloned()
            .collect();
        open_orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.client_order_id.cmp(&b.client_order_id))
        });
        Ok(LedgerSnapshot {
            account: t.account.clone(),
            positions: t.positions.values().cloned().collect(),
            open_orders,
            system: t.system.clone(),
            last_event_id: t.events.keys().next_back().copied().unwrap_or(0),
        })
    }

    /// # Logic
    /// 1. 先校验成交 id 与事件 id 的唯一性 (与 SQLite 约束一致)。
    /// 2. 校验通过后再整体应用。
    async fn commit(&self, batch: &LedgerBatch) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;

        for f in &batch.fills {
            if t.fills.iter().any(|x| x.fill_id == f.fill_id) {
                return Err(StoreError::Database(format!("duplicate fill id: {}", f.fill_id)));
            }
        }
        for e in &batch.events {
            if t.events.contains_key(&e.id) {
                return Err(StoreError::Database(format!("duplicate event id: {}", e.id)));
            }
        }

        if let Some(account) = &batch.account {
            t.account = Some(account.clone());
        }
        for p in &batch.positions {
            t.positions.insert(p.symbol.clone(), p.clone());
        }
        for symbol in &batch.removed_positions {
            t.positions.remove(symbol);
        }
        for o in &batch.orders {
            t.orders.insert(o.client_order_id.clone(), o.clone());
        }
        t.fills.extend(batch.fills.iter().cloned());
        for e in &batch.events {
            t.events.insert(e.id, e.clone());
        }
        if let Some(system) = &batch.system {
            t.system = system.clone();
        }
        if let Some(d) = &batch.daily_pnl {
            t.daily_pnl.insert(d.date, d.clone());
        }
        Ok(())
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.get(client_order_id).cloned())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let t = self.tables.read().await;
        let mut orders: Vec<Order> = t
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.client_order_id.cmp(&a.client_order_id))
        });
        orders.truncate(limit);
        Ok(orders)
    }

    async fn list_fills(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Fill>, StoreError> {
        let t = self.tables.read().await;
        // 插入顺序即 seq；稳定排序保证同一时刻后写入的排在前面
        let mut fills: Vec<Fill> = t
            .fills
            .iter()
            .rev()
            .filter(|f| symbol.is_none_or(|s| f.symbol == s))
            .cloned()
            .collect();
        fills.sort_by(|a, b| b.trade_time.cmp(&a.trade_time));
        fills.truncate(limit);
        Ok(fills)
    }

    async fn list_events(&self, since_id: u64, limit: usize) -> Result<Vec<Event>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.events
            .range(since_id.saturating_add(1)..)
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn list_daily_pnl(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyPnl>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.daily_pnl
            .values()
            .filter(|d| from.is_none_or(|f| d.date >= f) && to.is_none_or(|x| d.date <= x))
            .cloned()
            .collect())
    }
}
