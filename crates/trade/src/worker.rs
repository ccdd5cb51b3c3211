use chrono::{DateTime, Utc};
use kaipan_core::common::session::{is_weekday, local_time_reached, trading_date};
use kaipan_core::common::round_money;
use kaipan_core::market::entity::Quote;
use kaipan_core::trade::entity::{DailyPnl, EventType, Order};
use kaipan_core::trade::port::TradeError;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::service::TradeService;

impl TradeService {
    /// # Summary
    /// 撤销所有已到期的挂单 (原因 `Timeout`)。
    ///
    /// # Returns
    /// 撤销的订单数。
    pub async fn expire_orders(&self) -> Result<usize, TradeError> {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .ledger
            .peek(|s| {
                s.open_orders
                    .values()
                    .filter(|o| o.expires_at.is_some_and(|t| t <= now))
                    .map(|o| o.client_order_id.clone())
                    .collect()
            })
            .await;
        if expired.is_empty() {
            return Ok(0);
        }

        let canceled = self
            .ledger
            .transact(now, |tx| {
                Ok(expired
                    .iter()
                    .filter_map(|id| tx.cancel_order(id, "Timeout"))
                    .count())
            })
            .await?;
        info!(canceled, "expired orders canceled");
        Ok(canceled)
    }

    /// # Summary
    /// 用最新报价撮合所有挂单。
    ///
    /// # Logic
    /// 1. 非交易时段不撮合，挂单留待开盘或到期撤销。
    /// 2. 锁外批量拉取挂单标的的报价，丢弃过期或缺少时间戳的报价。
    /// 3. 锁内逐单重新读取订单 (可能已被撤销) 并判定、入账。
    ///
    /// # Returns
    /// 成交笔数。
    pub async fn match_open_orders(&self) -> Result<usize, TradeError> {
        let open: Vec<Order> = self
            .ledger
            .peek(|s| s.open_orders.values().cloned().collect())
            .await;
        if open.is_empty() {
            return Ok(0);
        }
        if !self.validator.session_open(self.clock.now()) {
            debug!(open = open.len(), "out of session, matching skipped");
            return Ok(0);
        }

        let mut symbols: Vec<String> = open.iter().map(|o| o.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        let fetched = self.market.get_quotes(&symbols).await?;

        let now = self.clock.now();
        let quotes: HashMap<String, Quote> = fetched
            .into_iter()
            .filter(|q| {
                let fresh = self.validator.quote_fresh(q, now);
                if !fresh {
                    warn!(symbol = %q.symbol, quote_time = ?q.quote_time, "stale quote skipped for matching");
                }
                fresh
            })
            .map(|q| (q.symbol.clone(), q))
            .collect();

        let filled = self
            .ledger
            .transact(now, |tx| {
                let mut filled = 0usize;
                for order in &open {
                    let Some(quote) = quotes.get(&order.symbol) else {
                        continue;
                    };
                    let Some(current) = tx.state().open_orders.get(&order.client_order_id) else {
                        continue;
                    };
                    if let Some(execution) = self.matcher.execute(current, quote) {
                        tx.apply_fill(&order.client_order_id, execution, &self.fees)?;
                        filled += 1;
                    }
                }
                Ok(filled)
            })
            .await?;
        if filled > 0 {
            info!(filled, "open orders matched");
        }
        Ok(filled)
    }

    /// # Summary
    /// 工作日 09:25 之后每日一次的 T+1 解冻。
    pub async fn unfreeze_if_due(&self) -> Result<bool, TradeError> {
        let now = self.clock.now();
        let today = trading_date(now);
        if !is_weekday(now) || !local_time_reached(now, 9, 25) {
            return Ok(false);
        }
        if self
            .ledger
            .peek(|s| s.system.last_unfreeze_date == Some(today))
            .await
        {
            return Ok(false);
        }

        self.ledger
            .transact(now, |tx| {
                tx.unfreeze_positions(today);
                Ok(())
            })
            .await?;
        info!(%today, "T+1 positions unfrozen");
        Ok(true)
    }

    /// # Summary
    /// 工作日 09:30 之后每日一次的开盘快照。
    ///
    /// # Logic
    /// 锁外盯市得到总资产，锁内记录并重置当日统计。
    pub async fn snapshot_if_due(&self) -> Result<bool, TradeError> {
        let now = self.clock.now();
        let today = trading_date(now);
        if !is_weekday(now) || !local_time_reached(now, 9, 30) {
            return Ok(false);
        }
        let state = self.ledger.read().await;
        if state.system.last_snapshot_date == Some(today) {
            return Ok(false);
        }

        let marks = self.marks_for(&state).await;
        let start_value = state.total_value(&marks);
        self.ledger
            .transact(now, |tx| {
                tx.snapshot_day_start(today, start_value);
                Ok(())
            })
            .await?;
        info!(%today, start_value = %start_value, "day start snapshot taken");
        Ok(true)
    }

    /// # Summary
    /// 工作日 15:05 之后每日一次的日终盈亏。
    ///
    /// # Logic
    /// 1. 盯市计算收盘总资产与浮动盈亏。
    /// 2. 今日无开盘快照时以收盘总资产作为期初。
    /// 3. 当日已实现盈亏、费用与笔数取自当日统计。
    pub async fn daily_pnl_if_due(&self) -> Result<bool, TradeError> {
        let now = self.clock.now();
        let today = trading_date(now);
        if !is_weekday(now) || !local_time_reached(now, 15, 5) {
            return Ok(false);
        }
        let state = self.ledger.read().await;
        if state.system.last_daily_pnl_date == Some(today) {
            return Ok(false);
        }

        let marks = self.marks_for(&state).await;
        let (views, market_value) = state.valuation(&marks);
        let end_value = round_money(state.account.cash + market_value);
        let start_value = state
            .system
            .day_start_value
            .filter(|_| state.system.last_snapshot_date == Some(today))
            .unwrap_or(end_value);
        let session = &state.system.session;
        let same_day = session.date == Some(today);

        let pnl = DailyPnl {
            date: today,
            start_value,
            end_value,
            realized_pnl: if same_day { session.realized_pnl } else { Decimal::ZERO },
            unrealized_pnl: views.iter().map(|v| v.unrealized_pnl_gross).sum(),
            fees: if same_day { session.fees } else { Decimal::ZERO },
            trades: if same_day { session.trades } else { 0 },
        };
        self.ledger
            .transact(now, |tx| {
                tx.record_daily_pnl(pnl);
                Ok(())
            })
            .await?;
        info!(%today, end_value = %end_value, "daily pnl recorded");
        Ok(true)
    }

    /// 记录后台任务失败 (ENGINE_ERROR)，写入失败只记日志
    pub async fn record_engine_error(&self, task: &str, err: &TradeError) {
        error!(task, error = %err, "background task failed");
        let now = self.clock.now();
        let message = err.to_string();
        let result = self
            .ledger
            .transact(now, |tx| {
                tx.push_event(
                    EventType::EngineError,
                    None,
                    json!({ "task": task, "error": message }),
                );
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "failed to record engine error event");
        }
    }
}

/// # Summary
/// 后台撮合与日终任务循环。
///
/// # Invariants
/// - 单个步骤失败只写 ENGINE_ERROR，不中断循环。
pub struct TradeWorker {
    service: Arc<TradeService>,
    interval: Duration,
}

impl TradeWorker {
    pub fn new(service: Arc<TradeService>, poll_seconds: f64) -> Self {
        let interval = Duration::try_from_secs_f64(poll_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(2));
        Self { service, interval }
    }

    /// # Summary
    /// 执行一轮全部任务。
    ///
    /// # Logic
    /// 日切任务 (T+1 解冻、开盘快照) 先于撮合执行，保证当日成交计入新的当日统计；
    /// 随后过期撤单、撮合，最后是日终盈亏。
    pub async fn tick(&self) {
        let svc = &self.service;
        if let Err(e) = svc.unfreeze_if_due().await {
            svc.record_engine_error("tplus1_unfreeze", &e).await;
        }
        if let Err(e) = svc.snapshot_if_due().await {
            svc.record_engine_error("day_start_snapshot", &e).await;
        }
        if let Err(e) = svc.expire_orders().await {
            svc.record_engine_error("expire_orders", &e).await;
        }
        if let Err(e) = svc.match_open_orders().await {
            svc.record_engine_error("match_open_orders", &e).await;
        }
        if let Err(e) = svc.daily_pnl_if_due().await {
            svc.record_engine_error("daily_pnl", &e).await;
        }
    }

    /// 启动后台循环，返回的句柄由调用方在退出时中止
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis(), "trade worker started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let started: DateTime<Utc> = self.service.clock.now();
                self.tick().await;
                debug!(%started, "trade worker tick done");
            }
        })
    }
}
