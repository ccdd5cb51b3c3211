use chrono::{DateTime, TimeZone, Utc};
use kaipan_core::common::time::{FakeClockProvider, TimeProvider};
use kaipan_core::common::TimeFrame;
use kaipan_core::config::AppConfig;
use kaipan_core::market::entity::{CandleSeries, DailyTrend, IntradaySeries, Quote, Trend};
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::{CandleQuery, Market};
use kaipan_core::store::port::LedgerStore;
use kaipan_core::trade::entity::{
    Direction, EventType, OrderRequest, OrderStatus, OrderType, RejectCode,
};
use kaipan_core::trade::port::{TradeError, TradePort};
use kaipan_store::memory::MemoryLedgerStore;
use kaipan_trade::ledger::Ledger;
use kaipan_trade::service::TradeService;
use kaipan_trade::worker::TradeWorker;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const PINGAN: &str = "000001.SZ";

#[derive(Clone, Copy)]
struct Book {
    bid: Decimal,
    ask: Decimal,
    last: Decimal,
    prev_close: Decimal,
}

/// 可编程行情：报价时间跟随虚拟时钟，可设置固定延迟
struct MockMarket {
    clock: Arc<FakeClockProvider>,
    books: Mutex<HashMap<String, Book>>,
    lag: Mutex<chrono::Duration>,
    trend: Mutex<Trend>,
    failing: Mutex<bool>,
}

impl MockMarket {
    fn new(clock: Arc<FakeClockProvider>) -> Self {
        Self {
            clock,
            books: Mutex::new(HashMap::new()),
            lag: Mutex::new(chrono::Duration::zero()),
            trend: Mutex::new(Trend::Up),
            failing: Mutex::new(false),
        }
    }

    fn set_book(&self, symbol: &str, bid: Decimal, ask: Decimal, last: Decimal) {
        self.books.lock().unwrap().insert(
            symbol.to_string(),
            Book {
                bid,
                ask,
                last,
                prev_close: dec!(10.00),
            },
        );
    }

    fn set_quote_lag(&self, lag: chrono::Duration) {
        *self.lag.lock().unwrap() = lag;
    }

    fn set_trend(&self, trend: Trend) {
        *self.trend.lock().unwrap() = trend;
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait::async_trait]
impl Market for MockMarket {
    async fn get_candles(&self, query: &CandleQuery) -> Result<CandleSeries, MarketError> {
        Err(MarketError::NoData(query.symbol.clone()))
    }

    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketError> {
        // 模拟网络往返，让并发请求在行情获取处交错
        tokio::task::yield_now().await;
        if *self.failing.lock().unwrap() {
            return Err(MarketError::Network("upstream down".to_string()));
        }
        let books = self.books.lock().unwrap();
        let quote_time = self.clock.now() - *self.lag.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| books.get(s).map(|b| (s, b)))
            .map(|(s, b)| Quote {
                symbol: s.clone(),
                name: None,
                last: b.last,
                open: None,
                high: None,
                low: None,
                bid1: Some(b.bid),
                ask1: Some(b.ask),
                bid1_volume: Some(100),
                ask1_volume: Some(100),
                prev_close: Some(b.prev_close),
                volume: None,
                amount: None,
                quote_time: Some(quote_time),
                source: "mock".to_string(),
            })
            .collect())
    }

    async fn daily_trend(
        &self,
        symbol: &str,
        ma: usize,
        lookback: usize,
    ) -> Result<DailyTrend, MarketError> {
        Ok(DailyTrend {
            symbol: symbol.to_string(),
            trend: *self.trend.lock().unwrap(),
            ma,
            lookback,
            ma_last: 10.0,
            close_last: 10.0,
            slope: 0.0,
            asof: self.clock.now(),
        })
    }

    async fn intraday(&self, symbol: &str, _: TimeFrame) -> Result<IntradaySeries, MarketError> {
        Err(MarketError::NoData(symbol.to_string()))
    }
}

struct Harness {
    clock: Arc<FakeClockProvider>,
    market: Arc<MockMarket>,
    store: Arc<MemoryLedgerStore>,
    service: Arc<TradeService>,
    worker: TradeWorker,
}

// 北京时间 = UTC+8
fn cn(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour - 8, minute, 0).unwrap()
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.trading.initial_cash = dec!(100000);
    config
}

async fn service_on(
    store: Arc<MemoryLedgerStore>,
    clock: Arc<FakeClockProvider>,
    market: Arc<MockMarket>,
) -> Arc<TradeService> {
    let config = config();
    let ledger = Ledger::open(store, config.trading.initial_cash, clock.now())
        .await
        .unwrap();
    Arc::new(TradeService::new(
        Arc::new(ledger),
        market,
        clock,
        &config,
    ))
}

/// 周一 09:31 开盘后启动，先跑一轮后台任务完成当日解冻与快照
async fn harness() -> Harness {
    let clock = Arc::new(FakeClockProvider::new(cn(4, 9, 31)));
    let market = Arc::new(MockMarket::new(clock.clone()));
    market.set_book(PINGAN, dec!(9.99), dec!(10.00), dec!(10.00));
    let store = Arc::new(MemoryLedgerStore::new());
    let service = service_on(store.clone(), clock.clone(), market.clone()).await;
    let worker = TradeWorker::new(service.clone(), 1.0);
    worker.tick().await;
    clock.set_time(cn(4, 10, 0));
    Harness {
        clock,
        market,
        store,
        service,
        worker,
    }
}

fn request(direction: Direction, qty: u64, order_type: OrderType, limit: Option<Decimal>) -> OrderRequest {
    OrderRequest {
        symbol: PINGAN.to_string(),
        direction,
        quantity: qty,
        order_type,
        limit_price: limit,
        client_order_id: None,
    }
}

async fn event_types(service: &TradeService) -> Vec<EventType> {
    service
        .list_events(0, 1000)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn test_aggressive_buy_fills_at_ask() {
    let h = harness().await;

    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_quantity, 1000);
    assert_eq!(order.submit_price, Some(dec!(10.00)));

    let account = h.service.account().await.unwrap();
    // 10000 + 最低佣金 5，深市无过户费
    assert_eq!(account.cash, dec!(89995.00));
    assert_eq!(account.frozen_cash, Decimal::ZERO);
    assert_eq!(account.market_value, dec!(10000.00));

    let positions = h.service.positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].position.total_quantity, 1000);
    assert_eq!(positions[0].position.available_quantity, 0);

    let fills = h.service.list_fills(Some(PINGAN), 10).await.unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, dec!(10.00));
    assert_eq!(fills[0].commission, dec!(5));

    let types = event_types(&h.service).await;
    assert!(types.ends_with(&[EventType::OrderAccepted, EventType::FillApplied]));
}

#[tokio::test]
async fn test_kill_switch_rejects_without_persisting() {
    let h = harness().await;
    let before = h.service.list_events(0, 1000).await.unwrap().len();

    let state = h.service.set_kill_switch(true).await.unwrap();
    assert!(state.enabled);

    let order = h
        .service
        .place_order(request(Direction::Buy, 100, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.rejection.unwrap().code, RejectCode::KillSwitch);

    assert!(h.service.list_orders(None, 10).await.unwrap().is_empty());
    let events = h.service.list_events(0, 1000).await.unwrap();
    // 只有开关切换本身的事件
    assert_eq!(events.len(), before + 1);
    assert_eq!(events[before].event_type, EventType::KillSwitch);
    assert!(h.service.kill_switch().await.unwrap().enabled);
}

#[tokio::test]
async fn test_kill_switch_cancels_open_orders() {
    let h = harness().await;
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::New);

    h.service.set_kill_switch(true).await.unwrap();

    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Canceled);
    let account = h.service.account().await.unwrap();
    assert_eq!(account.frozen_cash, Decimal::ZERO);
    assert_eq!(account.cash, dec!(100000));
}

#[tokio::test]
async fn test_trend_down_blocks_buy_only() {
    let h = harness().await;
    h.market.set_trend(Trend::Down);

    let order = h
        .service
        .place_order(request(Direction::Buy, 100, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.rejection.as_ref().unwrap().code, RejectCode::TrendDown);

    // 拒单会落库并写审计事件
    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Rejected);
    assert_eq!(event_types(&h.service).await.last(), Some(&EventType::OrderRejected));
}

#[tokio::test]
async fn test_quote_failure_rejects_as_invalid() {
    let h = harness().await;
    h.market.set_failing(true);

    let order = h
        .service
        .place_order(request(Direction::Buy, 100, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(order.rejection.unwrap().code, RejectCode::QuoteInvalid);
}

#[tokio::test]
async fn test_limit_order_rests_then_fills_on_worker_tick() {
    let h = harness().await;

    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.reserved_cash, dec!(9955.00));
    let account = h.service.account().await.unwrap();
    assert_eq!(account.frozen_cash, dec!(9955.00));
    assert_eq!(account.available_cash, dec!(90045.00));

    h.market.set_book(PINGAN, dec!(9.89), dec!(9.90), dec!(9.90));
    h.clock.set_time(cn(4, 10, 1));
    h.worker.tick().await;

    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
    let fills = h.service.list_fills(None, 10).await.unwrap();
    assert_eq!(fills[0].price, dec!(9.90));

    let account = h.service.account().await.unwrap();
    assert_eq!(account.frozen_cash, Decimal::ZERO);
    assert_eq!(account.cash, dec!(90095.00));
}

#[tokio::test]
async fn test_stale_quote_does_not_fill_resting_order() {
    let h = harness().await;
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();

    // 可成交的价格，但报价已落后 10 秒
    h.market.set_book(PINGAN, dec!(9.89), dec!(9.90), dec!(9.90));
    h.market.set_quote_lag(chrono::Duration::seconds(10));
    h.clock.set_time(cn(4, 10, 1));
    h.worker.tick().await;

    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::New);
    assert!(h.service.list_fills(None, 10).await.unwrap().is_empty());
    assert_eq!(h.service.account().await.unwrap().frozen_cash, dec!(9955.00));

    h.market.set_quote_lag(chrono::Duration::zero());
    h.worker.tick().await;
    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_no_matching_during_lunch_break() {
    let h = harness().await;
    h.clock.set_time(cn(4, 11, 29));
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::New);

    h.market.set_book(PINGAN, dec!(9.89), dec!(9.90), dec!(9.90));
    h.clock.set_time(cn(4, 11, 31));
    h.worker.tick().await;

    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::New);
    assert!(h.service.list_fills(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_releases_and_is_idempotent() {
    let h = harness().await;
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();

    let canceled = h.service.cancel_order(&order.client_order_id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    let events_after_first = h.service.list_events(0, 1000).await.unwrap().len();

    let again = h.service.cancel_order(&order.client_order_id).await.unwrap();
    assert_eq!(again.status, OrderStatus::Canceled);
    assert_eq!(
        h.service.list_events(0, 1000).await.unwrap().len(),
        events_after_first
    );

    let account = h.service.account().await.unwrap();
    assert_eq!(account.frozen_cash, Decimal::ZERO);

    let missing = h.service.cancel_order("nope").await;
    assert!(matches!(missing, Err(TradeError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_limit_order_expires_after_timeout() {
    let h = harness().await;
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();

    h.clock.advance(chrono::Duration::seconds(181));
    h.worker.tick().await;

    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Canceled);
    let events = h.service.list_events(0, 1000).await.unwrap();
    let cancel = events
        .iter()
        .rev()
        .find(|e| e.event_type == EventType::OrderCanceled)
        .unwrap();
    assert_eq!(cancel.details["reason"], "Timeout");
    assert_eq!(h.service.account().await.unwrap().frozen_cash, Decimal::ZERO);
}

#[tokio::test]
async fn test_t_plus_one_sell() {
    let h = harness().await;
    h.service
        .place_order(request(Direction::Buy, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();

    let same_day = h
        .service
        .place_order(request(Direction::Sell, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(
        same_day.rejection.unwrap().code,
        RejectCode::InsufficientSellable
    );

    // 周二 09:26 解冻
    h.clock.set_time(cn(5, 9, 26));
    h.worker.tick().await;
    assert_eq!(
        h.service.positions().await.unwrap()[0].position.available_quantity,
        1000
    );

    h.clock.set_time(cn(5, 10, 0));
    let sell = h
        .service
        .place_order(request(Direction::Sell, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);
    assert!(h.service.positions().await.unwrap().is_empty());

    // 卖出 9990：佣金 5 + 印花税 9.99
    let account = h.service.account().await.unwrap();
    assert_eq!(account.cash, dec!(89995.00) + dec!(9990) - dec!(5) - dec!(9.99));
}

#[tokio::test]
async fn test_daily_pnl_recorded_once_after_close() {
    let h = harness().await;
    h.service
        .place_order(request(Direction::Buy, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();

    h.market.set_book(PINGAN, dec!(10.19), dec!(10.20), dec!(10.20));
    let summary = h.service.pnl_summary().await.unwrap();
    assert_eq!(summary.day_start_value, Some(dec!(100000)));
    assert_eq!(summary.today_pnl, Some(dec!(195.00)));
    assert_eq!(summary.unrealized_pnl_gross, dec!(200.00));

    h.clock.set_time(cn(4, 15, 6));
    h.worker.tick().await;
    h.worker.tick().await;

    let rows = h.service.daily_pnl(None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.start_value, dec!(100000));
    assert_eq!(row.end_value, dec!(100195.00));
    assert_eq!(row.unrealized_pnl, dec!(200.00));
    assert_eq!(row.fees, dec!(5));
    assert_eq!(row.trades, 1);
    assert_eq!(row.realized_pnl, Decimal::ZERO);

    let pnl_events = event_types(&h.service)
        .await
        .into_iter()
        .filter(|t| *t == EventType::DailyPnl)
        .count();
    assert_eq!(pnl_events, 1);
}

#[tokio::test]
async fn test_weekend_tick_is_idle() {
    let h = harness().await;
    let before = h.service.list_events(0, 1000).await.unwrap().len();
    // 周六
    h.clock.set_time(cn(9, 10, 0));
    h.worker.tick().await;
    assert_eq!(h.service.list_events(0, 1000).await.unwrap().len(), before);
}

#[tokio::test]
async fn test_worker_records_engine_error_and_keeps_order() {
    let h = harness().await;
    let order = h
        .service
        .place_order(request(Direction::Buy, 1000, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();

    h.market.set_failing(true);
    h.worker.tick().await;

    let events = h.service.list_events(0, 1000).await.unwrap();
    let err = events.last().unwrap();
    assert_eq!(err.event_type, EventType::EngineError);
    assert_eq!(err.details["task"], "match_open_orders");
    let stored = h.store.get_order(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::New);
}

#[tokio::test]
async fn test_duplicate_client_order_id_returns_existing() {
    let h = harness().await;
    let mut req = request(Direction::Buy, 100, OrderType::Aggressive, None);
    req.client_order_id = Some("abc-1".to_string());

    let first = h.service.place_order(req.clone()).await.unwrap();
    let second = h.service.place_order(req).await.unwrap();
    assert_eq!(first.client_order_id, "abc-1");
    assert_eq!(second.client_order_id, "abc-1");
    assert_eq!(second.status, OrderStatus::Filled);
    assert_eq!(h.service.list_fills(None, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicate_client_order_id_fills_once() {
    let h = harness().await;
    let mut req = request(Direction::Buy, 100, OrderType::Aggressive, None);
    req.client_order_id = Some("dup-1".to_string());

    let (a, b) = tokio::join!(
        h.service.place_order(req.clone()),
        h.service.place_order(req)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.client_order_id, "dup-1");
    assert_eq!(b.client_order_id, "dup-1");
    assert_eq!(a.status, OrderStatus::Filled);
    assert_eq!(b.status, OrderStatus::Filled);

    assert_eq!(h.service.list_fills(None, 10).await.unwrap().len(), 1);
    let account = h.service.account().await.unwrap();
    assert_eq!(account.cash, dec!(98995.00));
    assert_eq!(h.service.positions().await.unwrap()[0].position.total_quantity, 100);
    let accepted = event_types(&h.service)
        .await
        .into_iter()
        .filter(|t| *t == EventType::OrderAccepted)
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_kill_switch_blocks_sell_without_mutation() {
    let h = harness().await;
    h.service
        .place_order(request(Direction::Buy, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    h.clock.set_time(cn(5, 9, 26));
    h.worker.tick().await;
    h.clock.set_time(cn(5, 10, 0));

    h.service.set_kill_switch(true).await.unwrap();
    let account_before = h.service.account().await.unwrap();
    let position_before = h.service.positions().await.unwrap()[0].position.clone();
    let events_before = h.service.list_events(0, 1000).await.unwrap().len();
    let fills_before = h.service.list_fills(None, 100).await.unwrap().len();

    let order = h
        .service
        .place_order(request(Direction::Sell, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.rejection.unwrap().code, RejectCode::KillSwitch);

    let account_after = h.service.account().await.unwrap();
    assert_eq!(account_after.cash, account_before.cash);
    assert_eq!(account_after.frozen_cash, account_before.frozen_cash);
    let position_after = h.service.positions().await.unwrap()[0].position.clone();
    assert_eq!(position_after.total_quantity, position_before.total_quantity);
    assert_eq!(position_after.available_quantity, 1000);
    assert_eq!(position_after.avg_cost_gross, position_before.avg_cost_gross);
    assert_eq!(h.service.list_events(0, 1000).await.unwrap().len(), events_before);
    assert_eq!(h.service.list_fills(None, 100).await.unwrap().len(), fills_before);
}

#[tokio::test]
async fn test_restart_restores_ledger() {
    let h = harness().await;
    h.service
        .place_order(request(Direction::Buy, 1000, OrderType::Aggressive, None))
        .await
        .unwrap();
    let resting = h
        .service
        .place_order(request(Direction::Buy, 500, OrderType::Limit, Some(dec!(9.95))))
        .await
        .unwrap();
    let last_id = h.service.list_events(0, 1000).await.unwrap().last().unwrap().id;

    let restarted = service_on(h.store.clone(), h.clock.clone(), h.market.clone()).await;
    let account = restarted.account().await.unwrap();
    assert_eq!(account.cash, dec!(89995.00));
    assert_eq!(account.frozen_cash, resting.reserved_cash);
    assert_eq!(restarted.positions().await.unwrap()[0].position.total_quantity, 1000);

    restarted.cancel_order(&resting.client_order_id).await.unwrap();
    let events = restarted.list_events(last_id, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, last_id + 1);
}
