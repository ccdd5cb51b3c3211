use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use kaipan_api::server::{ApiDoc, AppState};
use kaipan_api::types::{
    AccountResponse, ApiErrorResponse, ApiResponse, CandleFillResponse, CandlesResponse,
    EventResponse, IntradayResponse, KdjPointResponse, KillSwitchResponse, OrderResponse,
    PositionResponse,
};
use kaipan_core::common::TimeFrame;
use kaipan_core::common::time::{FakeClockProvider, TimeProvider};
use kaipan_core::config::AppConfig;
use kaipan_core::market::entity::{
    Candle, CandleSeries, DailyTrend, IntradaySeries, Quote, Trend,
};
use kaipan_core::market::error::MarketError;
use kaipan_core::market::port::{CandleQuery, Market};
use kaipan_store::memory::MemoryLedgerStore;
use kaipan_trade::ledger::Ledger;
use kaipan_trade::service::TradeService;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use utoipa::OpenApi;

// reqwest 在工作区中以 rustls-no-provider 构建，进程级加密后端需显式安装
fn install_crypto() {
    rustls::crypto::ring::default_provider().install_default().ok();
}

const PINGAN: &str = "000001.SZ";

// 北京时间 = UTC+8
fn cn(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour - 8, minute, 0).unwrap()
}

/// 固定盘口 9.99 / 10.00；只有平安银行有 K 线
struct StaticMarket {
    clock: Arc<FakeClockProvider>,
}

#[async_trait::async_trait]
impl Market for StaticMarket {
    async fn get_candles(&self, query: &CandleQuery) -> Result<CandleSeries, MarketError> {
        if query.symbol != PINGAN {
            return Err(MarketError::NoData(query.symbol.clone()));
        }
        // 60 分钟线：10:30 11:30 14:00 15:00 收
        let ends = [cn(10, 30), cn(11, 30), cn(14, 0), cn(15, 0)];
        let candles: Vec<Candle> = ends
            .iter()
            .map(|&time| Candle {
                time,
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 1000.0,
                amount: None,
            })
            .collect();
        let last_complete_time = candles.last().map(|c| c.time).unwrap();
        Ok(CandleSeries {
            candles,
            last_complete_time,
        })
    }

    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketError> {
        let now = self.clock.now();
        Ok(symbols
            .iter()
            .filter(|s| s.as_str() == PINGAN)
            .map(|s| Quote {
                symbol: s.clone(),
                name: Some("平安银行".to_string()),
                last: dec!(10.00),
                open: Some(dec!(10.00)),
                high: Some(dec!(10.05)),
                low: Some(dec!(9.95)),
                bid1: Some(dec!(9.99)),
                ask1: Some(dec!(10.00)),
                bid1_volume: Some(100),
                ask1_volume: Some(100),
                prev_close: Some(dec!(10.00)),
                volume: None,
                amount: None,
                quote_time: Some(now),
                source: "static".to_string(),
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
            trend: Trend::Up,
            ma,
            lookback,
            ma_last: 10.0,
            close_last: 10.0,
            slope: 0.01,
            asof: self.clock.now(),
        })
    }

    async fn intraday(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<IntradaySeries, MarketError> {
        if symbol != PINGAN {
            return Err(MarketError::NoData(symbol.to_string()));
        }
        let bar = |time, close, volume| Candle {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            amount: None,
        };
        Ok(IntradaySeries {
            symbol: symbol.to_string(),
            timeframe,
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            bars: vec![bar(cn(9, 31), 10.0, 100.0), bar(cn(9, 32), 11.0, 300.0)],
            avg_price: 10.75,
        })
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

// 帮助函数：在随机端口启动测试服务器 (周一 10:00 盘中)
async fn spawn_test_server() -> TestServer {
    let clock = Arc::new(FakeClockProvider::new(cn(10, 0)));
    let market = Arc::new(StaticMarket {
        clock: clock.clone(),
    });

    let mut config = AppConfig::default();
    config.trading.initial_cash = dec!(100000);
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = Ledger::open(store, config.trading.initial_cash, clock.now())
        .await
        .unwrap();
    let trade = Arc::new(TradeService::new(
        Arc::new(ledger),
        market.clone(),
        clock,
        &config,
    ));

    let state = AppState {
        trade,
        market,
        risk: config.risk.clone(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        kaipan_api::server::serve(state, listener, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    install_crypto();
    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _shutdown: tx,
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn buy(&self, quantity: u64, client_order_id: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/orders"))
            .json(&json!({
                "symbol": " 000001.sz ",
                "direction": "BUY",
                "quantity": quantity,
                "client_order_id": client_order_id,
            }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_openapi_lists_trading_paths() {
    let doc = ApiDoc::openapi();
    assert_eq!(doc.info.title, "开盘 Kaipan 纸面交易 API");

    let server = spawn_test_server().await;
    let res = server
        .client
        .get(server.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let doc_json: serde_json::Value = res.json().await.unwrap();
    let paths = doc_json["paths"].as_object().unwrap();
    for path in [
        "/api/v1/quotes",
        "/api/v1/candles",
        "/api/v1/candles/fills",
        "/api/v1/intraday/{symbol}",
        "/api/v1/indicators/kdj",
        "/api/v1/orders",
        "/api/v1/orders/{client_order_id}/cancel",
        "/api/v1/risk/kill_switch",
    ] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
}

#[tokio::test]
async fn test_order_workflow() {
    let server = spawn_test_server().await;

    // 1. 对价买入 100 股，按卖一 10.00 成交，佣金 5 元
    let res = server.buy(100, "wf-1").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: ApiResponse<OrderResponse> = res.json().await.unwrap();
    assert!(body.success);
    let order = body.data.unwrap();
    assert_eq!(order.client_order_id, "wf-1");
    assert_eq!(order.symbol, PINGAN);
    assert_eq!(order.status, "FILLED");
    assert_eq!(order.filled_quantity, 100);

    // 2. 账户：现金 100000 - 1000 - 5
    let res = server
        .client
        .get(server.url("/api/v1/account"))
        .send()
        .await
        .unwrap();
    let account = res
        .json::<ApiResponse<AccountResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(account.cash.parse::<Decimal>().unwrap(), dec!(98995));
    assert_eq!(account.frozen_cash.parse::<Decimal>().unwrap(), Decimal::ZERO);

    // 3. 当日买入不可卖
    let res = server
        .client
        .get(server.url("/api/v1/positions"))
        .send()
        .await
        .unwrap();
    let positions = res
        .json::<ApiResponse<Vec<PositionResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].total_quantity, 100);
    assert_eq!(positions[0].available_quantity, 0);

    // 4. 卖出被 T+1 拦截，仍然是 200 + REJECTED
    let res = server
        .client
        .post(server.url("/api/v1/orders"))
        .json(&json!({
            "symbol": PINGAN,
            "direction": "SELL",
            "quantity": 100,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order = res
        .json::<ApiResponse<OrderResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(order.status, "REJECTED");
    assert!(order.reject_code.is_some());

    // 5. 已成交订单撤单原样返回
    let res = server
        .client
        .post(server.url("/api/v1/orders/wf-1/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order = res
        .json::<ApiResponse<OrderResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(order.status, "FILLED");

    // 6. 订单列表按状态过滤
    let res = server
        .client
        .get(server.url("/api/v1/orders?status=filled"))
        .send()
        .await
        .unwrap();
    let orders = res
        .json::<ApiResponse<Vec<OrderResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].client_order_id, "wf-1");

    // 7. 事件增量拉取
    let res = server
        .client
        .get(server.url("/api/v1/events?since_id=0&limit=1000"))
        .send()
        .await
        .unwrap();
    let events = res
        .json::<ApiResponse<Vec<EventResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(events.iter().any(|e| e.event_type == "FILL_APPLIED"));
    let last_id = events.last().unwrap().id;
    let res = server
        .client
        .get(server.url(&format!("/api/v1/events?since_id={}", last_id)))
        .send()
        .await
        .unwrap();
    let newer = res
        .json::<ApiResponse<Vec<EventResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(newer.is_empty());
}

#[tokio::test]
async fn test_error_codes() {
    let server = spawn_test_server().await;

    let res = server
        .client
        .post(server.url("/api/v1/orders/nope/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: ApiErrorResponse = res.json().await.unwrap();
    assert!(!err.success);
    assert_eq!(err.code, "NOT_FOUND");

    let res = server
        .client
        .get(server.url("/api/v1/candles?symbol=600519.SH"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: ApiErrorResponse = res.json().await.unwrap();
    assert_eq!(err.code, "NO_DATA");

    let res = server
        .client
        .get(server.url("/api/v1/candles?symbol=000001.SZ&tf=7m"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: ApiErrorResponse = res.json().await.unwrap();
    assert_eq!(err.code, "BAD_REQUEST");

    let res = server
        .client
        .get(server.url("/api/v1/fills?limit=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .post(server.url("/api/v1/orders"))
        .json(&json!({
            "symbol": PINGAN,
            "direction": "HOLD",
            "quantity": 100,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .get(server.url("/api/v1/trend/daily?symbol=000001.SZ&ma=3"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_candles_kdj_and_fill_markers() {
    let server = spawn_test_server().await;
    let res = server.buy(200, "mk-1").await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client
        .get(server.url("/api/v1/candles?symbol=000001.SZ&tf=60m"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let series = res
        .json::<ApiResponse<CandlesResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(series.tf, "60m");
    assert_eq!(series.candles.len(), 4);
    assert_eq!(series.last_complete_time, cn(15, 0));

    let res = server
        .client
        .get(server.url("/api/v1/indicators/kdj?symbol=000001.SZ&tf=60m"))
        .send()
        .await
        .unwrap();
    let points = res
        .json::<ApiResponse<Vec<KdjPointResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(points.len(), 4);
    assert!(points.iter().all(|p| (p.k - 50.0).abs() < 1e-9));

    // 10:00 的成交落在 10:30 收盘的第一根 bar 上
    let res = server
        .client
        .get(server.url("/api/v1/candles/fills?symbol=000001.SZ&tf=60m"))
        .send()
        .await
        .unwrap();
    let markers = res
        .json::<ApiResponse<Vec<CandleFillResponse>>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].client_order_id, "mk-1");
    assert_eq!(markers[0].candle_index, 0);
    assert_eq!(markers[0].candle_time, cn(10, 30));
    assert_eq!(markers[0].trade_time, cn(10, 0));
    assert_eq!(markers[0].candle_time - markers[0].trade_time, Duration::minutes(30));
}

#[tokio::test]
async fn test_intraday_period_parsing() {
    let server = spawn_test_server().await;

    let res = server
        .client
        .get(server.url("/api/v1/intraday/000001.SZ?period=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let series = res
        .json::<ApiResponse<IntradayResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(series.tf, "5m");
    assert_eq!(series.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(series.bars.len(), 2);
    assert!((series.avg_price - 10.75).abs() < 1e-9);

    // 缺省周期为 1 分钟
    let res = server
        .client
        .get(server.url("/api/v1/intraday/000001.SZ"))
        .send()
        .await
        .unwrap();
    let series = res
        .json::<ApiResponse<IntradayResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(series.tf, "1m");

    for period in ["1d", "7", ""] {
        let res = server
            .client
            .get(server.url(&format!("/api/v1/intraday/000001.SZ?period={}", period)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "period={}", period);
    }

    let res = server
        .client
        .get(server.url("/api/v1/intraday/600519.SH"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: ApiErrorResponse = res.json().await.unwrap();
    assert_eq!(err.code, "NO_DATA");
}

#[tokio::test]
async fn test_kill_switch_toggle() {
    let server = spawn_test_server().await;

    let res = server
        .client
        .get(server.url("/api/v1/risk/kill_switch"))
        .send()
        .await
        .unwrap();
    let ks = res
        .json::<ApiResponse<KillSwitchResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(!ks.enabled);

    let res = server
        .client
        .post(server.url("/api/v1/risk/kill_switch"))
        .json(&json!({ "enabled": true }))
        .send()
        .await
        .unwrap();
    let ks = res
        .json::<ApiResponse<KillSwitchResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(ks.enabled);

    let res = server.buy(100, "ks-1").await;
    assert_eq!(res.status(), StatusCode::OK);
    let order = res
        .json::<ApiResponse<OrderResponse>>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(order.status, "REJECTED");
    assert_eq!(order.reject_code.as_deref(), Some("KILL_SWITCH"));

    let res = server
        .client
        .get(server.url("/api/v1/quotes?symbols=000001.SZ"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
