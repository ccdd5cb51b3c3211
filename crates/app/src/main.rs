use std::path::Path;
use std::sync::Arc;

use kaipan_api::server::AppState;
use kaipan_core::common::time::{RealTimeProvider, TimeProvider};
use kaipan_feed::eastmoney::EastmoneyProvider;
use kaipan_feed::sina::SinaProvider;
use kaipan_market::manager::MarketImpl;
use kaipan_store::sqlite::SqliteLedgerStore;
use kaipan_trade::ledger::Ledger;
use kaipan_trade::service::TradeService;
use kaipan_trade::worker::TradeWorker;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod settings;
mod telemetry;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 `Arc<dyn Trait>` 注入到交易服务与 API 层。
///
/// # Logic
/// 1. 加载分层配置，初始化全局日志。
/// 2. 实例化基础设施层 (Feed、SQLite 账本存储)。
/// 3. 实例化领域实现层 (Market、Ledger、TradeService)。
/// 4. 启动后台撮合任务与 HTTP 服务。
/// 5. 收到 Ctrl-C 后优雅停机，并终止后台任务。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = settings::load(Path::new("."))?;
    let _log_guard = telemetry::init(&config.log);
    info!("Kaipan paper trading starting...");

    // reqwest 使用 rustls-no-provider，进程级加密后端在此安装
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    // 2. 基础设施层
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let store = Arc::new(SqliteLedgerStore::open(&config.database.data_dir).await?);
    let quote_feed = Arc::new(SinaProvider::new()?);
    let candle_feed = Arc::new(EastmoneyProvider::new()?);

    // 3. 领域实现层
    let market = MarketImpl::new(candle_feed, quote_feed, clock.clone(), &config.market);
    let ledger = Ledger::open(store, config.trading.initial_cash, clock.now()).await?;
    let trade = Arc::new(TradeService::new(
        Arc::new(ledger),
        market.clone(),
        clock,
        &config,
    ));

    // 4. 后台任务与 HTTP 服务
    let worker = TradeWorker::new(trade.clone(), config.trading.poll_seconds).spawn();

    let state = AppState {
        trade,
        market,
        risk: config.risk.clone(),
    };
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    kaipan_api::server::serve(state, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received. Exiting...");
    })
    .await?;

    // 5. 停止后台任务
    worker.abort();
    info!("Kaipan stopped");
    Ok(())
}
