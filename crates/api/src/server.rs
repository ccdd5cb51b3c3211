//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的装配代码持有并调用。

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use kaipan_core::config::RiskConfig;
use kaipan_core::market::port::Market;
use kaipan_core::trade::port::TradePort;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use crate::routes::{account, indicator, market, risk, trade};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 各端口在服务启动前注入，生命周期与进程等同。
#[derive(Clone)]
pub struct AppState {
    /// 交易服务端口 (下单、撤单、账户与审计查询)
    pub trade: Arc<dyn TradePort>,
    /// 行情服务端口 (报价、K 线、趋势)
    pub market: Arc<dyn Market>,
    /// 趋势接口的默认均线参数与风控保持一致
    pub risk: RiskConfig,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "开盘 Kaipan 纸面交易 API",
        version = "0.1.0",
        description = "A 股纸面交易服务：实时报价、K 线与指标、事前风控下单、T+1 持仓账本与审计事件。",
        license(name = "MIT")
    ),
    tags(
        (name = "行情 (Market)", description = "报价、K 线与日线趋势"),
        (name = "指标 (Indicator)", description = "服务端计算的 KDJ 与成交落点"),
        (name = "账户 (Account)", description = "资金、持仓与盈亏"),
        (name = "订单交易 (Trade)", description = "下单、撤单、成交与审计事件"),
        (name = "风控 (Risk)", description = "熔断开关")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// 构建完整的 axum 应用路由树 (含 Swagger UI 与 CORS)。
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(market::get_quotes))
        .routes(routes!(market::get_candles))
        .routes(routes!(market::get_intraday))
        .routes(routes!(market::get_daily_trend))
        .routes(routes!(indicator::get_kdj))
        .routes(routes!(indicator::get_candle_fills))
        .routes(routes!(account::get_account))
        .routes(routes!(account::get_positions))
        .routes(routes!(account::get_pnl))
        .routes(routes!(account::get_daily_pnl))
        .routes(routes!(trade::list_orders, trade::place_order))
        .routes(routes!(trade::cancel_order))
        .routes(routes!(trade::list_fills))
        .routes(routes!(trade::list_events))
        .routes(routes!(risk::get_kill_switch, risk::set_kill_switch))
        .with_state(state)
        .split_for_parts();

    // 客户端为本地轮询面板，允许所有来源
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// 在已绑定的监听器上提供服务，直到 `shutdown` 完成。
///
/// # Arguments
/// * `state` - 由外部装配代码注入的共享状态
/// * `listener` - 已绑定的 TCP 监听器 (测试中可绑定 `127.0.0.1:0`)
/// * `shutdown` - 优雅停机信号
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Kaipan API server listening on {}", addr);
        tracing::info!("Swagger UI: http://{}/swagger-ui/", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
