//! # `kaipan-api` - HTTP API 层
//!
//! 本 crate 是纸面交易服务的 HTTP/REST 入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收来自行情面板或脚本的轮询请求
//! - 调用下层 `TradePort` 与 `Market` 端口完成业务操作
//! - 将领域模型转换为 DTO 返回给前端

pub mod error;
pub mod routes;
pub mod server;
pub mod types;
