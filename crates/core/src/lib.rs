//! # `kaipan-core` - 领域内核
//!
//! 纸面交易系统的实体、端口 (Trait) 与错误定义。
//! 所有适配器 crate 只依赖本 crate 暴露的抽象，彼此之间不直接耦合。

pub mod cache;
pub mod common;
pub mod config;
pub mod market;
pub mod store;
pub mod trade;
