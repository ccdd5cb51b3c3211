//! # 交易账本持久化
//!
//! - `sqlite`: 单库 (`paper_trading.db`) SQLite 实现
//! - `memory`: 进程内实现，供测试与无盘运行使用

pub mod memory;
pub mod sqlite;
