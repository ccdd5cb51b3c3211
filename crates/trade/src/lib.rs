//! 纸面交易核心：费用、事前风控、本地撮合、账本与后台任务。

pub mod fees;
pub mod ledger;
pub mod matcher;
pub mod risk;
pub mod service;
pub mod worker;
