pub mod candle;
pub mod intraday;
pub mod manager;
pub mod quote;
pub mod retry;
pub mod trend;
