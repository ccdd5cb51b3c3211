use kaipan_core::common::tick_round;
use kaipan_core::market::entity::Quote;
use kaipan_core::trade::entity::{Direction, Order, OrderType};
use rust_decimal::Decimal;

/// # Summary
/// 撮合判定结果：成交价与成交数量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub price: Decimal,
    pub quantity: u64,
}

/// # Summary
/// 纸面交易的本地撮合引擎。
///
/// # Invariants
/// - 不建模盘口深度与滑点：一旦触发即以对手价全量成交剩余数量。
/// - 只做判定，不修改订单与账本。
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMatchEngine;

impl LocalMatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// # Summary
    /// 用当前报价判定一笔挂单能否成交。
    ///
    /// # Logic
    /// 1. 终态或无剩余数量的订单不成交。
    /// 2. 对价单：买单按卖一、卖单按买一直接成交。
    /// 3. 限价单：买单限价 ≥ 卖一时按卖一成交；卖单限价 ≤ 买一时按买一成交。
    ///
    /// # Returns
    /// 未触发成交时返回 `None`，订单保持挂单。
    pub fn execute(&self, order: &Order, quote: &Quote) -> Option<Execution> {
        if !order.status.is_open() || order.remaining() == 0 {
            return None;
        }

        let price = tick_round(match order.direction {
            Direction::Buy => quote.ask(),
            Direction::Sell => quote.bid(),
        });
        if price <= Decimal::ZERO {
            return None;
        }

        let crossed = match order.order_type {
            OrderType::Aggressive => true,
            OrderType::Limit => {
                let limit = tick_round(order.limit_price?);
                match order.direction {
                    Direction::Buy => limit >= price,
                    Direction::Sell => limit <= price,
                }
            }
        };

        crossed.then_some(Execution {
            price,
            quantity: order.remaining(),
        })
    }
}
