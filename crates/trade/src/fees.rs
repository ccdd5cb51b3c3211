use kaipan_core::common::{Exchange, round_money};
use kaipan_core::config::FeeConfig;
use kaipan_core::trade::entity::{Direction, Fees};
use rust_decimal::Decimal;

/// # Summary
/// 固定费率表，纯函数计算单笔成交费用。
///
/// # Invariants
/// - 每个费用分量单独四舍五入到分，`total()` 因此也是整分。
/// - 佣金双边收取且不低于 `min_commission`；印花税仅卖出；过户费仅沪市。
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    commission_rate: Decimal,
    min_commission: Decimal,
    stamp_tax_rate: Decimal,
    transfer_fee_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(config: &FeeConfig) -> Self {
        Self {
            commission_rate: config.commission_rate,
            min_commission: config.min_commission,
            stamp_tax_rate: config.stamp_tax_rate,
            transfer_fee_rate: config.transfer_fee_rate,
        }
    }

    /// # Summary
    /// 计算一笔成交金额 `notional` 对应的费用拆分。
    ///
    /// # Arguments
    /// * `notional`: 成交金额 (价格 × 股数)。
    /// * `direction`: 买卖方向，决定是否收取印花税。
    /// * `exchange`: 交易所，决定是否收取过户费。
    pub fn compute(&self, notional: Decimal, direction: Direction, exchange: Exchange) -> Fees {
        let commission = round_money((notional * self.commission_rate).max(self.min_commission));
        let stamp_tax = match direction {
            Direction::Sell => round_money(notional * self.stamp_tax_rate),
            Direction::Buy => Decimal::ZERO,
        };
        let transfer_fee = match exchange {
            Exchange::SH => round_money(notional * self.transfer_fee_rate),
            Exchange::SZ => Decimal::ZERO,
        };
        Fees {
            commission,
            stamp_tax,
            transfer_fee,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(&FeeConfig::default())
    }
}
