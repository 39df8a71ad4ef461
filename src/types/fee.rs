//! Fee models
//!
//! A wallet (or a settlement request) carries a [`FeeModel`] describing how
//! the platform fee on an amount is derived: a percentage of the amount, a
//! fixed human value, or nothing at all.

use crate::types::amount::FixedAmount;
use crate::types::coin::Denomination;
use crate::types::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Highest percentage a percentage fee may charge
pub const MAX_FEE_PERCENT: f64 = 99.0;

/// How a fee is derived from an amount
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeeModel {
    /// No fee
    #[default]
    None,

    /// `amount * min(percent, 99) / 100`
    Percent { percent: f64 },

    /// Fixed human value regardless of amount
    Fixed { value: Decimal },
}

impl FeeModel {
    pub fn percent(percent: f64) -> Self {
        FeeModel::Percent { percent }
    }

    pub fn fixed(value: Decimal) -> Self {
        FeeModel::Fixed { value }
    }

    /// Fee owed on `amount`, in the same denomination
    pub fn compute<D: Denomination>(
        &self,
        amount: &FixedAmount<D>,
    ) -> Result<FixedAmount<D>, LedgerError> {
        match self {
            FeeModel::None => Ok(FixedAmount::zero(amount.unit().clone())),
            FeeModel::Percent { percent } => {
                let percent = percent.clamp(0.0, MAX_FEE_PERCENT);
                amount.multiply(percent / 100.0)
            }
            FeeModel::Fixed { value } => FixedAmount::from_value(*value, amount.unit().clone()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FeeModel::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coin, CoinAmount};
    use rstest::rstest;
    use std::str::FromStr;

    fn amount(value: &str) -> CoinAmount {
        CoinAmount::from_value(Decimal::from_str(value).unwrap(), Coin::bitcoin()).unwrap()
    }

    #[rstest]
    #[case::one_percent(FeeModel::percent(1.0), "100.0", "1.00000000")]
    #[case::fixed_large_amount(FeeModel::fixed(Decimal::from_str("0.0005").unwrap()), "100.0", "0.00050000")]
    #[case::fixed_small_amount(FeeModel::fixed(Decimal::from_str("0.0005").unwrap()), "0.01", "0.00050000")]
    #[case::capped_percent(FeeModel::percent(150.0), "1.0", "0.99000000")]
    #[case::negative_percent(FeeModel::percent(-5.0), "1.0", "0.00000000")]
    #[case::no_fee(FeeModel::None, "3.0", "0.00000000")]
    fn test_fee_computation(#[case] model: FeeModel, #[case] value: &str, #[case] expected: &str) {
        let fee = model.compute(&amount(value)).unwrap();
        assert_eq!(fee.format_value(), expected);
    }

    #[test]
    fn test_percent_fee_rounds_half_down() {
        // 5 satoshi * 10% = 0.5 satoshi
        let five_sats = CoinAmount::from_base(5, Coin::bitcoin()).unwrap();
        let fee = FeeModel::percent(10.0).compute(&five_sats).unwrap();
        assert!(fee.is_zero());
    }

    #[test]
    fn test_fee_model_deserializes_from_tagged_json() {
        let model: FeeModel = serde_json::from_str(r#"{"type":"percent","percent":1.5}"#).unwrap();
        assert_eq!(model, FeeModel::percent(1.5));

        let model: FeeModel = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert!(model.is_none());
    }
}
