use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, Result};

/// 1.0 in 18-decimal fixed point.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 100% in basis points.
pub const BPS: u64 = 10_000;

/// Health factor reported for positions without debt.
pub const INFINITE_HEALTH_FACTOR: U256 = U256::MAX;

/// `a * b / d`, truncating toward zero.
pub fn mul_div(a: U256, b: U256, d: U256, what: &'static str) -> Result<U256> {
    let product = a.checked_mul(b).ok_or(LendingError::MathOverflow(what))?;
    product.checked_div(d).ok_or(LendingError::MathOverflow(what))
}

/// `value * (BPS + bonus_bps) / BPS`
pub fn apply_bonus(value: U256, bonus_bps: u16) -> Result<U256> {
    mul_div(
        value,
        U256::from(BPS + bonus_bps as u64),
        U256::from(BPS),
        "liquidation bonus",
    )
}

/// Absolute deviation of `supplied` from `reference`, in basis points of `reference`.
pub fn deviation_bps(supplied: U256, reference: U256) -> Result<U256> {
    let diff = if supplied > reference {
        supplied - reference
    } else {
        reference - supplied
    };
    mul_div(diff, U256::from(BPS), reference, "rate deviation")
}

/// How an exchange rate relates an asset amount to the common quote unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateConvention {
    /// `rate` is the price of one unit of the asset in quote units.
    #[default]
    PricePerUnit,
    /// `rate` is how many units of the asset one quote unit buys.
    UnitsPerQuote,
}

impl RateConvention {
    /// Quote value of `amount` units of an asset quoted at `rate`.
    pub fn value_of(self, amount: U256, rate: U256) -> Result<U256> {
        match self {
            RateConvention::PricePerUnit => mul_div(amount, rate, WAD, "asset value"),
            RateConvention::UnitsPerQuote => mul_div(amount, WAD, rate, "asset value"),
        }
    }

    /// Quote value of `amount` scaled by a WAD `factor`, truncated once.
    pub fn weighted_value_of(self, amount: U256, rate: U256, factor: U256) -> Result<U256> {
        match self {
            RateConvention::PricePerUnit => {
                let scaled = amount
                    .checked_mul(rate)
                    .ok_or(LendingError::MathOverflow("weighted collateral value"))?;
                mul_div(scaled, factor, WAD * WAD, "weighted collateral value")
            }
            RateConvention::UnitsPerQuote => {
                mul_div(amount, factor, rate, "weighted collateral value")
            }
        }
    }

    /// Units of an asset quoted at `rate` worth `value` quote units.
    pub fn amount_for(self, value: U256, rate: U256) -> Result<U256> {
        match self {
            RateConvention::PricePerUnit => mul_div(value, WAD, rate, "asset amount"),
            RateConvention::UnitsPerQuote => mul_div(value, rate, WAD, "asset amount"),
        }
    }

    /// Registry-implied counterpart of a liquidator quote for `debt_asset`
    /// repaid against `collateral_asset`.
    ///
    /// Under `PricePerUnit` a liquidator quotes the debt asset in quote units,
    /// so this is the debt asset's own rate. Under `UnitsPerQuote` the quote is
    /// collateral units per unit of debt, i.e. the cross rate of the two.
    pub fn liquidator_reference(self, debt_rate: U256, collateral_rate: U256) -> Result<U256> {
        match self {
            RateConvention::PricePerUnit => Ok(debt_rate),
            RateConvention::UnitsPerQuote => mul_div(collateral_rate, WAD, debt_rate, "cross rate"),
        }
    }
}

impl std::str::FromStr for RateConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price_per_unit" | "price" => Ok(RateConvention::PricePerUnit),
            "units_per_quote" | "units" => Ok(RateConvention::UnitsPerQuote),
            other => Err(format!("unknown rate convention '{}'", other)),
        }
    }
}

/// Parses a decimal string such as `"0.9"` or `"1500"` into WAD fixed point.
pub fn parse_wad(s: &str) -> Option<U256> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() > 18 || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        int_part.parse::<U256>().ok()?
    };
    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<18}", frac_part);
        padded.parse::<U256>().ok()?
    };
    int_value.checked_mul(WAD)?.checked_add(frac_value)
}

/// Renders a WAD value as a decimal string, trimming trailing zeros.
pub fn format_wad(value: U256) -> String {
    if value == INFINITE_HEALTH_FACTOR {
        return "inf".to_string();
    }
    let int_part = value / WAD;
    let frac_part = value % WAD;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{:0>18}", frac_part.to_string());
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(s: &str) -> U256 {
        parse_wad(s).unwrap()
    }

    #[test]
    fn test_parse_and_format_wad() {
        assert_eq!(wad("1"), WAD);
        assert_eq!(wad("0.9"), U256::from(900_000_000_000_000_000u64));
        assert_eq!(wad(".5"), WAD / U256::from(2));
        assert_eq!(format_wad(wad("1520.25")), "1520.25");
        assert_eq!(format_wad(WAD * U256::from(3)), "3");
        assert_eq!(format_wad(INFINITE_HEALTH_FACTOR), "inf");
        assert!(parse_wad("1.0000000000000000001").is_none());
        assert!(parse_wad("abc").is_none());
        assert!(parse_wad("").is_none());
    }

    #[test]
    fn test_price_per_unit_valuation() {
        let convention = RateConvention::PricePerUnit;
        // 1000 units at 1500 quote each
        let value = convention.value_of(wad("1000"), wad("1500")).unwrap();
        assert_eq!(value, wad("1500000"));
        let weighted = convention
            .weighted_value_of(wad("1000"), wad("1500"), wad("0.9"))
            .unwrap();
        assert_eq!(weighted, wad("1350000"));
        assert_eq!(convention.amount_for(wad("3000"), wad("1500")).unwrap(), wad("2"));
    }

    #[test]
    fn test_units_per_quote_valuation() {
        let convention = RateConvention::UnitsPerQuote;
        // 20 AXS at 100 AXS per quote unit
        assert_eq!(convention.value_of(wad("20"), wad("100")).unwrap(), wad("0.2"));
        let weighted = convention
            .weighted_value_of(wad("1000"), wad("1500"), wad("0.9"))
            .unwrap();
        assert_eq!(weighted, wad("0.6"));
        assert_eq!(convention.amount_for(wad("0.2"), wad("100")).unwrap(), wad("20"));
    }

    #[test]
    fn test_truncation_never_rounds_up() {
        let convention = RateConvention::UnitsPerQuote;
        // 1 wei at 3 units per quote: exact value is 1/3 wei of quote scaled by WAD
        let value = convention.value_of(U256::from(1), wad("3")).unwrap();
        assert_eq!(value, U256::ZERO);
        let value = convention.value_of(U256::from(10), wad("3")).unwrap();
        assert_eq!(value, U256::from(3));
    }

    #[test]
    fn test_bonus_and_deviation() {
        assert_eq!(apply_bonus(wad("100"), 500).unwrap(), wad("105"));
        assert_eq!(apply_bonus(wad("100"), 0).unwrap(), wad("100"));
        assert_eq!(deviation_bps(wad("1520"), wad("1500")).unwrap(), U256::from(133));
        assert_eq!(deviation_bps(wad("1450"), wad("1500")).unwrap(), U256::from(333));
    }

    #[test]
    fn test_liquidator_reference_rate() {
        // USDC at 1500 per quote, ETH at 1 per quote: one ETH is worth 1500 USDC
        let reference = RateConvention::UnitsPerQuote
            .liquidator_reference(wad("1"), wad("1500"))
            .unwrap();
        assert_eq!(reference, wad("1500"));
        let reference = RateConvention::PricePerUnit
            .liquidator_reference(wad("2"), wad("100"))
            .unwrap();
        assert_eq!(reference, wad("2"));
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = mul_div(U256::MAX, U256::from(2), WAD, "test").unwrap_err();
        assert!(matches!(err, LendingError::MathOverflow("test")));
        assert!(mul_div(WAD, WAD, U256::ZERO, "zero").is_err());
    }

    #[test]
    fn test_convention_from_str() {
        assert_eq!("units_per_quote".parse::<RateConvention>().unwrap(), RateConvention::UnitsPerQuote);
        assert_eq!("PRICE_PER_UNIT".parse::<RateConvention>().unwrap(), RateConvention::PricePerUnit);
        assert!("bogus".parse::<RateConvention>().is_err());
    }
}
