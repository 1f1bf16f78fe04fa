use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::error::{LendingError, Result};
use crate::health;
use crate::math::{apply_bonus, deviation_bps, mul_div, RateConvention, WAD};
use crate::models::{DebtTranche, Position};
use crate::registry::AssetRegistry;

/// Engine-wide liquidation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationParams {
    pub bonus_bps: u16,
    pub max_rate_deviation_bps: Option<u32>,
}

/// Outcome of planning one liquidation; nothing has been mutated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationPlan {
    pub borrower: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
    pub repay_amount: U256,
    pub seized_amount: U256,
    /// Tranches written off because the collateral ran out.
    pub bad_debt: Vec<DebtTranche>,
    pub health_factor_before: U256,
    pub health_factor_after: U256,
    pub resulting_position: Position,
}

/// Computes how much of `debt_asset` a liquidator repays and how much
/// collateral they receive in exchange.
///
/// The repaid amount is valued at `liquidator_rate`, grossed up by the
/// liquidation bonus and converted into collateral at the registry rate of
/// the collateral asset. Under [`RateConvention::UnitsPerQuote`] the
/// liquidator quotes collateral units per unit repaid instead, and no
/// registry conversion applies. The repay amount is the smallest one that brings the
/// position back to a health factor of 1.0, capped by the tranche and by what
/// the collateral can pay for. When the collateral cannot restore solvency it
/// is seized entirely and any debt left behind is written off.
pub fn plan_liquidation(
    registry: &AssetRegistry,
    position: &Position,
    debt_asset: Address,
    liquidator_rate: U256,
    params: &LiquidationParams,
) -> Result<LiquidationPlan> {
    let borrower = position.borrower;
    let tranche_amount = position
        .tranche(debt_asset)
        .map(|t| t.amount)
        .ok_or(LendingError::DebtAssetNotHeld {
            borrower,
            asset: debt_asset,
        })?;

    let health_factor_before = health::health_factor(registry, position)?;
    if health_factor_before >= WAD {
        return Err(LendingError::PositionHealthy {
            health_factor: health_factor_before,
        });
    }

    if liquidator_rate.is_zero() {
        return Err(LendingError::InvalidParameter(
            "liquidator exchange rate must be greater than zero".to_string(),
        ));
    }
    let collateral_rate = registry.require_rate(position.collateral_asset)?;
    if let Some(max_deviation_bps) = params.max_rate_deviation_bps {
        let reference = registry
            .convention()
            .liquidator_reference(registry.require_rate(debt_asset)?, collateral_rate)?;
        if deviation_bps(liquidator_rate, reference)? > U256::from(max_deviation_bps) {
            return Err(LendingError::LiquidatorRateOutOfBounds {
                supplied: liquidator_rate,
                registry: reference,
                max_deviation_bps,
            });
        }
    }

    let pricing = SeizurePricing {
        registry,
        liquidator_rate,
        collateral_rate,
        bonus_bps: params.bonus_bps,
    };
    let collateral = position.collateral_amount;

    // Largest repay the collateral can pay for
    let (cap, collateral_bound) = if pricing.seize_for(tranche_amount)? <= collateral {
        (tranche_amount, false)
    } else {
        let first_unaffordable =
            bisect(U256::ZERO, tranche_amount, |r| Ok(pricing.seize_for(r)? > collateral))?;
        (first_unaffordable - U256::from(1), true)
    };
    if cap.is_zero() {
        return Err(LendingError::NothingToLiquidate {
            borrower,
            asset: debt_asset,
        });
    }

    let restores = |repay: U256| -> Result<bool> {
        let seize = pricing.seize_for(repay)?;
        if seize.is_zero() {
            return Ok(false);
        }
        let post = post_liquidation_position(position, debt_asset, repay, seize)?;
        Ok(health::health_factor(registry, &post)? >= WAD)
    };

    let (repay_amount, seized_amount) = if restores(cap)? {
        let repay = bisect(U256::ZERO, cap, restores)?;
        (repay, pricing.seize_for(repay)?)
    } else if collateral_bound {
        (cap, collateral)
    } else {
        (cap, pricing.seize_for(cap)?)
    };
    if seized_amount.is_zero() {
        return Err(LendingError::NothingToLiquidate {
            borrower,
            asset: debt_asset,
        });
    }
    debug!(
        "Liquidation plan for {}: cap={} collateral_bound={} repay={} seize={}",
        borrower, cap, collateral_bound, repay_amount, seized_amount
    );

    let mut resulting_position =
        post_liquidation_position(position, debt_asset, repay_amount, seized_amount)?;
    let bad_debt = if resulting_position.collateral_amount.is_zero() && resulting_position.has_debt() {
        std::mem::take(&mut resulting_position.debts)
    } else {
        Vec::new()
    };
    if !bad_debt.is_empty() {
        info!(
            "Collateral of {} exhausted; writing off {} tranche(s)",
            borrower,
            bad_debt.len()
        );
    }
    let health_factor_after = health::health_factor(registry, &resulting_position)?;

    Ok(LiquidationPlan {
        borrower,
        debt_asset,
        collateral_asset: position.collateral_asset,
        repay_amount,
        seized_amount,
        bad_debt,
        health_factor_before,
        health_factor_after,
        resulting_position,
    })
}

struct SeizurePricing<'a> {
    registry: &'a AssetRegistry,
    liquidator_rate: U256,
    collateral_rate: U256,
    bonus_bps: u16,
}

impl SeizurePricing<'_> {
    /// Collateral units owed for repaying `repay` units of the debt asset.
    fn seize_for(&self, repay: U256) -> Result<U256> {
        match self.registry.convention() {
            convention @ RateConvention::PricePerUnit => {
                let repaid_value = convention.value_of(repay, self.liquidator_rate)?;
                let seized_value = apply_bonus(repaid_value, self.bonus_bps)?;
                convention.amount_for(seized_value, self.collateral_rate)
            }
            // Quoted directly in collateral units per unit repaid
            RateConvention::UnitsPerQuote => {
                let repaid_in_collateral =
                    mul_div(repay, self.liquidator_rate, WAD, "seized collateral")?;
                apply_bonus(repaid_in_collateral, self.bonus_bps)
            }
        }
    }
}

/// The position after repaying `repay` of `debt_asset` and seizing `seize` collateral.
pub fn post_liquidation_position(
    position: &Position,
    debt_asset: Address,
    repay: U256,
    seize: U256,
) -> Result<Position> {
    let mut post = position.clone();
    post.collateral_amount = post
        .collateral_amount
        .checked_sub(seize)
        .ok_or(LendingError::InvalidRequest("seizure exceeds collateral".to_string()))?;
    post.reduce_debt(debt_asset, repay)
        .ok_or(LendingError::InvalidRequest("repayment exceeds tranche".to_string()))?;
    Ok(post)
}

/// Smallest `x` in `(lo, hi]` with `holds(x)`, given `holds(hi)` and `!holds(lo)`.
fn bisect<F>(mut lo: U256, mut hi: U256, mut holds: F) -> Result<U256>
where
    F: FnMut(U256) -> Result<bool>,
{
    let one = U256::from(1);
    while hi - lo > one {
        let mid = lo + (hi - lo) / U256::from(2);
        if holds(mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(hi)
}
