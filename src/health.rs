use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::error::{LendingError, Result};
use crate::math::{mul_div, INFINITE_HEALTH_FACTOR, WAD};
use crate::models::{Position, PositionHealth};
use crate::registry::AssetRegistry;

/// Values behind a health factor, all in quote units at WAD scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub collateral_value: U256,
    pub weighted_collateral_value: U256,
    pub debt_value: U256,
    pub health_factor: U256,
}

impl HealthSnapshot {
    pub fn is_solvent(&self) -> bool {
        self.health_factor >= WAD
    }
}

/// Values `position` against the registry's current rates.
///
/// Every step truncates, so the ratio is never more favorable to the
/// borrower than the exact value. Positions without debt report
/// [`INFINITE_HEALTH_FACTOR`].
pub fn assess(registry: &AssetRegistry, position: &Position) -> Result<HealthSnapshot> {
    let convention = registry.convention();

    let mut debt_value = U256::ZERO;
    for tranche in &position.debts {
        let rate = registry.require_rate(tranche.asset)?;
        let value = convention.value_of(tranche.amount, rate)?;
        debt_value = debt_value
            .checked_add(value)
            .ok_or(LendingError::MathOverflow("debt value"))?;
    }

    let (collateral_value, weighted_collateral_value) = if position.collateral_amount.is_zero() {
        (U256::ZERO, U256::ZERO)
    } else {
        let rate = registry.require_rate(position.collateral_asset)?;
        let factor = registry.collateral_factor(position.collateral_asset);
        (
            convention.value_of(position.collateral_amount, rate)?,
            convention.weighted_value_of(position.collateral_amount, rate, factor)?,
        )
    };

    let health_factor = if debt_value.is_zero() {
        INFINITE_HEALTH_FACTOR
    } else {
        mul_div(weighted_collateral_value, WAD, debt_value, "health factor")?
    };

    Ok(HealthSnapshot {
        collateral_value,
        weighted_collateral_value,
        debt_value,
        health_factor,
    })
}

pub fn health_factor(registry: &AssetRegistry, position: &Position) -> Result<U256> {
    Ok(assess(registry, position)?.health_factor)
}

/// Builds the scanner-facing report for one borrower.
pub fn check_position_health(
    registry: &AssetRegistry,
    position: &Position,
    warning_threshold: U256,
) -> Result<PositionHealth> {
    let snapshot = assess(registry, position)?;
    let is_liquidatable = snapshot.health_factor < WAD;
    let is_at_risk = snapshot.health_factor < warning_threshold;

    debug!(
        "Borrower {:?} - Health Factor: {}, Collateral: {}, Debt: {}, At Risk: {}",
        position.borrower, snapshot.health_factor, snapshot.weighted_collateral_value, snapshot.debt_value, is_at_risk
    );

    Ok(PositionHealth {
        borrower: position.borrower,
        collateral_value: snapshot.collateral_value,
        weighted_collateral_value: snapshot.weighted_collateral_value,
        debt_value: snapshot.debt_value,
        health_factor: snapshot.health_factor,
        is_liquidatable,
        is_at_risk,
    })
}

/// Reports for every borrower in `positions`, riskiest first.
pub fn rank_by_health<'a>(
    registry: &AssetRegistry,
    positions: impl Iterator<Item = &'a Position>,
    warning_threshold: U256,
) -> Result<Vec<PositionHealth>> {
    let mut reports = positions
        .filter(|p| p.has_debt())
        .map(|p| check_position_health(registry, p, warning_threshold))
        .collect::<Result<Vec<_>>>()?;
    reports.sort_by(|a, b| {
        a.health_factor
            .cmp(&b.health_factor)
            .then_with(|| a.borrower.cmp(&b.borrower))
    });
    Ok(reports)
}

/// Borrower addresses from `reports` that are eligible for liquidation.
pub fn liquidatable_borrowers(reports: &[PositionHealth]) -> Vec<Address> {
    reports
        .iter()
        .filter(|r| r.is_liquidatable)
        .map(|r| r.borrower)
        .collect()
}
