use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk parameters of one asset. `None` means the field was never set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub collateral_factor: Option<U256>,
    pub exchange_rate: Option<U256>,
}

/// Registry listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRiskEntry {
    pub asset: Address,
    pub parameters: RiskParameters,
}

/// One borrowed asset within a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTranche {
    pub asset: Address,
    pub amount: U256,
}

/// A requested draw of `amount` units of `asset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRequest {
    pub asset: Address,
    pub amount: U256,
}

impl DebtRequest {
    pub fn new(asset: Address, amount: U256) -> Self {
        Self { asset, amount }
    }
}

/// A borrower's collateral and debt tranches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub borrower: Address,
    pub collateral_asset: Address,
    pub collateral_amount: U256,
    pub debts: Vec<DebtTranche>,
}

impl Position {
    pub fn new(borrower: Address, collateral_asset: Address) -> Self {
        Self {
            borrower,
            collateral_asset,
            collateral_amount: U256::ZERO,
            debts: Vec::new(),
        }
    }

    pub fn tranche(&self, asset: Address) -> Option<&DebtTranche> {
        self.debts.iter().find(|t| t.asset == asset)
    }

    pub fn has_debt(&self) -> bool {
        !self.debts.is_empty()
    }

    /// Fully unwound: nothing pledged, nothing owed. The record stays in the ledger.
    pub fn is_degenerate(&self) -> bool {
        self.collateral_amount.is_zero() && self.debts.is_empty()
    }

    /// Adds `amount` to the tranche of `asset`, appending a new tranche if none exists.
    pub fn merge_debt(&mut self, asset: Address, amount: U256) -> Option<()> {
        match self.debts.iter_mut().find(|t| t.asset == asset) {
            Some(tranche) => tranche.amount = tranche.amount.checked_add(amount)?,
            None => self.debts.push(DebtTranche { asset, amount }),
        }
        Some(())
    }

    /// Reduces the tranche of `asset` by `amount`, removing it when it reaches zero.
    /// Returns `None` if the tranche is missing or smaller than `amount`.
    pub fn reduce_debt(&mut self, asset: Address, amount: U256) -> Option<U256> {
        let index = self.debts.iter().position(|t| t.asset == asset)?;
        let remaining = self.debts[index].amount.checked_sub(amount)?;
        if remaining.is_zero() {
            self.debts.remove(index);
        } else {
            self.debts[index].amount = remaining;
        }
        Some(remaining)
    }
}

/// Emitted after every successful borrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub borrower: Address,
    pub collateral_added: U256,
    pub requested: Vec<DebtRequest>,
    pub position: Position,
    pub health_factor: U256,
    pub timestamp: DateTime<Utc>,
}

/// Emitted after every successful liquidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub id: Uuid,
    pub borrower: Address,
    pub liquidator: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
    pub repay_amount: U256,
    pub seized_amount: U256,
    pub liquidator_exchange_rate: U256,
    /// Tranches written off because the collateral ran out.
    pub bad_debt: Vec<DebtTranche>,
    pub health_factor_before: U256,
    pub health_factor_after: U256,
    pub timestamp: DateTime<Utc>,
}

/// Health report of a single borrower, used by scanners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionHealth {
    pub borrower: Address,
    pub collateral_value: U256,
    pub weighted_collateral_value: U256,
    pub debt_value: U256,
    pub health_factor: U256,
    pub is_liquidatable: bool,
    pub is_at_risk: bool,
}
