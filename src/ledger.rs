use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{LendingError, Result};
use crate::models::Position;

/// Borrower-keyed store of open positions. One record per borrower.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<Address, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, borrower: Address) -> Option<&Position> {
        self.positions.get(&borrower)
    }

    pub fn contains(&self, borrower: Address) -> bool {
        self.positions.contains_key(&borrower)
    }

    /// Stores `position`, returning the record it replaced.
    /// Structurally invalid records are refused.
    pub fn insert(&mut self, position: Position) -> Result<Option<Position>> {
        validate_position(&position)?;
        debug!(
            "Ledger write for {}: collateral={} tranches={}",
            position.borrower,
            position.collateral_amount,
            position.debts.len()
        );
        Ok(self.positions.insert(position.borrower, position))
    }

    /// Puts back a snapshot taken before a failed operation.
    pub fn restore(&mut self, borrower: Address, previous: Option<Position>) {
        match previous {
            Some(position) => {
                self.positions.insert(borrower, position);
            }
            None => {
                self.positions.remove(&borrower);
            }
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn borrowers(&self) -> Vec<Address> {
        let mut borrowers: Vec<Address> = self.positions.keys().copied().collect();
        borrowers.sort();
        borrowers
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn validate_position(position: &Position) -> Result<()> {
    let mut seen = HashSet::with_capacity(position.debts.len());
    for tranche in &position.debts {
        if !seen.insert(tranche.asset) {
            return Err(LendingError::InvalidRequest(format!(
                "duplicate tranche for asset {}",
                tranche.asset
            )));
        }
        if tranche.amount == U256::ZERO {
            return Err(LendingError::InvalidRequest(format!(
                "empty tranche for asset {}",
                tranche.asset
            )));
        }
    }
    if position.has_debt() && position.collateral_amount.is_zero() {
        return Err(LendingError::InvalidRequest(
            "position with debt must hold collateral".to_string(),
        ));
    }
    Ok(())
}
