use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure reported by the asset-movement collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient balance of {asset} for {account}: has {available}, needs {requested}")]
    InsufficientBalance {
        asset: Address,
        account: Address,
        available: U256,
        requested: U256,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Moves fungible assets between accounts and the engine's custody.
///
/// Implementations must be all-or-nothing: a call either moves exactly
/// `amount` or moves nothing and returns an error. They may call back into
/// the engine.
pub trait AssetTransfer: Send + Sync {
    fn move_in(&self, asset: Address, from: Address, amount: U256) -> Result<(), TransferError>;

    fn move_out(&self, asset: Address, to: Address, amount: U256) -> Result<(), TransferError>;
}

impl<T: AssetTransfer + ?Sized> AssetTransfer for Arc<T> {
    fn move_in(&self, asset: Address, from: Address, amount: U256) -> Result<(), TransferError> {
        (**self).move_in(asset, from, amount)
    }

    fn move_out(&self, asset: Address, to: Address, amount: U256) -> Result<(), TransferError> {
        (**self).move_out(asset, to, amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    In { asset: Address, from: Address, amount: U256 },
    Out { asset: Address, to: Address, amount: U256 },
}

/// Journal of transfers executed for one engine operation.
///
/// On failure the executed legs are undone in reverse order with the
/// opposite movement.
pub struct TransferBatch<'a, T: AssetTransfer + ?Sized> {
    transfer: &'a T,
    executed: Vec<Leg>,
}

impl<'a, T: AssetTransfer + ?Sized> TransferBatch<'a, T> {
    pub fn new(transfer: &'a T) -> Self {
        Self {
            transfer,
            executed: Vec::new(),
        }
    }

    pub fn move_in(&mut self, asset: Address, from: Address, amount: U256) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.transfer.move_in(asset, from, amount)?;
        self.executed.push(Leg::In { asset, from, amount });
        Ok(())
    }

    pub fn move_out(&mut self, asset: Address, to: Address, amount: U256) -> Result<(), TransferError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.transfer.move_out(asset, to, amount)?;
        self.executed.push(Leg::Out { asset, to, amount });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.executed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    /// Reverses every executed leg, newest first.
    ///
    /// Every leg is attempted even after a failure; the first failure is
    /// returned.
    pub fn compensate(self) -> Result<(), TransferError> {
        warn!("Compensating {} executed transfer(s)", self.executed.len());
        let mut first_failure = None;
        for leg in self.executed.into_iter().rev() {
            let outcome = match leg {
                Leg::In { asset, from, amount } => self.transfer.move_out(asset, from, amount),
                Leg::Out { asset, to, amount } => self.transfer.move_in(asset, to, amount),
            };
            if let Err(e) = outcome {
                error!("Failed to compensate transfer {:?}: {}", leg, e);
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn commit(self) {
        debug!("Committed {} transfer(s)", self.executed.len());
    }
}

#[derive(Debug, Default)]
struct Book {
    accounts: HashMap<(Address, Address), U256>,
    custody: HashMap<Address, U256>,
}

/// Balance book held in memory, shared between clones.
///
/// Backs the simulator and the test suite; account balances must be minted
/// before they can be pledged or repaid.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    book: Arc<RwLock<Book>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, asset: Address, account: Address, amount: U256) {
        let mut book = self.book.write();
        let balance = book.accounts.entry((asset, account)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, asset: Address, account: Address) -> U256 {
        self.book
            .read()
            .accounts
            .get(&(asset, account))
            .copied()
            .unwrap_or_default()
    }

    pub fn custody_balance(&self, asset: Address) -> U256 {
        self.book.read().custody.get(&asset).copied().unwrap_or_default()
    }
}

impl AssetTransfer for InMemoryCustody {
    fn move_in(&self, asset: Address, from: Address, amount: U256) -> Result<(), TransferError> {
        let mut book = self.book.write();
        let available = book.accounts.get(&(asset, from)).copied().unwrap_or_default();
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset,
                account: from,
                available,
                requested: amount,
            });
        }
        book.accounts.insert((asset, from), available - amount);
        let held = book.custody.entry(asset).or_default();
        *held = held.saturating_add(amount);
        Ok(())
    }

    fn move_out(&self, asset: Address, to: Address, amount: U256) -> Result<(), TransferError> {
        let mut book = self.book.write();
        let available = book.custody.get(&asset).copied().unwrap_or_default();
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset,
                account: Address::ZERO,
                available,
                requested: amount,
            });
        }
        book.custody.insert(asset, available - amount);
        let balance = book.accounts.entry((asset, to)).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }
}
