use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::transfer::TransferError;

pub type Result<T, E = LendingError> = std::result::Result<T, E>;

/// Every failure the engine surfaces to its caller.
///
/// All of them are returned after a full rollback: the registry and the
/// ledger look exactly as they did before the failed call.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("asset {0} has no registered exchange rate")]
    UnknownAsset(Address),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("collateral asset mismatch: position holds {expected}, request pledges {requested}")]
    CollateralAssetMismatch { expected: Address, requested: Address },

    #[error("insufficient collateral: health factor would be {health_factor}")]
    InsufficientCollateral { health_factor: U256 },

    #[error("no open position for borrower {0}")]
    PositionNotFound(Address),

    #[error("borrower {borrower} holds no debt in asset {asset}")]
    DebtAssetNotHeld { borrower: Address, asset: Address },

    #[error("position is healthy (health factor {health_factor})")]
    PositionHealthy { health_factor: U256 },

    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// The original failure could not be fully undone; custody no longer
    /// matches the ledger.
    #[error("asset transfer failed: {cause}; compensation also failed: {compensation}")]
    CompensationFailed {
        cause: TransferError,
        compensation: TransferError,
    },

    #[error("caller {0} is not the registry admin")]
    Unauthorized(Address),

    #[error("arithmetic overflow while computing {0}")]
    MathOverflow(&'static str),

    #[error("liquidation of {asset} for {borrower} rounds to zero")]
    NothingToLiquidate { borrower: Address, asset: Address },

    #[error("liquidator rate {supplied} deviates more than {max_deviation_bps} bps from registry rate {registry}")]
    LiquidatorRateOutOfBounds {
        supplied: U256,
        registry: U256,
        max_deviation_bps: u32,
    },

    #[error("another operation on borrower {0} is still in progress")]
    OperationInProgress(Address),
}
