pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod ledger;
pub mod liquidation;
pub mod math;
pub mod models;
pub mod registry;
pub mod transfer;

pub use config::EngineConfig;
pub use engine::LendingEngine;
pub use error::{LendingError, Result};
pub use events::{EngineEvent, EventBus};
pub use ledger::PositionLedger;
pub use math::RateConvention;
pub use models::*;
pub use registry::AssetRegistry;
pub use transfer::{AssetTransfer, InMemoryCustody, TransferError};
