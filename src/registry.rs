use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{LendingError, Result};
use crate::math::{RateConvention, WAD};
use crate::models::{AssetRiskEntry, RiskParameters};

/// Per-asset collateral factors and exchange rates.
///
/// Writes are reserved to a single admin identity and take effect for every
/// subsequent read; there is no versioning or staleness window.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    admin: Address,
    convention: RateConvention,
    parameters: HashMap<Address, RiskParameters>,
}

impl AssetRegistry {
    pub fn new(admin: Address, convention: RateConvention) -> Self {
        Self {
            admin,
            convention,
            parameters: HashMap::new(),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn convention(&self) -> RateConvention {
        self.convention
    }

    fn require_admin(&self, caller: Address) -> Result<()> {
        if caller != self.admin {
            return Err(LendingError::Unauthorized(caller));
        }
        Ok(())
    }

    /// Overwrites the collateral factor of `asset`; `factor` must lie in `[0, 1e18]`.
    pub fn set_collateral_factor(&mut self, caller: Address, asset: Address, factor: U256) -> Result<()> {
        self.require_admin(caller)?;
        if factor > WAD {
            return Err(LendingError::InvalidParameter(format!(
                "collateral factor {} exceeds 1e18",
                factor
            )));
        }

        self.parameters.entry(asset).or_default().collateral_factor = Some(factor);
        info!("Collateral factor for {} set to {}", asset, factor);
        Ok(())
    }

    /// Overwrites the exchange rate of `asset`; `rate` must be non-zero.
    pub fn set_exchange_rate(&mut self, caller: Address, asset: Address, rate: U256) -> Result<()> {
        self.require_admin(caller)?;
        if rate.is_zero() {
            return Err(LendingError::InvalidParameter(
                "exchange rate must be greater than zero".to_string(),
            ));
        }

        self.parameters.entry(asset).or_default().exchange_rate = Some(rate);
        info!("Exchange rate for {} set to {}", asset, rate);
        Ok(())
    }

    pub fn risk_parameters(&self, asset: Address) -> RiskParameters {
        self.parameters.get(&asset).copied().unwrap_or_default()
    }

    pub fn exchange_rate(&self, asset: Address) -> Option<U256> {
        self.parameters.get(&asset).and_then(|p| p.exchange_rate)
    }

    /// Unset factors count as zero borrowing power.
    pub fn collateral_factor(&self, asset: Address) -> U256 {
        self.parameters
            .get(&asset)
            .and_then(|p| p.collateral_factor)
            .unwrap_or(U256::ZERO)
    }

    /// Exchange rate of `asset`, or `UnknownAsset` if it was never priced.
    pub fn require_rate(&self, asset: Address) -> Result<U256> {
        match self.exchange_rate(asset) {
            Some(rate) => Ok(rate),
            None => {
                debug!("Asset {} has no exchange rate", asset);
                Err(LendingError::UnknownAsset(asset))
            }
        }
    }

    pub fn all_risk_parameters(&self) -> Vec<AssetRiskEntry> {
        let mut entries: Vec<AssetRiskEntry> = self
            .parameters
            .iter()
            .map(|(asset, parameters)| AssetRiskEntry {
                asset: *asset,
                parameters: *parameters,
            })
            .collect();
        entries.sort_by_key(|e| e.asset);
        entries
    }
}
