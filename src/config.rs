use alloy_primitives::{Address, U256};
use eyre::Result;
use tracing::warn;

use crate::math::{parse_wad, RateConvention, BPS};

const DEFAULT_LIQUIDATION_BONUS_BPS: u16 = 500; // 5%
const DEFAULT_WARNING_THRESHOLD: U256 = U256::from_limbs([1_100_000_000_000_000_000, 0, 0, 0]); // 1.1

// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub admin: Address,
    pub rate_convention: RateConvention,
    pub liquidation_bonus_bps: u16,
    /// Bound on how far a liquidator-supplied rate may stray from the registry; `None` = unbounded.
    pub max_liquidator_rate_deviation_bps: Option<u32>,
    pub health_factor_warning_threshold: U256, // Flag positions below this (e.g., 1.1)
}

impl EngineConfig {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            rate_convention: RateConvention::default(),
            liquidation_bonus_bps: DEFAULT_LIQUIDATION_BONUS_BPS,
            max_liquidator_rate_deviation_bps: None,
            health_factor_warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }

    pub fn with_rate_convention(mut self, convention: RateConvention) -> Self {
        self.rate_convention = convention;
        self
    }

    pub fn with_liquidation_bonus_bps(mut self, bonus_bps: u16) -> Self {
        self.liquidation_bonus_bps = bonus_bps;
        self
    }

    pub fn with_max_liquidator_rate_deviation_bps(mut self, max_bps: Option<u32>) -> Self {
        self.max_liquidator_rate_deviation_bps = max_bps;
        self
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let admin = std::env::var("ENGINE_ADMIN")
            .map_err(|_| eyre::eyre!("ENGINE_ADMIN environment variable not set"))?
            .parse::<Address>()
            .map_err(|e| eyre::eyre!("Invalid ENGINE_ADMIN address: {}", e))?;

        let rate_convention = match std::env::var("RATE_CONVENTION") {
            Ok(value) => match value.parse::<RateConvention>() {
                Ok(convention) => convention,
                Err(e) => {
                    warn!("Invalid RATE_CONVENTION: {}. Using price_per_unit.", e);
                    RateConvention::default()
                }
            },
            Err(_) => RateConvention::default(),
        };

        let liquidation_bonus_bps = match std::env::var("LIQUIDATION_BONUS_BPS") {
            Ok(bonus_str) => match bonus_str.parse::<u16>() {
                Ok(bonus) if (bonus as u64) <= BPS => bonus,
                Ok(bonus) => {
                    warn!("LIQUIDATION_BONUS_BPS {} exceeds 10000. Using default 500.", bonus);
                    DEFAULT_LIQUIDATION_BONUS_BPS
                }
                Err(e) => {
                    warn!("Invalid LIQUIDATION_BONUS_BPS '{}': {}. Using default 500.", bonus_str, e);
                    DEFAULT_LIQUIDATION_BONUS_BPS
                }
            },
            Err(_) => DEFAULT_LIQUIDATION_BONUS_BPS,
        };

        let max_liquidator_rate_deviation_bps = match std::env::var("MAX_LIQUIDATOR_RATE_DEVIATION_BPS") {
            Ok(max_str) => match max_str.parse::<u32>() {
                Ok(max) => Some(max),
                Err(e) => {
                    warn!("Invalid MAX_LIQUIDATOR_RATE_DEVIATION_BPS '{}': {}. Leaving unbounded.", max_str, e);
                    None
                }
            },
            Err(_) => None,
        };

        let health_factor_warning_threshold = match std::env::var("HEALTH_FACTOR_WARNING_THRESHOLD") {
            Ok(threshold_str) => match parse_wad(&threshold_str) {
                Some(threshold) => threshold,
                None => {
                    warn!("Invalid HEALTH_FACTOR_WARNING_THRESHOLD '{}'. Using default 1.1.", threshold_str);
                    DEFAULT_WARNING_THRESHOLD
                }
            },
            Err(_) => DEFAULT_WARNING_THRESHOLD,
        };

        Ok(Self {
            admin,
            rate_convention,
            liquidation_bonus_bps,
            max_liquidator_rate_deviation_bps,
            health_factor_warning_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(Address::repeat_byte(0xAD));
        assert_eq!(config.rate_convention, RateConvention::PricePerUnit);
        assert_eq!(config.liquidation_bonus_bps, 500);
        assert_eq!(config.max_liquidator_rate_deviation_bps, None);
        assert_eq!(config.health_factor_warning_threshold, WAD + WAD / U256::from(10));
    }

    #[test]
    fn test_builders_override_defaults() {
        let config = EngineConfig::new(Address::ZERO)
            .with_rate_convention(RateConvention::UnitsPerQuote)
            .with_liquidation_bonus_bps(0)
            .with_max_liquidator_rate_deviation_bps(Some(200));
        assert_eq!(config.rate_convention, RateConvention::UnitsPerQuote);
        assert_eq!(config.liquidation_bonus_bps, 0);
        assert_eq!(config.max_liquidator_rate_deviation_bps, Some(200));
    }
}
