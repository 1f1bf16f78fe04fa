use alloy_primitives::{Address, U256};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{LendingError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::health;
use crate::ledger::PositionLedger;
use crate::liquidation::{plan_liquidation, LiquidationParams};
use crate::models::{
    AssetRiskEntry, BorrowRecord, DebtRequest, LiquidationRecord, Position, PositionHealth,
    RiskParameters,
};
use crate::registry::AssetRegistry;
use crate::transfer::{AssetTransfer, TransferBatch, TransferError};

/// Asset-backed borrowing ledger with third-party liquidation.
///
/// Every public operation is atomic: validation, arithmetic and the ledger
/// commit happen under one registry read lock (always taken before the
/// ledger lock), and only then are assets moved.
/// A failed transfer restores the ledger snapshot and compensates the legs
/// already executed. No lock is held while the custody collaborator runs, so
/// it may call back into the engine; a nested operation on a borrower that is
/// still being processed fails with [`LendingError::OperationInProgress`].
pub struct LendingEngine<T: AssetTransfer> {
    config: EngineConfig,
    registry: RwLock<AssetRegistry>,
    ledger: RwLock<PositionLedger>,
    custody: T,
    processing_borrowers: RwLock<HashSet<Address>>,
    events: EventBus,
}

struct BorrowerGuard<'a> {
    processing: &'a RwLock<HashSet<Address>>,
    borrower: Address,
}

impl Drop for BorrowerGuard<'_> {
    fn drop(&mut self) {
        self.processing.write().remove(&self.borrower);
    }
}

impl<T: AssetTransfer> LendingEngine<T> {
    /// Creates an engine with an empty registry and ledger.
    pub fn new(config: EngineConfig, custody: T) -> Self {
        let registry = AssetRegistry::new(config.admin, config.rate_convention);
        Self::with_state(config, registry, PositionLedger::new(), custody)
    }

    /// Creates an engine over existing stores.
    pub fn with_state(
        config: EngineConfig,
        registry: AssetRegistry,
        ledger: PositionLedger,
        custody: T,
    ) -> Self {
        info!(
            "Lending engine initialized: admin={} convention={:?} bonus={}bps",
            registry.admin(),
            registry.convention(),
            config.liquidation_bonus_bps
        );
        Self {
            config,
            registry: RwLock::new(registry),
            ledger: RwLock::new(ledger),
            custody,
            processing_borrowers: RwLock::new(HashSet::new()),
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn custody(&self) -> &T {
        &self.custody
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    fn begin_processing(&self, borrower: Address) -> Result<BorrowerGuard<'_>> {
        if !self.processing_borrowers.write().insert(borrower) {
            warn!("Rejecting nested operation on borrower {}", borrower);
            return Err(LendingError::OperationInProgress(borrower));
        }
        Ok(BorrowerGuard {
            processing: &self.processing_borrowers,
            borrower,
        })
    }

    /// Runs `legs` as one batch, undoing executed legs if any of them fails.
    ///
    /// A leg that cannot be undone is reported as
    /// [`LendingError::CompensationFailed`] alongside the original failure.
    fn execute_transfers<F>(&self, legs: F) -> Result<()>
    where
        F: FnOnce(&mut TransferBatch<'_, T>) -> std::result::Result<(), TransferError>,
    {
        let mut batch = TransferBatch::new(&self.custody);
        match legs(&mut batch) {
            Ok(()) => {
                batch.commit();
                Ok(())
            }
            Err(cause) => match batch.compensate() {
                Ok(()) => Err(LendingError::TransferFailed(cause)),
                Err(compensation) => Err(LendingError::CompensationFailed { cause, compensation }),
            },
        }
    }

    // ---- administration ----

    pub fn set_collateral_factor(&self, caller: Address, asset: Address, factor: U256) -> Result<()> {
        let parameters = {
            let mut registry = self.registry.write();
            registry.set_collateral_factor(caller, asset, factor)?;
            registry.risk_parameters(asset)
        };
        self.publish_parameters(asset, parameters);
        Ok(())
    }

    pub fn set_exchange_rate(&self, caller: Address, asset: Address, rate: U256) -> Result<()> {
        let parameters = {
            let mut registry = self.registry.write();
            registry.set_exchange_rate(caller, asset, rate)?;
            registry.risk_parameters(asset)
        };
        self.publish_parameters(asset, parameters);
        Ok(())
    }

    fn publish_parameters(&self, asset: Address, parameters: RiskParameters) {
        self.events.publish(EngineEvent::RiskParametersUpdated {
            asset,
            collateral_factor: parameters.collateral_factor,
            exchange_rate: parameters.exchange_rate,
        });
    }

    /// Moves lendable `asset` from `provider` into custody.
    pub fn seed_liquidity(&self, provider: Address, asset: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(LendingError::InvalidParameter(
                "seed amount must be greater than zero".to_string(),
            ));
        }
        self.registry.read().require_rate(asset)?;
        self.custody.move_in(asset, provider, amount)?;

        info!("Seeded {} of {} from {}", amount, asset, provider);
        self.events.publish(EngineEvent::LiquiditySeeded {
            asset,
            provider,
            amount,
        });
        Ok(())
    }

    // ---- borrowing ----

    /// Pledges `collateral_amount` of `collateral_asset` and draws `requests`.
    ///
    /// Repeated borrows must use the same collateral asset; collateral
    /// accumulates and tranches merge by asset. The resulting position must
    /// have a health factor of at least 1.0.
    pub fn borrow(
        &self,
        borrower: Address,
        collateral_asset: Address,
        collateral_amount: U256,
        requests: &[DebtRequest],
    ) -> Result<BorrowRecord> {
        validate_debt_requests(requests)?;
        if collateral_amount.is_zero() && requests.is_empty() {
            return Err(LendingError::InvalidRequest(
                "borrow pledges no collateral and requests no debt".to_string(),
            ));
        }

        let _guard = self.begin_processing(borrower)?;

        // Registry stays read-locked through the ledger commit
        let (candidate, health_factor, previous) = {
            let registry = self.registry.read();
            registry.require_rate(collateral_asset)?;
            for request in requests {
                registry.require_rate(request.asset)?;
            }

            let mut ledger = self.ledger.write();
            let mut candidate = match ledger.get(borrower) {
                Some(existing) if existing.is_degenerate() => Position::new(borrower, collateral_asset),
                Some(existing) if existing.collateral_asset != collateral_asset => {
                    return Err(LendingError::CollateralAssetMismatch {
                        expected: existing.collateral_asset,
                        requested: collateral_asset,
                    });
                }
                Some(existing) => existing.clone(),
                None => Position::new(borrower, collateral_asset),
            };

            candidate.collateral_amount = candidate
                .collateral_amount
                .checked_add(collateral_amount)
                .ok_or(LendingError::MathOverflow("collateral amount"))?;
            for request in requests {
                candidate
                    .merge_debt(request.asset, request.amount)
                    .ok_or(LendingError::MathOverflow("debt amount"))?;
            }

            let snapshot = health::assess(&registry, &candidate)?;
            if !snapshot.is_solvent() {
                debug!(
                    "Borrow by {} rejected: health factor {}",
                    borrower, snapshot.health_factor
                );
                return Err(LendingError::InsufficientCollateral {
                    health_factor: snapshot.health_factor,
                });
            }
            let previous = ledger.insert(candidate.clone())?;
            (candidate, snapshot.health_factor, previous)
        };

        let transferred = self.execute_transfers(|batch| {
            batch.move_in(collateral_asset, borrower, collateral_amount)?;
            for request in requests {
                batch.move_out(request.asset, borrower, request.amount)?;
            }
            Ok(())
        });
        if let Err(e) = transferred {
            warn!("Borrow by {} rolled back: {}", borrower, e);
            self.ledger.write().restore(borrower, previous);
            return Err(e);
        }

        let record = BorrowRecord {
            id: Uuid::new_v4(),
            borrower,
            collateral_added: collateral_amount,
            requested: requests.to_vec(),
            position: candidate,
            health_factor,
            timestamp: Utc::now(),
        };
        info!(
            "Borrow by {}: +{} collateral, {} tranche request(s), health factor {}",
            borrower,
            collateral_amount,
            requests.len(),
            health_factor
        );
        self.events.publish(EngineEvent::Borrowed(record.clone()));
        Ok(record)
    }

    // ---- liquidation ----

    /// Repays part of `borrower`'s `debt_asset` tranche on their behalf and
    /// hands `liquidator` the corresponding collateral plus bonus.
    ///
    /// `liquidator_exchange_rate` prices the repaid asset for this call only.
    pub fn liquidate(
        &self,
        liquidator: Address,
        borrower: Address,
        debt_asset: Address,
        liquidator_exchange_rate: U256,
    ) -> Result<LiquidationRecord> {
        let _guard = self.begin_processing(borrower)?;

        let (plan, previous) = {
            let registry = self.registry.read();
            let mut ledger = self.ledger.write();
            let position = ledger
                .get(borrower)
                .ok_or(LendingError::PositionNotFound(borrower))?;
            let plan = plan_liquidation(
                &registry,
                position,
                debt_asset,
                liquidator_exchange_rate,
                &self.liquidation_params(),
            )?;
            let previous = ledger.insert(plan.resulting_position.clone())?;
            (plan, previous)
        };

        let transferred = self.execute_transfers(|batch| {
            batch.move_in(debt_asset, liquidator, plan.repay_amount)?;
            batch.move_out(plan.collateral_asset, liquidator, plan.seized_amount)
        });
        if let Err(e) = transferred {
            warn!("Liquidation of {} rolled back: {}", borrower, e);
            self.ledger.write().restore(borrower, previous);
            return Err(e);
        }

        let record = LiquidationRecord {
            id: Uuid::new_v4(),
            borrower,
            liquidator,
            debt_asset,
            collateral_asset: plan.collateral_asset,
            repay_amount: plan.repay_amount,
            seized_amount: plan.seized_amount,
            liquidator_exchange_rate,
            bad_debt: plan.bad_debt,
            health_factor_before: plan.health_factor_before,
            health_factor_after: plan.health_factor_after,
            timestamp: Utc::now(),
        };
        warn!(
            "Liquidated {} by {}: repaid {} of {}, seized {} of {}, health factor {} -> {}",
            borrower,
            liquidator,
            record.repay_amount,
            debt_asset,
            record.seized_amount,
            record.collateral_asset,
            record.health_factor_before,
            record.health_factor_after
        );
        if !record.bad_debt.is_empty() {
            warn!("Bad debt written off for {}: {:?}", borrower, record.bad_debt);
        }
        self.events.publish(EngineEvent::Liquidated(record.clone()));
        Ok(record)
    }

    fn liquidation_params(&self) -> LiquidationParams {
        LiquidationParams {
            bonus_bps: self.config.liquidation_bonus_bps,
            max_rate_deviation_bps: self.config.max_liquidator_rate_deviation_bps,
        }
    }

    // ---- queries ----

    pub fn get_position(&self, borrower: Address) -> Option<Position> {
        self.ledger.read().get(borrower).cloned()
    }

    pub fn get_health_factor(&self, borrower: Address) -> Result<U256> {
        let registry = self.registry.read();
        let ledger = self.ledger.read();
        let position = ledger
            .get(borrower)
            .ok_or(LendingError::PositionNotFound(borrower))?;
        health::health_factor(&registry, position)
    }

    pub fn position_health(&self, borrower: Address) -> Result<PositionHealth> {
        let registry = self.registry.read();
        let ledger = self.ledger.read();
        let position = ledger
            .get(borrower)
            .ok_or(LendingError::PositionNotFound(borrower))?;
        health::check_position_health(&registry, position, self.config.health_factor_warning_threshold)
    }

    pub fn get_risk_parameters(&self, asset: Address) -> RiskParameters {
        self.registry.read().risk_parameters(asset)
    }

    pub fn all_risk_parameters(&self) -> Vec<AssetRiskEntry> {
        self.registry.read().all_risk_parameters()
    }

    /// Every position record, ordered by borrower.
    pub fn positions(&self) -> Vec<Position> {
        let ledger = self.ledger.read();
        ledger
            .borrowers()
            .into_iter()
            .filter_map(|b| ledger.get(b).cloned())
            .collect()
    }

    /// Positions with debt, riskiest first.
    pub fn scan_positions(&self) -> Result<Vec<PositionHealth>> {
        let registry = self.registry.read();
        let ledger = self.ledger.read();
        health::rank_by_health(
            &registry,
            ledger.positions(),
            self.config.health_factor_warning_threshold,
        )
    }

    pub fn liquidatable_positions(&self) -> Result<Vec<PositionHealth>> {
        let reports = self.scan_positions()?;
        Ok(reports.into_iter().filter(|r| r.is_liquidatable).collect())
    }

    pub fn at_risk_positions(&self) -> Result<Vec<PositionHealth>> {
        let reports = self.scan_positions()?;
        for report in reports.iter().filter(|r| r.is_at_risk) {
            warn!(
                "Borrower {} is at liquidation risk! Health Factor: {}",
                report.borrower, report.health_factor
            );
        }
        Ok(reports.into_iter().filter(|r| r.is_at_risk).collect())
    }
}

fn validate_debt_requests(requests: &[DebtRequest]) -> Result<()> {
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.asset) {
            return Err(LendingError::InvalidRequest(format!(
                "asset {} requested more than once",
                request.asset
            )));
        }
    }
    if let Some(request) = requests.iter().find(|r| r.amount.is_zero()) {
        return Err(LendingError::InvalidParameter(format!(
            "requested amount of {} must be greater than zero",
            request.asset
        )));
    }
    Ok(())
}
