pub mod plan;

pub use plan::{plan_liquidation, post_liquidation_position, LiquidationParams, LiquidationPlan};
