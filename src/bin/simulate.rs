use alloy_primitives::{Address, U256};
use clap::Parser;
use dotenvy::dotenv;
use eyre::{eyre, Result};
use lending_engine::health::liquidatable_borrowers;
use lending_engine::math::{format_wad, parse_wad};
use lending_engine::{DebtRequest, EngineConfig, InMemoryCustody, LendingEngine, RateConvention};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replay a borrow, a price shock and a liquidation against an in-memory book.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Rate convention: price_per_unit or units_per_quote
    #[arg(long, default_value = "units_per_quote")]
    convention: String,
    /// Liquidation bonus in basis points
    #[arg(long, default_value_t = 25)]
    bonus_bps: u16,
    /// Liquidator quote for the repaid ETH (USDC per ETH under units_per_quote)
    #[arg(long, default_value = "1520")]
    liquidator_rate: String,
    /// AXS exchange rate after the shock
    #[arg(long, default_value = "48")]
    axs_rate: String,
    /// Bound on liquidator rate deviation in basis points
    #[arg(long)]
    max_deviation_bps: Option<u32>,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn wad(value: &str) -> Result<U256> {
    parse_wad(value).ok_or_else(|| eyre!("invalid decimal amount '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let convention: RateConvention = args.convention.parse().map_err(|e: String| eyre!(e))?;

    let admin = Address::repeat_byte(0xAD);
    let borrower = Address::repeat_byte(0xB0);
    let liquidator = Address::repeat_byte(0xA1);
    let usdc = Address::repeat_byte(0x01);
    let eth = Address::repeat_byte(0x02);
    let axs = Address::repeat_byte(0x03);

    let custody = InMemoryCustody::new();
    custody.mint(eth, admin, wad("100")?);
    custody.mint(axs, admin, wad("1000")?);
    custody.mint(usdc, borrower, wad("1000")?);
    custody.mint(eth, liquidator, wad("50")?);

    let config = EngineConfig::new(admin)
        .with_rate_convention(convention)
        .with_liquidation_bonus_bps(args.bonus_bps)
        .with_max_liquidator_rate_deviation_bps(args.max_deviation_bps);
    let engine = LendingEngine::new(config, custody);
    let mut events = engine.subscribe();

    engine.set_collateral_factor(admin, usdc, wad("0.9")?)?;
    engine.set_collateral_factor(admin, eth, wad("0.8")?)?;
    engine.set_collateral_factor(admin, axs, wad("0.7")?)?;
    engine.set_exchange_rate(admin, usdc, wad("1500")?)?;
    engine.set_exchange_rate(admin, eth, wad("1")?)?;
    engine.set_exchange_rate(admin, axs, wad("100")?)?;
    engine.seed_liquidity(admin, eth, wad("100")?)?;
    engine.seed_liquidity(admin, axs, wad("1000")?)?;

    let requests = [
        DebtRequest::new(eth, wad("0.2")?),
        DebtRequest::new(axs, wad("20")?),
    ];
    engine.borrow(borrower, usdc, wad("1000")?, &requests)?;
    println!(
        "after borrow: health factor {}",
        format_wad(engine.get_health_factor(borrower)?)
    );

    engine.set_exchange_rate(admin, axs, wad(&args.axs_rate)?)?;
    let reports = engine.scan_positions()?;
    println!(
        "after shock: health factor {}, liquidatable: {:?}",
        format_wad(engine.get_health_factor(borrower)?),
        liquidatable_borrowers(&reports)
    );

    match engine.liquidate(liquidator, borrower, eth, wad(&args.liquidator_rate)?) {
        Ok(record) => {
            println!(
                "liquidated: repaid {} ETH, seized {} USDC, health factor {} -> {}",
                format_wad(record.repay_amount),
                format_wad(record.seized_amount),
                format_wad(record.health_factor_before),
                format_wad(record.health_factor_after)
            );
        }
        Err(e) => println!("liquidation refused: {}", e),
    }

    if let Some(position) = engine.get_position(borrower) {
        println!("position: {}", serde_json::to_string_pretty(&position)?);
    }

    while let Ok(event) = events.try_recv() {
        info!("event: {}", serde_json::to_string(&event)?);
    }

    Ok(())
}
