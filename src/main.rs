//! MoreMoney Tranche Liquidation Bot
//!
//! Polls the lending ledger on Avalanche C-Chain, corrects lagging oracle
//! prices and liquidates tranches whose debt exceeds their borrowing limit.
//!
//! Flags:
//! - `--once`: run a single cycle and exit

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tranche_api::{CoinGeckoClient, PositionFeedClient};
use tranche_chain::{
    load_private_key, ChainContext, FundingReader, LiquidationContract, PegOracle,
    StableLendingReader, TokenMetadataReader,
};
use tranche_core::{
    load_deployment_from_env, Collaborators, EngineConfig, LiquidationOrchestrator, PriceSources,
    ResolvedDeployment, TokenMetadata,
};

const DEFAULT_LOG_FILTER: &str = "info,tranche_core=debug,tranche_chain=debug";

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();
    init_tracing();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let deployment = load_deployment_from_env()?;
    let mut config = EngineConfig::from_env()?;
    config.exclude_tranches(deployment.excluded_tranches.iter().copied());
    config.log_config();

    info!(
        deployment = %deployment.name,
        chain_id = deployment.chain_id,
        ledger = %deployment.contracts.stable_lending,
        "Starting tranche liquidator"
    );

    let private_key = load_private_key()?;
    let ctx = ChainContext::connect(&deployment, &private_key)
        .await
        .context("Failed to connect bot account")?;
    info!(account = %ctx.signer_address(), chain_id = ctx.chain_id(), "Bot account");

    let collaborators = build_collaborators(&deployment, &config, ctx).await?;
    let orchestrator = LiquidationOrchestrator::new(collaborators, &config);

    let poll_interval = config.scanner.poll_interval();
    loop {
        match orchestrator.run_cycle().await {
            Ok(report) => report.log_summary(),
            Err(e) => error!(error = %e, transient = e.is_transient(), "Cycle failed"),
        }

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn build_collaborators(
    deployment: &ResolvedDeployment,
    config: &EngineConfig,
    ctx: ChainContext,
) -> Result<Collaborators> {
    let contracts = deployment.contracts;
    let (tokens, strategies) = deployment.token_strategy_pairs();

    let metadata = Arc::new(TokenMetadataReader::new(
        ctx.rpc_url(),
        contracts.strategy_viewer,
        contracts.stable_lending,
        tokens,
        strategies,
    ));
    metadata.warm_up().await;
    if let Err(e) = metadata.refresh_strategies().await {
        warn!(error = %e, "Strategy metadata unavailable");
    }
    for token in &deployment.tokens {
        let symbol = token.symbol.as_deref().unwrap_or("?");
        match metadata.value_per_1e18(token.address).await {
            Ok(value) => info!(symbol, token = %token.address, value_per_1e18 = %value, "Tracked token"),
            Err(e) => warn!(symbol, token = %token.address, error = %e, "Tracked token has no valuation"),
        }
    }

    let feed = Arc::new(PositionFeedClient::new(&deployment.position_feed_url)?);
    let positions = Arc::new(StableLendingReader::new(
        ctx.rpc_url(),
        contracts.stable_lending,
        feed,
        metadata.clone(),
        config.scanner.read_concurrency,
    ));

    let oracle = Arc::new(PegOracle::new(
        ctx.clone(),
        contracts.oracle,
        contracts.money_token,
        metadata,
    ));
    let market = Arc::new(CoinGeckoClient::new(
        &deployment.coingecko_url,
        deployment.coingecko_ids(),
    )?);

    let liquidation = Arc::new(LiquidationContract::new(ctx.clone(), contracts.liquidation));
    let funding = Arc::new(FundingReader::new(ctx, contracts.money_token));

    Ok(Collaborators {
        positions,
        prices: PriceSources::new(oracle.clone(), market),
        oracle,
        bid_targets: liquidation.clone(),
        funding,
        submitter: liquidation,
    })
}

fn print_banner() {
    println!(
        r#"
    ╔╦╗┬─┐┌─┐┌┐┌┌─┐┬ ┬┌─┐  ╦  ┬┌─┐ ┬ ┬┬┌┬┐┌─┐┌┬┐┌─┐┬─┐
     ║ ├┬┘├─┤││││  ├─┤├┤   ║  ││─┼┐│ ││ ││├─┤ │ │ │├┬┘
     ╩ ┴└─┴ ┴┘└┘└─┘┴ ┴└─┘  ╩═╝┴└─┘└└─┘┴─┴┘┴ ┴ ┴ └─┘┴└─
    MoreMoney Tranche Liquidator v0.1.0
    "#
    );
}
