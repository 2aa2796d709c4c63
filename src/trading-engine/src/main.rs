//! Composition root binary: configuration, logging, and the engine event
//! loop (spec.md §6 CLI surface, §5 graceful shutdown).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use common::{Clock, Config, SystemClock};
use dump_detector::{DumpDetector, DumpDetectorConfig};
use hedge_strategy::{HedgeStrategy, HedgeStrategyConfig};
use market_feed::{MarketFeed, MarketFeedConfig};
use order_client::{DryRunOrderClient, OrderClient};
use round_manager::{RoundManager, RoundManagerConfig};
use rust_decimal::Decimal;
use state_machine::{StateMachine, TimeoutPolicy};
use tokio::time::{interval, Duration};
use trading_engine::{EngineConfig, TradingEngine};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trading-engine")]
#[command(about = "Detects dump-side entries and hedges a second leg to lock in arbitrage profit")]
struct Args {
    /// Force dry-run mode regardless of DRY_RUN/credentials.
    #[arg(long)]
    dry: bool,

    /// Verbose logging (debug level).
    #[arg(long)]
    debug: bool,

    /// Disable Gamma-API auto-discovery; requires CONDITION_ID to be set.
    #[arg(long)]
    no_auto_discover: bool,

    /// Run a single tick and exit (smoke-test the wiring).
    #[arg(long)]
    once: bool,

    /// Exit after this many completed cycles instead of running forever.
    #[arg(long)]
    cycles: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = Config::from_env().context("loading configuration")?;
    if args.dry {
        config.dry_run = true;
    }
    if args.no_auto_discover && config.condition_id.is_none() {
        bail!("--no-auto-discover requires CONDITION_ID to be set");
    }

    info!(
        dry_run = config.dry_run,
        auto_discover = config.auto_discover() && !args.no_auto_discover,
        "starting trading engine"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Token pair is unknown until `RoundManager` resolves the active
    // market; `TradingEngine::start` fills it in via `set_tokens` before
    // connecting.
    let feed = MarketFeed::new(
        MarketFeedConfig {
            ws_url: config.ws_url.clone(),
            ..Default::default()
        },
        String::new(),
        String::new(),
    );

    let round_manager = RoundManager::new(RoundManagerConfig {
        condition_id: config.condition_id.clone(),
        gamma_api_url: config.gamma_api_url.clone(),
        keywords: vec!["bitcoin".to_string(), "btc".to_string()],
    });

    let dump_detector = DumpDetector::new(DumpDetectorConfig {
        move_pct: config.move_pct,
        window_min: config.window_ms as f64 / 60_000.0,
    });

    let hedge_strategy = HedgeStrategy::new(HedgeStrategyConfig {
        sum_target: config.sum_target,
        fee_rate: Decimal::ZERO,
    });

    let state_machine = StateMachine::new(TimeoutPolicy::default());

    let order_client = build_order_client(&config, clock.clone())?;

    let engine_config = EngineConfig {
        auto_mode: true,
        max_order_usdc: config.max_order_usdc,
        cooldown_ms: config.cooldown_ms,
    };

    let mut engine = TradingEngine::new(
        feed,
        round_manager,
        dump_detector,
        hedge_strategy,
        state_machine,
        order_client,
        clock,
        engine_config,
    );

    engine.start().await.context("starting engine")?;

    if args.once {
        engine.tick().await.context("engine tick")?;
        engine.shutdown().await.ok();
        return Ok(());
    }

    run_forever(&mut engine, args.cycles).await
}

async fn run_forever(engine: &mut TradingEngine, cycles: Option<u64>) -> Result<()> {
    let mut timer = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                break;
            }
            _ = timer.tick() => {
                if let Err(e) = engine.on_timer_tick().await {
                    warn!(error = %e, "timer tick failed");
                }
            }
            result = engine.tick() => {
                if let Err(e) = result {
                    error!(error = %e, "engine tick failed");
                }
            }
        }

        if let Some(limit) = cycles {
            if engine.cycles_completed() >= limit {
                info!(cycles = limit, "reached configured cycle limit, exiting");
                break;
            }
        }
    }

    engine.shutdown().await.context("shutting down engine")
}

fn build_order_client(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn OrderClient>> {
    if config.dry_run {
        info!("dry-run mode: orders are synthesized locally, no venue is contacted");
        return Ok(Arc::new(DryRunOrderClient::new(clock)));
    }

    #[cfg(feature = "live")]
    {
        let credentials = order_client::BuilderCredentials {
            api_key: config.builder_api_key.clone().context("BUILDER_API_KEY required for live trading")?,
            api_secret: config.builder_api_secret.clone().context("BUILDER_API_SECRET required for live trading")?,
            api_passphrase: config
                .builder_api_passphrase
                .clone()
                .context("BUILDER_API_PASSPHRASE required for live trading")?,
        };
        Ok(Arc::new(order_client::LiveOrderClient::new(
            config.clob_api_url.clone(),
            credentials,
            clock,
        )))
    }

    #[cfg(not(feature = "live"))]
    {
        bail!("live trading requires building with `--features live`")
    }
}
