use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use duoquote::config::Settings;
use duoquote::discovery::{discover_markets, StaticMarketSource};
use duoquote::events::{EventPublisher, LogEventPublisher};
use duoquote::executor::PaperExecutor;
use duoquote::live::{run_ws_feed, GammaMarketSource};
use duoquote::tob_cache::InMemoryTobCache;
use duoquote::types::Market;
use duoquote::StrategyEngine;

/// CLI overrides layered on top of the environment-variable-driven
/// `Settings` surface (§6, A.3): just the handful of knobs worth flipping
/// at invocation time, matching the teacher's habit of keeping the bulk of
/// configuration in the environment and reserving flags for run mode.
#[derive(Parser, Debug)]
#[command(name = "duoquote", about = "Complete-set market maker for UP/DOWN crypto prediction markets")]
struct Cli {
    /// Skip live Gamma/CLOB wiring; run against the bundled static seeds only.
    #[arg(long)]
    offline: bool,

    #[arg(long, env = "GAMMA_BASE_URL", default_value = "https://gamma-api.polymarket.com")]
    gamma_base_url: String,

    #[arg(long, env = "CLOB_WS_URL", default_value = "wss://ws-subscriptions-clob.polymarket.com/ws/market")]
    clob_ws_url: String,
}

fn token_ids_of(markets: &[Market]) -> Vec<String> {
    markets
        .iter()
        .flat_map(|m| [m.up_token_id.clone(), m.down_token_id.clone()])
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    if !settings.enabled {
        log::info!("strategy disabled via config, exiting");
        return Ok(());
    }

    let tob_cache = InMemoryTobCache::new();
    let executor = PaperExecutor::new(dec!(0.01));
    let publisher: Arc<dyn EventPublisher> = Arc::new(LogEventPublisher);
    let run_id = uuid::Uuid::new_v4().to_string();

    let (markets_tx, mut markets_rx) = watch::channel(Vec::<Market>::new());

    if cli.offline {
        let source = StaticMarketSource::new(Vec::new());
        let markets = discover_markets(&source, &settings, Utc::now()).await?;
        let _ = markets_tx.send(markets);
    } else {
        let gamma_source = GammaMarketSource::new(&cli.gamma_base_url)?;
        let discovery_settings = settings.clone();
        let discovery_tx = markets_tx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(discovery_settings.market_refresh_secs));
            loop {
                tick.tick().await;
                match discover_markets(&gamma_source, &discovery_settings, Utc::now()).await {
                    Ok(markets) => {
                        log::debug!("discovery refreshed, {} markets tracked", markets.len());
                        if discovery_tx.send(markets).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("discovery cycle failed: {e:#}"),
                }
            }
        });

        let feed_cache = tob_cache.clone();
        let ws_url = cli.clob_ws_url.clone();
        let mut feed_markets_rx = markets_rx.clone();
        tokio::spawn(async move {
            loop {
                let token_ids = token_ids_of(&feed_markets_rx.borrow());
                tokio::select! {
                    result = run_ws_feed(&ws_url, token_ids, feed_cache.clone()) => {
                        if let Err(e) = result {
                            log::error!("ws feed loop exited: {e:#}");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    changed = feed_markets_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    let mut engine = StrategyEngine::new(settings.clone(), run_id, executor, tob_cache, publisher);
    let mut tick = tokio::time::interval(Duration::from_millis(settings.evaluation_period_millis()));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let markets = markets_rx.borrow().clone();
                engine.tick(&markets).await;
            }
            _ = markets_rx.changed() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
