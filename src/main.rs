//! Pool Sniper
//!
//! Buys newly created Solana pools through Jupiter and exits on take-profit or stop-loss.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use pool_sniper::adapters::cli::{self, Command, HistoryCmd, MintCmd, ReplayCmd, RunCmd};
use pool_sniper::adapters::jupiter::{JupiterClient, JupiterConfig};
use pool_sniper::adapters::persistence::JsonLedgerStore;
use pool_sniper::adapters::solana::{LogsFeed, LogsFeedConfig, SolanaClient, WalletManager};
use pool_sniper::adapters::token_metadata::{MetadataCache, TokenMetadataClient, TokenMetadataConfig};
use pool_sniper::application::{
    DiscoveryConfig, DiscoveryMonitor, ExecutorConfig, LifecycleOrchestrator, OrchestratorConfig,
    PollScheduler, PriceTracker, PriceTrackerConfig, TradeExecutor, TradeOutcome,
};
use pool_sniper::config::{load_config, Config};
use pool_sniper::domain::{Position, PriceHistoryStore, SellDecisionEngine, SellReadiness};
use pool_sniper::ports::TokioTicker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    let config = load_config(app.command.config_path())
        .with_context(|| format!("Failed to load configuration from {}", app.command.config_path().display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level);

    let engine = Engine::build(&config, app.command.needs_wallet())?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, &config, engine).await,
        Command::Replay(cmd) => replay_command(cmd, engine).await,
        Command::Status(_) => status_command(engine).await,
        Command::History(cmd) => history_command(cmd, engine).await,
        Command::Sell(cmd) => sell_command(cmd, engine).await,
        Command::Remove(cmd) => remove_command(cmd, engine).await,
        Command::Prune(_) => prune_command(engine).await,
        Command::Quote(cmd) => quote_command(cmd, engine).await,
    }
}

/// Flags win over RUST_LOG, which wins over the config file
fn init_logging(verbose: bool, debug: bool, config_level: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

struct Engine {
    orchestrator: Arc<LifecycleOrchestrator>,
    discovery: Arc<DiscoveryMonitor>,
}

impl Engine {
    fn build(config: &Config, require_wallet: bool) -> Result<Self> {
        let wallet = load_wallet(config, require_wallet)?;
        if let Some(wallet) = &wallet {
            tracing::info!("Wallet: {}", wallet.public_key());
        }

        let quotes = Arc::new(
            JupiterClient::with_config(JupiterConfig::from(config)).context("Failed to create Jupiter client")?,
        );
        let chain = Arc::new(SolanaClient::with_commitment(
            config.solana.rpc_url.clone(),
            config.solana.commitment_config(),
        ));
        let metadata_client = TokenMetadataClient::with_config(TokenMetadataConfig::from(config))
            .context("Failed to create metadata client")?;
        let metadata = Arc::new(MetadataCache::new(Arc::new(metadata_client), config.cache_ttl()));
        let store = Arc::new(JsonLedgerStore::new(config.storage.expanded_data_dir()));

        let tracker = PriceTracker::new(quotes.clone(), PriceHistoryStore::new(), PriceTrackerConfig::from(config));
        let decisions = SellDecisionEngine::new(config.thresholds(), SellReadiness::new());
        let executor = TradeExecutor::new(quotes, chain.clone(), wallet, ExecutorConfig::from(config));
        let orchestrator_config = OrchestratorConfig::from(config);
        let scheduler = PollScheduler::new(Arc::new(TokioTicker), orchestrator_config.poll_delay);

        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            tracker,
            decisions,
            executor,
            metadata,
            store,
            scheduler,
            orchestrator_config,
        ));
        let discovery = Arc::new(DiscoveryMonitor::new(
            chain,
            Arc::new(LogsFeed::new(LogsFeedConfig::from(config))),
            orchestrator.clone(),
            DiscoveryConfig::from(config),
        ));

        Ok(Self { orchestrator, discovery })
    }

    /// Restore the ledger, start polling and wire Ctrl+C to shutdown
    async fn start(&self) -> tokio::task::JoinHandle<usize> {
        self.orchestrator.restore().await;

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            orchestrator.shutdown();
        });

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_polling().await })
    }
}

/// Key material from WALLET_PRIVATE_KEY, else the keypair file
fn load_wallet(config: &Config, required: bool) -> Result<Option<WalletManager>> {
    if let Some(json) = &config.solana.private_key {
        let wallet = WalletManager::from_secret(json).context("WALLET_PRIVATE_KEY is not a valid secret key")?;
        return Ok(Some(wallet));
    }

    let keypair_path = config.solana.expanded_keypair_path();
    if keypair_path.is_empty() || !Path::new(&keypair_path).exists() {
        if required {
            bail!(
                "Wallet file not found: {}\n\n\
                 A wallet is required to trade.\n\n\
                 To create a new wallet, run:\n  \
                 solana-keygen new --outfile {}\n\n\
                 Or set WALLET_PRIVATE_KEY / SOLANA_KEYPAIR_PATH in your environment",
                keypair_path,
                keypair_path
            );
        }
        tracing::debug!("No wallet at '{}', continuing read-only", keypair_path);
        return Ok(None);
    }

    WalletManager::from_file(&keypair_path)
        .map(Some)
        .context("Expected a JSON byte array (e.g., [1,2,3,...]) or a base58 secret key")
}

async fn run_command(cmd: RunCmd, config: &Config, engine: Engine) -> Result<()> {
    tracing::info!("Starting pool sniper...");
    let polling = engine.start().await;

    for input in &cmd.replay {
        match engine.discovery.process_one(input).await {
            Ok(Some(position)) => print_position(&position),
            Ok(None) => tracing::info!("Nothing to replay for {}", input),
            Err(e) => tracing::warn!("Replay of {} failed: {}", input, e),
        }
    }

    if cmd.no_monitor {
        tracing::info!("Live discovery disabled");
    } else {
        let subscription = engine
            .discovery
            .start_live_monitoring(config.trading.max_open_positions, engine.orchestrator.shutdown_token());
        let exit = subscription.join().await;
        tracing::info!("Discovery finished ({:?}), positions keep polling", exit);
    }

    let passes = polling.await.context("Polling task failed")?;
    tracing::info!("Pool sniper stopped after {} polling passes", passes);
    Ok(())
}

async fn replay_command(cmd: ReplayCmd, engine: Engine) -> Result<()> {
    let polling = engine.start().await;

    match engine.discovery.process_one(&cmd.input).await {
        Ok(Some(position)) => print_position(&position),
        Ok(None) => println!("Nothing to buy for {}", cmd.input),
        Err(e) => {
            engine.orchestrator.shutdown();
            let _ = polling.await;
            bail!("Replay of {} failed: {}", cmd.input, e);
        }
    }

    polling.await.context("Polling task failed")?;
    Ok(())
}

async fn status_command(engine: Engine) -> Result<()> {
    engine.orchestrator.restore().await;
    let status = engine.orchestrator.status().await;

    match &status.wallet {
        Some(wallet) => {
            let balance = engine
                .orchestrator
                .wallet_balance()
                .await
                .context("Failed to get balance")?;
            println!("Wallet:  {}", wallet);
            println!("Balance: {} lamports ({:.4} SOL)", balance, balance as f64 / 1e9);
        }
        None => println!("Wallet:  (none configured)"),
    }
    println!("Pending: {}", status.pending);
    println!("Open:    {} / {}", status.open, status.max_open_positions);
    println!("Sold:    {}", status.sold);
    Ok(())
}

async fn history_command(cmd: HistoryCmd, engine: Engine) -> Result<()> {
    engine.orchestrator.restore().await;
    let positions = engine.orchestrator.history(cmd.filter).await;
    if positions.is_empty() {
        println!("No positions");
    }
    for position in &positions {
        print_position(position);
    }
    Ok(())
}

async fn sell_command(cmd: MintCmd, engine: Engine) -> Result<()> {
    engine.orchestrator.restore().await;
    match engine.orchestrator.sell_now(&cmd.mint).await? {
        TradeOutcome::Confirmed(receipt) => {
            println!("Sold {} at {} bps: {}", cmd.mint, receipt.slippage_bps, receipt.signature)
        }
        TradeOutcome::Aborted(reason) => bail!("Sell of {} aborted: {}", cmd.mint, reason),
    }
    Ok(())
}

async fn remove_command(cmd: MintCmd, engine: Engine) -> Result<()> {
    engine.orchestrator.restore().await;
    let removed = engine.orchestrator.remove(&cmd.mint).await?;
    println!("Removed {} ({})", removed.asset_address, removed.label);
    Ok(())
}

async fn prune_command(engine: Engine) -> Result<()> {
    engine.orchestrator.restore().await;
    let pruned = engine.orchestrator.prune_inactive().await;
    println!("Pruned {} positions", pruned.len());
    Ok(())
}

async fn quote_command(cmd: MintCmd, engine: Engine) -> Result<()> {
    let info = tokio::time::timeout(Duration::from_secs(30), engine.orchestrator.tracker().sample(&cmd.mint))
        .await
        .context("Quote timed out")?;

    if !info.has_liquidity {
        bail!("No liquidity for {}", cmd.mint);
    }
    println!("Price:       {:.6}", info.price);
    if let Some(impact) = info.buy_impact_pct {
        println!("Buy impact:  {:.4}%", impact);
    }
    if let Some(impact) = info.sell_impact_pct {
        println!("Sell impact: {:.4}%", impact);
    }
    Ok(())
}

fn print_position(position: &Position) {
    let price = position
        .price
        .as_ref()
        .map(|p| format!("{:.6} ({:.2}%)", p.current_price, p.change_percent))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<8} {:<44} {:<9} {:<4} {}",
        position.label,
        position.asset_address,
        format!("{:?}", position.buy_state),
        format!("{:?}", position.sell_state),
        price
    );
}
