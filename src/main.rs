use clap::Parser;
use leadfunnel::clients::bridge::BridgeMessenger;
use leadfunnel::clients::dexscreener::DexScreenerClient;
use leadfunnel::clients::index_probe::GoogleIndexProbe;
use leadfunnel::clients::{Discovery, IndexProbe, Messenger};
use leadfunnel::config::Config;
use leadfunnel::cycle::CycleController;
use leadfunnel::daemon::Daemon;
use leadfunnel::db::Database;
use leadfunnel::executor::{OutreachSettings, StageExecutor};
use leadfunnel::rate_limiter::RateLimiter;
use leadfunnel::shutdown::{self, ShutdownTrigger};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "leadfunnel", about = "Autonomous token lead discovery and outreach daemon")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run one discovery-and-outreach cycle, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    leadfunnel::init_tracing(&config.logging)?;

    let db = Arc::new(Database::new(&config.database.path)?);
    let discovery: Arc<dyn Discovery> = Arc::new(DexScreenerClient::new()?);
    let messenger: Arc<dyn Messenger> = Arc::new(BridgeMessenger::new(&config.messenger.bridge_url)?);
    let index_probe: Option<Arc<dyn IndexProbe>> = if config.index_check.enabled {
        Some(Arc::new(GoogleIndexProbe::new(config.index_check.check_delay_seconds)?))
    } else {
        None
    };

    let (trigger, shutdown) = shutdown::channel();
    spawn_signal_listener(trigger);

    let limiter = RateLimiter::new(
        config.messenger.rate_limits.max_joins_per_hour,
        config.messenger.rate_limits.max_dms_per_hour,
    );
    let executor = StageExecutor::new(
        Arc::clone(&db),
        Arc::clone(&messenger),
        limiter,
        OutreachSettings::from_config(&config.messenger),
        shutdown.clone(),
    );
    let cycle = CycleController::new(
        Arc::clone(&db),
        discovery,
        index_probe,
        executor,
        config.discovery.clone(),
        config.index_check.clone(),
        config.monitoring.clone(),
        shutdown.clone(),
    );

    if args.once {
        let mut cycle = cycle;
        messenger.connect().await?;
        let report = cycle.run_cycle().await?;
        messenger.close().await?;
        tracing::info!(
            new_leads = report.new_leads,
            processed = report.processed,
            messaged = report.messaged,
            "single cycle finished"
        );
        return Ok(());
    }

    Daemon::new(db, messenger, cycle, config.monitoring.clone(), shutdown)
        .run()
        .await?;
    Ok(())
}

fn spawn_signal_listener(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        trigger.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable, listening for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
