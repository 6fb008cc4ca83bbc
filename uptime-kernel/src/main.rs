/**
 * UPTIME KERNEL - Entry point
 *
 * ROLE: Wires config, store, source client, poller, scheduler and HTTP API,
 * then serves until Ctrl-C.
 */

use anyhow::Context;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uptime_kernel::backfill::Backfill;
use uptime_kernel::config::{api_key_from_env, load_config};
use uptime_kernel::health::HealthTracker;
use uptime_kernel::http::{self, AppState};
use uptime_kernel::logging;
use uptime_kernel::poll::Poller;
use uptime_kernel::query::UptimeQueries;
use uptime_kernel::reconciler::Reconciler;
use uptime_kernel::scheduler::RepeatingTask;
use uptime_kernel::source::SourceClient;
use uptime_kernel::store::{JsonFileStore, UptimeStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = load_config().await;

    let store: Arc<dyn UptimeStore> = Arc::new(
        JsonFileStore::open(&cfg.store.path)
            .with_context(|| format!("cannot open store at {}", cfg.store.path.display()))?,
    );

    let health = HealthTracker::new();
    let source = SourceClient::new(&cfg.source_config()).context("cannot build source client")?;
    let reconciler = Reconciler::new(store.clone(), cfg.reconcile_config());
    let poller = Arc::new(Poller::new(source, reconciler, health.clone()));

    if let Some(year) = cfg.backfill_year(OffsetDateTime::now_utc()) {
        let backfill = Backfill::new(store.clone());
        tokio::task::spawn_blocking(move || match backfill.run(year) {
            Ok(report) => info!(
                year,
                summaries = report.summaries_created,
                failures = report.failures,
                "monthly backfill finished"
            ),
            Err(e) => error!(year, error = %e, "monthly backfill failed"),
        });
    }

    let scheduled = poller.clone();
    let scheduler = RepeatingTask::spawn("node-poll", cfg.refresh_interval(), move || {
        let poller = scheduled.clone();
        async move {
            // failures are logged and recorded by the poller
            let _ = poller.run_cycle().await;
        }
    });

    let api_key = api_key_from_env();
    if api_key.is_none() {
        warn!("UPTIME_API_KEY not set, /info/updateNodeInfo will refuse every request");
    }

    let app = http::build_router(AppState {
        store: store.clone(),
        queries: UptimeQueries::new(store),
        poller,
        health,
        api_key,
    });

    let listener = TcpListener::bind(cfg.server.listen)
        .await
        .with_context(|| format!("cannot bind {}", cfg.server.listen))?;
    info!(addr = %cfg.server.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("http server failed")?;

    info!(task = scheduler.name(), "stopping scheduler");
    scheduler.shutdown().await;
    Ok(())
}
