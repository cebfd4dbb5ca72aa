#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use fableforge_server::adapters::generation::stub::StubGenerator;
use fableforge_server::adapters::mail::stub::StubMailer;
use fableforge_server::adapters::push::stub::StubPushProvider;
use fableforge_server::api::MgmtState;
use fableforge_server::config::Config;
use fableforge_server::domain::job::JobKind;
use fableforge_server::{AppBuilder, adapters, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init_telemetry(&config.telemetry)?;

    fableforge_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx, event_rx, workers) = async {
        // Phase 1: Infrastructure Setup (Resources)
        let pool =
            adapters::database::init_pool(&config.database.database_url, config.database.max_connections, config.database.acquire_timeout_secs)
                .await?;
        fableforge_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        fableforge_server::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component Wiring (Pure logic, no side effects)
        // Real story/voice pipelines live outside this subsystem and are wired
        // in through the `Generator` trait; this binary ships the in-process
        // stub so the service is runnable standalone.
        let app = AppBuilder::new(config.clone())
            .with_database(pool.clone())
            .with_generator(Arc::new(StubGenerator::for_kind(JobKind::StoryForPrompt)))
            .with_generator(Arc::new(StubGenerator::for_kind(JobKind::StoryForChild)))
            .with_generator(Arc::new(StubGenerator::for_kind(JobKind::VoiceClone)))
            .with_push_provider(Arc::new(StubPushProvider))
            .with_mailer(Arc::new(StubMailer))
            .initialize()
            .await?;

        let event_rx = app.event_bus.subscribe_all();

        // Phase 3: Runtime Setup (Listeners and Routers)
        let app_router = fableforge_server::api::app_router(app.state);
        let mgmt_app = fableforge_server::api::mgmt_router(MgmtState { pool: app.pool });

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx, event_rx, app.workers))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Start Runtime (Explicit Spawning and Listening)
    let worker_tasks = workers.spawn_all(shutdown_rx.clone(), event_rx);

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    if let Err(e) = tokio::try_join!(api_server, mgmt_server) {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Graceful Shutdown Orchestration
    let _ = shutdown_tx.send(true);
    tokio::select! {
        () = async {
            futures::future::join_all(worker_tasks).await;
        } => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(30)) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    Ok(())
}
