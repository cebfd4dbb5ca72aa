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

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::adapters::database::DbPool;
use crate::adapters::database::device_token_repo::DeviceTokenRepository;
use crate::adapters::database::job_repo::JobRepository;
use crate::adapters::generation::Generator;
use crate::adapters::mail::Mailer;
use crate::adapters::push::PushProvider;
use crate::config::Config;
use crate::domain::job::JobKind;
use crate::services::device_token_registry::DeviceTokenRegistry;
use crate::services::event_bus::EventBus;
use crate::services::job_service::{JobService, KindNotifiers};
use crate::services::sse_hub::SseHub;
use crate::workers::{JobWorkerPool, LeaseReaperWorker, NotificationDispatcher, RetentionSweeperWorker};

#[derive(Debug)]
pub struct Workers {
    pub job_workers: Vec<JobWorkerPool>,
    pub lease_reaper: LeaseReaperWorker,
    pub retention_sweeper: RetentionSweeperWorker,
    pub notification_dispatcher: NotificationDispatcher,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>, event_rx: tokio::sync::broadcast::Receiver<crate::domain::event::JobEvent>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();

        for pool in self.job_workers {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                pool.run(rx).await;
            }));
        }

        let lease_reaper = self.lease_reaper;
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            lease_reaper.run(rx).await;
        }));

        let retention_sweeper = self.retention_sweeper;
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            retention_sweeper.run(rx).await;
        }));

        let notification_dispatcher = self.notification_dispatcher;
        tasks.push(tokio::spawn(async move {
            notification_dispatcher.run(event_rx, shutdown_rx).await;
        }));

        tasks
    }
}

pub struct App {
    pub pool: DbPool,
    pub state: api::AppState,
    pub event_bus: EventBus,
    pub workers: Workers,
}

/// Builder for constructing and wiring the application object graph:
/// repositories, the Event Bus, the per-owner SSE hub, one worker pool per
/// job kind, and the two completion-fan-out sinks.
#[derive(Debug, Default)]
pub struct AppBuilder {
    config: Option<Config>,
    pool: Option<DbPool>,
    generators: Vec<Arc<dyn Generator>>,
    push_provider: Option<Arc<dyn PushProvider>>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl AppBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config: Some(config), ..Self::default() }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Registers one `Generator` implementation. Each job kind must have
    /// exactly one generator wired by the time `initialize` runs.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generators.push(generator);
        self
    }

    #[must_use]
    pub fn with_push_provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.push_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Builds the application components by wiring all services, repositories,
    /// and background workers.
    ///
    /// # Errors
    /// Returns an error if a mandatory dependency is missing, or if a job
    /// kind has no registered generator.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(self) -> anyhow::Result<App> {
        let config = self.config.ok_or_else(|| anyhow::anyhow!("Config is required"))?;
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("Database pool is required"))?;
        let push_provider = self.push_provider.ok_or_else(|| anyhow::anyhow!("Push provider is required"))?;
        let mailer = self.mailer.ok_or_else(|| anyhow::anyhow!("Mailer is required"))?;

        let mut generators_by_kind: HashMap<JobKind, Arc<dyn Generator>> = HashMap::new();
        for generator in self.generators {
            generators_by_kind.insert(generator.kind(), generator);
        }

        let job_repo = JobRepository::new(pool.clone());
        let device_token_repo = DeviceTokenRepository::new(pool.clone());

        let event_bus = EventBus::new(config.sse.event_channel_capacity);
        let sse_hub = SseHub::new(event_bus.clone(), Duration::from_secs(config.sse.heartbeat_interval_secs));
        let notifiers = KindNotifiers::new();

        let job_service = JobService::new(job_repo.clone(), event_bus.clone(), notifiers.clone(), config.jobs.clone());
        let device_tokens = DeviceTokenRegistry::new(device_token_repo);

        let mut job_workers = Vec::with_capacity(JobKind::ALL.len());
        for kind in JobKind::ALL {
            let generator = generators_by_kind
                .get(&kind)
                .ok_or_else(|| anyhow::anyhow!("No generator registered for job kind {kind}"))?;
            let waiter = notifiers.waiter(kind);
            job_workers.push(JobWorkerPool::new(kind, job_repo.clone(), event_bus.clone(), Arc::clone(generator), waiter, &config.jobs));
        }

        let lease_reaper = LeaseReaperWorker::new(job_repo.clone(), event_bus.clone(), config.jobs.lease_reaper_interval_secs);
        let retention_sweeper = RetentionSweeperWorker::new(
            job_repo,
            config.jobs.retention_sweeper_interval_secs,
            config.jobs.succeeded_retention_secs,
            config.jobs.failed_retention_secs,
        );
        let notification_dispatcher = NotificationDispatcher::new(device_tokens.clone(), push_provider, mailer);

        let state = api::AppState { config, job_service, device_tokens, sse_hub };

        Ok(App {
            pool,
            state,
            event_bus,
            workers: Workers { job_workers, lease_reaper, retention_sweeper, notification_dispatcher },
        })
    }
}

/// Runs database migrations.
///
/// # Errors
/// Returns an error if migrations fail.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await.map_err(Into::into)
}

/// Sets up a panic hook that logs the panic message and location.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .map_or_else(|| payload.downcast_ref::<String>().map_or_else(|| "Box<Any>", String::as_str), |s| *s);

        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), |location| format!("{}:{}:{}", location.file(), location.line(), location.column()));

        tracing::error!(panic.message = %msg, panic.location = %location, "Application panicked");
    }));
}

/// Returns a future that completes when a termination signal is received.
///
/// # Panics
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

/// Spawns a task that listens for OS signals and broadcasts a shutdown signal.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
}
