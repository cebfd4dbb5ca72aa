use clap::Parser;

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_SERVER_MGMT_PORT: u16 = 8081;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

const DEFAULT_MAX_ATTEMPTS: i32 = 3;
const DEFAULT_BACKOFF_BASE_SECS: i64 = 60;
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
const DEFAULT_BACKOFF_MAX_SECS: i64 = 3600;
const DEFAULT_LEASE_VISIBILITY_TIMEOUT_SECS: i64 = 30;
const DEFAULT_WORKER_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_CONCURRENCY_STORY_FOR_PROMPT: usize = 2;
const DEFAULT_CONCURRENCY_STORY_FOR_CHILD: usize = 2;
const DEFAULT_CONCURRENCY_VOICE_CLONE: usize = 2;
const DEFAULT_LEASE_REAPER_INTERVAL_SECS: u64 = 30;
const DEFAULT_RETENTION_SWEEPER_INTERVAL_SECS: u64 = 300;
const DEFAULT_SUCCEEDED_RETENTION_SECS: i64 = 2 * 3600;
const DEFAULT_FAILED_RETENTION_SECS: i64 = 24 * 3600;

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SSE_HEARTBEAT_INTERVAL_SECS: u64 = 20;
const DEFAULT_SSE_CLIENT_BUFFER_SIZE: usize = 32;

const DEFAULT_TOKEN_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Process-wide configuration, assembled from env vars and CLI flags via
/// `clap::Parser`. Grouped the way the service's components are grouped —
/// each sub-config travels with the component that owns its defaults.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub jobs: JobConfig,

    #[command(flatten)]
    pub notifications: NotificationConfig,

    #[command(flatten)]
    pub sse: SseConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Parser)]
pub struct ServerConfig {
    #[arg(long, env, default_value = DEFAULT_SERVER_HOST)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    #[arg(long, env, default_value_t = DEFAULT_SERVER_MGMT_PORT)]
    pub mgmt_port: u16,
}

#[derive(Clone, Debug, Parser)]
pub struct DatabaseConfig {
    #[arg(long, env)]
    pub database_url: String,

    #[arg(long, env, default_value_t = DEFAULT_DB_MAX_CONNECTIONS)]
    pub max_connections: u32,

    #[arg(long, env, default_value_t = DEFAULT_DB_ACQUIRE_TIMEOUT_SECS)]
    pub acquire_timeout_secs: u64,
}

/// Tunables for the Job Store and Worker Pool: retry discipline, leasing,
/// per-kind concurrency, and the background reaper/sweeper intervals.
#[derive(Clone, Debug, Parser)]
pub struct JobConfig {
    #[arg(long, env, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: i32,

    #[arg(long, env, default_value_t = DEFAULT_BACKOFF_BASE_SECS)]
    pub backoff_base_secs: i64,

    #[arg(long, env, default_value_t = DEFAULT_BACKOFF_FACTOR)]
    pub backoff_factor: f64,

    #[arg(long, env, default_value_t = DEFAULT_BACKOFF_MAX_SECS)]
    pub backoff_max_secs: i64,

    /// How long a lease is held before a job is considered stalled and
    /// eligible for reclaim by the lease-reaper.
    #[arg(long, env, default_value_t = DEFAULT_LEASE_VISIBILITY_TIMEOUT_SECS)]
    pub lease_visibility_timeout_secs: i64,

    #[arg(long, env, default_value_t = DEFAULT_WORKER_POLL_INTERVAL_SECS)]
    pub worker_poll_interval_secs: u64,

    #[arg(long, env, default_value_t = DEFAULT_CONCURRENCY_STORY_FOR_PROMPT)]
    pub concurrency_story_for_prompt: usize,

    #[arg(long, env, default_value_t = DEFAULT_CONCURRENCY_STORY_FOR_CHILD)]
    pub concurrency_story_for_child: usize,

    #[arg(long, env, default_value_t = DEFAULT_CONCURRENCY_VOICE_CLONE)]
    pub concurrency_voice_clone: usize,

    #[arg(long, env, default_value_t = DEFAULT_LEASE_REAPER_INTERVAL_SECS)]
    pub lease_reaper_interval_secs: u64,

    #[arg(long, env, default_value_t = DEFAULT_RETENTION_SWEEPER_INTERVAL_SECS)]
    pub retention_sweeper_interval_secs: u64,

    #[arg(long, env, default_value_t = DEFAULT_SUCCEEDED_RETENTION_SECS)]
    pub succeeded_retention_secs: i64,

    #[arg(long, env, default_value_t = DEFAULT_FAILED_RETENTION_SECS)]
    pub failed_retention_secs: i64,
}

impl JobConfig {
    #[must_use]
    pub fn concurrency_for(&self, kind: crate::domain::job::JobKind) -> usize {
        match kind {
            crate::domain::job::JobKind::StoryForPrompt => self.concurrency_story_for_prompt,
            crate::domain::job::JobKind::StoryForChild => self.concurrency_story_for_child,
            crate::domain::job::JobKind::VoiceClone => self.concurrency_voice_clone,
        }
    }
}

/// Tunables for the Device Token Registry and the Notification Dispatcher.
#[derive(Clone, Debug, Parser)]
pub struct NotificationConfig {
    #[arg(long, env, default_value_t = DEFAULT_TOKEN_CLEANUP_INTERVAL_SECS)]
    pub invalid_token_cleanup_interval_secs: u64,
}

/// Tunables for the Event Bus and SSE Hub.
#[derive(Clone, Debug, Parser)]
pub struct SseConfig {
    #[arg(long, env, default_value_t = DEFAULT_EVENT_CHANNEL_CAPACITY)]
    pub event_channel_capacity: usize,

    #[arg(long, env, default_value_t = DEFAULT_SSE_HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,

    #[arg(long, env, default_value_t = DEFAULT_SSE_CLIENT_BUFFER_SIZE)]
    pub client_buffer_size: usize,
}

#[derive(Clone, Debug, Parser)]
pub struct AuthConfig {
    #[arg(long, env)]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Parser)]
pub struct TelemetryConfig {
    #[arg(long, env)]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env, default_value = "fableforge-server")]
    pub service_name: String,

    #[arg(long, env, default_value_t = false)]
    pub json_logs: bool,
}
