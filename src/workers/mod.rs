pub mod job_worker;
pub mod lease_reaper;
pub mod notification_dispatcher;
pub mod retention_sweeper;
pub mod retry_policy;

pub use job_worker::JobWorkerPool;
pub use lease_reaper::LeaseReaperWorker;
pub use notification_dispatcher::NotificationDispatcher;
pub use retention_sweeper::RetentionSweeperWorker;
pub use retry_policy::RetryPolicy;
