pub mod device_token_registry;
pub mod event_bus;
pub mod job_service;
pub mod sse_hub;
