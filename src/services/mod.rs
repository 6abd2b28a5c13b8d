pub mod clock;
pub mod correlation;
pub mod credential_store;
pub mod request_client;
pub mod route_guard;
pub mod session;
pub mod telemetry;
