pub mod credential;
pub mod metrics;
pub mod model_session;
pub mod providers;
pub mod registry;
pub mod relay;
pub mod session_store;
