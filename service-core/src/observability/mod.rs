pub mod logging;

pub use logging::{TelemetryConfig, init_tracing};
