use serde::Deserialize;
use service_core::error::AppError;
use service_core::observability::TelemetryConfig;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Inactivity window after which a UI session and its conversation are
    /// dropped.
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

fn default_session_idle_minutes() -> u64 {
    120
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    /// Provider model identifier (e.g. `gemini-2.5-flash`).
    pub id: String,
    /// Base URL of the Gemini REST API, without a trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl ModelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let directory = service_core::config::configuration_directory("fv-assistant")?;
    service_core::config::load(&directory)
}
