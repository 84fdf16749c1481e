//! Error taxonomy for the chat core.
//!
//! [`StartupError`] halts a UI session before any conversation happens;
//! [`RelayError`] is scoped to a single submitted turn and leaves the session
//! usable.

use crate::services::credential::CREDENTIAL_KEY;
use thiserror::Error;

/// Fatal errors raised while resolving the credential or opening the model
/// session. None of these carry the credential value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("secret {key} is not configured")]
    MissingCredential { key: &'static str },

    #[error("secret {key} is empty or malformed: {reason}")]
    EmptyCredential {
        key: &'static str,
        reason: &'static str,
    },

    #[error("model provider rejected the connection: {0}")]
    ConnectionRejected(String),

    #[error("model {model} is unavailable: {detail}")]
    ModelUnavailable { model: String, detail: String },
}

impl StartupError {
    /// Stable identifier used in metrics and JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            StartupError::MissingCredential { .. } => "missing_credential",
            StartupError::EmptyCredential { .. } => "empty_credential",
            StartupError::ConnectionRejected(_) => "connection_rejected",
            StartupError::ModelUnavailable { .. } => "model_unavailable",
        }
    }

    /// Operator-facing message shown on the halted page.
    pub fn headline(&self) -> String {
        match self {
            StartupError::MissingCredential { key } => {
                format!("Error: La clave {} no se encontró.", key)
            }
            StartupError::EmptyCredential { key, .. } => {
                format!("Error: La clave {} está vacía o no es válida.", key)
            }
            StartupError::ConnectionRejected(_) => {
                "Error: El proveedor del modelo rechazó la conexión.".to_string()
            }
            StartupError::ModelUnavailable { model, .. } => {
                format!("Error: El modelo '{}' no está disponible.", model)
            }
        }
    }

    /// What the operator has to change before reloading.
    pub fn remediation(&self) -> String {
        match self {
            StartupError::MissingCredential { .. } | StartupError::EmptyCredential { .. } => {
                format!(
                    "Define la variable {} en el entorno del servidor (o en el archivo .env) \
                     con una clave de API válida y recarga la página.",
                    CREDENTIAL_KEY
                )
            }
            StartupError::ConnectionRejected(_) => format!(
                "Comprueba que la clave {} es correcta y está activa; si fue revocada, \
                 genera una nueva y recarga la página.",
                CREDENTIAL_KEY
            ),
            StartupError::ModelUnavailable { .. } => "Verifica el identificador del modelo \
                 (APP_MODEL__ID); el proveedor puede haberlo renombrado o retirado."
                .to_string(),
        }
    }
}

/// Per-turn relay failures. The message is the provider diagnostic as is,
/// already scrubbed of the credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("a previous message is still being answered")]
    Busy,

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    MalformedResponse(String),
}

impl RelayError {
    /// Stable identifier used in metrics and JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Busy => "busy",
            RelayError::Startup(e) => e.kind(),
            RelayError::Network(_) => "network",
            RelayError::Provider(_) => "provider",
            RelayError::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Whether the session is halted until the operator intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Startup(_))
    }
}
