//! Model-provider credential resolution.
//!
//! The credential is read from a [`SecretStore`] once per UI session, checked
//! locally, and kept inside a [`secrecy::Secret`] so it cannot end up in logs
//! or error messages by accident.

use crate::error::StartupError;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::fmt;

/// Name of the one secret this service reads.
pub const CREDENTIAL_KEY: &str = "GEMINI_API_KEY";

/// Provider keys are 39 characters; anything under this is a paste error.
pub const MIN_CREDENTIAL_LEN: usize = 30;

/// Read-only key/value lookup supplied by the hosting environment.
pub trait SecretStore: Send + Sync {
    /// `None` when the key is absent. A present but undecodable value comes
    /// back as an empty secret.
    fn get(&self, key: &str) -> Option<Secret<String>>;
}

/// Process environment. `.env` is loaded into it at startup by `dotenvy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, key: &str) -> Option<Secret<String>> {
        match std::env::var(key) {
            Ok(value) => Some(Secret::new(value)),
            Err(std::env::VarError::NotPresent) => None,
            Err(std::env::VarError::NotUnicode(_)) => Some(Secret::new(String::new())),
        }
    }
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct StaticSecretStore {
    values: HashMap<String, Secret<String>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), Secret::new(value.into()));
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, key: &str) -> Option<Secret<String>> {
        self.values.get(key).cloned()
    }
}

/// A provider API key that passed the local checks.
#[derive(Clone)]
pub struct Credential(Secret<String>);

impl Credential {
    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Replace any occurrence of the key in `text`, for diagnostics that echo
    /// request details back.
    pub fn scrub(&self, text: &str) -> String {
        text.replace(self.expose(), "[REDACTED]")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Read and sanity-check [`CREDENTIAL_KEY`]. Deterministic: there is nothing
/// to retry without operator action.
pub fn resolve_credential(store: &dyn SecretStore) -> Result<Credential, StartupError> {
    let secret = store.get(CREDENTIAL_KEY).ok_or(StartupError::MissingCredential {
        key: CREDENTIAL_KEY,
    })?;

    let value = secret.expose_secret();
    if value.trim().is_empty() {
        return Err(StartupError::EmptyCredential {
            key: CREDENTIAL_KEY,
            reason: "value is empty",
        });
    }
    if value.trim() != value {
        return Err(StartupError::EmptyCredential {
            key: CREDENTIAL_KEY,
            reason: "value has leading or trailing whitespace",
        });
    }
    if value.chars().count() < MIN_CREDENTIAL_LEN {
        return Err(StartupError::EmptyCredential {
            key: CREDENTIAL_KEY,
            reason: "value is too short to be an API key",
        });
    }

    tracing::debug!(key = CREDENTIAL_KEY, "Credential resolved");
    Ok(Credential(secret))
}
