use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment prefix shared by every service (`APP_SERVER__PORT=9000`).
pub const ENV_PREFIX: &str = "APP";

/// Resolve a service's `config/` directory whether the process runs from the
/// workspace root or from inside the crate directory.
pub fn configuration_directory(crate_dir: &str) -> Result<PathBuf, AppError> {
    let base_path = std::env::current_dir()?;

    if base_path.ends_with(crate_dir) {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join(crate_dir).join("config"))
    }
}

/// Load layered settings: `base.yaml` from `directory` first, then any
/// `APP_`-prefixed environment variables using `__` as the nesting separator.
///
/// `.env` is loaded beforehand so local overrides behave like exported
/// variables.
pub fn load<T: DeserializeOwned>(directory: &Path) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let settings = Cfg::builder()
        .add_source(File::from(directory.join("base.yaml")).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
