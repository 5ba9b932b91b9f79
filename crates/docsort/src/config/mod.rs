pub mod loader;
pub mod schema;

use std::path::PathBuf;

pub use loader::{load_config, load_config_from_str, validate_config, ConfigFormat};
pub use schema::{CategoryPath, CategoryRule, Config, FileKind, LlmConfig, OcrConfig};

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DOCSORT_CONFIG";

/// Picks the config file: explicit path, then `$DOCSORT_CONFIG`, then
/// `<config_dir>/docsort/config.yaml`.
pub fn default_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(crate::secrets::expand_home(path.trim()));
        }
    }

    let candidate = dirs::config_dir().map(|dir| dir.join("docsort").join("config.yaml"));
    match candidate {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(ConfigError::NotFound(format!(
            "--config, ${}, {}",
            CONFIG_ENV,
            path.display()
        ))),
        None => Err(ConfigError::NotFound(format!("--config, ${}", CONFIG_ENV))),
    }
}
