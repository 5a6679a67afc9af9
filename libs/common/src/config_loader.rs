//! Configuration loading helper functions
//!
//! Layered loading with `figment`. Priority (highest to lowest):
//! 1. Environment variables (prefixed, `__` separates nested keys)
//! 2. Config file (YAML, TOML or JSON by extension)
//! 3. Default values of the target type

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Build the figment for `T` without extracting it
///
/// A missing file is an error when a path is given explicitly.
pub fn config_figment<T>(path: Option<&Path>, env_prefix: &str) -> Result<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };
        info!("Loading configuration from {}", path.display());
    }

    debug!(prefix = env_prefix, "Applying environment overrides");
    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load configuration: defaults, then optional file, then `{env_prefix}*` variables
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    config_figment::<T>(path, env_prefix)?
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}
