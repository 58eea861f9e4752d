// src/config.rs

//! Configuration loading utilities.
//!
//! A run's configuration is layered: TOML file (or defaults), then
//! environment overrides.

use std::path::Path;

use crate::models::Config;

#[cfg(feature = "s3")]
pub use lambda_loader::LambdaConfigLoader;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

/// Load configuration from a TOML file and apply process environment overrides.
///
/// Falls back to defaults if the file is missing or unreadable.
pub fn load_config(path: &Path) -> Config {
    let mut config = if path.exists() {
        Config::load_or_default(path)
    } else {
        log::debug!("No config file at {:?}, using defaults", path);
        Config::default()
    };
    config.apply_process_env();
    config
}

#[cfg(feature = "s3")]
mod lambda_loader {
    use crate::error::{AppError, Result};
    use crate::models::Config;
    use crate::storage::s3::S3Storage;

    /// Config loader for the Lambda environment.
    pub struct LambdaConfigLoader<'a> {
        storage: &'a S3Storage,
    }

    impl<'a> LambdaConfigLoader<'a> {
        pub fn new(storage: &'a S3Storage) -> Self {
            Self { storage }
        }

        /// Read `config.toml` under the storage prefix, or defaults when absent.
        ///
        /// Environment overrides are applied on top in both cases.
        pub async fn load_config(&self) -> Result<Config> {
            let key = self.storage.key("config.toml");
            log::info!("Loading config file from S3: {}", key);

            let mut config = match self.storage.read_bytes_optional(&key).await? {
                Some(bytes) => {
                    let s = String::from_utf8(bytes).map_err(|e| {
                        AppError::config(format!("Config file {} is not valid UTF-8: {}", key, e))
                    })?;
                    Config::from_toml_str(&s)?
                }
                None => {
                    log::info!("No config at {}, using defaults", key);
                    Config::default()
                }
            };
            config.apply_process_env();
            Ok(config)
        }
    }
}
