//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ServiceConfig;
use crate::config::validation::ValidationError;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "apiserver.toml";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file was given and `apiserver.toml` does not exist.
    Defaults,
}

impl ConfigSource {
    /// Report the source. Called once logging is installed, since the log
    /// level itself comes from the loaded file.
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                tracing::info!(path = %path.display(), "Configuration file loaded");
            }
            ConfigSource::Defaults => {
                tracing::warn!(
                    file = DEFAULT_CONFIG_FILE,
                    "No configuration file found, using defaults"
                );
            }
        }
    }
}

/// Load configuration from a TOML file.
///
/// With an explicit `path` the file must exist. Without one, `apiserver.toml`
/// in the working directory is used when present and defaults otherwise.
/// Validation is left to the caller so command-line overrides can be
/// applied first.
pub fn load_config(path: Option<&Path>) -> Result<(ServiceConfig, ConfigSource), ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.exists() {
                return Ok((ServiceConfig::default(), ConfigSource::Defaults));
            }
            fallback
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config: ServiceConfig =
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

    Ok((config, ConfigSource::File(path)))
}
