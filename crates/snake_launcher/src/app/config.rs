use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use snake_engine::{SessionConfig, SessionError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: SessionError,
    },
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub(crate) fn load_session_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "session_config_defaulted");
            return Ok(SessionConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config = parse_session_config(&raw).map_err(|(field, source)| ConfigError::Parse {
        path: path.to_path_buf(),
        field,
        source,
    })?;
    config.validate().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        path = %path.display(),
        grid_width = config.grid.width,
        grid_height = config.grid.height,
        kinds = config.kinds.len(),
        "session_config_loaded"
    );
    Ok(config)
}

fn parse_session_config(raw: &str) -> Result<SessionConfig, (String, serde_json::Error)> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SessionConfig>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        let field = if field.is_empty() { ".".to_string() } else { field };
        (field, error.into_inner())
    })
}
