use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[cfg(feature = "native")]
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[cfg(feature = "native")]
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(String),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot store for feed '{0}' is no longer running")]
    ActorClosed(String),
}

#[cfg(feature = "native")]
impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

#[cfg(feature = "native")]
impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::TomlSerialization(err.to_string())
    }
}
