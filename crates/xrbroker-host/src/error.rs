use thiserror::Error;

use xrbroker_core::BrokerError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("manifest error in {path}: {message}")]
    ManifestError { path: String, message: String },

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl From<HostError> for BrokerError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::Broker(inner) => inner,
            HostError::ManifestError { .. } => BrokerError::Registry(e.to_string()),
            other => BrokerError::Preference(other.to_string()),
        }
    }
}
