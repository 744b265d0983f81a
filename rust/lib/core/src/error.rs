use thiserror::Error;

/// Configuration could not be built from the given sources.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("missing {0}")]
    Missing(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}
