use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/**
 * Everything that can go wrong below the HTTP layer
 */
#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Corrupt collection `{key}`: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Option {option} does not exist in poll {poll}")]
    UnknownOption { poll: String, option: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
