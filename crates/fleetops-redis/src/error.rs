//! Connection layer error types

use thiserror::Error;

/// Connection layer errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for ClientError {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
